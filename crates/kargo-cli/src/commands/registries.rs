//! Registries command implementation.
//!
//! Shows how the directory resolves registry host prefixes: API address,
//! page size and effective rate limit.

use std::fmt::Write as _;

use anyhow::Result;
use clap::Args;

use kargo_image::{Registry, RegistryDirectory};

use super::directory;

/// Arguments for the registries command.
#[derive(Args)]
pub struct RegistriesArgs {
    /// Additional registry hosts to resolve (e.g., `quay.io`)
    pub hosts: Vec<String>,
}

/// Runs the registries command.
///
/// # Errors
///
/// Returns an error if the registry configuration in the environment is
/// malformed.
pub fn run(args: &RegistriesArgs) -> Result<()> {
    let directory = directory()?;
    print!("{}", render(&directory, &args.hosts));
    Ok(())
}

fn render(directory: &RegistryDirectory, hosts: &[String]) -> String {
    for host in hosts {
        let _ = directory.get(host);
    }

    let mut out = String::new();
    for prefix in directory.prefixes() {
        let registry = directory.get(&prefix);
        let _ = writeln!(
            out,
            "{:<28} {:<32} page={:<5} rps={}",
            registry.name(),
            registry.api_address(),
            registry.page_size(),
            rate(&registry),
        );
    }
    out
}

fn rate(registry: &Registry) -> String {
    let interval = registry.limiter().interval();
    if interval.is_zero() {
        "unlimited".to_string()
    } else {
        format!("{:.0}", 1.0 / interval.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kargo_image::DirectoryConfig;

    #[test]
    fn test_render_includes_seeded_and_requested_hosts() {
        let directory =
            RegistryDirectory::new(DirectoryConfig::default().with_rate_limit("quay.io", 5));
        let text = render(&directory, &["quay.io".to_string(), "docker.io".to_string()]);
        let lines: Vec<_> = text.lines().collect();

        // Docker Hub aliases do not add entries.
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Docker Hub"));
        assert!(lines[0].contains("https://registry-1.docker.io"));
        assert!(lines[1].starts_with("GitHub Container Registry"));
        assert!(lines[1].contains("page=100"));
        assert!(lines[2].starts_with("quay.io"));
        assert!(lines[2].ends_with("rps=5"));
    }
}
