//! Select command implementation.
//!
//! Runs one selection strategy against a repository and prints the result.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use kargo_image::{Artifact, FetchLimiter, SelectorFactory, SelectorOptions};

use super::{directory, interrupt_token, RegistryArgs};

/// Output formats for selected images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned columns
    Text,
    /// JSON array of artifacts
    Json,
}

/// Arguments for the select command.
#[derive(Args)]
pub struct SelectArgs {
    /// Repository URL (e.g., `ghcr.io/akuity/kargo` or `nginx`)
    pub repo_url: String,

    /// Selection strategy: Digest, Lexical, NewestBuild or SemVer
    #[arg(short, long, default_value = "SemVer")]
    pub strategy: String,

    /// Tag to track (Digest) or version range (SemVer)
    #[arg(short, long)]
    pub constraint: Option<String>,

    /// Regular expression tags must match
    #[arg(long)]
    pub allow: Option<String>,

    /// Tag to exclude (repeatable)
    #[arg(long)]
    pub ignore: Vec<String>,

    /// Platform images must be built for (`os/arch[/variant]`)
    #[arg(short, long)]
    pub platform: Option<String>,

    /// Maximum number of images to return (0 for all)
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Require SemVer tags to have major, minor and patch components
    #[arg(long)]
    pub strict_semvers: bool,

    /// Maximum concurrent metadata fetches
    #[arg(long, default_value_t = FetchLimiter::DEFAULT_CEILING)]
    pub concurrency: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

impl SelectArgs {
    fn options(&self) -> SelectorOptions {
        SelectorOptions {
            constraint: self.constraint.clone().unwrap_or_default(),
            allow_regex: self.allow.clone().unwrap_or_default(),
            ignore: self.ignore.clone(),
            platform: self.platform.clone().unwrap_or_default(),
            credentials: self.registry.credentials(),
            discovery_limit: self.limit,
            insecure_skip_tls_verify: self.registry.insecure_skip_tls_verify,
            strict_semvers: self.strict_semvers,
        }
    }
}

/// Runs the select command.
///
/// # Errors
///
/// Returns an error if:
/// - The options are invalid
/// - The registry cannot be reached or queried
/// - The selection is interrupted
pub async fn run(args: SelectArgs) -> Result<()> {
    info!(
        repository = %args.repo_url,
        strategy = %args.strategy,
        limit = args.limit,
        "Selecting images"
    );

    let factory = SelectorFactory::new(
        Arc::new(directory()?),
        FetchLimiter::new(args.concurrency),
        &args.registry.http(),
    )
    .context("Failed to create selector factory")?;

    let selector = factory
        .new_selector(&args.repo_url, &args.strategy, args.options())
        .await
        .with_context(|| format!("Failed to create selector for {}", args.repo_url))?;

    let artifacts = selector
        .select(&interrupt_token())
        .await
        .with_context(|| format!("Failed to select images from {}", args.repo_url))?;

    info!(count = artifacts.len(), "Selection complete");

    match args.output {
        OutputFormat::Text => print!("{}", render_text(&artifacts)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&artifacts)?),
    }
    Ok(())
}

/// Renders artifacts as aligned `TAG DIGEST CREATED` columns.
fn render_text(artifacts: &[Artifact]) -> String {
    if artifacts.is_empty() {
        return "No matching images found\n".to_string();
    }

    let tag_width = artifacts
        .iter()
        .map(|a| a.tag.as_deref().map_or(1, str::len))
        .max()
        .unwrap_or(0)
        .max(3);

    let mut out = format!("{:<tag_width$}  {:<71}  CREATED\n", "TAG", "DIGEST");
    for artifact in artifacts {
        let created = artifact
            .created_at
            .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
        let _ = writeln!(
            out,
            "{:<tag_width$}  {:<71}  {created}",
            artifact.tag.as_deref().unwrap_or("-"),
            artifact.digest,
        );
    }
    out
}
