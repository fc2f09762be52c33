//! Tags command implementation.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use kargo_image::{Repository, RepositoryClient};

use super::{directory, RegistryArgs};

/// Arguments for the tags command.
#[derive(Args)]
pub struct TagsArgs {
    /// Repository URL (e.g., `ghcr.io/akuity/kargo` or `nginx`)
    pub repo_url: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

/// Runs the tags command.
///
/// # Errors
///
/// Returns an error if the registry cannot be reached or the tags cannot be
/// listed.
pub async fn run(args: &TagsArgs) -> Result<()> {
    let directory = directory()?;
    let http = args
        .registry
        .http()
        .build_client(args.registry.insecure_skip_tls_verify)
        .context("Failed to create HTTP client")?;

    let client = RepositoryClient::connect(
        &directory,
        &args.repo_url,
        args.registry.credentials(),
        http,
    )
    .await
    .with_context(|| format!("Failed to connect to {}", args.repo_url))?;

    let tags = client
        .tags()
        .await
        .with_context(|| format!("Failed to list tags of {}", args.repo_url))?;
    info!(repository = %client.repository().normalized, count = tags.len(), "Listed tags");

    for tag in &tags {
        println!("{tag}");
    }
    Ok(())
}
