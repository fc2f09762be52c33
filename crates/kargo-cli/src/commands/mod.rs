//! CLI commands and argument parsing.

pub mod registries;
pub mod select;
pub mod tags;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kargo_image::{Credentials, DirectoryConfig, HttpConfig, RegistryDirectory};
use tokio_util::sync::CancellationToken;

/// Kargo image discovery
#[derive(Parser)]
#[command(name = "kargo-image")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Select images from a repository
    Select(select::SelectArgs),

    /// List the tags of a repository
    Tags(tags::TagsArgs),

    /// Show the registries known to the directory
    Registries(registries::RegistriesArgs),

    /// Print version information
    Version,
}

/// Connection options shared by commands that talk to a registry.
#[derive(Args, Debug)]
pub struct RegistryArgs {
    /// Username for registry authentication
    #[arg(short, long, env = "KARGO_REGISTRY_USERNAME")]
    pub username: Option<String>,

    /// Password or access token for registry authentication
    #[arg(long, env = "KARGO_REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,
}

impl RegistryArgs {
    /// Returns the configured credentials, or `None` for anonymous access.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        let credentials = Credentials::new(
            self.username.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
        );
        (!credentials.is_anonymous()).then_some(credentials)
    }

    /// Returns the HTTP settings.
    #[must_use]
    pub fn http(&self) -> HttpConfig {
        HttpConfig::default().with_timeout(Duration::from_secs(self.timeout))
    }
}

/// Builds a registry directory from the environment.
///
/// # Errors
///
/// Returns an error if the rate-limit overrides are malformed.
pub fn directory() -> Result<RegistryDirectory> {
    let config = DirectoryConfig::from_env().context("Invalid registry configuration")?;
    Ok(RegistryDirectory::new(config))
}

/// Returns a token cancelled on Ctrl-C.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    token
}
