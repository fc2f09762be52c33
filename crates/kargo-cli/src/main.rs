//! Kargo image CLI - discover and select container images from the command line.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kargo_image=info,kargo_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Select(args) => commands::select::run(args).await,
        Commands::Tags(args) => commands::tags::run(&args).await,
        Commands::Registries(args) => commands::registries::run(&args),
        Commands::Version => {
            println!("kargo-image {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
