//! # Kargo Image
//!
//! Container image discovery for Kargo warehouses.
//!
//! This crate lists the tags of a repository in any Docker Registry v2 or
//! OCI Distribution compatible registry, ranks them under a selection
//! strategy and resolves the best candidates to [`Artifact`]s carrying a
//! digest and build time.
//!
//! ## Features
//!
//! - **Selection strategies**: `Digest`, `Lexical`, `NewestBuild` and `SemVer`
//! - **Every manifest format**: Docker schema 1 and 2, OCI manifests, manifest
//!   lists and image indexes
//! - **Platform filtering**: pick the `os/arch[/variant]` image out of
//!   multi-platform lists
//! - **Registry etiquette**: per-registry rate limits, a digest cache and a
//!   process-wide ceiling on concurrent fetches
//! - **Auth**: anonymous, Basic and Bearer token challenges
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kargo_image::{
//!     DirectoryConfig, FetchLimiter, HttpConfig, RegistryDirectory, SelectorFactory,
//!     SelectorOptions,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directory = RegistryDirectory::new(DirectoryConfig::from_env()?);
//!     let factory = SelectorFactory::new(
//!         Arc::new(directory),
//!         FetchLimiter::default(),
//!         &HttpConfig::default(),
//!     )?;
//!
//!     let opts = SelectorOptions {
//!         platform: "linux/amd64".to_string(),
//!         discovery_limit: 10,
//!         ..SelectorOptions::default()
//!     };
//!     let selector = factory.new_selector("ghcr.io/akuity/kargo", "SemVer", opts).await?;
//!     for artifact in selector.select(&CancellationToken::new()).await? {
//!         println!("{:?} {}", artifact.tag, artifact.digest);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SelectorFactory                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │ SelectorPlan │  │ FetchLimiter │  │RegistryDirectory │   │
//! │  │ (validation) │  │  (ceiling)   │  │ (limits, cache)  │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Selector ──▶ Repository (RepositoryClient)                 │
//! │                 │  Authorizer ──▶ RateLimitedTransport      │
//! └─────────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │       Registry (Docker Hub, GHCR, Harbor, ECR, etc.)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod artifact;
mod auth;
mod cache;
mod client;
mod config;
pub mod directory;
mod error;
mod extract;
mod fetcher;
mod limiter;
mod oci;
mod platform;
mod repository;
mod selector;
mod transport;
pub mod version;

pub use artifact::Artifact;
pub use auth::{Authorizer, Challenge, Credentials};
pub use cache::DigestCache;
pub use client::RepositoryClient;
pub use config::{parse_rate_limits, DirectoryConfig, HttpConfig, RATE_LIMITS_ENV};
pub use directory::{Registry, RegistryDirectory, RepositoryRef};
pub use error::{ImageError, Result};
pub use fetcher::FetchLimiter;
pub use limiter::RateLimiter;
pub use oci::{
    compute_digest, media_type, Descriptor, ImageConfig, ImageIndex, ImageManifest, LegacyHistory,
    LegacyManifest, Manifest, Platform,
};
pub use platform::PlatformConstraint;
pub use repository::Repository;
pub use selector::{
    DigestSelector, LexicalSelector, NewestBuildSelector, SelectionStrategy, SelectorFactory,
    SelectorOptions, SelectorPlan, SemVerSelector, Selector, TagFilter,
};
pub use transport::RateLimitedTransport;
