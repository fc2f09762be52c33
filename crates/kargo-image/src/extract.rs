//! Turning decoded manifests and image configs into artifacts.

use chrono::{DateTime, Utc};

use crate::artifact::Artifact;
use crate::error::{ImageError, Result};
use crate::oci::{ImageConfig, ImageIndex, LegacyManifest};
use crate::platform::{is_image_platform, PlatformConstraint};

/// Reads the image config embedded in a schema 1 manifest's most recent
/// history entry.
pub(crate) fn legacy_config(manifest: &LegacyManifest, digest: &str) -> Result<ImageConfig> {
    let entry = manifest.history.first().ok_or_else(|| ImageError::NoHistory {
        digest: digest.to_string(),
    })?;

    serde_json::from_str(&entry.v1_compatibility).map_err(|e| ImageError::MalformedHistory {
        digest: digest.to_string(),
        reason: e.to_string(),
    })
}

/// Decodes a config blob.
pub(crate) fn image_config(blob: &[u8], digest: &str) -> Result<ImageConfig> {
    serde_json::from_slice(blob).map_err(|e| ImageError::MalformedHistory {
        digest: digest.to_string(),
        reason: e.to_string(),
    })
}

/// Builds the artifact described by an image config.
///
/// Returns `None` for non-image configs (empty or `unknown` platform) and
/// for configs that do not match the platform constraint. A missing
/// creation time leaves `created_at` unset; an unparseable one is an error.
pub(crate) fn artifact_from_config(
    config: &ImageConfig,
    digest: String,
    platform: Option<&PlatformConstraint>,
) -> Result<Option<Artifact>> {
    if !is_image_platform(&config.os, &config.architecture) {
        tracing::trace!(digest = %digest, "Skipping non-image manifest");
        return Ok(None);
    }
    if let Some(platform) = platform {
        if !platform.matches(&config.os, &config.architecture, &config.variant) {
            return Ok(None);
        }
    }

    let created_at = match config.created.as_deref().filter(|c| !c.is_empty()) {
        Some(created) => Some(parse_created(created).map_err(|e| ImageError::MalformedHistory {
            digest: digest.clone(),
            reason: format!("invalid creation time '{created}': {e}"),
        })?),
        None => None,
    };

    Ok(Some(Artifact::new(digest).with_created_at(created_at)))
}

fn parse_created(created: &str) -> chrono::ParseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(created).map(|t| t.with_timezone(&Utc))
}

/// Picks the children of a manifest list or index to resolve.
///
/// Children that are not images are dropped. With a platform constraint at
/// most one child is returned.
///
/// # Errors
///
/// Returns [`ImageError::EmptyCollection`] if no image children remain and
/// [`ImageError::AmbiguousPlatformMatch`] if several match the constraint.
pub(crate) fn collection_children(
    index: &ImageIndex,
    digest: &str,
    platform: Option<&PlatformConstraint>,
) -> Result<Vec<String>> {
    let images: Vec<_> = index.manifests.iter().filter(|d| d.is_image()).collect();
    if images.is_empty() {
        return Err(ImageError::EmptyCollection {
            digest: digest.to_string(),
        });
    }

    let Some(platform) = platform else {
        return Ok(images.into_iter().map(|d| d.digest.clone()).collect());
    };

    let matched: Vec<String> = images
        .into_iter()
        .filter(|d| {
            d.platform
                .as_ref()
                .is_some_and(|p| platform.matches(&p.os, &p.architecture, &p.variant))
        })
        .map(|d| d.digest.clone())
        .collect();

    if matched.len() > 1 {
        return Err(ImageError::AmbiguousPlatformMatch {
            digest: digest.to_string(),
            platform: platform.to_string(),
            count: matched.len(),
        });
    }
    Ok(matched)
}

/// Folds resolved children into the artifact for their list or index.
///
/// The list's own digest is kept and its creation time is that of the most
/// recently created child. Returns `None` if no child resolved.
pub(crate) fn collection_artifact(digest: String, children: &[Artifact]) -> Option<Artifact> {
    if children.is_empty() {
        return None;
    }
    let latest = children.iter().filter_map(|c| c.created_at).max();
    Some(Artifact::new(digest).with_created_at(latest))
}
