//! OCI and Docker Distribution wire types.
//!
//! Manifests are decoded into the closed [`Manifest`] union. Only the five
//! media types in [`media_type::ACCEPTED`] are understood; everything else is
//! rejected as unsupported.

use base64::Engine;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{ImageError, Result};

/// Manifest media types.
pub mod media_type {
    /// Docker schema 1 signed manifest.
    pub const DOCKER_V1_SIGNED: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";

    /// Docker schema 2 manifest.
    pub const DOCKER_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

    /// OCI image manifest.
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

    /// Docker manifest list.
    pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

    /// OCI image index.
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

    /// Every manifest media type this crate decodes.
    pub const ACCEPTED: [&str; 5] = [
        DOCKER_V1_SIGNED,
        DOCKER_V2,
        OCI_MANIFEST,
        DOCKER_MANIFEST_LIST,
        OCI_INDEX,
    ];

    /// Returns the `Accept` header value sent with manifest requests.
    #[must_use]
    pub fn accept_header() -> String {
        ACCEPTED.join(", ")
    }
}

/// A content descriptor as it appears in manifests and indices.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    #[serde(default)]
    pub media_type: String,

    /// Digest of the referenced content.
    pub digest: String,

    /// Size in bytes.
    #[serde(default)]
    pub size: u64,

    /// Platform of the referenced image, for index entries.
    #[serde(default)]
    pub platform: Option<Platform>,
}

impl Descriptor {
    /// Returns true if the descriptor points at a runnable image.
    ///
    /// Attestations and other companions carry no platform, or an `unknown`
    /// one.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.platform
            .as_ref()
            .is_some_and(|p| crate::platform::is_image_platform(&p.os, &p.architecture))
    }
}

/// Platform annotation on an index entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Platform {
    /// CPU architecture.
    #[serde(default)]
    pub architecture: String,

    /// Operating system.
    #[serde(default)]
    pub os: String,

    /// CPU variant.
    #[serde(default)]
    pub variant: String,
}

/// A single-image manifest (Docker schema 2 or OCI).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Config blob descriptor.
    pub config: Descriptor,

    /// Layer descriptors.
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

/// A multi-platform manifest list or image index.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Child manifests.
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

/// A Docker schema 1 manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyManifest {
    /// Schema version (always 1).
    pub schema_version: u32,

    /// Repository name.
    #[serde(default)]
    pub name: String,

    /// Tag the manifest was pushed under.
    #[serde(default)]
    pub tag: String,

    /// Layer history, most recent first.
    #[serde(default)]
    pub history: Vec<LegacyHistory>,
}

/// One schema 1 history entry.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyHistory {
    /// Embedded JSON image configuration.
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// The image configuration fields needed for selection.
///
/// Shared by schema 1 history entries and schema 2/OCI config blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImageConfig {
    /// Operating system.
    #[serde(default)]
    pub os: String,

    /// CPU architecture.
    #[serde(default)]
    pub architecture: String,

    /// CPU variant.
    #[serde(default)]
    pub variant: String,

    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub created: Option<String>,
}

/// A decoded manifest of any supported shape.
///
/// Every variant carries the digest of the payload it was decoded from.
#[derive(Debug, Clone)]
pub enum Manifest {
    /// Docker schema 1 signed manifest.
    LegacyV1 {
        /// Digest of the canonical (unsigned) payload.
        digest: String,
        /// Decoded manifest.
        manifest: LegacyManifest,
    },

    /// Docker schema 2 manifest.
    V2 {
        /// Payload digest.
        digest: String,
        /// Decoded manifest.
        manifest: ImageManifest,
    },

    /// OCI image manifest.
    Oci {
        /// Payload digest.
        digest: String,
        /// Decoded manifest.
        manifest: ImageManifest,
    },

    /// Docker manifest list.
    ManifestList {
        /// Payload digest.
        digest: String,
        /// Decoded list.
        index: ImageIndex,
    },

    /// OCI image index.
    ImageIndex {
        /// Payload digest.
        digest: String,
        /// Decoded index.
        index: ImageIndex,
    },
}

impl Manifest {
    /// Decodes a manifest payload.
    ///
    /// The media type is taken from `content_type` when it names a known
    /// type, otherwise from the payload's own `mediaType` field, falling back
    /// to `schemaVersion: 1` for schema 1 manifests served as plain JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::UnsupportedManifestType`] for unknown media
    /// types and [`ImageError::MalformedManifest`] if the payload does not
    /// decode.
    pub fn decode(content_type: Option<&str>, payload: &[u8], reference: &str) -> Result<Self> {
        let malformed = |e: serde_json::Error| ImageError::MalformedManifest {
            reference: reference.to_string(),
            reason: e.to_string(),
        };

        let media_type = match content_type.map(essence) {
            Some(t) if media_type::ACCEPTED.contains(&t) => t.to_string(),
            Some(t) if !is_generic_json(t) => {
                return Err(ImageError::UnsupportedManifestType {
                    reference: reference.to_string(),
                    media_type: t.to_string(),
                });
            }
            _ => sniff_media_type(payload).map_err(malformed)?.ok_or_else(|| {
                ImageError::UnsupportedManifestType {
                    reference: reference.to_string(),
                    media_type: content_type.unwrap_or_default().to_string(),
                }
            })?,
        };

        let manifest = match media_type.as_str() {
            media_type::DOCKER_V1_SIGNED => Self::LegacyV1 {
                digest: compute_digest(&legacy_canonical_payload(payload, reference)?),
                manifest: serde_json::from_slice(payload).map_err(malformed)?,
            },
            media_type::DOCKER_V2 => Self::V2 {
                digest: compute_digest(payload),
                manifest: serde_json::from_slice(payload).map_err(malformed)?,
            },
            media_type::OCI_MANIFEST => Self::Oci {
                digest: compute_digest(payload),
                manifest: serde_json::from_slice(payload).map_err(malformed)?,
            },
            media_type::DOCKER_MANIFEST_LIST => Self::ManifestList {
                digest: compute_digest(payload),
                index: serde_json::from_slice(payload).map_err(malformed)?,
            },
            media_type::OCI_INDEX => Self::ImageIndex {
                digest: compute_digest(payload),
                index: serde_json::from_slice(payload).map_err(malformed)?,
            },
            other => {
                return Err(ImageError::UnsupportedManifestType {
                    reference: reference.to_string(),
                    media_type: other.to_string(),
                });
            }
        };

        Ok(manifest)
    }

    /// Returns the manifest digest.
    #[must_use]
    pub fn digest(&self) -> &str {
        match self {
            Self::LegacyV1 { digest, .. }
            | Self::V2 { digest, .. }
            | Self::Oci { digest, .. }
            | Self::ManifestList { digest, .. }
            | Self::ImageIndex { digest, .. } => digest,
        }
    }

    /// Returns the media type the manifest was decoded as.
    #[must_use]
    pub const fn media_type(&self) -> &'static str {
        match self {
            Self::LegacyV1 { .. } => media_type::DOCKER_V1_SIGNED,
            Self::V2 { .. } => media_type::DOCKER_V2,
            Self::Oci { .. } => media_type::OCI_MANIFEST,
            Self::ManifestList { .. } => media_type::DOCKER_MANIFEST_LIST,
            Self::ImageIndex { .. } => media_type::OCI_INDEX,
        }
    }
}

/// Strips parameters such as `; charset=utf-8` from a content type.
fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

fn is_generic_json(content_type: &str) -> bool {
    matches!(
        content_type,
        "" | "application/json" | "text/plain" | "application/octet-stream"
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestProbe {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Option<serde_json::Value>,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

/// Infers the media type of a payload served without a useful content type.
fn sniff_media_type(payload: &[u8]) -> serde_json::Result<Option<String>> {
    let probe: ManifestProbe = serde_json::from_slice(payload)?;

    if let Some(media_type) = probe.media_type.filter(|t| !t.is_empty()) {
        return Ok(Some(media_type));
    }

    let inferred = match probe.schema_version {
        1 => Some(media_type::DOCKER_V1_SIGNED),
        2 if probe.manifests.is_some() => Some(media_type::OCI_INDEX),
        2 if probe.config.is_some() => Some(media_type::OCI_MANIFEST),
        _ => None,
    };
    Ok(inferred.map(ToString::to_string))
}

#[derive(Deserialize)]
struct Jws {
    #[serde(default)]
    signatures: Vec<JwsSignature>,
}

#[derive(Deserialize)]
struct JwsSignature {
    protected: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JwsProtectedHeader {
    format_length: usize,
    format_tail: String,
}

/// Recovers the unsigned payload of a schema 1 signed manifest.
///
/// The signature block is spliced into the pretty-printed JSON; the
/// protected header records where it starts and the bytes it displaced.
/// Unsigned payloads are returned as-is.
fn legacy_canonical_payload(payload: &[u8], reference: &str) -> Result<Vec<u8>> {
    let malformed = |reason: String| ImageError::MalformedManifest {
        reference: reference.to_string(),
        reason,
    };

    let jws: Jws = serde_json::from_slice(payload).map_err(|e| malformed(e.to_string()))?;
    let Some(signature) = jws.signatures.first() else {
        return Ok(payload.to_vec());
    };

    let header = decode_base64_url(&signature.protected)
        .map_err(|e| malformed(format!("invalid JWS protected header: {e}")))?;
    let header: JwsProtectedHeader = serde_json::from_slice(&header)
        .map_err(|e| malformed(format!("invalid JWS protected header: {e}")))?;
    let tail = decode_base64_url(&header.format_tail)
        .map_err(|e| malformed(format!("invalid JWS format tail: {e}")))?;

    if header.format_length > payload.len() {
        return Err(malformed(format!(
            "JWS format length {} exceeds payload size {}",
            header.format_length,
            payload.len()
        )));
    }

    let mut canonical = payload[..header.format_length].to_vec();
    canonical.extend_from_slice(&tail);
    Ok(canonical)
}

fn decode_base64_url(value: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(value.trim_end_matches('='))
}

/// Computes the `sha256:` digest of a payload.
#[must_use]
pub fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Tag list response.
#[derive(Debug, Clone, Deserialize)]
pub struct TagList {
    /// Tags on this page. Registries send `null` for empty repositories.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Error response body of the Distribution API.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Reported errors.
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
}

/// One Distribution API error.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorInfo {
    /// Error code (e.g., `MANIFEST_UNKNOWN`).
    #[serde(default)]
    pub code: String,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl ErrorResponse {
    /// Renders an error body for a failed response.
    ///
    /// Distribution API error bodies are summarized as `CODE: message`;
    /// anything else is passed through, truncated.
    #[must_use]
    pub fn describe(status: reqwest::StatusCode, body: &[u8]) -> String {
        let detail = serde_json::from_slice::<Self>(body)
            .ok()
            .filter(|r| !r.errors.is_empty())
            .map_or_else(
                || {
                    let text = String::from_utf8_lossy(body);
                    text.trim().chars().take(256).collect::<String>()
                },
                |r| {
                    r.errors
                        .iter()
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .collect::<Vec<_>>()
                        .join("; ")
                },
            );

        if detail.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {detail}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OCI_MANIFEST: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": "sha256:c0ffee",
            "size": 1469
        },
        "layers": []
    }"#;

    const INDEX: &str = r#"{
        "schemaVersion": 2,
        "manifests": [
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:amd64",
                "size": 100,
                "platform": {"architecture": "amd64", "os": "linux"}
            },
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:attestation",
                "size": 100,
                "platform": {"architecture": "unknown", "os": "unknown"}
            }
        ]
    }"#;

    #[test]
    fn test_accept_header_lists_every_type() {
        let header = media_type::accept_header();
        for media_type in media_type::ACCEPTED {
            assert!(header.contains(media_type));
        }
        assert_eq!(header.matches(", ").count(), 4);
    }

    #[test]
    fn test_decode_by_content_type() {
        let manifest = Manifest::decode(
            Some("application/vnd.oci.image.manifest.v1+json; charset=utf-8"),
            OCI_MANIFEST.as_bytes(),
            "v1.0.0",
        )
        .unwrap();

        match &manifest {
            Manifest::Oci { manifest, .. } => assert_eq!(manifest.config.digest, "sha256:c0ffee"),
            other => panic!("unexpected manifest {other:?}"),
        }
        assert_eq!(manifest.digest(), compute_digest(OCI_MANIFEST.as_bytes()));
    }

    #[test]
    fn test_decode_sniffs_generic_json() {
        let manifest = Manifest::decode(Some("application/json"), INDEX.as_bytes(), "latest").unwrap();
        assert_eq!(manifest.media_type(), media_type::OCI_INDEX);

        let manifest = Manifest::decode(None, OCI_MANIFEST.as_bytes(), "latest").unwrap();
        assert_eq!(manifest.media_type(), media_type::OCI_MANIFEST);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = Manifest::decode(
            Some("application/vnd.cncf.helm.config.v1+json"),
            b"{}",
            "latest",
        )
        .unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedManifestType { .. }));
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let err = Manifest::decode(Some(media_type::DOCKER_V2), b"{not json", "latest").unwrap_err();
        assert!(matches!(err, ImageError::MalformedManifest { .. }));
    }

    #[test]
    fn test_index_children_image_filter() {
        let index: ImageIndex = serde_json::from_str(INDEX).unwrap();
        let images: Vec<_> = index.manifests.iter().filter(|d| d.is_image()).collect();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].digest, "sha256:amd64");
    }

    #[test]
    fn test_legacy_unsigned_digest_is_payload_digest() {
        let payload = br#"{"schemaVersion": 1, "history": []}"#;
        let manifest = Manifest::decode(Some(media_type::DOCKER_V1_SIGNED), payload, "old").unwrap();
        assert_eq!(manifest.digest(), compute_digest(payload));
    }

    #[test]
    fn test_legacy_signed_digest_strips_signatures() {
        let canonical = "{\n   \"schemaVersion\": 1,\n   \"history\": []\n}";
        // The signature block replaces the closing "\n}".
        let format_length = canonical.len() - 2;
        let header = format!(
            r#"{{"formatLength":{format_length},"formatTail":"{}"}}"#,
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("\n}")
        );
        let protected = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(header);
        let signed = format!(
            "{},\n   \"signatures\": [{{\"protected\": \"{protected}\", \"signature\": \"x\"}}]\n}}",
            &canonical[..format_length]
        );

        let manifest =
            Manifest::decode(Some(media_type::DOCKER_V1_SIGNED), signed.as_bytes(), "old").unwrap();
        assert_eq!(manifest.digest(), compute_digest(canonical.as_bytes()));
    }

    #[test]
    fn test_compute_digest() {
        let digest = compute_digest(b"test data");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), 7 + 64);
    }

    #[test]
    fn test_error_response_describe() {
        let body = br#"{"errors":[{"code":"MANIFEST_UNKNOWN","message":"manifest unknown"}]}"#;
        let reason = ErrorResponse::describe(reqwest::StatusCode::NOT_FOUND, body);
        assert_eq!(reason, "404 Not Found: MANIFEST_UNKNOWN: manifest unknown");

        let reason = ErrorResponse::describe(reqwest::StatusCode::BAD_GATEWAY, b"");
        assert_eq!(reason, "502 Bad Gateway");
    }

    #[test]
    fn test_tag_list_null_tags() {
        let list: TagList = serde_json::from_str(r#"{"name":"app","tags":null}"#).unwrap();
        assert!(list.tags.is_none());
    }
}
