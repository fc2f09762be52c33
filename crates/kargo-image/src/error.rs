//! Error types for image discovery and selection.

use thiserror::Error;

/// Result type alias for image discovery operations.
pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors that can occur while discovering and selecting images.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Platform string is not of the form `os/arch[/variant]`.
    #[error("invalid platform '{value}': expected os/arch[/variant]")]
    InvalidPlatform {
        /// The rejected platform string.
        value: String,
    },

    /// Repository URL cannot be parsed.
    #[error("invalid repository reference '{reference}': {reason}")]
    InvalidReference {
        /// The rejected reference.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Allow-list pattern does not compile.
    #[error("invalid allow pattern '{pattern}': {source}")]
    InvalidRegex {
        /// The rejected pattern.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// Selection constraint is missing or malformed.
    #[error("invalid constraint '{constraint}': {reason}")]
    InvalidConstraint {
        /// The rejected constraint.
        constraint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Selection strategy name is not recognized.
    #[error("unknown image selection strategy '{name}'")]
    UnknownStrategy {
        /// The unrecognized strategy name.
        name: String,
    },

    /// Operator configuration is malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// The registry API root could not be reached or is not a registry.
    #[error("registry {registry} is unreachable: {reason}")]
    RegistryUnreachable {
        /// Registry host.
        registry: String,
        /// Failure reason.
        reason: String,
    },

    /// The registry's authentication challenge could not be understood.
    #[error("failed to negotiate authentication with {registry}: {reason}")]
    ChallengeNegotiationFailed {
        /// Registry host.
        registry: String,
        /// Failure reason.
        reason: String,
    },

    /// Token exchange or credential use was rejected.
    #[error("authentication with {registry} failed: {reason}")]
    AuthenticationFailed {
        /// Registry host.
        registry: String,
        /// Failure reason.
        reason: String,
    },

    /// Listing tags failed.
    #[error("failed to list tags for {repository}: {reason}")]
    TagListingFailed {
        /// Repository URL.
        repository: String,
        /// Failure reason.
        reason: String,
    },

    /// Fetching a manifest failed.
    #[error("failed to fetch manifest {reference}: {reason}")]
    ManifestFetchFailed {
        /// Tag or digest requested.
        reference: String,
        /// Failure reason.
        reason: String,
    },

    /// Fetching a blob failed.
    #[error("failed to fetch blob {digest}: {reason}")]
    BlobFetchFailed {
        /// Blob digest.
        digest: String,
        /// Failure reason.
        reason: String,
    },

    /// Manifest payload could not be decoded.
    #[error("malformed manifest {reference}: {reason}")]
    MalformedManifest {
        /// Tag or digest of the manifest.
        reference: String,
        /// Decoding failure.
        reason: String,
    },

    /// Legacy manifest carries no history entries.
    #[error("no history information found in manifest {digest}")]
    NoHistory {
        /// Manifest digest.
        digest: String,
    },

    /// History or config metadata could not be decoded.
    #[error("malformed image metadata for {digest}: {reason}")]
    MalformedHistory {
        /// Manifest digest.
        digest: String,
        /// Decoding failure.
        reason: String,
    },

    /// Manifest media type is not one we understand.
    #[error("unsupported manifest type '{media_type}' for {reference}")]
    UnsupportedManifestType {
        /// Tag or digest of the manifest.
        reference: String,
        /// Reported media type.
        media_type: String,
    },

    /// Manifest list or index references no images.
    #[error("manifest list {digest} contains no image references")]
    EmptyCollection {
        /// List/index digest.
        digest: String,
    },

    /// More than one child of a list matches the platform constraint.
    #[error("found {count} references in manifest list {digest} matching platform {platform}; expected at most one")]
    AmbiguousPlatformMatch {
        /// List/index digest.
        digest: String,
        /// Platform constraint.
        platform: String,
        /// Number of matching references.
        count: usize,
    },

    /// A list child selected for a platform resolved to nothing.
    #[error("expected manifest {digest} to match platform {platform}, but it did not")]
    NoMatchingPlatform {
        /// Child manifest digest.
        digest: String,
        /// Platform constraint.
        platform: String,
    },

    /// One unit of a concurrent metadata batch failed.
    #[error("error retrieving image metadata for {reference}: {source}")]
    FetchFailed {
        /// Tag or digest whose fetch failed.
        reference: String,
        /// Underlying error.
        #[source]
        source: Box<ImageError>,
    },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl ImageError {
    /// Returns true if this error stems from invalid caller configuration.
    ///
    /// Such errors are surfaced at construction time and never retried.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPlatform { .. }
                | Self::InvalidReference { .. }
                | Self::InvalidRegex { .. }
                | Self::InvalidConstraint { .. }
                | Self::UnknownStrategy { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Returns true if the error is a network or registry condition that a
    /// caller-level backoff may reasonably retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RegistryUnreachable { .. }
            | Self::TagListingFailed { .. }
            | Self::ManifestFetchFailed { .. }
            | Self::BlobFetchFailed { .. } => true,
            Self::FetchFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Wraps this error with the tag or digest of the batch unit that failed.
    #[must_use]
    pub fn for_reference(self, reference: impl Into<String>) -> Self {
        Self::FetchFailed {
            reference: reference.into(),
            source: Box::new(self),
        }
    }
}
