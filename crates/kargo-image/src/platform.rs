//! Platform constraints for multi-architecture images.

use std::fmt;
use std::str::FromStr;

use crate::error::{ImageError, Result};

/// An `os/arch[/variant]` triple that image metadata must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformConstraint {
    /// Operating system (e.g., `linux`).
    pub os: String,

    /// CPU architecture (e.g., `arm64`).
    pub arch: String,

    /// Optional CPU variant (e.g., `v8`). Empty when absent.
    pub variant: String,
}

impl PlatformConstraint {
    /// Parses a platform string.
    ///
    /// # Examples
    ///
    /// ```
    /// use kargo_image::PlatformConstraint;
    ///
    /// let platform = PlatformConstraint::parse("linux/arm64/v8").unwrap();
    /// assert_eq!(platform.os, "linux");
    /// assert_eq!(platform.arch, "arm64");
    /// assert_eq!(platform.variant, "v8");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidPlatform`] if the string has fewer than
    /// two segments. Anything after the second `/` is the variant.
    pub fn parse(platform: &str) -> Result<Self> {
        let invalid = || ImageError::InvalidPlatform {
            value: platform.to_string(),
        };

        let mut parts = platform.splitn(3, '/');
        let (Some(os), Some(arch)) = (parts.next(), parts.next()) else {
            return Err(invalid());
        };

        Ok(Self {
            os: os.to_string(),
            arch: arch.to_string(),
            variant: parts.next().unwrap_or_default().to_string(),
        })
    }

    /// Returns true if the given triple equals this constraint.
    ///
    /// Comparison is case-sensitive, and an empty variant only matches an
    /// empty variant.
    #[must_use]
    pub fn matches(&self, os: &str, arch: &str, variant: &str) -> bool {
        self.os == os && self.arch == arch && self.variant == variant
    }

    /// Returns true if the string parses as a platform constraint.
    #[must_use]
    pub fn validate(platform: &str) -> bool {
        Self::parse(platform).is_ok()
    }
}

impl FromStr for PlatformConstraint {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PlatformConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant.is_empty() {
            write!(f, "{}/{}", self.os, self.arch)
        } else {
            write!(f, "{}/{}/{}", self.os, self.arch, self.variant)
        }
    }
}

/// Returns true if platform metadata describes a runnable image.
///
/// Attestations and other non-image companions report an empty or
/// `unknown` OS or architecture.
#[must_use]
pub(crate) fn is_image_platform(os: &str, arch: &str) -> bool {
    !os.is_empty() && !arch.is_empty() && os != "unknown" && arch != "unknown"
}
