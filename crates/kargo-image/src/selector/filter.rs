//! Allow-pattern and ignore-list filtering of tag names.

use std::collections::HashSet;

use regex::Regex;

use crate::error::{ImageError, Result};

/// Decides which tags are candidates for selection.
///
/// A tag passes if it matches the allow pattern (when one is set) and is not
/// on the ignore list.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    allow: Option<Regex>,
    ignore: HashSet<String>,
}

impl TagFilter {
    /// Builds a filter. An empty pattern allows every tag.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidRegex`] if the pattern does not compile.
    pub fn new(allow: &str, ignore: &[String]) -> Result<Self> {
        let allow = if allow.is_empty() {
            None
        } else {
            Some(Regex::new(allow).map_err(|source| ImageError::InvalidRegex {
                pattern: allow.to_string(),
                source,
            })?)
        };

        Ok(Self {
            allow,
            ignore: ignore.iter().cloned().collect(),
        })
    }

    /// Returns true if the tag is a candidate.
    #[must_use]
    pub fn allows(&self, tag: &str) -> bool {
        !self.ignore.contains(tag) && self.allow.as_ref().is_none_or(|re| re.is_match(tag))
    }

    /// Keeps only the candidate tags.
    #[must_use]
    pub fn apply(&self, tags: Vec<String>) -> Vec<String> {
        tags.into_iter().filter(|t| self.allows(t)).collect()
    }
}
