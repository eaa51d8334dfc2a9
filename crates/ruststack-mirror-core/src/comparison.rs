//! Deciding whether a present destination object is stale.
//!
//! A size mismatch always means the object differs. Each
//! [`ComparisonStrategy`] adds one more predicate on top of that.

use std::fmt;
use std::str::FromStr;

use ruststack_mirror_model::{KeySummary, ObjectMetadata, normalize_etag};
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;

/// How a listed source object is compared with its destination copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonStrategy {
    /// Different only when sizes differ.
    SizeOnly,
    /// Different when sizes differ or the source is newer.
    SizeAndLastModified,
    /// Different when sizes or ETags differ.
    #[default]
    Etag,
}

impl ComparisonStrategy {
    /// Whether the source must be copied over the existing destination.
    #[must_use]
    pub fn source_differs(self, source: &KeySummary, destination: &ObjectMetadata) -> bool {
        size_differs(source, destination)
            || match self {
                Self::SizeOnly => false,
                Self::SizeAndLastModified => source_newer(source, destination),
                Self::Etag => etag_differs(source, destination),
            }
    }
}

impl fmt::Display for ComparisonStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SizeOnly => "size-only",
            Self::SizeAndLastModified => "size-and-last-modified",
            Self::Etag => "etag",
        };
        f.write_str(s)
    }
}

impl FromStr for ComparisonStrategy {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "size-only" | "size" => Ok(Self::SizeOnly),
            "size-and-last-modified" | "last-modified" => Ok(Self::SizeAndLastModified),
            "etag" => Ok(Self::Etag),
            other => Err(MirrorError::Config(format!(
                "unknown comparison strategy: {other}"
            ))),
        }
    }
}

/// Sizes differ.
#[must_use]
pub fn size_differs(source: &KeySummary, destination: &ObjectMetadata) -> bool {
    source.size != destination.size
}

/// ETags differ once quotes are stripped. A destination without an ETag
/// cannot be told apart and is treated as equal.
#[must_use]
pub fn etag_differs(source: &KeySummary, destination: &ObjectMetadata) -> bool {
    destination
        .etag
        .as_deref()
        .is_some_and(|etag| normalize_etag(etag) != normalize_etag(&source.etag))
}

/// The source was modified after the destination.
///
/// A missing timestamp on either side counts as newer, so the key is copied.
#[must_use]
pub fn source_newer(source: &KeySummary, destination: &ObjectMetadata) -> bool {
    match (source.last_modified, destination.last_modified) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}
