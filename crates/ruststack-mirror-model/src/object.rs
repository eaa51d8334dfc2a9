//! Object summaries, metadata, and the fingerprint used for equality checks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// KeySummary
// ---------------------------------------------------------------------------

/// One object revision as seen by a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySummary {
    /// The object key.
    pub key: String,
    /// The object size in bytes.
    pub size: u64,
    /// The entity tag as reported by the listing (usually quoted).
    pub etag: String,
    /// Last-modified time, when the backend reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Version ID of the listed revision, when the bucket is versioned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

impl KeySummary {
    /// Create a summary without last-modified or version information.
    #[must_use]
    pub fn new(key: impl Into<String>, size: u64, etag: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size,
            etag: etag.into(),
            last_modified: None,
            version_id: None,
        }
    }

    /// Set the last-modified time.
    #[must_use]
    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Set the version ID.
    #[must_use]
    pub fn with_version_id(mut self, version_id: impl Into<String>) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    /// Fingerprint including the ETag.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.size, Some(self.etag.clone()))
    }
}

// ---------------------------------------------------------------------------
// ObjectMetadata
// ---------------------------------------------------------------------------

/// Metadata returned by a `HEAD`-style probe of a single object.
///
/// The HTTP-ish fields are carried verbatim onto the destination when an
/// object is copied, so that the copy replaces rather than inherits metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    /// Content length in bytes.
    pub size: u64,
    /// The entity tag (usually quoted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last-modified time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// The MIME type of the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Content encoding (e.g. `gzip`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Content disposition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// Cache control directives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// User-defined metadata (`x-amz-meta-*`), keys without the prefix.
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
}

impl ObjectMetadata {
    /// Metadata carrying only a size and an ETag.
    #[must_use]
    pub fn new(size: u64, etag: impl Into<String>) -> Self {
        Self {
            size,
            etag: Some(etag.into()),
            ..Self::default()
        }
    }

    /// Fingerprint including the ETag, if one is known.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.size, self.etag.clone())
    }
}

/// Result of probing a location for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationMetadata {
    /// The object exists.
    Present(ObjectMetadata),
    /// The object does not exist (404).
    Missing,
}

impl DestinationMetadata {
    /// Returns the metadata if the object exists.
    #[must_use]
    pub fn present(self) -> Option<ObjectMetadata> {
        match self {
            Self::Present(meta) => Some(meta),
            Self::Missing => None,
        }
    }

    /// Returns `true` if the object does not exist.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// `(size, etag)` pair identifying an object revision for equality purposes.
///
/// Two fingerprints are equal when their sizes match and either side lacks
/// an ETag or both ETags match once surrounding quotes are stripped. The
/// relation is deliberately not [`Eq`]: a fingerprint without an ETag is
/// equal to fingerprints with different ETags of the same size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    /// Size in bytes.
    pub size: u64,
    /// Optional ETag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl Fingerprint {
    /// Create a fingerprint.
    #[must_use]
    pub fn new(size: u64, etag: Option<String>) -> Self {
        Self { size, etag }
    }

    /// Create a size-only fingerprint.
    #[must_use]
    pub fn size_only(size: u64) -> Self {
        Self { size, etag: None }
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        if self.size != other.size {
            return false;
        }
        match (&self.etag, &other.etag) {
            (Some(a), Some(b)) => normalize_etag(a) == normalize_etag(b),
            _ => true,
        }
    }
}

/// Strip surrounding double quotes from an ETag.
#[must_use]
pub fn normalize_etag(etag: &str) -> &str {
    etag.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(etag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_match_fingerprints_with_same_size_and_etag() {
        let a = Fingerprint::new(100, Some("\"e1\"".to_owned()));
        let b = Fingerprint::new(100, Some("e1".to_owned()));
        assert_eq!(a, b);
    }

    #[test]
    fn test_should_not_match_fingerprints_with_different_etag() {
        let a = Fingerprint::new(100, Some("e1".to_owned()));
        let b = Fingerprint::new(100, Some("e2".to_owned()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_should_not_match_fingerprints_with_different_size() {
        let a = Fingerprint::size_only(100);
        let b = Fingerprint::new(101, Some("e1".to_owned()));
        assert_ne!(a, b);
        assert_ne!(b, a);
    }

    #[test]
    fn test_should_ignore_etag_when_either_side_lacks_one() {
        let with = Fingerprint::new(100, Some("e1".to_owned()));
        let without = Fingerprint::size_only(100);
        assert_eq!(with, without);
        assert_eq!(without, with);
    }

    #[test]
    fn test_should_build_summary_fingerprint() {
        let summary = KeySummary::new("a", 10, "\"abc\"").with_version_id("v1");
        assert_eq!(summary.fingerprint(), Fingerprint::new(10, Some("abc".to_owned())));
        assert_eq!(summary.version_id.as_deref(), Some("v1"));
    }

    #[test]
    fn test_should_expose_present_metadata() {
        let probe = DestinationMetadata::Present(ObjectMetadata::new(5, "\"x\""));
        assert!(!probe.is_missing());
        assert_eq!(probe.present().map(|m| m.size), Some(5));
        assert!(DestinationMetadata::Missing.is_missing());
    }

    #[test]
    fn test_should_serialize_summary_to_camel_case() {
        let summary = KeySummary::new("k", 1, "e").with_version_id("v");
        let json = serde_json::to_string(&summary).expect("test serialization");
        assert!(json.contains("versionId"));
        assert!(!json.contains("lastModified"));
    }
}
