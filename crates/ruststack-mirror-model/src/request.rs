//! Requests issued by the mirror engine against a storage backend.

use std::fmt;

use crate::acl::AccessControlList;
use crate::object::ObjectMetadata;

/// A server-side copy of one object.
///
/// The same request drives both a single-shot copy and every step of a
/// multipart copy session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Bucket holding the source object.
    pub source_bucket: String,
    /// Source object key.
    pub source_key: String,
    /// Pin the copy to this source revision.
    pub source_version_id: Option<String>,
    /// Destination bucket.
    pub destination_bucket: String,
    /// Destination object key.
    pub destination_key: String,
    /// Metadata written onto the destination object.
    pub metadata: ObjectMetadata,
    /// ACL applied to the destination object.
    pub acl: AccessControlList,
    /// Destination storage class (e.g. `STANDARD`).
    pub storage_class: String,
    /// Request `AES256` server-side encryption.
    pub encrypt: bool,
}

/// An inclusive byte range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Create a range. `end` is inclusive.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always `false`: a range covers at least one byte.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// A part produced by a ranged part-copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// ETag of the copied part.
    pub etag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_format_range_header() {
        let range = ByteRange::new(0, 499);
        assert_eq!(range.to_string(), "bytes=0-499");
        assert_eq!(range.len(), 500);
    }
}
