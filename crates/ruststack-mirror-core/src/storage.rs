//! The object storage seam.
//!
//! [`ObjectStorage`] is everything the mirror engine needs from a backend.
//! The engine is written against this trait only; `ruststack-mirror-s3`
//! implements it on top of the AWS SDK and [`MemoryStorage`](crate::memory::MemoryStorage)
//! implements it in process for tests and dry experiments.

use std::fmt;

use async_trait::async_trait;
use ruststack_mirror_model::{
    AccessControlList, ByteRange, CompletedPart, CopyRequest, DestinationMetadata, ListCursor,
    ListPage,
};

use crate::error::StorageResult;

/// Remote object store operations used by the mirror engine.
///
/// Implementations must be safe to call from many jobs at once.
#[async_trait]
pub trait ObjectStorage: Send + Sync + fmt::Debug {
    /// Fetch one listing page of at most `page_size` entries.
    ///
    /// Only the latest revision of each key is reported; delete markers are
    /// skipped. `cursor` is `None` for the first page.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        cursor: Option<&ListCursor>,
        page_size: usize,
    ) -> StorageResult<ListPage>;

    /// Probe one object. A missing object is `Ok(DestinationMetadata::Missing)`,
    /// not an error.
    ///
    /// With `version_id`, the probe describes that revision rather than the
    /// latest one, and a revision that no longer exists is `Missing`.
    async fn get_metadata(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<DestinationMetadata>;

    /// Copy an object in a single request.
    async fn copy(&self, request: &CopyRequest) -> StorageResult<()>;

    /// Open a multipart copy session and return its upload ID.
    async fn initiate_multipart_copy(&self, request: &CopyRequest) -> StorageResult<String>;

    /// Copy one byte range of the source into the session.
    async fn copy_part(
        &self,
        request: &CopyRequest,
        upload_id: &str,
        part_number: u32,
        range: ByteRange,
    ) -> StorageResult<CompletedPart>;

    /// Assemble the copied parts into the destination object.
    async fn complete_multipart_copy(
        &self,
        request: &CopyRequest,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()>;

    /// Discard a multipart copy session.
    async fn abort_multipart_copy(&self, bucket: &str, key: &str, upload_id: &str)
    -> StorageResult<()>;

    /// Delete one object. Deleting a missing object succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Fetch the ACL of one object.
    async fn get_acl(&self, bucket: &str, key: &str) -> StorageResult<AccessControlList>;
}
