//! In-process object storage.
//!
//! [`MemoryStorage`] keeps buckets as ordered key maps so listing is a range
//! scan. It also supports scripted failures ([`MemoryStorage::fail`]) and
//! artificial latency, and it counts every call. The mirror tests use it as
//! their storage double.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use digest::Digest;
use parking_lot::RwLock;
use ruststack_mirror_model::{
    AccessControlList, ByteRange, CompletedPart, CopyRequest, DestinationMetadata, KeySummary,
    ListCursor, ListPage, ObjectMetadata,
};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::storage::ObjectStorage;

/// Wildcard accepted by [`MemoryStorage::fail`] in place of a key.
pub const ANY_KEY: &str = "*";

/// Storage operations, for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_page`
    List,
    /// `get_metadata`
    GetMetadata,
    /// `copy`
    Copy,
    /// `initiate_multipart_copy`
    InitiateMultipart,
    /// `copy_part`
    CopyPart,
    /// `complete_multipart_copy`
    CompleteMultipart,
    /// `abort_multipart_copy`
    AbortMultipart,
    /// `delete`
    Delete,
    /// `get_acl`
    GetAcl,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Self::List => "list_object_versions",
            Self::GetMetadata => "head_object",
            Self::Copy => "copy_object",
            Self::InitiateMultipart => "create_multipart_upload",
            Self::CopyPart => "upload_part_copy",
            Self::CompleteMultipart => "complete_multipart_upload",
            Self::AbortMultipart => "abort_multipart_upload",
            Self::Delete => "delete_object",
            Self::GetAcl => "get_object_acl",
        }
    }
}

// ---------------------------------------------------------------------------
// Stored state
// ---------------------------------------------------------------------------

/// One object held by [`MemoryStorage`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object body.
    pub data: Bytes,
    /// Quoted ETag.
    pub etag: String,
    /// Version ID of this revision.
    pub version_id: String,
    /// Last-modified time.
    pub last_modified: DateTime<Utc>,
    /// HTTP and user metadata written with the object.
    pub metadata: ObjectMetadata,
    /// Object ACL.
    pub acl: AccessControlList,
    /// Storage class.
    pub storage_class: String,
    /// Whether server-side encryption was requested.
    pub encrypted: bool,
}

impl StoredObject {
    fn new(data: Bytes, last_modified: DateTime<Utc>) -> Self {
        let etag = compute_etag(&data);
        Self {
            data,
            etag,
            version_id: uuid::Uuid::new_v4().simple().to_string(),
            last_modified,
            metadata: ObjectMetadata::default(),
            acl: AccessControlList::default(),
            storage_class: "STANDARD".to_owned(),
            encrypted: false,
        }
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn head(&self) -> ObjectMetadata {
        ObjectMetadata {
            size: self.size(),
            etag: Some(self.etag.clone()),
            last_modified: Some(self.last_modified),
            ..self.metadata.clone()
        }
    }

    fn summary(&self, key: &str) -> KeySummary {
        KeySummary::new(key, self.size(), self.etag.clone())
            .with_last_modified(self.last_modified)
            .with_version_id(self.version_id.clone())
    }
}

type Bucket = Arc<RwLock<BTreeMap<String, StoredObject>>>;

#[derive(Debug)]
struct PendingUpload {
    request: CopyRequest,
    parts: BTreeMap<u32, (Bytes, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FaultTarget {
    operation: Operation,
    bucket: String,
    key: String,
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// Object storage held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: DashMap<String, Bucket>,
    uploads: DashMap<String, PendingUpload>,
    faults: DashMap<FaultTarget, u32>,
    calls: DashMap<Operation, u64>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every copy and part-copy by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Create a bucket if it does not exist.
    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.entry(bucket.to_owned()).or_default();
    }

    /// Store an object, creating the bucket if needed. Returns the ETag.
    pub fn put_object(&self, bucket: &str, key: &str, data: impl Into<Bytes>) -> String {
        self.put_object_at(bucket, key, data, Utc::now())
    }

    /// Store an object with an explicit last-modified time. Returns the ETag.
    pub fn put_object_at(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) -> String {
        let object = StoredObject::new(data.into(), last_modified);
        let etag = object.etag.clone();
        self.bucket_or_create(bucket)
            .write()
            .insert(key.to_owned(), object);
        etag
    }

    /// Replace the ACL of a stored object.
    pub fn set_acl(&self, bucket: &str, key: &str, acl: AccessControlList) {
        if let Some(bucket) = self.bucket(bucket) {
            if let Some(object) = bucket.write().get_mut(key) {
                object.acl = acl;
            }
        }
    }

    /// A copy of the stored object, if present.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.bucket(bucket)?.read().get(key).cloned()
    }

    /// All keys in a bucket, in order.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.bucket(bucket)
            .map(|b| b.read().keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Fail the next `times` calls of `operation` on `bucket/key`.
    ///
    /// Pass [`ANY_KEY`] to match every key, and `u32::MAX` to fail forever.
    pub fn fail(&self, operation: Operation, bucket: &str, key: &str, times: u32) {
        let target = FaultTarget {
            operation,
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        };
        self.faults.insert(target, times);
    }

    /// Number of calls made for `operation`, including failed ones.
    #[must_use]
    pub fn calls(&self, operation: Operation) -> u64 {
        self.calls.get(&operation).map_or(0, |n| *n)
    }

    /// Highest number of copy or part-copy calls observed in flight at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Multipart sessions neither completed nor aborted.
    #[must_use]
    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }

    fn bucket(&self, bucket: &str) -> Option<Bucket> {
        self.buckets.get(bucket).map(|b| Arc::clone(b.value()))
    }

    fn bucket_or_create(&self, bucket: &str) -> Bucket {
        Arc::clone(self.buckets.entry(bucket.to_owned()).or_default().value())
    }

    fn existing_bucket(&self, operation: Operation, bucket: &str) -> StorageResult<Bucket> {
        self.bucket(bucket).ok_or_else(|| {
            StorageError::service(
                operation.name(),
                Some(404),
                format!("The specified bucket does not exist: {bucket}"),
            )
        })
    }

    /// Count the call and apply any scripted failure.
    fn enter(&self, operation: Operation, bucket: &str, key: &str) -> StorageResult<()> {
        *self.calls.entry(operation).or_insert(0) += 1;
        for key in [key, ANY_KEY] {
            let target = FaultTarget {
                operation,
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            };
            if let Some(mut remaining) = self.faults.get_mut(&target) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    debug!(operation = operation.name(), bucket, key, "injected failure");
                    return Err(StorageError::service(
                        operation.name(),
                        Some(500),
                        "We encountered an internal error. Please try again.",
                    ));
                }
            }
        }
        Ok(())
    }

    async fn transfer_delay(&self) -> InFlight<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn source_object(&self, operation: Operation, request: &CopyRequest) -> StorageResult<StoredObject> {
        let bucket = self.existing_bucket(operation, &request.source_bucket)?;
        let guard = bucket.read();
        let object = guard
            .get(&request.source_key)
            .filter(|o| {
                request
                    .source_version_id
                    .as_deref()
                    .is_none_or(|v| v == o.version_id)
            })
            .ok_or_else(|| StorageError::NotFound {
                bucket: request.source_bucket.clone(),
                key: request.source_key.clone(),
            })?;
        Ok(object.clone())
    }

    fn write_destination(&self, request: &CopyRequest, data: Bytes, etag: String) {
        let mut object = StoredObject::new(data, Utc::now());
        object.etag = etag;
        object.metadata = request.metadata.clone();
        object.acl = request.acl.clone();
        object.storage_class.clone_from(&request.storage_class);
        object.encrypted = request.encrypt;
        self.bucket_or_create(&request.destination_bucket)
            .write()
            .insert(request.destination_key.clone(), object);
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        cursor: Option<&ListCursor>,
        page_size: usize,
    ) -> StorageResult<ListPage> {
        self.enter(Operation::List, bucket, prefix)?;
        let objects = self.existing_bucket(Operation::List, bucket)?;
        let guard = objects.read();

        let after = cursor.and_then(|c| c.key_marker.as_deref());
        let mut matching = guard
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| after.is_none_or(|marker| key.as_str() > marker));

        let entries: Vec<KeySummary> = matching
            .by_ref()
            .take(page_size)
            .map(|(key, object)| object.summary(key))
            .collect();
        let truncated = matching.next().is_some();
        let next = if truncated {
            entries.last().map(|e| ListCursor {
                key_marker: Some(e.key.clone()),
                version_id_marker: e.version_id.clone(),
            })
        } else {
            None
        };

        Ok(ListPage {
            entries,
            truncated,
            next,
        })
    }

    async fn get_metadata(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<DestinationMetadata> {
        self.enter(Operation::GetMetadata, bucket, key)?;
        let Some(objects) = self.bucket(bucket) else {
            return Ok(DestinationMetadata::Missing);
        };
        // Only the latest revision is kept; older versions read as missing.
        let probe = objects
            .read()
            .get(key)
            .filter(|o| version_id.is_none_or(|v| v == o.version_id))
            .map_or(DestinationMetadata::Missing, |o| {
                DestinationMetadata::Present(o.head())
            });
        Ok(probe)
    }

    async fn copy(&self, request: &CopyRequest) -> StorageResult<()> {
        let _in_flight = self.transfer_delay().await;
        self.enter(Operation::Copy, &request.destination_bucket, &request.destination_key)?;
        let source = self.source_object(Operation::Copy, request)?;
        self.write_destination(request, source.data, source.etag);
        Ok(())
    }

    async fn initiate_multipart_copy(&self, request: &CopyRequest) -> StorageResult<String> {
        self.enter(
            Operation::InitiateMultipart,
            &request.destination_bucket,
            &request.destination_key,
        )?;
        let upload_id = uuid::Uuid::new_v4().to_string();
        self.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                request: request.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn copy_part(
        &self,
        request: &CopyRequest,
        upload_id: &str,
        part_number: u32,
        range: ByteRange,
    ) -> StorageResult<CompletedPart> {
        let _in_flight = self.transfer_delay().await;
        self.enter(Operation::CopyPart, &request.destination_bucket, &request.destination_key)?;
        let source = self.source_object(Operation::CopyPart, request)?;

        let start = usize::try_from(range.start).map_err(anyhow::Error::from)?;
        let end = usize::try_from(range.end).map_err(anyhow::Error::from)?;
        if end >= source.data.len() || start > end {
            return Err(StorageError::service(
                Operation::CopyPart.name(),
                Some(416),
                format!("The requested range {range} is not satisfiable"),
            ));
        }
        let slice = source.data.slice(start..=end);
        let etag = compute_etag(&slice);

        let mut upload = self.uploads.get_mut(upload_id).ok_or_else(|| {
            StorageError::service(
                Operation::CopyPart.name(),
                Some(404),
                format!("The specified upload does not exist: {upload_id}"),
            )
        })?;
        upload.parts.insert(part_number, (slice, etag.clone()));
        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_copy(
        &self,
        request: &CopyRequest,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        self.enter(
            Operation::CompleteMultipart,
            &request.destination_bucket,
            &request.destination_key,
        )?;
        let (_, upload) = self.uploads.remove(upload_id).ok_or_else(|| {
            StorageError::service(
                Operation::CompleteMultipart.name(),
                Some(404),
                format!("The specified upload does not exist: {upload_id}"),
            )
        })?;

        let mut body = BytesMut::new();
        let mut digests = Vec::with_capacity(parts.len());
        for part in parts {
            let Some((data, etag)) = upload.parts.get(&part.part_number) else {
                return Err(StorageError::service(
                    Operation::CompleteMultipart.name(),
                    Some(400),
                    format!("Part {} was never uploaded", part.part_number),
                ));
            };
            body.extend_from_slice(data);
            digests.push(etag.clone());
        }
        let etag = compute_multipart_etag(&digests);
        self.write_destination(&upload.request, body.freeze(), etag);
        Ok(())
    }

    async fn abort_multipart_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StorageResult<()> {
        self.enter(Operation::AbortMultipart, bucket, key)?;
        self.uploads.remove(upload_id);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.enter(Operation::Delete, bucket, key)?;
        if let Some(objects) = self.bucket(bucket) {
            objects.write().remove(key);
        }
        Ok(())
    }

    async fn get_acl(&self, bucket: &str, key: &str) -> StorageResult<AccessControlList> {
        self.enter(Operation::GetAcl, bucket, key)?;
        let objects = self.existing_bucket(Operation::GetAcl, bucket)?;
        let guard = objects.read();
        guard
            .get(key)
            .map(|o| o.acl.clone())
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            })
    }
}

/// Quoted hex MD5 of `data`.
fn compute_etag(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(md5::Md5::digest(data)))
}

/// Composite ETag: MD5 over the binary part digests, suffixed with the part count.
fn compute_multipart_etag(part_etags: &[String]) -> String {
    let mut combined = Vec::with_capacity(part_etags.len() * 16);
    for etag in part_etags {
        if let Ok(bytes) = hex::decode(etag.trim_matches('"')) {
            combined.extend_from_slice(&bytes);
        }
    }
    format!(
        "\"{}-{}\"",
        hex::encode(md5::Md5::digest(&combined)),
        part_etags.len()
    )
}
