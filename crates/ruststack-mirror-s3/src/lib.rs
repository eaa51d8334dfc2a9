//! S3 backend for the RustStack Mirror engine.
//!
//! [`S3Storage`] implements [`ObjectStorage`] on top of `aws-sdk-s3`. Listing
//! walks object versions so each summary carries the version ID of the
//! revision it describes; copies are server-side and pinned to that version.

mod convert;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart as S3CompletedPart, MetadataDirective,
    ServerSideEncryption, StorageClass,
};
use ruststack_mirror_core::{ObjectStorage, StorageError, StorageResult};
use ruststack_mirror_model::{
    AccessControlList, ByteRange, CompletedPart, CopyRequest, DestinationMetadata, ListCursor,
    ListPage,
};
use tracing::debug;

use crate::convert::{
    GrantHeaders, acl_from_output, copy_source, metadata_from_head, status_of, storage_error,
    summary_from_version, user_metadata,
};

/// Largest page `ListObjectVersions` returns.
const MAX_LIST_KEYS: i32 = 1000;

/// [`ObjectStorage`] backed by an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential and region chain.
    ///
    /// When `endpoint_url` is set, requests go there with path-style
    /// addressing, which is what local S3 emulators expect.
    pub async fn from_env(endpoint_url: Option<&str>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url).force_path_style(true);
        }
        Self::new(Client::from_conf(builder.build()))
    }

    /// The underlying SDK client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        cursor: Option<&ListCursor>,
        page_size: usize,
    ) -> StorageResult<ListPage> {
        let max_keys = i32::try_from(page_size).map_or(MAX_LIST_KEYS, |n| n.min(MAX_LIST_KEYS));
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(max_keys)
            .set_key_marker(cursor.and_then(|c| c.key_marker.clone()))
            .set_version_id_marker(cursor.and_then(|c| c.version_id_marker.clone()))
            .send()
            .await
            .map_err(|e| storage_error("list_object_versions", e))?;

        let entries = output
            .versions()
            .iter()
            .filter_map(summary_from_version)
            .collect::<Vec<_>>();
        let truncated = output.is_truncated().unwrap_or(false);
        let next = truncated.then(|| ListCursor {
            key_marker: output.next_key_marker().map(ToOwned::to_owned),
            version_id_marker: output.next_version_id_marker().map(ToOwned::to_owned),
        });
        debug!(bucket, prefix, entries = entries.len(), truncated, "listed page");

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
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(ToOwned::to_owned))
            .send()
            .await;
        match head {
            Ok(head) => Ok(DestinationMetadata::Present(metadata_from_head(&head))),
            Err(err)
                if status_of(&err) == Some(404)
                    || err.as_service_error().is_some_and(HeadObjectError::is_not_found) =>
            {
                Ok(DestinationMetadata::Missing)
            }
            Err(err) => Err(storage_error("head_object", err)),
        }
    }

    async fn copy(&self, request: &CopyRequest) -> StorageResult<()> {
        let grants = GrantHeaders::from_acl(&request.acl);
        let metadata = &request.metadata;
        let mut call = self
            .client
            .copy_object()
            .bucket(&request.destination_bucket)
            .key(&request.destination_key)
            .copy_source(copy_source(request))
            .metadata_directive(MetadataDirective::Replace)
            .storage_class(StorageClass::from(request.storage_class.as_str()))
            .set_content_type(metadata.content_type.clone())
            .set_content_encoding(metadata.content_encoding.clone())
            .set_content_disposition(metadata.content_disposition.clone())
            .set_cache_control(metadata.cache_control.clone())
            .set_metadata(user_metadata(metadata))
            .set_grant_full_control(grants.full_control)
            .set_grant_read(grants.read)
            .set_grant_read_acp(grants.read_acp)
            .set_grant_write_acp(grants.write_acp);
        if request.encrypt {
            call = call.server_side_encryption(ServerSideEncryption::Aes256);
        }
        call.send()
            .await
            .map_err(|e| storage_error("copy_object", e))?;
        Ok(())
    }

    async fn initiate_multipart_copy(&self, request: &CopyRequest) -> StorageResult<String> {
        let grants = GrantHeaders::from_acl(&request.acl);
        let metadata = &request.metadata;
        let mut call = self
            .client
            .create_multipart_upload()
            .bucket(&request.destination_bucket)
            .key(&request.destination_key)
            .storage_class(StorageClass::from(request.storage_class.as_str()))
            .set_content_type(metadata.content_type.clone())
            .set_content_encoding(metadata.content_encoding.clone())
            .set_content_disposition(metadata.content_disposition.clone())
            .set_cache_control(metadata.cache_control.clone())
            .set_metadata(user_metadata(metadata))
            .set_grant_full_control(grants.full_control)
            .set_grant_read(grants.read)
            .set_grant_read_acp(grants.read_acp)
            .set_grant_write_acp(grants.write_acp);
        if request.encrypt {
            call = call.server_side_encryption(ServerSideEncryption::Aes256);
        }
        let output = call
            .send()
            .await
            .map_err(|e| storage_error("create_multipart_upload", e))?;
        output
            .upload_id()
            .map(ToOwned::to_owned)
            .ok_or_else(|| StorageError::service("create_multipart_upload", None, "no upload ID returned"))
    }

    async fn copy_part(
        &self,
        request: &CopyRequest,
        upload_id: &str,
        part_number: u32,
        range: ByteRange,
    ) -> StorageResult<CompletedPart> {
        let number = i32::try_from(part_number).map_err(anyhow::Error::from)?;
        let output = self
            .client
            .upload_part_copy()
            .bucket(&request.destination_bucket)
            .key(&request.destination_key)
            .upload_id(upload_id)
            .part_number(number)
            .copy_source(copy_source(request))
            .copy_source_range(range.to_string())
            .send()
            .await
            .map_err(|e| storage_error("upload_part_copy", e))?;
        let etag = output
            .copy_part_result()
            .and_then(|r| r.e_tag())
            .ok_or_else(|| StorageError::service("upload_part_copy", None, "no part ETag returned"))?;
        Ok(CompletedPart {
            part_number,
            etag: etag.to_owned(),
        })
    }

    async fn complete_multipart_copy(
        &self,
        request: &CopyRequest,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        let parts = parts
            .iter()
            .map(|part| {
                Ok(S3CompletedPart::builder()
                    .part_number(i32::try_from(part.part_number)?)
                    .e_tag(&part.etag)
                    .build())
            })
            .collect::<Result<Vec<_>, std::num::TryFromIntError>>()
            .map_err(anyhow::Error::from)?;
        self.client
            .complete_multipart_upload()
            .bucket(&request.destination_bucket)
            .key(&request.destination_key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| storage_error("complete_multipart_upload", e))?;
        Ok(())
    }

    async fn abort_multipart_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| storage_error("abort_multipart_upload", e))?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("delete_object", e))?;
        Ok(())
    }

    async fn get_acl(&self, bucket: &str, key: &str) -> StorageResult<AccessControlList> {
        let output = self
            .client
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("get_object_acl", e))?;
        Ok(acl_from_output(&output))
    }
}
