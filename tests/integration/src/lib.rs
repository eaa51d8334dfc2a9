//! Integration tests for RustStack Mirror.
//!
//! These tests require an S3-compatible server at `localhost:4566` (or
//! `S3_ENDPOINT_URL`). They are marked `#[ignore]` so they don't run during
//! normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p ruststack-mirror-integration -- --ignored
//! ```

use std::sync::{Arc, Once};

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use ruststack_mirror_core::{Mirror, MirrorConfig};
use ruststack_mirror_s3::S3Storage;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server.
fn endpoint_url() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned())
}

/// Create a configured S3 client pointing at the local server.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new("test", "test", None, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a bucket and return its name. Caller is responsible for cleanup.
pub async fn create_test_bucket(client: &aws_sdk_s3::Client, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    client
        .create_bucket()
        .bucket(&name)
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    name
}

/// Upload one object.
pub async fn put_object(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    body: impl Into<Bytes>,
) {
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body.into()))
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to put {bucket}/{key}: {e}"));
}

/// Every key in a bucket, in listing order.
pub async fn list_keys(client: &aws_sdk_s3::Client, bucket: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut continuation_token = None;
    loop {
        let resp = client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token.take())
            .send()
            .await
            .unwrap_or_else(|e| panic!("failed to list {bucket}: {e}"));
        keys.extend(resp.contents().iter().filter_map(|o| o.key().map(ToOwned::to_owned)));
        if resp.is_truncated() == Some(true) {
            continuation_token = resp.next_continuation_token().map(ToOwned::to_owned);
        } else {
            return keys;
        }
    }
}

/// A small mirror configuration between two test buckets.
#[must_use]
pub fn mirror_config(source: &str, destination: &str) -> MirrorConfig {
    MirrorConfig::builder()
        .source_bucket(source)
        .destination_bucket(destination)
        .max_retries(3)
        .max_threads(4)
        .max_queue_capacity(16)
        .build()
}

/// A mirror backed by [`S3Storage`] on the test endpoint.
#[must_use]
pub fn mirror(config: MirrorConfig) -> Mirror {
    let storage = Arc::new(S3Storage::new(s3_client()));
    Mirror::new(config, storage).expect("valid mirror config")
}

/// Delete all objects in a bucket, then delete the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    // Versioned buckets keep old revisions; remove every version.
    let mut key_marker = None;
    let mut version_id_marker = None;
    loop {
        let Ok(resp) = client
            .list_object_versions()
            .bucket(bucket)
            .set_key_marker(key_marker.take())
            .set_version_id_marker(version_id_marker.take())
            .send()
            .await
        else {
            return; // Bucket may not exist.
        };

        let versions = resp
            .versions()
            .iter()
            .map(|v| (v.key(), v.version_id()))
            .chain(resp.delete_markers().iter().map(|m| (m.key(), m.version_id())));
        for (key, version_id) in versions {
            if let Some(key) = key {
                let _ = client
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .set_version_id(version_id.map(ToOwned::to_owned))
                    .send()
                    .await;
            }
        }

        if resp.is_truncated() == Some(true) {
            key_marker = resp.next_key_marker().map(ToOwned::to_owned);
            version_id_marker = resp.next_version_id_marker().map(ToOwned::to_owned);
        } else {
            break;
        }
    }

    // Delete any in-progress multipart uploads.
    if let Ok(uploads) = client.list_multipart_uploads().bucket(bucket).send().await {
        for upload in uploads.uploads() {
            if let (Some(key), Some(id)) = (upload.key(), upload.upload_id()) {
                let _ = client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(id)
                    .send()
                    .await;
            }
        }
    }

    let _ = client.delete_bucket().bucket(bucket).send().await;
}

mod test_mirror;
mod test_storage;
