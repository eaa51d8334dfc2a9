//! Destination deletes.

use std::sync::Arc;

use ruststack_mirror_model::{DestinationMetadata, KeySummary};
use tracing::{error, info, warn};

use super::retry;
use crate::context::{RunContext, progress};

/// Deletes one key from the destination bucket.
///
/// With `delete_removed` set, the key is only deleted when its source
/// counterpart no longer exists.
#[derive(Debug)]
pub struct DeleteJob {
    ctx: Arc<RunContext>,
    summary: KeySummary,
}

impl DeleteJob {
    /// Create a job for a listed destination key.
    #[must_use]
    pub fn new(ctx: Arc<RunContext>, summary: KeySummary) -> Self {
        Self { ctx, summary }
    }

    /// The listed destination key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.summary.key
    }

    /// Check the source if required, then delete.
    pub async fn run(self) {
        let ctx = self.ctx.as_ref();
        let key = self.summary.key.as_str();

        if ctx.config.delete_removed && !self.removed_from_source().await {
            return;
        }
        if ctx.config.dry_run {
            info!(key, "dry run: would have deleted");
            return;
        }

        let bucket = ctx.config.destination_bucket.as_str();
        let deleted = retry(ctx, "delete_object", key, move || {
            ctx.stats.record_delete_call();
            ctx.storage.delete(bucket, key)
        })
        .await;

        match deleted {
            Ok(()) => {
                ctx.stats.record_deleted();
                progress!(ctx, key, "deleted");
            }
            Err(e) => {
                error!(key, error = %e, "delete failed");
                ctx.stats.record_delete_error();
            }
        }
    }

    /// Whether the source no longer holds this key. Probe failures keep the key.
    async fn removed_from_source(&self) -> bool {
        let ctx = self.ctx.as_ref();
        let key = self.summary.key.as_str();
        let source_key = ctx.config.source_key(key);
        let source_key = source_key.as_str();
        let bucket = ctx.config.source_bucket.as_str();

        let probe = retry(ctx, "get_metadata", source_key, move || {
            ctx.stats.record_metadata_call();
            ctx.storage.get_metadata(bucket, source_key, None)
        })
        .await;

        match probe {
            Ok(DestinationMetadata::Missing) => true,
            Ok(DestinationMetadata::Present(_)) => {
                progress!(ctx, key, source_key, "still in source, keeping");
                false
            }
            Err(e) => {
                warn!(key, source_key, error = %e, "source probe failed, keeping key");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{config, context};
    use super::*;
    use crate::config::MirrorMode;
    use crate::memory::{MemoryStorage, Operation};

    fn delete_config() -> crate::config::MirrorConfig {
        let mut cfg = config();
        cfg.mode = MirrorMode::Delete;
        cfg
    }

    #[tokio::test]
    async fn test_should_delete_key() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("dst", "a", "x");
        let ctx = context(delete_config(), &storage);

        DeleteJob::new(Arc::clone(&ctx), KeySummary::new("a", 1, "e")).run().await;

        assert!(storage.keys("dst").is_empty());
        let snap = ctx.stats.snapshot();
        assert_eq!(snap.objects_deleted, 1);
        assert_eq!(snap.delete_calls, 1);
    }

    #[tokio::test]
    async fn test_should_count_delete_error_after_retries() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("dst", "a", "x");
        storage.fail(Operation::Delete, "dst", "a", u32::MAX);
        let ctx = context(delete_config(), &storage);

        DeleteJob::new(Arc::clone(&ctx), KeySummary::new("a", 1, "e")).run().await;

        let snap = ctx.stats.snapshot();
        assert_eq!(snap.objects_deleted, 0);
        assert_eq!(snap.delete_errors, 1);
        assert_eq!(snap.delete_calls, 3);
    }

    #[tokio::test]
    async fn test_should_keep_key_in_dry_run() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("dst", "a", "x");
        let mut cfg = delete_config();
        cfg.dry_run = true;
        let ctx = context(cfg, &storage);

        DeleteJob::new(Arc::clone(&ctx), KeySummary::new("a", 1, "e")).run().await;

        assert_eq!(storage.keys("dst"), vec!["a"]);
        assert_eq!(storage.calls(Operation::Delete), 0);
    }

    #[tokio::test]
    async fn test_should_only_delete_keys_removed_from_source() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("src", "live/kept", "x");
        storage.put_object("dst", "backup/kept", "x");
        storage.put_object("dst", "backup/gone", "x");
        let mut cfg = delete_config();
        cfg.delete_removed = true;
        cfg.prefix = Some("live/".to_owned());
        cfg.dest_prefix = Some("backup/".to_owned());
        let ctx = context(cfg, &storage);

        for key in ["backup/kept", "backup/gone"] {
            DeleteJob::new(Arc::clone(&ctx), KeySummary::new(key, 1, "e")).run().await;
        }

        assert_eq!(storage.keys("dst"), vec!["backup/kept"]);
    }

    #[tokio::test]
    async fn test_should_keep_key_when_source_probe_fails() {
        let storage = Arc::new(MemoryStorage::new());
        storage.create_bucket("src");
        storage.put_object("dst", "a", "x");
        storage.fail(Operation::GetMetadata, "src", "a", u32::MAX);
        let mut cfg = delete_config();
        cfg.delete_removed = true;
        let ctx = context(cfg, &storage);

        DeleteJob::new(Arc::clone(&ctx), KeySummary::new("a", 1, "e")).run().await;

        assert_eq!(storage.keys("dst"), vec!["a"]);
        assert_eq!(ctx.stats.snapshot().delete_errors, 0);
    }
}
