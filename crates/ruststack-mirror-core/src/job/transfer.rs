//! Single-request copy.

use std::sync::Arc;

use ruststack_mirror_model::KeySummary;
use tracing::{error, info};

use super::{prepare_copy, retry, should_transfer, verify_copy};
use crate::context::{RunContext, progress};

/// Copies one key with a single server-side copy request.
#[derive(Debug)]
pub struct TransferJob {
    ctx: Arc<RunContext>,
    summary: KeySummary,
    destination_key: String,
}

impl TransferJob {
    /// Create a job for a listed source key.
    #[must_use]
    pub fn new(ctx: Arc<RunContext>, summary: KeySummary) -> Self {
        let destination_key = ctx.config.destination_key(&summary.key);
        Self {
            ctx,
            summary,
            destination_key,
        }
    }

    /// The listed source key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.summary.key
    }

    /// Decide, copy, and verify.
    pub async fn run(self) {
        let ctx = self.ctx.as_ref();
        let key = self.summary.key.as_str();
        let destination_key = self.destination_key.as_str();

        if !should_transfer(ctx, &self.summary, destination_key).await {
            return;
        }
        if ctx.config.dry_run {
            info!(key, destination_key, size = self.summary.size, "dry run: would have copied");
            return;
        }

        let request = match prepare_copy(ctx, &self.summary, destination_key).await {
            Ok(request) => request,
            Err(e) => {
                error!(key, error = %e, "could not read source object");
                ctx.stats.record_copy_error();
                return;
            }
        };

        let request = &request;
        let copied = retry(ctx, "copy_object", key, move || {
            ctx.stats.mark_attempted(&request.destination_key);
            ctx.stats.record_copy_call();
            ctx.storage.copy(request)
        })
        .await;

        match copied {
            Ok(()) => {
                ctx.stats.record_copied(self.summary.size);
                progress!(ctx, key, destination_key, size = self.summary.size, "copied");
                verify_copy(ctx, destination_key, &self.summary.fingerprint()).await;
            }
            Err(e) => {
                error!(key, destination_key, error = %e, "copy failed");
                ctx.stats.record_copy_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{config, context};
    use super::*;
    use crate::memory::{MemoryStorage, Operation};

    fn listed(storage: &MemoryStorage, key: &str) -> KeySummary {
        let object = storage.object("src", key).expect("source object");
        KeySummary::new(key, object.data.len() as u64, object.etag)
            .with_version_id(object.version_id)
    }

    #[tokio::test]
    async fn test_should_copy_and_confirm_missing_key() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("src", "a", "hello");
        storage.create_bucket("dst");
        let ctx = context(config(), &storage);

        TransferJob::new(Arc::clone(&ctx), listed(&storage, "a")).run().await;

        let snap = ctx.stats.snapshot();
        assert_eq!(snap.objects_copied, 1);
        assert_eq!(snap.bytes_copied, 5);
        assert_eq!(snap.copy_errors, 0);
        assert!(storage.object("dst", "a").is_some());
        assert!(ctx.stats.unverified_keys().is_empty());
    }

    #[tokio::test]
    async fn test_should_not_copy_when_destination_matches() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("src", "a", "hello");
        storage.put_object("dst", "a", "hello");
        let ctx = context(config(), &storage);

        TransferJob::new(Arc::clone(&ctx), listed(&storage, "a")).run().await;

        assert_eq!(storage.calls(Operation::Copy), 0);
        assert_eq!(ctx.stats.snapshot().objects_copied, 0);
    }

    #[tokio::test]
    async fn test_should_count_one_copy_after_transient_failures() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("src", "a", "hello");
        storage.create_bucket("dst");
        storage.fail(Operation::Copy, "dst", "a", 2);
        let ctx = context(config(), &storage);

        TransferJob::new(Arc::clone(&ctx), listed(&storage, "a")).run().await;

        let snap = ctx.stats.snapshot();
        assert_eq!(snap.objects_copied, 1);
        assert_eq!(snap.copy_errors, 0);
        assert_eq!(snap.copy_calls, 3);
    }

    #[tokio::test]
    async fn test_should_count_error_when_retries_exhausted() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("src", "a", "hello");
        storage.create_bucket("dst");
        storage.fail(Operation::Copy, "dst", "a", u32::MAX);
        let ctx = context(config(), &storage);

        TransferJob::new(Arc::clone(&ctx), listed(&storage, "a")).run().await;

        let snap = ctx.stats.snapshot();
        assert_eq!(snap.objects_copied, 0);
        assert_eq!(snap.copy_errors, 1);
        assert_eq!(snap.copy_calls, 3);
        assert_eq!(ctx.stats.unverified_keys(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_should_only_log_in_dry_run() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("src", "a", "hello");
        storage.create_bucket("dst");
        let mut cfg = config();
        cfg.dry_run = true;
        let ctx = context(cfg, &storage);

        TransferJob::new(Arc::clone(&ctx), listed(&storage, "a")).run().await;

        assert_eq!(storage.calls(Operation::Copy), 0);
        assert!(storage.object("dst", "a").is_none());
    }

    #[tokio::test]
    async fn test_should_rewrite_destination_prefix() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("src", "live/a.txt", "hello");
        storage.create_bucket("dst");
        let mut cfg = config();
        cfg.prefix = Some("live/".to_owned());
        cfg.dest_prefix = Some("backup/".to_owned());
        let ctx = context(cfg, &storage);

        TransferJob::new(Arc::clone(&ctx), listed(&storage, "live/a.txt"))
            .run()
            .await;

        assert_eq!(storage.keys("dst"), vec!["backup/a.txt"]);
    }

    #[tokio::test]
    async fn test_should_count_error_when_source_vanishes() {
        let storage = Arc::new(MemoryStorage::new());
        storage.create_bucket("src");
        storage.create_bucket("dst");
        let ctx = context(config(), &storage);

        TransferJob::new(Arc::clone(&ctx), KeySummary::new("ghost", 3, "\"e\""))
            .run()
            .await;

        assert_eq!(ctx.stats.snapshot().copy_errors, 1);
        assert_eq!(storage.calls(Operation::Copy), 0);
    }
}
