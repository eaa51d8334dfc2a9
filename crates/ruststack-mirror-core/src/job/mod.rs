//! Per-key jobs.
//!
//! A [`JobFactory`] turns each listed key into a [`MirrorJob`]. Every job
//! runs one decide-then-act sequence and never returns an error: failures
//! are logged and counted in [`MirrorStats`](crate::stats::MirrorStats).

pub mod delete;
pub mod large_object;
pub mod transfer;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ruststack_mirror_model::{
    CopyRequest, DestinationMetadata, Fingerprint, KeySummary, ObjectMetadata,
};
use tracing::warn;

pub use self::delete::DeleteJob;
pub use self::large_object::LargeObjectTransferJob;
pub use self::transfer::TransferJob;
use crate::acl::cross_account_acl;
use crate::comparison::ComparisonStrategy;
use crate::config::MirrorMode;
use crate::context::{RunContext, progress};
use crate::error::{StorageError, StorageResult};

/// Pause between attempts of a failed per-key call.
pub const RETRY_DELAY: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// MirrorJob
// ---------------------------------------------------------------------------

/// One unit of work for one key.
#[derive(Debug)]
pub enum MirrorJob {
    /// Single-request copy.
    Transfer(TransferJob),
    /// Multipart copy of an object above the large-object threshold.
    LargeObjectTransfer(LargeObjectTransferJob),
    /// Delete from the destination.
    Delete(DeleteJob),
}

impl MirrorJob {
    /// The listed key this job handles.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Transfer(job) => job.key(),
            Self::LargeObjectTransfer(job) => job.key(),
            Self::Delete(job) => job.key(),
        }
    }

    /// Run the job to completion.
    pub async fn run(self) {
        match self {
            Self::Transfer(job) => job.run().await,
            Self::LargeObjectTransfer(job) => job.run().await,
            Self::Delete(job) => job.run().await,
        }
    }
}

// ---------------------------------------------------------------------------
// JobFactory
// ---------------------------------------------------------------------------

/// Bucket and prefix a run lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingTarget {
    /// Bucket to list.
    pub bucket: String,
    /// Prefix to list.
    pub prefix: String,
}

/// Builds the job for each listed key.
pub trait JobFactory: Send + Sync + fmt::Debug {
    /// Which run mode this factory serves.
    fn mode(&self) -> MirrorMode;

    /// Where keys come from.
    fn listing(&self) -> ListingTarget;

    /// Build the job for one listed key.
    fn create(&self, summary: KeySummary) -> MirrorJob;

    /// Count a job that ended without reporting its own outcome.
    fn record_lost_job(&self);
}

/// Create the factory for `mode`.
#[must_use]
pub fn factory_for(mode: MirrorMode, ctx: Arc<RunContext>) -> Box<dyn JobFactory> {
    match mode {
        MirrorMode::Copy => Box::new(CopyJobFactory { ctx }),
        MirrorMode::Delete => Box::new(DeleteJobFactory { ctx }),
    }
}

/// Lists the source and copies keys that differ at the destination.
#[derive(Debug)]
pub struct CopyJobFactory {
    ctx: Arc<RunContext>,
}

impl JobFactory for CopyJobFactory {
    fn mode(&self) -> MirrorMode {
        MirrorMode::Copy
    }

    fn listing(&self) -> ListingTarget {
        ListingTarget {
            bucket: self.ctx.config.source_bucket.clone(),
            prefix: self.ctx.config.prefix_str().to_owned(),
        }
    }

    fn create(&self, summary: KeySummary) -> MirrorJob {
        let ctx = Arc::clone(&self.ctx);
        if summary.size > self.ctx.config.large_object_threshold {
            MirrorJob::LargeObjectTransfer(LargeObjectTransferJob::new(ctx, summary))
        } else {
            MirrorJob::Transfer(TransferJob::new(ctx, summary))
        }
    }

    fn record_lost_job(&self) {
        self.ctx.stats.record_copy_error();
    }
}

/// Lists the destination and deletes its keys.
#[derive(Debug)]
pub struct DeleteJobFactory {
    ctx: Arc<RunContext>,
}

impl JobFactory for DeleteJobFactory {
    fn mode(&self) -> MirrorMode {
        MirrorMode::Delete
    }

    fn listing(&self) -> ListingTarget {
        ListingTarget {
            bucket: self.ctx.config.destination_bucket.clone(),
            prefix: self.ctx.config.destination_prefix().to_owned(),
        }
    }

    fn create(&self, summary: KeySummary) -> MirrorJob {
        MirrorJob::Delete(DeleteJob::new(Arc::clone(&self.ctx), summary))
    }

    fn record_lost_job(&self) {
        self.ctx.stats.record_delete_error();
    }
}

// ---------------------------------------------------------------------------
// Shared job steps
// ---------------------------------------------------------------------------

/// Why a job step gave up.
#[derive(Debug, thiserror::Error)]
pub(crate) enum JobError {
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: StorageError,
    },

    #[error("{operation} interrupted while waiting to retry")]
    Interrupted { operation: &'static str },

    #[error("source object no longer exists")]
    SourceMissing,

    #[error("source object changed since listing: listed {listed} bytes, found {found}")]
    SourceChanged { listed: u64, found: u64 },
}

/// Call `attempt` until it succeeds, the attempt budget runs out, or the run
/// is interrupted. Not-found errors are not retried.
pub(crate) async fn retry<T, F, Fut>(
    ctx: &RunContext,
    operation: &'static str,
    key: &str,
    mut attempt: F,
) -> Result<T, JobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(source) if source.is_not_found() || attempts >= ctx.config.max_retries => {
                return Err(JobError::Exhausted {
                    operation,
                    attempts,
                    source,
                });
            }
            Err(e) => {
                warn!(operation, key, attempt = attempts, error = %e, "call failed, retrying");
                if ctx.interrupt.sleep(RETRY_DELAY).await.is_err() {
                    return Err(JobError::Interrupted { operation });
                }
            }
        }
    }
}

/// Decide whether `summary` must be copied to `destination_key`.
///
/// Skips keys older than the configured cutoff, copies keys missing at the
/// destination, and otherwise compares with the configured strategy (size
/// only above the large-object threshold). A failed probe skips the key.
pub(crate) async fn should_transfer(
    ctx: &RunContext,
    summary: &KeySummary,
    destination_key: &str,
) -> bool {
    let key = summary.key.as_str();
    if let (Some(cutoff), Some(modified)) = (ctx.config.modified_since, summary.last_modified) {
        if modified < cutoff {
            progress!(ctx, key, %modified, "older than cutoff, skipping");
            return false;
        }
    }

    let bucket = ctx.config.destination_bucket.as_str();
    let probe = retry(ctx, "get_metadata", destination_key, move || {
        ctx.stats.record_metadata_call();
        ctx.storage.get_metadata(bucket, destination_key, None)
    })
    .await;

    let destination = match probe {
        Ok(DestinationMetadata::Missing) => {
            progress!(ctx, key, destination_key, "not at destination, copying");
            return true;
        }
        Ok(DestinationMetadata::Present(meta)) => meta,
        Err(e) => {
            warn!(key, destination_key, error = %e, "destination probe failed, skipping key");
            return false;
        }
    };

    let strategy = if summary.size > ctx.config.large_object_threshold {
        ComparisonStrategy::SizeOnly
    } else {
        ctx.config.comparison
    };
    let differs = strategy.source_differs(summary, &destination);
    progress!(ctx, key, %strategy, differs, "compared with destination");
    differs
}

/// Gather source metadata and ACL into the request that copies `summary`.
///
/// The metadata read is pinned to the listed version, and a revision whose
/// size no longer matches the listing is refused.
pub(crate) async fn prepare_copy(
    ctx: &RunContext,
    summary: &KeySummary,
    destination_key: &str,
) -> Result<CopyRequest, JobError> {
    let bucket = ctx.config.source_bucket.as_str();
    let key = summary.key.as_str();

    let version_id = summary.version_id.as_deref();
    let metadata: ObjectMetadata = retry(ctx, "get_metadata", key, move || {
        ctx.stats.record_metadata_call();
        ctx.storage.get_metadata(bucket, key, version_id)
    })
    .await?
    .present()
    .ok_or(JobError::SourceMissing)?;
    if metadata.size != summary.size {
        return Err(JobError::SourceChanged {
            listed: summary.size,
            found: metadata.size,
        });
    }

    let acl = retry(ctx, "get_acl", key, move || {
        ctx.stats.record_metadata_call();
        ctx.storage.get_acl(bucket, key)
    })
    .await?;
    let acl = if ctx.config.cross_account {
        cross_account_acl(&acl)
    } else {
        acl
    };

    Ok(CopyRequest {
        source_bucket: bucket.to_owned(),
        source_key: key.to_owned(),
        source_version_id: summary.version_id.clone(),
        destination_bucket: ctx.config.destination_bucket.clone(),
        destination_key: destination_key.to_owned(),
        metadata,
        acl,
        storage_class: ctx.config.storage_class.clone(),
        encrypt: ctx.config.encrypt,
    })
}

/// Probe the destination after a copy and record the key as confirmed when
/// it matches `expected`. A mismatch is only logged.
pub(crate) async fn verify_copy(ctx: &RunContext, destination_key: &str, expected: &Fingerprint) {
    ctx.stats.record_metadata_call();
    let probe = ctx
        .storage
        .get_metadata(&ctx.config.destination_bucket, destination_key, None)
        .await;
    match probe {
        Ok(DestinationMetadata::Present(meta)) if meta.fingerprint() == *expected => {
            ctx.stats.mark_confirmed(destination_key);
        }
        Ok(DestinationMetadata::Present(meta)) => {
            warn!(
                destination_key,
                expected = ?expected,
                actual = ?meta.fingerprint(),
                "checksum mismatch after copy"
            );
        }
        Ok(DestinationMetadata::Missing) => {
            warn!(destination_key, "copied object not found at destination");
        }
        Err(e) => {
            warn!(destination_key, error = %e, "could not verify copy");
        }
    }
}
