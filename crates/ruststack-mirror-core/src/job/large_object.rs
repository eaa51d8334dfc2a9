//! Multipart copy for objects too large for a single copy request.

use std::sync::Arc;

use ruststack_mirror_model::{ByteRange, CopyRequest, Fingerprint, KeySummary};
use tracing::{error, info, warn};

use super::{prepare_copy, retry, should_transfer, verify_copy};
use crate::context::{RunContext, progress};
use crate::error::StorageResult;

/// Most parts a single multipart upload may have.
pub const MAX_PARTS: u64 = 10_000;

/// Copies one key as initiate, ranged part copies, complete.
///
/// Comparison and verification use size only: a multipart ETag depends on
/// the part layout, so it never matches the source's.
#[derive(Debug)]
pub struct LargeObjectTransferJob {
    ctx: Arc<RunContext>,
    summary: KeySummary,
    destination_key: String,
}

impl LargeObjectTransferJob {
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

    /// Decide, copy in parts, and verify.
    pub async fn run(self) {
        let ctx = self.ctx.as_ref();
        let key = self.summary.key.as_str();
        let destination_key = self.destination_key.as_str();

        if !should_transfer(ctx, &self.summary, destination_key).await {
            return;
        }
        if ctx.config.dry_run {
            info!(key, destination_key, size = self.summary.size, "dry run: would have copied in parts");
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
        let job = &self;
        let copied = retry(ctx, "multipart_copy", key, move || job.copy_in_parts(request)).await;

        match copied {
            Ok(()) => {
                let size = self.summary.size;
                ctx.stats.record_copied(size);
                progress!(ctx, key, destination_key, size, "copied in parts");
                verify_copy(ctx, destination_key, &Fingerprint::size_only(size)).await;
            }
            Err(e) => {
                error!(key, destination_key, error = %e, "multipart copy failed");
                ctx.stats.record_copy_error();
            }
        }
    }

    /// One full multipart session. The session is aborted if any step fails.
    async fn copy_in_parts(&self, request: &CopyRequest) -> StorageResult<()> {
        let ctx = self.ctx.as_ref();
        ctx.stats.mark_attempted(&request.destination_key);
        let upload_id = ctx.storage.initiate_multipart_copy(request).await?;

        let result = self.copy_parts(request, &upload_id).await;
        if result.is_err() {
            let aborted = ctx
                .storage
                .abort_multipart_copy(&request.destination_bucket, &request.destination_key, &upload_id)
                .await;
            if let Err(e) = aborted {
                warn!(
                    key = %request.destination_key,
                    upload_id,
                    error = %e,
                    "could not abort multipart copy"
                );
            }
        }
        result
    }

    async fn copy_parts(&self, request: &CopyRequest, upload_id: &str) -> StorageResult<()> {
        let ctx = self.ctx.as_ref();
        let ranges = part_ranges(self.summary.size, ctx.config.part_size);
        let mut parts = Vec::with_capacity(ranges.len());
        for (part_number, range) in (1u32..).zip(ranges) {
            ctx.stats.record_copy_call();
            let part = ctx
                .storage
                .copy_part(request, upload_id, part_number, range)
                .await?;
            parts.push(part);
        }
        ctx.storage
            .complete_multipart_copy(request, upload_id, &parts)
            .await
    }
}

/// Split `size` bytes into contiguous inclusive ranges of `part_size` bytes,
/// growing the part size when needed to stay within [`MAX_PARTS`].
#[must_use]
pub fn part_ranges(size: u64, part_size: u64) -> Vec<ByteRange> {
    let part_size = part_size.max(size.div_ceil(MAX_PARTS)).max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < size {
        let end = start.saturating_add(part_size).min(size) - 1;
        ranges.push(ByteRange::new(start, end));
        start = end + 1;
    }
    ranges
}
