//! Paginated listing into a bounded buffer.
//!
//! The [`Lister`] is the single producer of keys for a run. It fetches pages
//! while its buffer is below the watermark (`max_queue_capacity`) and idles
//! otherwise. The dispatcher drains the buffer in batches. The size check
//! and the append are separate critical sections and only the lister
//! appends, so the buffer can exceed the watermark by at most one page.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use ruststack_mirror_model::{KeySummary, ListCursor, ListPage};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::context::RunContext;
use crate::error::{MirrorError, MirrorResult};

/// Pause between attempts of a failed listing call.
pub const LIST_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Pause while the buffer is at the watermark.
pub const IDLE_DELAY: Duration = Duration::from_millis(50);

/// Pages between progress reports.
pub const REPORT_EVERY_PAGES: u64 = 100;

/// Fetches listing pages into a buffer drained by the dispatcher.
#[derive(Debug)]
pub struct Lister {
    ctx: Arc<RunContext>,
    bucket: String,
    prefix: String,
    buffer: Mutex<Vec<KeySummary>>,
    cursor: Mutex<Option<ListCursor>>,
    done: AtomicBool,
    ready: Notify,
}

impl Lister {
    /// Fetch the first page.
    ///
    /// Fails when the first page cannot be fetched within the retry budget,
    /// or when the run is interrupted while retrying it.
    pub async fn start(
        ctx: Arc<RunContext>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> MirrorResult<Self> {
        let lister = Self {
            ctx,
            bucket: bucket.into(),
            prefix: prefix.into(),
            buffer: Mutex::new(Vec::new()),
            cursor: Mutex::new(None),
            done: AtomicBool::new(false),
            ready: Notify::new(),
        };
        info!(bucket = %lister.bucket, prefix = %lister.prefix, "listing started");

        let first = lister.fetch_page(None).await?;
        *lister.cursor.lock() = lister.next_cursor(&first);
        lister.append(first.entries);
        Ok(lister)
    }

    /// Fetch the remaining pages.
    ///
    /// Returns an error only when a page cannot be fetched within the retry
    /// budget. Interruption ends the loop quietly. The done flag is set on
    /// every exit path.
    pub async fn run(self: Arc<Self>) -> MirrorResult<()> {
        let _done = DoneGuard(&self);
        let mut cursor = self.cursor.lock().take();
        let mut pages: u64 = 1;
        let capacity = self.ctx.config.max_queue_capacity;

        loop {
            if self.ctx.interrupt.is_triggered() {
                warn!(bucket = %self.bucket, pages, "listing interrupted");
                return Ok(());
            }
            if self.len() >= capacity {
                if self.ctx.interrupt.sleep(IDLE_DELAY).await.is_err() {
                    warn!(bucket = %self.bucket, pages, "listing interrupted");
                    return Ok(());
                }
                continue;
            }
            let Some(next) = cursor.take() else {
                info!(bucket = %self.bucket, prefix = %self.prefix, pages, "no more keys found, listing finished");
                return Ok(());
            };

            let page = match self.fetch_page(Some(&next)).await {
                Ok(page) => page,
                Err(MirrorError::ListingInterrupted { .. }) => {
                    warn!(bucket = %self.bucket, pages, "listing interrupted while retrying");
                    return Ok(());
                }
                Err(e) => {
                    error!(bucket = %self.bucket, pages, error = %e, "listing failed");
                    return Err(e);
                }
            };

            pages += 1;
            if pages % REPORT_EVERY_PAGES == 0 {
                self.ctx.stats.log_report();
                self.ctx.stats.log_consistency();
            }
            cursor = self.next_cursor(&page);
            self.append(page.entries);
        }
    }

    /// Take every buffered key.
    pub fn drain(&self) -> Vec<KeySummary> {
        mem::take(&mut *self.buffer.lock())
    }

    /// Keys currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Whether listing has stopped, for any reason.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Wait until keys are appended, listing stops, or `timeout` elapses.
    pub async fn wait_for_keys(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.ready.notified()).await;
    }

    fn append(&self, entries: Vec<KeySummary>) {
        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        let buffered = {
            let mut buffer = self.buffer.lock();
            buffer.extend(entries);
            buffer.len()
        };
        self.ctx.stats.record_read(count as u64);
        debug!(bucket = %self.bucket, count, buffered, "queued keys");
        self.ready.notify_one();
    }

    fn next_cursor(&self, page: &ListPage) -> Option<ListCursor> {
        if page.truncated && page.next.is_none() {
            warn!(bucket = %self.bucket, "truncated page without a continuation marker, stopping");
        }
        page.next_cursor().cloned()
    }

    async fn fetch_page(&self, cursor: Option<&ListCursor>) -> MirrorResult<ListPage> {
        let max_retries = self.ctx.config.max_retries;
        let page_size = self.ctx.config.page_size();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.ctx.stats.record_list_call();
            let result = self
                .ctx
                .storage
                .list_page(&self.bucket, &self.prefix, cursor, page_size)
                .await;
            match result {
                Ok(page) => return Ok(page),
                Err(source) if attempt >= max_retries => {
                    return Err(MirrorError::ListingFailed {
                        bucket: self.bucket.clone(),
                        prefix: self.prefix.clone(),
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    warn!(bucket = %self.bucket, attempt, error = %e, "listing call failed, retrying");
                    if self.ctx.interrupt.sleep(LIST_RETRY_DELAY).await.is_err() {
                        return Err(MirrorError::ListingInterrupted {
                            bucket: self.bucket.clone(),
                            prefix: self.prefix.clone(),
                        });
                    }
                }
            }
        }
    }
}

struct DoneGuard<'a>(&'a Lister);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.0.done.store(true, Ordering::Release);
        self.0.ready.notify_one();
    }
}
