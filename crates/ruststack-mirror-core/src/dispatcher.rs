//! Turning listed keys into running jobs.
//!
//! The [`Dispatcher`] starts a [`Lister`], drains its buffer in batches, and
//! spawns one job per key. Two semaphores bound the work:
//!
//! - `slots` (`max_queue_capacity` permits) caps jobs submitted but not
//!   finished. A permit is taken before spawning and is owned by the job's
//!   future, so it is released whenever that future ends.
//! - `workers` (`max_threads` permits) caps jobs executing at once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::config::MirrorMode;
use crate::context::RunContext;
use crate::error::{MirrorError, MirrorResult};
use crate::job::{JobFactory, factory_for};
use crate::lister::{IDLE_DELAY, Lister};

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    /// Jobs spawned.
    pub submitted: u64,
    /// Jobs that panicked or were cancelled.
    pub lost: u64,
    /// Highest number of jobs outstanding at once.
    pub peak_outstanding: usize,
}

/// The spawned listing task, aborted when dropped so an abandoned dispatch
/// does not leave the lister running.
#[derive(Debug)]
struct ListingTask(JoinHandle<MirrorResult<()>>);

impl Drop for ListingTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drives one listing pass to completion.
#[derive(Debug)]
pub struct Dispatcher {
    ctx: Arc<RunContext>,
    factory: Box<dyn JobFactory>,
}

impl Dispatcher {
    /// Create a dispatcher for `mode`.
    #[must_use]
    pub fn new(ctx: Arc<RunContext>, mode: MirrorMode) -> Self {
        let factory = factory_for(mode, Arc::clone(&ctx));
        Self { ctx, factory }
    }

    /// Create a dispatcher with a custom job factory.
    #[must_use]
    pub fn with_factory(ctx: Arc<RunContext>, factory: Box<dyn JobFactory>) -> Self {
        Self { ctx, factory }
    }

    /// List, dispatch, and wait for every job.
    ///
    /// Fails only when listing fails; job failures are counted in the run
    /// statistics.
    pub async fn run(self) -> MirrorResult<DispatchSummary> {
        let target = self.factory.listing();
        let mode = self.factory.mode();
        info!(%mode, bucket = %target.bucket, prefix = %target.prefix, "dispatch started");

        let lister = Arc::new(Lister::start(Arc::clone(&self.ctx), target.bucket, target.prefix).await?);
        let mut listing = ListingTask(tokio::spawn(Arc::clone(&lister).run()));

        let ceiling = self.ctx.config.max_queue_capacity;
        let slots = Arc::new(Semaphore::new(ceiling));
        let workers = Arc::new(Semaphore::new(self.ctx.config.max_threads));
        let mut jobs = JoinSet::new();
        let mut summary = DispatchSummary::default();

        loop {
            let batch = lister.drain();
            if batch.is_empty() {
                if lister.is_done() && lister.is_empty() {
                    break;
                }
                lister.wait_for_keys(IDLE_DELAY).await;
                continue;
            }

            for key in batch {
                let slot = Arc::clone(&slots)
                    .acquire_owned()
                    .await
                    .map_err(|e| MirrorError::Task {
                        task: "dispatcher",
                        message: e.to_string(),
                    })?;
                summary.peak_outstanding = summary
                    .peak_outstanding
                    .max(ceiling - slots.available_permits());

                let job = self.factory.create(key);
                debug!(key = job.key(), "submitting job");
                let workers = Arc::clone(&workers);
                jobs.spawn(async move {
                    let _slot = slot;
                    let Ok(_worker) = workers.acquire().await else {
                        return;
                    };
                    job.run().await;
                });
                summary.submitted += 1;

                while let Some(result) = jobs.try_join_next() {
                    self.reap(result, &mut summary);
                }
            }
        }

        while let Some(result) = jobs.join_next().await {
            self.reap(result, &mut summary);
        }

        let listed = (&mut listing.0).await.map_err(|e| MirrorError::Task {
            task: "lister",
            message: e.to_string(),
        })?;
        info!(
            %mode,
            submitted = summary.submitted,
            lost = summary.lost,
            peak_outstanding = summary.peak_outstanding,
            "dispatch finished"
        );
        listed.map(|()| summary)
    }

    fn reap(&self, result: Result<(), JoinError>, summary: &mut DispatchSummary) {
        if let Err(e) = result {
            error!(error = %e, "job ended abnormally");
            self.factory.record_lost_job();
            summary.lost += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ruststack_mirror_model::KeySummary;

    use super::*;
    use crate::config::MirrorConfig;
    use crate::interrupt::Interrupt;
    use crate::job::{ListingTarget, MirrorJob};
    use crate::memory::{ANY_KEY, MemoryStorage, Operation};
    use crate::stats::MirrorStats;
    use crate::storage::ObjectStorage;

    fn context(storage: &Arc<MemoryStorage>, threads: usize, capacity: usize) -> Arc<RunContext> {
        let config = MirrorConfig::builder()
            .source_bucket("src")
            .destination_bucket("dst")
            .max_retries(2)
            .max_threads(threads)
            .max_queue_capacity(capacity)
            .build();
        let storage: Arc<dyn ObjectStorage> = storage.clone();
        Arc::new(RunContext::new(
            config,
            storage,
            Arc::new(MirrorStats::new()),
            Interrupt::never(),
        ))
    }

    #[tokio::test]
    async fn test_should_bound_outstanding_jobs() {
        let storage = Arc::new(MemoryStorage::new().with_latency(Duration::from_millis(5)));
        for i in 0..60 {
            storage.put_object("src", &format!("k{i:03}"), "data");
        }
        storage.create_bucket("dst");
        let ctx = context(&storage, 3, 6);

        let summary = Dispatcher::new(Arc::clone(&ctx), MirrorMode::Copy)
            .run()
            .await
            .expect("dispatch");

        assert_eq!(summary.submitted, 60);
        assert!(summary.peak_outstanding <= 6);
        assert!(storage.peak_in_flight() <= 3);
        assert_eq!(storage.keys("dst").len(), 60);
        assert_eq!(ctx.stats.snapshot().objects_copied, 60);
    }

    #[tokio::test]
    async fn test_should_propagate_listing_failure() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("src", "a", "x");
        storage.fail(Operation::List, "src", ANY_KEY, u32::MAX);
        let ctx = context(&storage, 2, 4);

        let err = Dispatcher::new(ctx, MirrorMode::Copy)
            .run()
            .await
            .expect_err("listing failure is fatal");
        assert!(matches!(err, MirrorError::ListingFailed { .. }));
    }

    #[tokio::test]
    async fn test_should_handle_empty_listing() {
        let storage = Arc::new(MemoryStorage::new());
        storage.create_bucket("src");
        let ctx = context(&storage, 2, 4);

        let summary = Dispatcher::new(ctx, MirrorMode::Copy)
            .run()
            .await
            .expect("dispatch");
        assert_eq!(summary.submitted, 0);
    }

    #[derive(Debug)]
    struct DestinationPurge {
        ctx: Arc<RunContext>,
    }

    impl JobFactory for DestinationPurge {
        fn mode(&self) -> MirrorMode {
            MirrorMode::Delete
        }

        fn listing(&self) -> ListingTarget {
            ListingTarget {
                bucket: "src".to_owned(),
                prefix: String::new(),
            }
        }

        fn create(&self, summary: KeySummary) -> MirrorJob {
            MirrorJob::Delete(crate::job::DeleteJob::new(Arc::clone(&self.ctx), summary))
        }

        fn record_lost_job(&self) {
            self.ctx.stats.record_delete_error();
        }
    }

    #[tokio::test]
    async fn test_should_dispatch_through_custom_factory() {
        let storage = Arc::new(MemoryStorage::new());
        storage.put_object("src", "a", "x");
        storage.put_object("src", "b", "x");
        storage.create_bucket("dst");
        let ctx = context(&storage, 2, 4);
        let factory = Box::new(DestinationPurge {
            ctx: Arc::clone(&ctx),
        });

        let summary = Dispatcher::with_factory(Arc::clone(&ctx), factory)
            .run()
            .await
            .expect("dispatch");
        assert_eq!(summary.submitted, 2);
        assert_eq!(ctx.stats.snapshot().objects_deleted, 2);
    }

    #[tokio::test]
    async fn test_should_stop_listing_when_dispatch_is_dropped() {
        let storage = Arc::new(MemoryStorage::new().with_latency(Duration::from_millis(10)));
        for i in 0..200 {
            storage.put_object("src", &format!("k{i:03}"), "data");
        }
        storage.create_bucket("dst");
        let ctx = context(&storage, 2, 4);

        let dispatch = Dispatcher::new(Arc::clone(&ctx), MirrorMode::Copy).run();
        let cut_short = tokio::time::timeout(Duration::from_millis(30), dispatch).await;
        assert!(cut_short.is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(Arc::strong_count(&ctx), 1);
        assert!(storage.keys("dst").len() < 200);
    }

    #[tokio::test]
    async fn test_should_count_panicked_job_as_error() {
        let storage = Arc::new(MemoryStorage::new());
        let ctx = context(&storage, 2, 4);
        let dispatcher = Dispatcher::new(Arc::clone(&ctx), MirrorMode::Copy);
        let task: tokio::task::JoinHandle<()> = tokio::spawn(async { panic!("job blew up") });
        let join_error = task.await.expect_err("task panicked");

        let mut summary = DispatchSummary::default();
        dispatcher.reap(Err(join_error), &mut summary);
        dispatcher.reap(Ok(()), &mut summary);

        assert_eq!(summary.lost, 1);
        assert_eq!(ctx.stats.snapshot().copy_errors, 1);
    }
}
