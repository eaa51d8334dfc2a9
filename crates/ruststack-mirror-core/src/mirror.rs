//! The mirror runner.
//!
//! [`Mirror::run`] executes one copy or delete pass, plus a delete-removed
//! pass after a copy when configured. The final statistics report is logged
//! by a guard created at the start of the run, so it is written whether the
//! run completes, fails, or is dropped mid-flight.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{MirrorConfig, MirrorMode};
use crate::context::RunContext;
use crate::dispatcher::{DispatchSummary, Dispatcher};
use crate::error::MirrorResult;
use crate::interrupt::Interrupt;
use crate::stats::{MirrorStats, StatsSnapshot};
use crate::storage::ObjectStorage;

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorReport {
    /// Final counter values.
    pub stats: StatsSnapshot,
    /// One entry per dispatch pass, in execution order.
    pub passes: Vec<DispatchSummary>,
    /// Destination keys attempted but not verified, sorted.
    pub unverified: Vec<String>,
}

/// A configured mirror between two buckets of one backend.
#[derive(Debug)]
pub struct Mirror {
    config: MirrorConfig,
    storage: Arc<dyn ObjectStorage>,
    stats: Arc<MirrorStats>,
    interrupt: Interrupt,
}

impl Mirror {
    /// Create a mirror. The configuration is validated.
    pub fn new(config: MirrorConfig, storage: Arc<dyn ObjectStorage>) -> MirrorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            storage,
            stats: Arc::new(MirrorStats::new()),
            interrupt: Interrupt::never(),
        })
    }

    /// Stop cooperatively when `interrupt` is triggered.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Live statistics, shared with the running tasks.
    #[must_use]
    pub fn stats(&self) -> &Arc<MirrorStats> {
        &self.stats
    }

    /// Run every configured pass.
    pub async fn run(&self) -> MirrorResult<MirrorReport> {
        let _report = FinalReport(Arc::clone(&self.stats));
        let ctx = Arc::new(RunContext::new(
            self.config.clone(),
            Arc::clone(&self.storage),
            Arc::clone(&self.stats),
            self.interrupt.clone(),
        ));
        info!(
            source = %self.config.source_bucket,
            destination = %self.config.destination_bucket,
            prefix = self.config.prefix_str(),
            mode = %self.config.mode,
            dry_run = self.config.dry_run,
            "mirror started"
        );

        let mut passes = vec![Dispatcher::new(Arc::clone(&ctx), self.config.mode).run().await?];
        if self.config.mode == MirrorMode::Copy
            && self.config.delete_removed
            && !self.interrupt.is_triggered()
        {
            passes.push(Dispatcher::new(ctx, MirrorMode::Delete).run().await?);
        }

        Ok(MirrorReport {
            stats: self.stats.snapshot(),
            passes,
            unverified: self.stats.unverified_keys(),
        })
    }
}

/// Logs the final report when dropped.
struct FinalReport(Arc<MirrorStats>);

impl Drop for FinalReport {
    fn drop(&mut self) {
        self.0.log_report();
        self.0.log_consistency();
    }
}
