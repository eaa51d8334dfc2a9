//! State shared by every task of a run.

use std::sync::Arc;

use crate::config::MirrorConfig;
use crate::interrupt::Interrupt;
use crate::stats::MirrorStats;
use crate::storage::ObjectStorage;

/// Configuration plus the shared handles a lister or job needs.
#[derive(Debug)]
pub struct RunContext {
    /// Run configuration.
    pub config: MirrorConfig,
    /// Backend holding both buckets.
    pub storage: Arc<dyn ObjectStorage>,
    /// Run statistics.
    pub stats: Arc<MirrorStats>,
    /// Cancellation observer.
    pub interrupt: Interrupt,
}

impl RunContext {
    /// Bundle the pieces of a run.
    #[must_use]
    pub fn new(
        config: MirrorConfig,
        storage: Arc<dyn ObjectStorage>,
        stats: Arc<MirrorStats>,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            config,
            storage,
            stats,
            interrupt,
        }
    }
}

/// Log a per-key decision at `info` in verbose mode and at `debug` otherwise.
macro_rules! progress {
    ($ctx:expr, $($arg:tt)+) => {
        if $ctx.config.verbose {
            ::tracing::info!($($arg)+);
        } else {
            ::tracing::debug!($($arg)+);
        }
    };
}

pub(crate) use progress;
