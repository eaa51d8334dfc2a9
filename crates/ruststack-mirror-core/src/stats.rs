//! Run statistics.
//!
//! [`MirrorStats`] is shared by every task in a run through an `Arc`.
//! Counters are monotone atomics. Two key sets back the consistency check:
//! every destination key a copy was attempted for, and every destination key
//! whose copy was verified afterwards. Keys in exactly one set are reported
//! as unverified.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;
const PB: u64 = TB * 1024;
const EB: u64 = PB * 1024;

const BANNER: &str = "--------------------------------------------------------------------";

/// Upper bound on unverified keys written to a single log line.
const MAX_LOGGED_KEYS: usize = 100;

/// Counters and key sets for one mirror run.
#[derive(Debug)]
pub struct MirrorStats {
    started: Instant,
    objects_read: AtomicU64,
    objects_copied: AtomicU64,
    copy_errors: AtomicU64,
    objects_deleted: AtomicU64,
    delete_errors: AtomicU64,
    bytes_copied: AtomicU64,
    list_calls: AtomicU64,
    metadata_calls: AtomicU64,
    copy_calls: AtomicU64,
    delete_calls: AtomicU64,
    attempted: DashSet<String>,
    confirmed: DashSet<String>,
}

impl Default for MirrorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorStats {
    /// Start a new set of statistics. Elapsed time is measured from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            objects_read: AtomicU64::new(0),
            objects_copied: AtomicU64::new(0),
            copy_errors: AtomicU64::new(0),
            objects_deleted: AtomicU64::new(0),
            delete_errors: AtomicU64::new(0),
            bytes_copied: AtomicU64::new(0),
            list_calls: AtomicU64::new(0),
            metadata_calls: AtomicU64::new(0),
            copy_calls: AtomicU64::new(0),
            delete_calls: AtomicU64::new(0),
            attempted: DashSet::new(),
            confirmed: DashSet::new(),
        }
    }

    /// Keys received from the lister.
    pub fn record_read(&self, count: u64) {
        self.objects_read.fetch_add(count, Ordering::Relaxed);
    }

    /// A copy finished; `bytes` is the source content length.
    pub fn record_copied(&self, bytes: u64) {
        self.objects_copied.fetch_add(1, Ordering::Relaxed);
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }

    /// A copy was given up on.
    pub fn record_copy_error(&self) {
        self.copy_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A delete finished.
    pub fn record_deleted(&self) {
        self.objects_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// A delete was given up on.
    pub fn record_delete_error(&self) {
        self.delete_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// One listing call was issued.
    pub fn record_list_call(&self) {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// One metadata or ACL call was issued.
    pub fn record_metadata_call(&self) {
        self.metadata_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// One copy call was issued (single-shot or part).
    pub fn record_copy_call(&self) {
        self.copy_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// One delete call was issued.
    pub fn record_delete_call(&self) {
        self.delete_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// A copy to `destination_key` is about to be attempted.
    pub fn mark_attempted(&self, destination_key: &str) {
        if !self.attempted.contains(destination_key) {
            self.attempted.insert(destination_key.to_owned());
        }
    }

    /// The copy at `destination_key` was verified.
    pub fn mark_confirmed(&self, destination_key: &str) {
        if !self.confirmed.contains(destination_key) {
            self.confirmed.insert(destination_key.to_owned());
        }
    }

    /// Keys present in exactly one of the attempted and confirmed sets, sorted.
    #[must_use]
    pub fn unverified_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .attempted
            .iter()
            .filter(|key| !self.confirmed.contains(key.as_str()))
            .map(|key| key.key().clone())
            .chain(
                self.confirmed
                    .iter()
                    .filter(|key| !self.attempted.contains(key.as_str()))
                    .map(|key| key.key().clone()),
            )
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            elapsed_millis: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            objects_read: self.objects_read.load(Ordering::Relaxed),
            objects_copied: self.objects_copied.load(Ordering::Relaxed),
            copy_errors: self.copy_errors.load(Ordering::Relaxed),
            objects_deleted: self.objects_deleted.load(Ordering::Relaxed),
            delete_errors: self.delete_errors.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            list_calls: self.list_calls.load(Ordering::Relaxed),
            metadata_calls: self.metadata_calls.load(Ordering::Relaxed),
            copy_calls: self.copy_calls.load(Ordering::Relaxed),
            delete_calls: self.delete_calls.load(Ordering::Relaxed),
        }
    }

    /// Log the report between banner lines.
    pub fn log_report(&self) {
        info!("\n{BANNER}\nSTATS BEGIN\n{}STATS END\n{BANNER}", self.snapshot());
    }

    /// Log the keys whose copy was attempted but never verified.
    pub fn log_consistency(&self) {
        let keys = self.unverified_keys();
        if keys.is_empty() {
            info!(
                attempted = self.attempted.len(),
                "every attempted key verified at destination"
            );
            return;
        }
        let shown = &keys[..keys.len().min(MAX_LOGGED_KEYS)];
        warn!(
            unverified = keys.len(),
            keys = ?shown,
            "keys not verified at destination"
        );
    }
}

// ---------------------------------------------------------------------------
// StatsSnapshot
// ---------------------------------------------------------------------------

/// Counter values captured at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Time since the run started, in milliseconds.
    pub elapsed_millis: u64,
    /// Keys received from the lister.
    pub objects_read: u64,
    /// Copies completed.
    pub objects_copied: u64,
    /// Copies given up on.
    pub copy_errors: u64,
    /// Deletes completed.
    pub objects_deleted: u64,
    /// Deletes given up on.
    pub delete_errors: u64,
    /// Sum of source sizes over completed copies.
    pub bytes_copied: u64,
    /// Listing calls issued.
    pub list_calls: u64,
    /// Metadata and ACL calls issued.
    pub metadata_calls: u64,
    /// Copy calls issued.
    pub copy_calls: u64,
    /// Delete calls issued.
    pub delete_calls: u64,
}

impl StatsSnapshot {
    /// Elapsed time as a [`Duration`].
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_millis)
    }

    /// Events per minute over the elapsed time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn per_minute(&self, count: u64) -> f64 {
        let minutes = self.elapsed_millis as f64 / 60_000.0;
        if minutes > 0.0 {
            count as f64 / minutes
        } else {
            0.0
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "read: {}", self.objects_read)?;
        writeln!(f, "copied: {}", self.objects_copied)?;
        writeln!(f, "copy errors: {}", self.copy_errors)?;
        writeln!(f, "deleted: {}", self.objects_deleted)?;
        writeln!(f, "delete errors: {}", self.delete_errors)?;
        writeln!(f, "duration: {}", format_duration(self.elapsed()))?;
        writeln!(f, "read rate: {:.2}/minute", self.per_minute(self.objects_read))?;
        writeln!(f, "copy rate: {:.2}/minute", self.per_minute(self.objects_copied))?;
        writeln!(f, "delete rate: {:.2}/minute", self.per_minute(self.objects_deleted))?;
        writeln!(f, "bytes copied: {}", format_bytes(self.bytes_copied))?;
        writeln!(f, "LIST operations: {}", self.list_calls)?;
        writeln!(f, "GET operations: {}", self.metadata_calls)?;
        writeln!(f, "COPY operations: {}", self.copy_calls)?;
        writeln!(f, "DELETE operations: {}", self.delete_calls)
    }
}

/// Format a duration as `h:mm:ss`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Format a byte count with the largest unit it exceeds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    let units = [
        (EB, "EB"),
        (PB, "PB"),
        (TB, "TB"),
        (GB, "GB"),
        (MB, "MB"),
        (KB, "KB"),
    ];
    for (size, unit) in units {
        if bytes > size {
            return format!("{:.2} {unit} ({bytes} bytes)", bytes as f64 / size as f64);
        }
    }
    format!("{bytes} bytes")
}
