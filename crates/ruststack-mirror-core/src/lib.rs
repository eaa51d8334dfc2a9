//! Bucket mirroring engine for RustStack.
//!
//! Copies every key under a prefix from a source bucket to a destination
//! bucket, skipping keys the destination already holds, or deletes keys from
//! the destination. Listing, comparison, and transfer all go through the
//! [`ObjectStorage`] trait, so the engine runs against S3 or against the
//! in-memory [`MemoryStorage`] used by the tests.
//!
//! # Architecture
//!
//! ```text
//!   Mirror (one or two passes, final report)
//!        |
//!        v
//!   Dispatcher ---- spawns ----> MirrorJob (Transfer | LargeObjectTransfer | Delete)
//!        ^                            |
//!        | drain                      v
//!   Lister (bounded buffer)      ObjectStorage (S3 / memory)
//! ```

pub mod acl;
pub mod comparison;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod interrupt;
pub mod job;
pub mod lister;
pub mod memory;
pub mod mirror;
pub mod stats;
pub mod storage;

pub use comparison::ComparisonStrategy;
pub use config::{MirrorConfig, MirrorMode};
pub use error::{MirrorError, MirrorResult, StorageError, StorageResult};
pub use interrupt::{Interrupt, InterruptHandle};
pub use memory::MemoryStorage;
pub use mirror::{Mirror, MirrorReport};
pub use stats::{MirrorStats, StatsSnapshot};
pub use storage::ObjectStorage;
