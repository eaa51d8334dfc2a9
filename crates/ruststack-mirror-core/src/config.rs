//! Mirror configuration.
//!
//! Provides [`MirrorConfig`] for one mirror run. Values are loaded from
//! `MIRROR_*` environment variables; everything except the two bucket names
//! has a default.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::comparison::ComparisonStrategy;
use crate::error::{MirrorError, MirrorResult};

/// Default per-call attempt budget.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default worker pool size.
pub const DEFAULT_MAX_THREADS: usize = 100;

/// Outstanding-job ceiling as a multiple of the worker pool size.
pub const QUEUE_CAPACITY_FACTOR: usize = 10;

/// Largest object copied with a single request (5 GiB).
pub const DEFAULT_LARGE_OBJECT_THRESHOLD: u64 = 5 * 1024 * 1024 * 1024;

/// Default part size for multipart copies (4 GiB).
pub const DEFAULT_PART_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Smallest part size accepted by S3 (5 MiB).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest single copy request or copied part accepted by S3 (5 GiB).
pub const MAX_COPY_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Storage class applied when none is configured.
pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

// ---------------------------------------------------------------------------
// MirrorMode
// ---------------------------------------------------------------------------

/// What a run does with the keys it lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorMode {
    /// List the source and copy keys that differ at the destination.
    #[default]
    Copy,
    /// List the destination and delete its keys.
    Delete,
}

impl fmt::Display for MirrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => f.write_str("copy"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

impl FromStr for MirrorMode {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "delete" => Ok(Self::Delete),
            other => Err(MirrorError::Config(format!("unknown mode: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MirrorConfig
// ---------------------------------------------------------------------------

/// Configuration for a mirror run.
///
/// # Examples
///
/// ```
/// use ruststack_mirror_core::config::MirrorConfig;
///
/// let config = MirrorConfig::builder()
///     .source_bucket("src")
///     .destination_bucket("dst")
///     .build();
/// assert_eq!(config.max_threads, 100);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    /// Bucket to read from.
    #[builder(setter(into))]
    pub source_bucket: String,

    /// Bucket to write to.
    #[builder(setter(into))]
    pub destination_bucket: String,

    /// Only keys starting with this prefix are mirrored.
    #[builder(default, setter(strip_option, into))]
    pub prefix: Option<String>,

    /// Replaces `prefix` at the start of every destination key.
    #[builder(default, setter(strip_option, into))]
    pub dest_prefix: Option<String>,

    /// Log intended copies and deletes without performing them.
    #[builder(default = false)]
    pub dry_run: bool,

    /// Log every key decision at `info` rather than `debug`.
    #[builder(default = false)]
    pub verbose: bool,

    /// Attempts per remote call before a key is given up on.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Jobs executing concurrently.
    #[builder(default = DEFAULT_MAX_THREADS)]
    pub max_threads: usize,

    /// Jobs submitted but not yet finished. Also the lister's buffer watermark.
    #[builder(default = DEFAULT_MAX_THREADS * QUEUE_CAPACITY_FACTOR)]
    pub max_queue_capacity: usize,

    /// Storage class written at the destination.
    #[builder(default = String::from(DEFAULT_STORAGE_CLASS), setter(into))]
    pub storage_class: String,

    /// Request `AES256` server-side encryption on written objects.
    #[builder(default = false)]
    pub encrypt: bool,

    /// Rewrite ACLs so they are valid in another account.
    #[builder(default = false)]
    pub cross_account: bool,

    /// How a present destination object is compared to its source.
    #[builder(default)]
    pub comparison: ComparisonStrategy,

    /// Source objects modified before this instant are never copied.
    #[builder(default, setter(strip_option))]
    pub modified_since: Option<DateTime<Utc>>,

    /// Objects strictly larger than this are copied in parts.
    #[builder(default = DEFAULT_LARGE_OBJECT_THRESHOLD)]
    pub large_object_threshold: u64,

    /// Requested part size for multipart copies.
    #[builder(default = DEFAULT_PART_SIZE)]
    pub part_size: u64,

    /// Whether the run copies or deletes.
    #[builder(default)]
    pub mode: MirrorMode,

    /// Delete only destination keys that no longer exist in the source.
    ///
    /// In copy mode this also appends a delete pass after the copy pass.
    #[builder(default = false)]
    pub delete_removed: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"), setter(into))]
    pub log_level: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source_bucket: String::new(),
            destination_bucket: String::new(),
            prefix: None,
            dest_prefix: None,
            dry_run: false,
            verbose: false,
            max_retries: DEFAULT_MAX_RETRIES,
            max_threads: DEFAULT_MAX_THREADS,
            max_queue_capacity: DEFAULT_MAX_THREADS * QUEUE_CAPACITY_FACTOR,
            storage_class: String::from(DEFAULT_STORAGE_CLASS),
            encrypt: false,
            cross_account: false,
            comparison: ComparisonStrategy::default(),
            modified_since: None,
            large_object_threshold: DEFAULT_LARGE_OBJECT_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
            mode: MirrorMode::default(),
            delete_removed: false,
            log_level: String::from("info"),
        }
    }
}

impl MirrorConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `MIRROR_SOURCE_BUCKET` | required |
    /// | `MIRROR_DESTINATION_BUCKET` | required |
    /// | `MIRROR_PREFIX` | unset |
    /// | `MIRROR_DEST_PREFIX` | unset |
    /// | `MIRROR_DRY_RUN` | `false` |
    /// | `MIRROR_VERBOSE` | `false` |
    /// | `MIRROR_MAX_RETRIES` | `5` |
    /// | `MIRROR_MAX_THREADS` | `100` |
    /// | `MIRROR_MAX_QUEUE_CAPACITY` | 10 x `MIRROR_MAX_THREADS` |
    /// | `MIRROR_STORAGE_CLASS` | `STANDARD` |
    /// | `MIRROR_ENCRYPT` | `false` |
    /// | `MIRROR_CROSS_ACCOUNT` | `false` |
    /// | `MIRROR_COMPARISON` | `etag` |
    /// | `MIRROR_MAX_AGE` | unset |
    /// | `MIRROR_LARGE_OBJECT_THRESHOLD` | `5368709120` |
    /// | `MIRROR_PART_SIZE` | `4294967296` |
    /// | `MIRROR_MODE` | `copy` |
    /// | `MIRROR_DELETE_REMOVED` | `false` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// The result is validated before it is returned.
    pub fn from_env() -> MirrorResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), Utc::now())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// `now` anchors `MIRROR_MAX_AGE`.
    pub fn from_lookup<F>(lookup: F, now: DateTime<Utc>) -> MirrorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("MIRROR_SOURCE_BUCKET") {
            config.source_bucket = v;
        }
        if let Some(v) = lookup("MIRROR_DESTINATION_BUCKET") {
            config.destination_bucket = v;
        }
        if let Some(v) = lookup("MIRROR_PREFIX") {
            config.prefix = Some(v).filter(|p| !p.is_empty());
        }
        if let Some(v) = lookup("MIRROR_DEST_PREFIX") {
            config.dest_prefix = Some(v).filter(|p| !p.is_empty());
        }
        if let Some(v) = lookup("MIRROR_DRY_RUN") {
            config.dry_run = parse_bool(&v);
        }
        if let Some(v) = lookup("MIRROR_VERBOSE") {
            config.verbose = parse_bool(&v);
        }
        if let Some(v) = lookup("MIRROR_MAX_RETRIES") {
            config.max_retries = parse_number("MIRROR_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("MIRROR_MAX_THREADS") {
            config.max_threads = parse_number("MIRROR_MAX_THREADS", &v)?;
        }
        config.max_queue_capacity = match lookup("MIRROR_MAX_QUEUE_CAPACITY") {
            Some(v) => parse_number("MIRROR_MAX_QUEUE_CAPACITY", &v)?,
            None => config.max_threads.saturating_mul(QUEUE_CAPACITY_FACTOR),
        };
        if let Some(v) = lookup("MIRROR_STORAGE_CLASS") {
            config.storage_class = v;
        }
        if let Some(v) = lookup("MIRROR_ENCRYPT") {
            config.encrypt = parse_bool(&v);
        }
        if let Some(v) = lookup("MIRROR_CROSS_ACCOUNT") {
            config.cross_account = parse_bool(&v);
        }
        if let Some(v) = lookup("MIRROR_COMPARISON") {
            config.comparison = v.parse()?;
        }
        if let Some(v) = lookup("MIRROR_MAX_AGE") {
            config.modified_since = Some(now - parse_age(&v)?);
        }
        if let Some(v) = lookup("MIRROR_LARGE_OBJECT_THRESHOLD") {
            config.large_object_threshold = parse_number("MIRROR_LARGE_OBJECT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("MIRROR_PART_SIZE") {
            config.part_size = parse_number("MIRROR_PART_SIZE", &v)?;
        }
        if let Some(v) = lookup("MIRROR_MODE") {
            config.mode = v.parse()?;
        }
        if let Some(v) = lookup("MIRROR_DELETE_REMOVED") {
            config.delete_removed = parse_bool(&v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration describes a runnable mirror.
    pub fn validate(&self) -> MirrorResult<()> {
        if self.source_bucket.is_empty() {
            return Err(MirrorError::Config("source bucket is required".to_owned()));
        }
        if self.destination_bucket.is_empty() {
            return Err(MirrorError::Config("destination bucket is required".to_owned()));
        }
        if self.max_retries == 0 {
            return Err(MirrorError::Config("max retries must be at least 1".to_owned()));
        }
        if self.max_threads == 0 {
            return Err(MirrorError::Config("max threads must be at least 1".to_owned()));
        }
        if self.max_queue_capacity < self.max_threads {
            return Err(MirrorError::Config(format!(
                "max queue capacity ({}) must be at least max threads ({})",
                self.max_queue_capacity, self.max_threads
            )));
        }
        if self.part_size < MIN_PART_SIZE {
            return Err(MirrorError::Config(format!(
                "part size must be at least {MIN_PART_SIZE} bytes"
            )));
        }
        if self.part_size > MAX_COPY_SIZE {
            return Err(MirrorError::Config(format!(
                "part size must be at most {MAX_COPY_SIZE} bytes"
            )));
        }
        if self.large_object_threshold > MAX_COPY_SIZE {
            return Err(MirrorError::Config(format!(
                "large object threshold must be at most {MAX_COPY_SIZE} bytes"
            )));
        }
        if self.source_bucket == self.destination_bucket
            && self.dest_prefix.as_deref().unwrap_or(self.prefix_str()) == self.prefix_str()
        {
            return Err(MirrorError::Config(
                "source and destination resolve to the same location".to_owned(),
            ));
        }
        Ok(())
    }

    /// The source prefix, or `""` when unset.
    #[must_use]
    pub fn prefix_str(&self) -> &str {
        self.prefix.as_deref().unwrap_or_default()
    }

    /// Prefix used when listing the destination bucket.
    #[must_use]
    pub fn destination_prefix(&self) -> &str {
        self.dest_prefix.as_deref().unwrap_or(self.prefix_str())
    }

    /// Map a source key to its destination key.
    ///
    /// With a destination prefix set, the source prefix is swapped for it;
    /// otherwise keys are kept as-is.
    #[must_use]
    pub fn destination_key(&self, source_key: &str) -> String {
        match &self.dest_prefix {
            Some(dest) => swap_prefix(source_key, self.prefix_str(), dest),
            None => source_key.to_owned(),
        }
    }

    /// Map a destination key back to the source key it mirrors.
    #[must_use]
    pub fn source_key(&self, destination_key: &str) -> String {
        match &self.dest_prefix {
            Some(dest) => swap_prefix(destination_key, dest, self.prefix_str()),
            None => destination_key.to_owned(),
        }
    }

    /// Items fetched per listing page.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.max_threads.clamp(1, 1000)
    }
}

fn swap_prefix(key: &str, from: &str, to: &str) -> String {
    match key.strip_prefix(from) {
        Some(rest) => format!("{to}{rest}"),
        None => key.to_owned(),
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> MirrorResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MirrorError::Config(format!("{name}: not a valid number: {value:?}")))
}

/// Parse an age such as `30d`, `12h` or `2w`.
///
/// Units: `s` seconds, `m` minutes, `h` hours, `d` days, `w` weeks,
/// `M` months (30 days), `y` years (365 days). A bare number means days.
pub fn parse_age(value: &str) -> MirrorResult<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: i64 = digits
        .parse()
        .map_err(|_| MirrorError::Config(format!("invalid age: {value:?}")))?;

    let duration = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "" | "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        "M" => amount.checked_mul(30).and_then(Duration::try_days),
        "y" => amount.checked_mul(365).and_then(Duration::try_days),
        other => {
            return Err(MirrorError::Config(format!(
                "invalid age unit {other:?} in {value:?}"
            )));
        }
    };
    duration.ok_or_else(|| MirrorError::Config(format!("age out of range: {value:?}")))
}
