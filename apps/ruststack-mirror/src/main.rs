//! RustStack Mirror - copy the keys of one S3 bucket into another.
//!
//! Lists the source bucket, skips keys the destination already holds, and
//! issues server-side copies for the rest. With `MIRROR_MODE=delete` it lists
//! the destination and deletes instead.
//!
//! # Usage
//!
//! ```text
//! MIRROR_SOURCE_BUCKET=logs MIRROR_DESTINATION_BUCKET=logs-backup ruststack-mirror
//! ```
//!
//! # Environment Variables
//!
//! All `MIRROR_*` variables are read by `MirrorConfig::from_env`. In addition:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `S3_ENDPOINT_URL` | *(unset)* | Custom endpoint, path-style addressing |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//!
//! Exits with status 1 when the configuration is invalid or a listing fails.
//! Per-key failures are reported in the final statistics only.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use ruststack_mirror_core::{Interrupt, Mirror, MirrorConfig, MirrorReport};
use ruststack_mirror_s3::S3Storage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Tool version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Custom endpoint from `S3_ENDPOINT_URL`, ignoring blank values.
fn endpoint_url(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    lookup("S3_ENDPOINT_URL")
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Trigger the run's interrupt on the first Ctrl-C.
fn watch_ctrl_c() -> Interrupt {
    let (handle, interrupt) = Interrupt::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received interrupt, stopping after in-flight requests");
            handle.trigger();
        }
    });
    interrupt
}

async fn run() -> Result<MirrorReport> {
    let config = MirrorConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level)?;

    let endpoint = endpoint_url(|name| std::env::var(name).ok());
    let storage = Arc::new(S3Storage::from_env(endpoint.as_deref()).await);
    let mirror = Mirror::new(config, storage)?.with_interrupt(watch_ctrl_c());

    let config = mirror.config();
    info!(
        source = %config.source_bucket,
        destination = %config.destination_bucket,
        endpoint = endpoint.as_deref().unwrap_or("default"),
        mode = %config.mode,
        max_threads = config.max_threads,
        max_queue_capacity = config.max_queue_capacity,
        comparison = %config.comparison,
        version = VERSION,
        "starting RustStack Mirror",
    );
    Ok(mirror.run().await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(report) => {
            match serde_json::to_string(&report) {
                Ok(json) => info!(report = %json, "mirror finished"),
                Err(e) => warn!(error = %e, "failed to serialize report"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            // Tracing may not be initialized when configuration failed.
            eprintln!("ruststack-mirror: {e:#}");
            error!(error = %format!("{e:#}"), "mirror failed");
            ExitCode::FAILURE
        }
    }
}
