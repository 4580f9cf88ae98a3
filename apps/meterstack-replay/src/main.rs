//! meterstack-replay - rebuild account totals from recorded container events.
//!
//! Reads JSON-lines container events from a file (or stdin when no path is
//! given), applies each one to a fresh in-memory store and prints one JSON
//! account summary per line.
//!
//! # Usage
//!
//! ```text
//! meterstack-replay [--refresh] [events.jsonl]
//! ```
//!
//! Each input line is an object such as
//! `{"account":"acct","name":"photos","mtime":"1700000000.00000","objects":5,"bytes":500,"bucket":"photos"}`.
//! `--refresh` recomputes every account and bucket once all events are in.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `METERSTACK_AUTOCREATE` | `true` | Create accounts on their first event |
//! | `METERSTACK_REFRESH_BATCH_SIZE` | `10000` | Containers per refresh batch |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use anyhow::{Context, Result};
use meterstack_account::{
    AccountBackend, AccountConfig, AccountError, ErrorKind, Timestamp, UpdateContainerRequest,
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
/// Logs go to stderr so stdout carries only the JSON output.
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
        .with_writer(io::stderr)
        .init();

    Ok(())
}

/// One recorded container event.
#[derive(Debug, Deserialize)]
struct ContainerEvent {
    account: String,
    name: String,
    #[serde(default)]
    mtime: Option<Timestamp>,
    #[serde(default)]
    dtime: Option<Timestamp>,
    #[serde(default)]
    objects: Option<i64>,
    #[serde(default)]
    bytes: Option<i64>,
    #[serde(default)]
    bucket: Option<String>,
}

impl From<ContainerEvent> for UpdateContainerRequest {
    fn from(event: ContainerEvent) -> Self {
        Self {
            account: event.account,
            name: event.name,
            mtime: event.mtime,
            dtime: event.dtime,
            object_count: event.objects,
            bytes_used: event.bytes,
            bucket_name: event.bucket,
            autocreate_account: None,
            autocreate_container: true,
        }
    }
}

/// Counts of one replay run.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReplayStats {
    applied: usize,
    rejected: usize,
    malformed: usize,
}

/// Apply every event read from `input`.
///
/// Stale and not-found rejections are expected when events are replayed out
/// of order; any other failure aborts the replay.
fn replay(backend: &AccountBackend, input: impl BufRead) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();
    for (lineno, line) in input.lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ContainerEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "skipping malformed event");
                stats.malformed += 1;
                continue;
            }
        };

        match backend.update_container(&event.into()) {
            Ok(_) => stats.applied += 1,
            Err(e @ (AccountError::StaleUpdate { .. } | AccountError::NoSuchContainer { .. })) => {
                debug!(line = lineno + 1, error = %e, "event rejected");
                stats.rejected += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::BadRequest => {
                warn!(line = lineno + 1, error = %e, "event rejected");
                stats.rejected += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("event on line {} failed", lineno + 1)),
        }
    }
    Ok(stats)
}

/// Recompute every account, then every bucket.
fn refresh_all(backend: &AccountBackend) -> Result<()> {
    let batch_size = backend.config().refresh_batch_size;
    let mut buckets = Vec::new();
    for account in backend.list_accounts()? {
        backend
            .refresh_account(&account)
            .with_context(|| format!("failed to refresh account {account}"))?;
        let mut marker: Option<String> = None;
        loop {
            let mut params = meterstack_account::ListParams::default();
            params.marker.clone_from(&marker);
            let page = backend.list_buckets(&account, &params)?;
            buckets.extend(page.names().into_iter().map(str::to_owned));
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
    }
    for bucket in buckets {
        backend
            .refresh_bucket(&bucket, batch_size)
            .with_context(|| format!("failed to refresh bucket {bucket}"))?;
    }
    Ok(())
}

/// Write one JSON summary per account.
fn write_summaries(backend: &AccountBackend, mut out: impl Write) -> Result<()> {
    for account in backend.list_accounts()? {
        let info = backend.info_account(&account)?;
        serde_json::to_writer(&mut out, &info)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let config = AccountConfig::from_env();
    init_tracing(&config.log_level)?;

    let mut refresh = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        if arg == "--refresh" {
            refresh = true;
        } else {
            path = Some(arg);
        }
    }

    let backend = AccountBackend::in_memory(config);
    let stats = match &path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("cannot open {path}"))?;
            replay(&backend, BufReader::new(file))?
        }
        None => replay(&backend, io::stdin().lock())?,
    };
    info!(
        applied = stats.applied,
        rejected = stats.rejected,
        malformed = stats.malformed,
        "replay complete"
    );

    if refresh {
        refresh_all(&backend)?;
    }
    write_summaries(&backend, io::stdout().lock())
}
