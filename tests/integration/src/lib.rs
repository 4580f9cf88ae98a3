//! Integration tests for the meterstack accounting backend.
//!
//! Every test drives a fresh in-memory [`AccountBackend`] through its public
//! API only.
//!
//! Run them with:
//! ```text
//! cargo test -p meterstack-integration
//! ```

use std::sync::Once;

use meterstack_account::{
    AccountBackend, AccountConfig, ContainerEntry, ListParams, Listing, Timestamp,
    UpdateContainerRequest,
};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Create a backend over a fresh in-memory store.
#[must_use]
pub fn backend() -> AccountBackend {
    backend_with(AccountConfig::default())
}

/// Create a backend with a custom configuration.
#[must_use]
pub fn backend_with(config: AccountConfig) -> AccountBackend {
    init_tracing();
    AccountBackend::in_memory(config)
}

/// Generate a unique account name for a test.
#[must_use]
pub fn test_account_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// A timestamp `secs` seconds after the epoch.
#[must_use]
pub fn ts(secs: u64) -> Timestamp {
    Timestamp::from_ticks(secs * 100_000)
}

/// A container report carrying totals.
#[must_use]
pub fn report(account: &str, name: &str, mtime: u64, objects: i64, bytes: i64) -> UpdateContainerRequest {
    UpdateContainerRequest::builder()
        .account(account)
        .name(name)
        .mtime(ts(mtime))
        .object_count(objects)
        .bytes_used(bytes)
        .build()
}

/// A container report carrying totals and a bucket.
#[must_use]
pub fn bucket_report(
    account: &str,
    name: &str,
    bucket: &str,
    mtime: u64,
    objects: i64,
    bytes: i64,
) -> UpdateContainerRequest {
    let mut req = report(account, name, mtime, objects, bytes);
    req.bucket_name = Some(bucket.to_owned());
    req
}

/// A container deletion report.
#[must_use]
pub fn deletion(account: &str, name: &str, dtime: u64) -> UpdateContainerRequest {
    UpdateContainerRequest::builder()
        .account(account)
        .name(name)
        .dtime(ts(dtime))
        .build()
}

/// Account counters.
#[must_use]
pub fn account_totals(backend: &AccountBackend, account: &str) -> (i64, i64) {
    let info = backend
        .info_account(account)
        .unwrap_or_else(|e| panic!("info_account {account}: {e}"));
    (info.objects, info.bytes)
}

/// Follow `next_marker` until the listing is exhausted and return every
/// entry name.
#[must_use]
pub fn list_all(backend: &AccountBackend, account: &str, params: &ListParams) -> Vec<String> {
    let mut names = Vec::new();
    let mut params = params.clone();
    loop {
        let page: Listing<ContainerEntry> = backend
            .list_containers(account, &params)
            .unwrap_or_else(|e| panic!("list_containers {account}: {e}"));
        names.extend(page.names().into_iter().map(str::to_owned));
        match page.next_marker {
            Some(next) => params.marker = Some(next),
            None => return names,
        }
    }
}

mod test_concurrency;
mod test_container;
mod test_listing;
mod test_refresh;
