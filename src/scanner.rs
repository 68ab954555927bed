use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregate::{fold_pings, fold_probes};
use crate::ping;
use crate::probe::{self, ProbeOptions};
use crate::types::{now_rfc3339, AggregatedRow, Endpoint, PingOutcome, ProbeOutcome, ScanResults};

/// Per-run scan settings.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Ping+probe pairs per endpoint.
    pub attempts: usize,
    pub attempt_timeout: Duration,
    pub read_banner: bool,
    pub banner_max_bytes: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout: Duration::from_millis(1000),
            read_banner: false,
            banner_max_bytes: 256,
        }
    }
}

impl ScanOptions {
    fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            timeout: self.attempt_timeout,
            read_banner: self.read_banner,
            banner_max_bytes: self.banner_max_bytes,
        }
    }
}

/// The network operations one attempt is made of.
pub trait Prober {
    fn ping(&self, host: &str, timeout: Duration) -> impl Future<Output = PingOutcome> + Send;

    fn probe(
        &self,
        host: &str,
        endpoint: &Endpoint,
        opts: &ProbeOptions,
    ) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Real ICMP + TCP prober.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetProber;

impl Prober for NetProber {
    fn ping(&self, host: &str, timeout: Duration) -> impl Future<Output = PingOutcome> + Send {
        ping::ping(host, timeout)
    }

    fn probe(
        &self,
        host: &str,
        endpoint: &Endpoint,
        opts: &ProbeOptions,
    ) -> impl Future<Output = ProbeOutcome> + Send {
        probe::check(host, endpoint, opts)
    }
}

/// Live view of a running scan, shared with readers such as the HTTP API.
#[derive(Clone, Debug)]
pub struct SharedProgress {
    pub running: Arc<AtomicBool>,
    pub checked_count: Arc<AtomicU64>,
    pub open_count: Arc<AtomicU64>,
    pub rows: Arc<Mutex<Vec<AggregatedRow>>>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            checked_count: Arc::new(AtomicU64::new(0)),
            open_count: Arc::new(AtomicU64::new(0)),
            rows: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mark a scan as started. Returns `false` if one is already running.
    pub fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Clear the flag set by [`try_begin`](Self::try_begin). Called by the
    /// owner of the scan once its results are published.
    pub fn finish(&self) {
        self.running.store(false, Ordering::Release);
    }
}

impl Default for SharedProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `opts.attempts` ping+probe pairs against one endpoint and fold them.
///
/// Returns `None` if cancelled before all attempts finished, so callers
/// never see a row built from a partial attempt window.
pub async fn scan_endpoint_with<P: Prober>(
    prober: &P,
    host: &str,
    endpoint: &Endpoint,
    opts: &ScanOptions,
    cancel: &CancellationToken,
) -> Option<AggregatedRow> {
    let attempts = opts.attempts.max(1);
    let probe_opts = opts.probe_options();
    let mut pings = Vec::with_capacity(attempts);
    let mut probes = Vec::with_capacity(attempts);

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            debug!(endpoint = %endpoint, attempt, "cancelled");
            return None;
        }
        pings.push(prober.ping(host, opts.attempt_timeout).await);
        probes.push(prober.probe(host, endpoint, &probe_opts).await);
    }

    Some(AggregatedRow::checked(
        endpoint.clone(),
        fold_pings(&pings),
        fold_probes(&probes),
    ))
}

/// [`scan_endpoint_with`] over the real network, without cancellation.
pub async fn scan_endpoint(host: &str, endpoint: &Endpoint, opts: &ScanOptions) -> AggregatedRow {
    let never = CancellationToken::new();
    match scan_endpoint_with(&NetProber, host, endpoint, opts, &never).await {
        Some(row) => row,
        None => AggregatedRow::not_checked(endpoint.clone()),
    }
}

/// Scan every endpoint on `host` in order, one row per endpoint.
pub async fn scan(host: &str, endpoints: &[Endpoint], opts: &ScanOptions) -> ScanResults {
    scan_with(
        &NetProber,
        host,
        endpoints,
        opts,
        CancellationToken::new(),
        SharedProgress::new(),
    )
    .await
}

/// Variant that accepts a `CancellationToken` and publishes progress to `shared`.
///
/// Endpoints are processed strictly one after another. Cancellation is
/// checked between endpoints and between attempts; endpoints not reached
/// keep their "not checked" row. The running flag in `shared` is left to
/// whoever took it with [`SharedProgress::try_begin`].
pub async fn scan_with<P: Prober>(
    prober: &P,
    host: &str,
    endpoints: &[Endpoint],
    opts: &ScanOptions,
    cancel: CancellationToken,
    shared: SharedProgress,
) -> ScanResults {
    let started_at = now_rfc3339();
    shared.checked_count.store(0, Ordering::Relaxed);
    shared.open_count.store(0, Ordering::Relaxed);
    {
        let mut rows = shared.rows.lock().await;
        *rows = endpoints.iter().cloned().map(AggregatedRow::not_checked).collect();
    }

    info!(host, endpoints = endpoints.len(), attempts = opts.attempts, "scan started");

    for (idx, endpoint) in endpoints.iter().enumerate() {
        if cancel.is_cancelled() {
            info!(host, "scan cancelled");
            break;
        }
        let Some(row) = scan_endpoint_with(prober, host, endpoint, opts, &cancel).await else {
            break;
        };
        debug!(
            endpoint = %endpoint,
            status = ?row.probe.as_ref().map(|p| p.status),
            ping_ok = ?row.ping.as_ref().map(|p| p.ok),
            "endpoint checked"
        );
        if row.is_open() {
            shared.open_count.fetch_add(1, Ordering::Relaxed);
        }
        {
            let mut rows = shared.rows.lock().await;
            rows[idx] = row;
        }
        shared.checked_count.fetch_add(1, Ordering::Relaxed);
    }

    let rows = shared.rows.lock().await.clone();
    let results = ScanResults {
        host: host.to_string(),
        started_at,
        finished_at: Some(now_rfc3339()),
        checked_count: shared.checked_count.load(Ordering::Relaxed),
        open_count: shared.open_count.load(Ordering::Relaxed),
        rows,
    };
    info!(
        host,
        checked = results.checked_count,
        open = results.open_count,
        "scan finished"
    );
    results
}
