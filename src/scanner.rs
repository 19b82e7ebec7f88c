use crate::error::ValidationError;
use crate::probe::{Prober, TcpProber};
use crate::types::{ProbeOutcome, ProbeResult, ScanRequest, ScanResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ::time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Scan `request.host` over the requested port range using TCP connects.
///
/// - Validates the request first; an invalid request opens no sockets.
/// - Limits in-flight connects to `request.concurrency` using a `Semaphore`.
/// - Every port is probed exactly once; errors and timeouts count as not open.
pub async fn scan(request: &ScanRequest) -> Result<ScanResult, ValidationError> {
    scan_internal(request, Arc::new(TcpProber), None, None).await
}

/// Variant that probes through the given `Prober`.
pub async fn scan_with<P>(request: &ScanRequest, prober: Arc<P>) -> Result<ScanResult, ValidationError>
where
    P: Prober + ?Sized,
{
    scan_internal(request, prober, None, None).await
}

/// Like [`scan_with`], but stops dispatching ports once `cancel` fires.
///
/// Once cancelled no further ports are dispatched; probes already in flight
/// run to completion and the partial result is returned with `cancelled` set.
pub async fn scan_with_cancel<P>(
    request: &ScanRequest,
    prober: Arc<P>,
    cancel: CancellationToken,
) -> Result<ScanResult, ValidationError>
where
    P: Prober + ?Sized,
{
    scan_internal(request, prober, Some(cancel), None).await
}

/// Live counters of a running scan. Clones share the same counters.
#[derive(Clone, Debug)]
pub struct SharedProgress {
    scanned: Arc<AtomicU64>,
    open: Arc<AtomicU64>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self {
            scanned: Arc::new(AtomicU64::new(0)),
            open: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Ports whose probe has completed so far.
    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::Relaxed)
    }

    pub fn open(&self) -> u64 {
        self.open.load(Ordering::Relaxed)
    }

    fn tick(&self, open: bool) {
        if open {
            self.open.fetch_add(1, Ordering::Relaxed);
        }
        self.scanned.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for SharedProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Like [`scan_with_cancel`], also updating `shared` as each probe completes.
pub async fn scan_with_progress<P>(
    request: &ScanRequest,
    prober: Arc<P>,
    cancel: CancellationToken,
    shared: SharedProgress,
) -> Result<ScanResult, ValidationError>
where
    P: Prober + ?Sized,
{
    scan_internal(request, prober, Some(cancel), Some(shared)).await
}

async fn scan_internal<P>(
    request: &ScanRequest,
    prober: Arc<P>,
    cancel_opt: Option<CancellationToken>,
    shared_opt: Option<SharedProgress>,
) -> Result<ScanResult, ValidationError>
where
    P: Prober + ?Sized,
{
    let ports = request.validate()?;
    let port_count = usize::from(*ports.end() - *ports.start()) + 1;
    let progress = shared_opt.unwrap_or_default();
    let cancel = cancel_opt.unwrap_or_default();
    let host: Arc<str> = Arc::from(request.host.as_str());
    let timeout = request.timeout;

    info!(
        host = %request.host,
        start = ports.start(),
        end = ports.end(),
        concurrency = request.concurrency,
        timeout_ms = timeout.as_millis() as u64,
        "starting scan"
    );

    let mut result = ScanResult {
        host: request.host.clone(),
        started_at: rfc3339_now(),
        ..ScanResult::default()
    };
    let start = Instant::now();

    // More permits than ports would never be used.
    let sem = Arc::new(Semaphore::new(request.concurrency.min(port_count)));
    let mut set = JoinSet::new();

    for port in ports {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                result.cancelled = true;
                break;
            }
            permit = sem.clone().acquire_owned() => permit.expect("semaphore is never closed"),
        };
        let prober = prober.clone();
        let host = host.clone();
        let progress = progress.clone();

        set.spawn(async move {
            let _permit = permit; // keep permit until the probe completes

            let outcome = prober.probe(&host, port, timeout).await;
            progress.tick(outcome.is_open());
            ProbeResult { port, outcome }
        });

        while let Some(joined) = set.try_join_next() {
            collect(&mut result, joined);
        }
    }

    while let Some(joined) = set.join_next().await {
        collect(&mut result, joined);
    }

    result.elapsed_ms = start.elapsed().as_millis() as u64;
    if result.cancelled {
        warn!(
            scanned = result.scanned,
            total = port_count,
            "scan cancelled before all ports were dispatched"
        );
    }
    info!(
        host = %result.host,
        scanned = result.scanned,
        open = result.open_ports.len(),
        closed = result.closed,
        timed_out = result.timed_out,
        errored = result.errored,
        elapsed_ms = result.elapsed_ms,
        "scan finished"
    );
    Ok(result)
}

/// Fold one finished task into the aggregate. A panicked probe counts as errored.
fn collect(result: &mut ScanResult, joined: Result<ProbeResult, JoinError>) {
    match joined {
        Ok(probe) => {
            match &probe.outcome {
                ProbeOutcome::Open => debug!(port = probe.port, "open"),
                ProbeOutcome::Error(reason) => debug!(port = probe.port, %reason, "probe error"),
                _ => {}
            }
            result.record(&probe);
        }
        Err(e) => {
            warn!("probe task failed: {e}");
            result.scanned += 1;
            result.errored += 1;
        }
    }
}

/// Wall-clock start of the scan. Only years outside 0..=9999 fail to format.
fn rfc3339_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed(&'static [u16]);

    #[async_trait]
    impl Prober for Fixed {
        async fn probe(&self, _host: &str, port: u16, _timeout: Duration) -> ProbeOutcome {
            if self.0.contains(&port) {
                ProbeOutcome::Open
            } else {
                ProbeOutcome::Closed
            }
        }
    }

    struct Panicky;

    #[async_trait]
    impl Prober for Panicky {
        async fn probe(&self, _host: &str, port: u16, _timeout: Duration) -> ProbeOutcome {
            if port == 5 {
                panic!("boom");
            }
            if port == 7 {
                ProbeOutcome::Open
            } else {
                ProbeOutcome::TimedOut
            }
        }
    }

    #[tokio::test]
    async fn single_port_range() {
        let req = ScanRequest::new("host", 80, 80);
        let res = scan_with(&req, Arc::new(Fixed(&[80]))).await.unwrap();
        assert_eq!(res.scanned, 1);
        assert_eq!(res.open_ports.into_iter().collect::<Vec<_>>(), vec![80]);
        assert!(!res.cancelled);
    }

    #[tokio::test]
    async fn panicked_task_does_not_affect_others() {
        let req = ScanRequest::new("host", 1, 10).with_concurrency(3);
        let res = scan_with(&req, Arc::new(Panicky)).await.unwrap();
        assert_eq!(res.scanned, 10);
        assert_eq!(res.errored, 1);
        assert_eq!(res.timed_out, 8);
        assert_eq!(res.open_ports.into_iter().collect::<Vec<_>>(), vec![7]);
    }

    #[tokio::test]
    async fn progress_counters_match_result() {
        let req = ScanRequest::new("host", 1, 100);
        let shared = SharedProgress::new();
        let res = scan_with_progress(
            &req,
            Arc::new(Fixed(&[22, 80])),
            CancellationToken::new(),
            shared.clone(),
        )
        .await
        .unwrap();
        assert_eq!(shared.scanned(), 100);
        assert_eq!(shared.open(), 2);
        assert_eq!(res.scanned, 100);
        assert_eq!(res.closed, 98);
    }

    #[tokio::test]
    async fn cancelled_before_start_dispatches_nothing() {
        let req = ScanRequest::new("host", 1, 100);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = scan_with_cancel(&req, Arc::new(Fixed(&[1])), cancel)
            .await
            .unwrap();
        assert!(res.cancelled);
        assert_eq!(res.scanned, 0);
        assert!(res.is_empty());
    }
}
