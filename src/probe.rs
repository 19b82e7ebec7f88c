use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;

use crate::types::ProbeOutcome;

/// A single point-in-time reachability check of `host:port`.
///
/// Implementations must never fail: every error is folded into the returned
/// `ProbeOutcome`.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome;
}

/// Full TCP connect against the OS stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
        // Resolution happens inside `connect`, so the timeout bounds it too.
        match time::timeout(timeout, TcpStream::connect((host, port))).await {
            // The stream is dropped here, releasing the socket immediately.
            Ok(Ok(_stream)) => ProbeOutcome::Open,
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => ProbeOutcome::Closed,
            Ok(Err(e)) => ProbeOutcome::Error(e.to_string()),
            Err(_elapsed) => ProbeOutcome::TimedOut,
        }
    }
}

/// Returns `true` if a TCP connection to `host:port` is accepted within `timeout`.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
    TcpProber.probe(host, port, timeout).await.is_open()
}
