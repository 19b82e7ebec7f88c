use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::error::ValidationError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Parameters of one scan invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub host: String,
    pub start_port: u32,
    pub end_port: u32,
    pub timeout: Duration,
    pub concurrency: usize,
}

impl ScanRequest {
    pub fn new(host: impl Into<String>, start_port: u32, end_port: u32) -> Self {
        Self {
            host: host.into(),
            start_port,
            end_port,
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Check the request invariants and return the port range to scan.
    ///
    /// Port bounds are checked first, in the order start, end, ordering.
    pub fn validate(&self) -> Result<RangeInclusive<u16>, ValidationError> {
        if self.start_port < 1 || self.start_port > u16::MAX as u32 {
            return Err(ValidationError::StartPortOutOfRange(self.start_port));
        }
        if self.end_port < 1 || self.end_port > u16::MAX as u32 {
            return Err(ValidationError::EndPortOutOfRange(self.end_port));
        }
        if self.start_port > self.end_port {
            return Err(ValidationError::InvertedRange {
                start: self.start_port,
                end: self.end_port,
            });
        }
        if self.concurrency == 0 {
            return Err(ValidationError::ZeroConcurrency);
        }
        if self.timeout.is_zero() {
            return Err(ValidationError::ZeroTimeout);
        }
        Ok(self.start_port as u16..=self.end_port as u16)
    }
}

/// Outcome of a single connection attempt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Open,
    /// Connection refused.
    Closed,
    TimedOut,
    /// Resolution failure, unreachable host and other socket errors.
    Error(String),
}

impl ProbeOutcome {
    pub fn is_open(&self) -> bool {
        matches!(self, ProbeOutcome::Open)
    }
}

/// One probed port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub port: u16,
    pub outcome: ProbeOutcome,
}

/// Aggregate of a finished (or cancelled) scan.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub host: String,
    pub open_ports: BTreeSet<u16>,
    pub scanned: u64,
    pub closed: u64,
    pub timed_out: u64,
    pub errored: u64,
    pub cancelled: bool,
    pub started_at: String,
    pub elapsed_ms: u64,
}

impl ScanResult {
    pub(crate) fn record(&mut self, result: &ProbeResult) {
        self.scanned += 1;
        match &result.outcome {
            ProbeOutcome::Open => {
                self.open_ports.insert(result.port);
            }
            ProbeOutcome::Closed => self.closed += 1,
            ProbeOutcome::TimedOut => self.timed_out += 1,
            ProbeOutcome::Error(_) => self.errored += 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.open_ports.is_empty()
    }
}
