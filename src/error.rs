use thiserror::Error;

/// Reasons a `ScanRequest` is rejected before any socket is opened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("start port `{0}` is out of range (1-65535)")]
    StartPortOutOfRange(u32),
    #[error("end port `{0}` is out of range (1-65535)")]
    EndPortOutOfRange(u32),
    #[error("start port `{start}` is greater than end port `{end}`")]
    InvertedRange { start: u32, end: u32 },
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}
