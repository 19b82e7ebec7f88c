//! Library crate for port-scan-rs: a bounded-concurrency TCP connect scanner.
pub mod error;
pub mod probe;
pub mod scanner;
pub mod types;
