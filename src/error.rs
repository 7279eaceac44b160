//! Error kinds that decide whether the process keeps running.
//!
//! Everything that can go wrong inside a poll cycle is retryable and is
//! handled by the relay loop (see `ScanError` and `PayoutFailure`). The errors
//! here are fatal: they are only raised before the loop starts and make the
//! process exit non-zero.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),

    #[error("{name} is invalid: {reason}")]
    InvalidVar { name: &'static str, reason: String },

    #[error("destination RPC {url} is unreachable: {reason}")]
    RpcUnreachable { url: String, reason: String },

    #[error("destination RPC reports chain id {actual}, configured {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },
}
