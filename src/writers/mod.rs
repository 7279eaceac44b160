//! Destination-chain payout submission

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use thiserror::Error;

pub mod evm;
pub mod retry;

pub use evm::Erc20Disperser;
pub use retry::RetryPolicy;

/// Why a payout did not complete.
///
/// The relay loop treats every variant the same way (retry next cycle); the
/// distinction exists for logs, metrics and the operator.
#[derive(Debug, Error)]
pub enum PayoutFailure {
    #[error("treasury holds {available} reward tokens, payout needs {required}")]
    InsufficientTreasury { available: U256, required: U256 },

    #[error("treasury native balance {available} is below the gas floor {floor}")]
    InsufficientGas { available: U256, floor: U256 },

    #[error("destination RPC request failed: {0}")]
    Rpc(String),

    #[error("failed to sign or submit payout: {0}")]
    Submission(String),

    #[error("no receipt for payout {tx_hash}: {reason}")]
    ReceiptUnavailable { tx_hash: B256, reason: String },

    #[error("payout transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },
}

impl PayoutFailure {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PayoutFailure::InsufficientTreasury { .. } => "insufficient_treasury",
            PayoutFailure::InsufficientGas { .. } => "insufficient_gas",
            PayoutFailure::Rpc(_) => "rpc",
            PayoutFailure::Submission(_) => "submission",
            PayoutFailure::ReceiptUnavailable { .. } => "receipt_unavailable",
            PayoutFailure::Reverted { .. } => "reverted",
        }
    }

    /// True when the transfer may have landed even though the payout is
    /// reported as failed; a retry could then pay twice.
    pub fn may_have_landed(&self) -> bool {
        matches!(self, PayoutFailure::ReceiptUnavailable { .. })
    }
}

/// Pays out rewards on the destination chain.
///
/// Implementations must not return before the payout is either confirmed by
/// a receipt or known to have failed; the relay loop relies on one payout
/// being fully settled before the next nonce is read.
#[async_trait]
pub trait Disperser: Send + Sync {
    /// Transfer `amount` to `destination`, returning the destination tx hash.
    async fn send(
        &self,
        destination: Address,
        amount: U256,
        source_tx_id: &str,
    ) -> Result<B256, PayoutFailure>;
}
