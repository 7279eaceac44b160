//! Source-chain event scanning

use async_trait::async_trait;
use thiserror::Error;

use crate::events::{DecodeError, SourceEvent};

pub mod etherscan;

pub use etherscan::EtherscanScanner;

/// Upstream caps a single `getLogs` response at this many records.
pub const LOG_PAGE_LIMIT: usize = 1000;

/// Failure to obtain a complete, decoded batch of events.
///
/// The relay loop leaves its state untouched on every variant and scans again
/// after the poll interval. `Decode` and `PageSaturated` repeat until the
/// upstream data or the scan window changes.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("log API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("log API returned an error: {message} ({detail})")]
    Upstream { message: String, detail: String },

    #[error("malformed log in transaction {tx_hash}: {source}")]
    Decode {
        tx_hash: String,
        #[source]
        source: DecodeError,
    },

    #[error("log page filled by {count} records from block {block} alone; the rest of the block is unreachable")]
    PageSaturated { block: u64, count: usize },
}

/// Source of presale transfer events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch all matching events mined at or after `from_block`, ascending by
    /// block height (upstream order within a block).
    async fn fetch_events(&self, from_block: u64) -> Result<Vec<SourceEvent>, ScanError>;
}

/// Drop the trailing block of a response that hit the page limit.
///
/// A full page may end partway through its last block. Keeping those events
/// would let the cursor move past the block while some of its transfers were
/// never returned. The dropped block is rescanned next cycle. A full page from
/// one block cannot be split that way and fails with `PageSaturated`.
pub fn trim_partial_block(
    mut events: Vec<SourceEvent>,
    page_limit: usize,
) -> Result<Vec<SourceEvent>, ScanError> {
    if events.len() < page_limit {
        return Ok(events);
    }

    let (first, last) = match (events.first(), events.last()) {
        (Some(first), Some(last)) => (first.block_height, last.block_height),
        _ => return Ok(events),
    };

    if first == last {
        return Err(ScanError::PageSaturated {
            block: last,
            count: events.len(),
        });
    }

    events.retain(|e| e.block_height < last);
    tracing::debug!(
        dropped_block = last,
        kept = events.len(),
        "Log page full, deferring trailing block to next scan"
    );
    Ok(events)
}
