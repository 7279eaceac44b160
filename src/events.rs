//! Source-chain event types and log decoding
//!
//! The log-query API returns untyped JSON log objects. `decode_log` turns each
//! one into a [`SourceEvent`] or fails with a [`DecodeError`]; fields are never
//! dropped or defaulted silently.

use alloy::primitives::{keccak256, Address, B256, U256};
use serde::Deserialize;
use thiserror::Error;

/// `keccak256("Transfer(address,address,uint256)")`
pub fn transfer_event_signature() -> B256 {
    keccak256(b"Transfer(address,address,uint256)")
}

/// Left-pad an address into a 32-byte topic, as indexed event arguments are stored.
pub fn address_topic(address: Address) -> B256 {
    address.into_word()
}

/// A presale transfer observed on the source chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    /// Height at which the transfer was mined
    pub block_height: u64,
    /// Source transaction hash, lower-cased; the dedup key
    pub tx_id: String,
    /// Recipient of the payout on the destination chain
    pub destination: Address,
    /// Amount in the token's smallest unit
    pub amount: U256,
}

/// Raw log object as returned by the log-query API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub block_number: String,
    pub transaction_hash: String,
    pub topics: Vec<String>,
    pub data: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid block number: {0:?}")]
    InvalidBlockNumber(String),

    #[error("missing transaction hash")]
    MissingTxHash,

    #[error("missing topic at index {index} ({found} topics present)")]
    MissingTopic { index: usize, found: usize },

    #[error("topic {index} is not a 32-byte hex word: {value:?}")]
    InvalidTopic { index: usize, value: String },

    #[error("invalid data field: {0:?}")]
    InvalidData(String),

    #[error("amount does not fit in 256 bits ({len} bytes)")]
    AmountOverflow { len: usize },
}

/// Decode a `Transfer(from, to, value)` log into a [`SourceEvent`].
///
/// Layout:
/// - `topics[0]` = event signature (filtered upstream)
/// - `topics[1]` = from (filtered upstream)
/// - `topics[2]` = to, left-padded to 32 bytes
/// - `data` = value, big-endian
pub fn decode_log(log: &RawLog) -> Result<SourceEvent, DecodeError> {
    let block_height = parse_hex_u64(&log.block_number)
        .ok_or_else(|| DecodeError::InvalidBlockNumber(log.block_number.clone()))?;

    let tx_id = log.transaction_hash.trim().to_lowercase();
    if tx_id.is_empty() || tx_id == "0x" {
        return Err(DecodeError::MissingTxHash);
    }

    let recipient_topic = log.topics.get(2).ok_or(DecodeError::MissingTopic {
        index: 2,
        found: log.topics.len(),
    })?;
    let word = decode_hex(recipient_topic)
        .filter(|bytes| bytes.len() == 32)
        .ok_or_else(|| DecodeError::InvalidTopic {
            index: 2,
            value: recipient_topic.clone(),
        })?;
    let destination = Address::from_slice(&word[12..32]);

    let data = decode_hex(&log.data)
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| DecodeError::InvalidData(log.data.clone()))?;
    let amount = U256::try_from_be_slice(&data)
        .ok_or(DecodeError::AmountOverflow { len: data.len() })?;

    Ok(SourceEvent {
        block_height,
        tx_id,
        destination,
        amount,
    })
}

fn parse_hex_u64(value: &str) -> Option<u64> {
    let digits = value.trim().strip_prefix("0x")?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    let digits = value.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    if digits.len() % 2 == 1 {
        hex::decode(format!("0{}", digits)).ok()
    } else {
        hex::decode(digits).ok()
    }
}
