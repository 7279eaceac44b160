//! Etherscan-compatible `getLogs` scanner
//!
//! Queries presale `Transfer` events through the Etherscan v2 multi-chain API:
//!
//! `GET ?module=logs&action=getLogs&fromBlock=N&toBlock=latest&address=<token>
//!  &topic0=<Transfer>&topic1=<presale>&apikey=..&chainid=..`
//!
//! The response is `{status, message, result}`; `status == "1"` carries an
//! array of logs, `status == "0"` with "No records found" is an empty result,
//! anything else is an upstream error.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{trim_partial_block, EventSource, ScanError, LOG_PAGE_LIMIT};
use crate::config::SourceConfig;
use crate::events::{address_topic, decode_log, transfer_event_signature, RawLog, SourceEvent};

const NO_RECORDS_MESSAGE: &str = "No records found";

#[derive(Debug, Deserialize)]
struct LogApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

/// Event scanner backed by the Etherscan log API
pub struct EtherscanScanner {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    chain_id: u64,
    token_address: Address,
    transfer_topic: B256,
    presale_topic: B256,
    page_limit: usize,
}

impl EtherscanScanner {
    /// Create a new scanner
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .wrap_err("Failed to build log API HTTP client")?;

        Ok(Self {
            client,
            api_url: config.log_api_url.clone(),
            api_key: config.log_api_key.clone(),
            chain_id: config.chain_id,
            token_address: config.token_address,
            transfer_topic: transfer_event_signature(),
            presale_topic: address_topic(config.presale_address),
            page_limit: LOG_PAGE_LIMIT,
        })
    }

    fn query_params(&self, from_block: u64) -> Vec<(&'static str, String)> {
        vec![
            ("module", "logs".to_string()),
            ("action", "getLogs".to_string()),
            ("fromBlock", from_block.to_string()),
            ("toBlock", "latest".to_string()),
            ("address", format!("0x{:x}", self.token_address)),
            ("topic0", format!("0x{:x}", self.transfer_topic)),
            ("topic1", format!("0x{:x}", self.presale_topic)),
            ("apikey", self.api_key.clone()),
            ("chainid", self.chain_id.to_string()),
        ]
    }

    /// Turn an API response into decoded, ordered events.
    fn parse_response(&self, response: LogApiResponse) -> Result<Vec<SourceEvent>, ScanError> {
        if response.status != "1" {
            if response.message == NO_RECORDS_MESSAGE {
                return Ok(Vec::new());
            }
            let detail = match &response.result {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => "no details".to_string(),
                other => other.to_string(),
            };
            return Err(ScanError::Upstream {
                message: response.message,
                detail,
            });
        }

        let logs: Vec<RawLog> =
            serde_json::from_value(response.result).map_err(|e| ScanError::Upstream {
                message: "unexpected result shape".to_string(),
                detail: e.to_string(),
            })?;
        let count = logs.len();

        let mut events = logs
            .iter()
            .map(|log| {
                decode_log(log).map_err(|source| ScanError::Decode {
                    tx_hash: log.transaction_hash.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Stable: keeps upstream order within a block
        events.sort_by_key(|e| e.block_height);

        let events = trim_partial_block(events, self.page_limit)?;
        if events.len() < count {
            warn!(
                returned = count,
                kept = events.len(),
                "Log API page limit reached"
            );
        }
        Ok(events)
    }
}

#[async_trait]
impl EventSource for EtherscanScanner {
    async fn fetch_events(&self, from_block: u64) -> Result<Vec<SourceEvent>, ScanError> {
        debug!(from_block, token = %self.token_address, "Querying source logs");

        let response: LogApiResponse = self
            .client
            .get(&self.api_url)
            .query(&self.query_params(from_block))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        self.parse_response(response)
    }
}
