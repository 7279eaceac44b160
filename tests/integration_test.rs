//! Integration tests for the presale relay loop
//!
//! Run with: cargo test --test integration_test -- --nocapture
//!
//! The default tests run the real scanner against an in-process fake log API
//! and a recording disperser. Tests marked `#[ignore]` need live endpoints:
//! - DEST_RPC_URL / DEST_CHAIN_ID for the destination chain
//! - LOG_API_KEY (and optionally LOG_API_URL) for the log API

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use presale_relayer::config::SourceConfig;
use presale_relayer::relay::{CycleOutcome, Relayer};
use presale_relayer::state::StateStore;
use presale_relayer::watchers::{EtherscanScanner, EventSource};
use presale_relayer::writers::{Disperser, PayoutFailure, RetryPolicy};
use tempfile::TempDir;

const PRESALE: &str = "0x1CA4a1029356540fb66f62403289bCB6804f352F";
const TOKEN: &str = "0xF5C0A842DCdd43b3A23e06EB6e49bAaE9B92b248";

mod helpers {
    use super::*;
    use axum::extract::{Query, State};
    use axum::routing::get;
    use axum::{Json, Router};

    /// A presale transfer as the log API would return it
    pub fn transfer_log(block: u64, tx: u8, recipient: Address, amount: u128) -> serde_json::Value {
        serde_json::json!({
            "address": TOKEN.to_lowercase(),
            "topics": [
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                format!("0x{:0>64}", PRESALE.to_lowercase().trim_start_matches("0x")),
                format!("0x{:0>64}", format!("{:x}", recipient)),
            ],
            "data": format!("0x{:064x}", amount),
            "blockNumber": format!("0x{:x}", block),
            "transactionHash": tx_hash(tx),
            "logIndex": "0x0"
        })
    }

    pub fn tx_hash(tx: u8) -> String {
        format!("0x{:064x}", tx)
    }

    /// Fake log API that honours `fromBlock` over a fixed set of logs.
    pub async fn fake_log_api(logs: Vec<serde_json::Value>) -> String {
        let app = Router::new()
            .route(
                "/api",
                get(
                    |State(logs): State<Arc<Vec<serde_json::Value>>>,
                     Query(params): Query<HashMap<String, String>>| async move {
                        let from: u64 = params["fromBlock"].parse().unwrap();
                        let matching: Vec<_> = logs
                            .iter()
                            .filter(|log| {
                                let raw = log["blockNumber"].as_str().unwrap();
                                u64::from_str_radix(&raw[2..], 16).unwrap() >= from
                            })
                            .cloned()
                            .collect();

                        if matching.is_empty() {
                            Json(serde_json::json!({
                                "status": "0", "message": "No records found", "result": []
                            }))
                        } else {
                            Json(serde_json::json!({
                                "status": "1", "message": "OK", "result": matching
                            }))
                        }
                    },
                ),
            )
            .with_state(Arc::new(logs));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    pub fn scanner(url: String) -> EtherscanScanner {
        EtherscanScanner::new(&SourceConfig {
            log_api_url: url,
            log_api_key: "test-key".to_string(),
            chain_id: 1,
            token_address: Address::from_str(TOKEN).unwrap(),
            presale_address: Address::from_str(PRESALE).unwrap(),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    /// Payout recorded by [`LedgerDisperser`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Payout {
        pub source_tx: String,
        pub destination: Address,
        pub amount: U256,
    }

    /// In-memory treasury that fails payouts for selected source txs
    #[derive(Clone, Default)]
    pub struct LedgerDisperser {
        pub payouts: Arc<Mutex<Vec<Payout>>>,
        pub failing: Arc<Mutex<HashSet<String>>>,
    }

    #[async_trait]
    impl Disperser for LedgerDisperser {
        async fn send(
            &self,
            destination: Address,
            amount: U256,
            source_tx_id: &str,
        ) -> Result<B256, PayoutFailure> {
            if self.failing.lock().unwrap().contains(source_tx_id) {
                return Err(PayoutFailure::InsufficientTreasury {
                    available: U256::ZERO,
                    required: amount,
                });
            }
            let mut payouts = self.payouts.lock().unwrap();
            payouts.push(Payout {
                source_tx: source_tx_id.to_string(),
                destination,
                amount,
            });
            Ok(B256::with_last_byte(payouts.len() as u8))
        }
    }

    /// Test configuration for live endpoints
    pub struct LiveConfig {
        pub dest_rpc_url: String,
        pub dest_chain_id: u64,
    }

    impl LiveConfig {
        pub fn from_env() -> Option<Self> {
            Some(LiveConfig {
                dest_rpc_url: std::env::var("DEST_RPC_URL").ok()?,
                dest_chain_id: std::env::var("DEST_CHAIN_ID").ok()?.parse().ok()?,
            })
        }
    }
}

use helpers::{fake_log_api, scanner, transfer_log, tx_hash, LedgerDisperser, Payout};

fn relayer(
    url: String,
    dir: &TempDir,
    disperser: LedgerDisperser,
) -> Relayer<EtherscanScanner, LedgerDisperser> {
    let store = StateStore::new(dir.path().join("bridge_state.json"), 100, 2000);
    let state = store.load();
    Relayer::new(
        scanner(url),
        disperser,
        store,
        state,
        RetryPolicy::default(),
    )
}

#[tokio::test]
async fn test_relays_decoded_transfers() {
    let alice = Address::repeat_byte(0xa1);
    let bob = Address::repeat_byte(0xb0);
    let url = fake_log_api(vec![
        transfer_log(101, 1, alice, 100_000_000_000_000_000_000),
        transfer_log(102, 2, bob, 5),
    ])
    .await;

    let dir = TempDir::new().unwrap();
    let disperser = LedgerDisperser::default();
    let mut relayer = relayer(url, &dir, disperser.clone());

    let outcome = relayer.run_cycle().await;
    assert_eq!(outcome, CycleOutcome::Completed { paid: 2, skipped: 0 });
    assert_eq!(
        *disperser.payouts.lock().unwrap(),
        vec![
            Payout {
                source_tx: tx_hash(1),
                destination: alice,
                amount: U256::from(100_000_000_000_000_000_000u128),
            },
            Payout {
                source_tx: tx_hash(2),
                destination: bob,
                amount: U256::from(5u64),
            },
        ]
    );

    let raw = std::fs::read_to_string(dir.path().join("bridge_state.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["last_block"], 102);
    assert_eq!(
        json["processed_txs"],
        serde_json::json!([tx_hash(1), tx_hash(2)])
    );

    // Nothing new: the next cycle scans from 103 and pays nothing
    let outcome = relayer.run_cycle().await;
    assert_eq!(outcome, CycleOutcome::Completed { paid: 0, skipped: 0 });
    assert_eq!(disperser.payouts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_restart_after_partial_batch_pays_each_tx_once() {
    let logs = vec![
        transfer_log(101, 1, Address::repeat_byte(1), 10),
        transfer_log(102, 2, Address::repeat_byte(2), 20),
        transfer_log(103, 3, Address::repeat_byte(3), 30),
    ];
    let url = fake_log_api(logs).await;
    let dir = TempDir::new().unwrap();

    let disperser = LedgerDisperser::default();
    disperser.failing.lock().unwrap().insert(tx_hash(2));
    {
        let mut first_run = relayer(url.clone(), &dir, disperser.clone());
        let outcome = first_run.run_cycle().await;
        assert_eq!(outcome, CycleOutcome::PayoutFailed { paid: 1, skipped: 0 });
        assert_eq!(first_run.state().cursor, 100);
    }

    // Treasury topped up, process restarted from the state file
    disperser.failing.lock().unwrap().clear();
    let mut second_run = relayer(url, &dir, disperser.clone());
    assert_eq!(second_run.state().cursor, 100);
    assert!(second_run.state().is_processed(&tx_hash(1)));

    let outcome = second_run.run_cycle().await;
    assert_eq!(outcome, CycleOutcome::Completed { paid: 2, skipped: 1 });
    assert_eq!(second_run.state().cursor, 103);

    let paid: Vec<String> = disperser
        .payouts
        .lock()
        .unwrap()
        .iter()
        .map(|p| p.source_tx.clone())
        .collect();
    assert_eq!(paid, vec![tx_hash(1), tx_hash(2), tx_hash(3)]);
}

#[tokio::test]
async fn test_forced_rescan_after_restart_skips_paid() {
    let url = fake_log_api(vec![
        transfer_log(101, 1, Address::repeat_byte(1), 10),
        transfer_log(150, 2, Address::repeat_byte(2), 20),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let disperser = LedgerDisperser::default();

    {
        let mut first_run = relayer(url.clone(), &dir, disperser.clone());
        first_run.run_cycle().await;
        assert_eq!(first_run.state().cursor, 150);
    }

    let mut rescan = relayer(url, &dir, disperser.clone());
    rescan.force_rescan(100);
    let outcome = rescan.run_cycle().await;

    assert_eq!(outcome, CycleOutcome::Completed { paid: 0, skipped: 2 });
    assert_eq!(rescan.state().cursor, 150);
    assert_eq!(disperser.payouts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_scanner_reports_no_records_as_empty() {
    let url = fake_log_api(Vec::new()).await;
    let events = scanner(url).fetch_events(1).await;
    tokio_test::assert_ok!(&events);
    assert!(events.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_log_api_keeps_state() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let disperser = LedgerDisperser::default();
    let mut relayer = relayer(format!("http://{}/api", addr), &dir, disperser.clone());

    let outcome = relayer.run_cycle().await;
    assert_eq!(outcome, CycleOutcome::ScanFailed);
    assert_eq!(relayer.state().cursor, 100);
    assert_eq!(relayer.consecutive_failures(), 1);
    assert!(!dir.path().join("bridge_state.json").exists());
}

/// Check the destination RPC answers and reports the configured chain id
#[tokio::test]
#[ignore]
async fn test_destination_rpc_connectivity() {
    use alloy::providers::{Provider, ProviderBuilder};

    let config = helpers::LiveConfig::from_env()
        .expect("Set DEST_RPC_URL and DEST_CHAIN_ID to run this test");

    let provider = ProviderBuilder::new().on_http(config.dest_rpc_url.parse().unwrap());
    let chain_id = provider.get_chain_id().await.unwrap();
    assert_eq!(chain_id, config.dest_chain_id);
}

/// Query the live log API for the presale filter from a recent block
#[tokio::test]
#[ignore]
async fn test_live_log_api_query() {
    let api_key = std::env::var("LOG_API_KEY").expect("Set LOG_API_KEY to run this test");
    let api_url = std::env::var("LOG_API_URL")
        .unwrap_or_else(|_| "https://api.etherscan.io/v2/api".to_string());

    let scanner = EtherscanScanner::new(&SourceConfig {
        log_api_url: api_url,
        log_api_key: api_key,
        chain_id: 1,
        token_address: Address::from_str(TOKEN).unwrap(),
        presale_address: Address::from_str(PRESALE).unwrap(),
        request_timeout_secs: 20,
    })
    .unwrap();

    let events = scanner.fetch_events(23_084_945).await.unwrap();
    println!("Fetched {} presale transfers", events.len());
    for pair in events.windows(2) {
        assert!(pair[0].block_height <= pair[1].block_height);
    }
}
