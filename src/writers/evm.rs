//! ERC-20 Disperser - pays rewards from the treasury on the destination chain
//!
//! Each payout is a single legacy `transfer(to, amount)` transaction signed by
//! the treasury key. Every transaction field is set explicitly (pending nonce,
//! fixed gas limit, current gas price, chain id), so the provider only needs
//! the wallet filler to sign.
//!
//! Pre-flight checks run before anything is signed:
//! 1. treasury reward-token balance >= amount
//! 2. treasury native balance >= configured gas floor
//!
//! `send` only returns `Ok` after a receipt with success status.

use std::time::Duration;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, info, warn};

use super::{Disperser, PayoutFailure};
use crate::config::DestinationConfig;
use crate::contracts::ERC20;
use crate::error::StartupError;

/// Upper bound on the startup chain-id check
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Treasury-backed ERC-20 payout submitter
pub struct Erc20Disperser {
    rpc_url: Url,
    chain_id: u64,
    token: Address,
    signer: PrivateKeySigner,
    gas_limit: u64,
    min_gas_balance: U256,
    receipt_timeout: Duration,
}

impl Erc20Disperser {
    /// Build a disperser without touching the network
    pub fn new(config: &DestinationConfig) -> Result<Self, StartupError> {
        let signer: PrivateKeySigner =
            config
                .treasury_private_key
                .parse()
                .map_err(|_| StartupError::InvalidVar {
                    name: "TREASURY_PRIVATE_KEY",
                    reason: "not a valid secp256k1 private key".to_string(),
                })?;

        let rpc_url = config
            .rpc_url
            .parse::<Url>()
            .map_err(|e| StartupError::InvalidVar {
                name: "DEST_RPC_URL",
                reason: e.to_string(),
            })?;

        Ok(Self {
            rpc_url,
            chain_id: config.chain_id,
            token: config.token_address,
            signer,
            gas_limit: config.gas_limit,
            min_gas_balance: config.min_gas_balance_wei,
            receipt_timeout: config.receipt_timeout(),
        })
    }

    /// Build a disperser and verify the RPC serves the configured chain.
    pub async fn connect(config: &DestinationConfig) -> Result<Self, StartupError> {
        let disperser = Self::new(config)?;
        disperser.verify_chain().await?;

        info!(
            treasury = %disperser.treasury_address(),
            chain_id = disperser.chain_id,
            token = %disperser.token,
            "Disperser connected"
        );
        Ok(disperser)
    }

    /// Fail unless the RPC answers and reports the configured chain id.
    pub async fn verify_chain(&self) -> Result<(), StartupError> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());

        let actual = tokio::time::timeout(CONNECT_TIMEOUT, provider.get_chain_id())
            .await
            .map_err(|_| StartupError::RpcUnreachable {
                url: self.rpc_url.to_string(),
                reason: format!("no answer within {}s", CONNECT_TIMEOUT.as_secs()),
            })?
            .map_err(|e| StartupError::RpcUnreachable {
                url: self.rpc_url.to_string(),
                reason: e.to_string(),
            })?;

        if actual != self.chain_id {
            return Err(StartupError::ChainIdMismatch {
                expected: self.chain_id,
                actual,
            });
        }
        Ok(())
    }

    pub fn treasury_address(&self) -> Address {
        self.signer.address()
    }

    /// Current (reward token, native) balances of the treasury
    pub async fn treasury_balances(&self) -> Result<(U256, U256), PayoutFailure> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let treasury = self.treasury_address();

        let tokens = ERC20::new(self.token, &provider)
            .balanceOf(treasury)
            .call()
            .await
            .map_err(|e| PayoutFailure::Rpc(format!("balanceOf failed: {}", e)))?
            ._0;

        let native = provider
            .get_balance(treasury)
            .await
            .map_err(|e| PayoutFailure::Rpc(format!("eth_getBalance failed: {}", e)))?;

        Ok((tokens, native))
    }

    /// Check the treasury can cover both the transfer and its gas.
    async fn preflight(&self, amount: U256) -> Result<(), PayoutFailure> {
        let (tokens, native) = self.treasury_balances().await?;

        if tokens < amount {
            return Err(PayoutFailure::InsufficientTreasury {
                available: tokens,
                required: amount,
            });
        }
        if native < self.min_gas_balance {
            return Err(PayoutFailure::InsufficientGas {
                available: native,
                floor: self.min_gas_balance,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Disperser for Erc20Disperser {
    async fn send(
        &self,
        destination: Address,
        amount: U256,
        source_tx_id: &str,
    ) -> Result<B256, PayoutFailure> {
        self.preflight(amount).await?;

        let treasury = self.treasury_address();
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .on_http(self.rpc_url.clone());

        let nonce = provider
            .get_transaction_count(treasury)
            .pending()
            .await
            .map_err(|e| PayoutFailure::Rpc(format!("failed to read pending nonce: {}", e)))?;
        let gas_price = provider
            .get_gas_price()
            .await
            .map_err(|e| PayoutFailure::Rpc(format!("eth_gasPrice failed: {}", e)))?;

        let input = ERC20::transferCall {
            to: destination,
            amount,
        }
        .abi_encode();

        let tx = TransactionRequest::default()
            .with_from(treasury)
            .with_to(self.token)
            .with_input(input)
            .with_nonce(nonce)
            .with_gas_limit(self.gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        debug!(
            source_tx = source_tx_id,
            to = %destination,
            amount = %amount,
            nonce,
            gas_price = %gas_price,
            "Submitting payout"
        );

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| PayoutFailure::Submission(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        info!(
            source_tx = source_tx_id,
            dest_tx = %tx_hash,
            "Payout broadcast, waiting for receipt"
        );

        let receipt = match tokio::time::timeout(self.receipt_timeout, pending.get_receipt()).await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                return Err(PayoutFailure::ReceiptUnavailable {
                    tx_hash,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    source_tx = source_tx_id,
                    dest_tx = %tx_hash,
                    timeout_secs = self.receipt_timeout.as_secs(),
                    "Gave up waiting for payout receipt; the transfer may still land"
                );
                return Err(PayoutFailure::ReceiptUnavailable {
                    tx_hash,
                    reason: format!("timed out after {}s", self.receipt_timeout.as_secs()),
                });
            }
        };

        if !receipt.status() {
            return Err(PayoutFailure::Reverted { tx_hash });
        }

        info!(
            source_tx = source_tx_id,
            dest_tx = %tx_hash,
            to = %destination,
            amount = %amount,
            block = ?receipt.block_number,
            "Payout confirmed"
        );
        Ok(tx_hash)
    }
}
