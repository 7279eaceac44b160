//! Relayer configuration
//!
//! Read once from the environment (after loading `.env` if present) into an
//! immutable [`Config`] that is passed by reference to every component.

use alloy::primitives::{Address, U256};
use eyre::Result;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::bounded_cache::DEFAULT_PROCESSED_CAPACITY;
use crate::error::StartupError;

/// Main configuration for the relayer
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub relay: RelayConfig,
    /// Port for the health/metrics/status server. `0` disables it.
    pub api_port: u16,
}

/// Source chain (log-query API) configuration
#[derive(Clone)]
pub struct SourceConfig {
    pub log_api_url: String,
    pub log_api_key: String,
    /// Chain id passed to the multi-chain log API (1 = Ethereum mainnet)
    pub chain_id: u64,
    /// Presale token whose `Transfer` events are watched
    pub token_address: Address,
    /// Presale contract; only transfers *from* it are relayed
    pub presale_address: Address,
    pub request_timeout_secs: u64,
}

/// Custom Debug that redacts the API key.
impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("log_api_url", &self.log_api_url)
            .field("log_api_key", &"<redacted>")
            .field("chain_id", &self.chain_id)
            .field("token_address", &self.token_address)
            .field("presale_address", &self.presale_address)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Destination chain (payout) configuration
#[derive(Clone)]
pub struct DestinationConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Reward token paid out from the treasury
    pub token_address: Address,
    pub treasury_private_key: String,
    pub gas_limit: u64,
    /// Native balance the treasury must hold before a payout is attempted
    pub min_gas_balance_wei: U256,
    pub receipt_timeout_secs: u64,
}

/// Custom Debug that redacts the treasury key to prevent accidental log leakage.
impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("token_address", &self.token_address)
            .field("treasury_private_key", &"<redacted>")
            .field("gas_limit", &self.gas_limit)
            .field("min_gas_balance_wei", &self.min_gas_balance_wei)
            .field("receipt_timeout_secs", &self.receipt_timeout_secs)
            .finish()
    }
}

impl DestinationConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

/// Reconciliation loop configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval_secs: u64,
    pub max_backoff_secs: u64,
    /// 1.0 keeps a fixed poll interval after failures
    pub backoff_multiplier: f64,
    /// Rewind the cursor to `start_block` at startup, keeping the dedup set
    pub force_rescan: bool,
    pub start_block: u64,
    pub state_file: PathBuf,
    pub processed_capacity: usize,
}

/// Default functions
fn default_log_api_url() -> String {
    "https://api.etherscan.io/v2/api".to_string()
}

fn default_source_chain_id() -> u64 {
    1
}

fn default_request_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    30
}

fn default_max_backoff() -> u64 {
    300
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_state_file() -> PathBuf {
    PathBuf::from("bridge_state.json")
}

fn default_gas_limit() -> u64 {
    200_000
}

/// 0.001 ether
fn default_min_gas_balance() -> U256 {
    U256::from(1_000_000_000_000_000u64)
}

fn default_receipt_timeout() -> u64 {
    300
}

fn default_api_port() -> u16 {
    9090
}

impl Config {
    /// Load configuration from environment variables
    /// Loads .env file if present, then reads from environment
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }
        Ok(Self::from_env()?)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> std::result::Result<Self, StartupError> {
        let source = SourceConfig {
            log_api_url: env::var("LOG_API_URL").unwrap_or_else(|_| default_log_api_url()),
            log_api_key: required("LOG_API_KEY")?,
            chain_id: optional("SOURCE_CHAIN_ID")?.unwrap_or(default_source_chain_id()),
            token_address: parse_address("SOURCE_TOKEN_ADDRESS")?,
            presale_address: parse_address("SOURCE_PRESALE_ADDRESS")?,
            request_timeout_secs: optional("LOG_API_TIMEOUT_SECS")?
                .unwrap_or(default_request_timeout()),
        };

        let destination = DestinationConfig {
            rpc_url: required("DEST_RPC_URL")?,
            chain_id: optional("DEST_CHAIN_ID")?
                .ok_or(StartupError::MissingVar("DEST_CHAIN_ID"))?,
            token_address: parse_address("DEST_TOKEN_ADDRESS")?,
            treasury_private_key: required("TREASURY_PRIVATE_KEY")?,
            gas_limit: optional("GAS_LIMIT")?.unwrap_or(default_gas_limit()),
            min_gas_balance_wei: optional("MIN_GAS_BALANCE_WEI")?
                .unwrap_or(default_min_gas_balance()),
            receipt_timeout_secs: optional("RECEIPT_TIMEOUT_SECS")?
                .unwrap_or(default_receipt_timeout()),
        };

        let relay = RelayConfig {
            poll_interval_secs: optional("POLL_INTERVAL_SECS")?
                .unwrap_or(default_poll_interval()),
            max_backoff_secs: optional("MAX_BACKOFF_SECS")?.unwrap_or(default_max_backoff()),
            backoff_multiplier: optional("BACKOFF_MULTIPLIER")?
                .unwrap_or(default_backoff_multiplier()),
            force_rescan: optional("FORCE_RESCAN")?.unwrap_or(false),
            start_block: optional("START_BLOCK")?.unwrap_or(0),
            state_file: env::var("STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_state_file()),
            processed_capacity: optional("PROCESSED_CAPACITY")?
                .unwrap_or(DEFAULT_PROCESSED_CAPACITY),
        };

        let config = Config {
            source,
            destination,
            relay,
            api_port: optional("API_PORT")?.unwrap_or(default_api_port()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), StartupError> {
        if self.source.log_api_url.is_empty() {
            return Err(invalid("LOG_API_URL", "cannot be empty"));
        }

        if self.source.log_api_key.is_empty() {
            return Err(invalid("LOG_API_KEY", "cannot be empty"));
        }

        if self.destination.rpc_url.is_empty() {
            return Err(invalid("DEST_RPC_URL", "cannot be empty"));
        }

        let key = &self.destination.treasury_private_key;
        let key_hex = key.strip_prefix("0x").unwrap_or(key);
        if key_hex.len() != 64 || !key_hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid(
                "TREASURY_PRIVATE_KEY",
                "must be 64 hex chars (optionally 0x-prefixed)",
            ));
        }

        if self.destination.gas_limit == 0 {
            return Err(invalid("GAS_LIMIT", "must be greater than zero"));
        }

        if self.relay.poll_interval_secs == 0 {
            return Err(invalid("POLL_INTERVAL_SECS", "must be greater than zero"));
        }

        if self.relay.max_backoff_secs < self.relay.poll_interval_secs {
            return Err(invalid(
                "MAX_BACKOFF_SECS",
                "must not be smaller than POLL_INTERVAL_SECS",
            ));
        }

        if self.relay.backoff_multiplier.is_nan() || self.relay.backoff_multiplier < 1.0 {
            return Err(invalid("BACKOFF_MULTIPLIER", "must be >= 1.0"));
        }

        if self.relay.processed_capacity == 0 {
            return Err(invalid("PROCESSED_CAPACITY", "must be greater than zero"));
        }

        Ok(())
    }
}

fn required(name: &'static str) -> std::result::Result<String, StartupError> {
    env::var(name).map_err(|_| StartupError::MissingVar(name))
}

fn optional<T>(name: &'static str) -> std::result::Result<Option<T>, StartupError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(name, e.to_string())),
        _ => Ok(None),
    }
}

fn parse_address(name: &'static str) -> std::result::Result<Address, StartupError> {
    let raw = required(name)?;
    Address::from_str(raw.trim()).map_err(|e| invalid(name, e.to_string()))
}

fn invalid(name: &'static str, reason: impl Into<String>) -> StartupError {
    StartupError::InvalidVar {
        name,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[(&str, &str)] = &[
        ("LOG_API_KEY", "test-key"),
        ("SOURCE_TOKEN_ADDRESS", "0xF5C0A842DCdd43b3A23e06EB6e49bAaE9B92b248"),
        ("SOURCE_PRESALE_ADDRESS", "0x1CA4a1029356540fb66f62403289bCB6804f352F"),
        ("DEST_RPC_URL", "http://localhost:8545"),
        ("DEST_CHAIN_ID", "102219"),
        ("DEST_TOKEN_ADDRESS", "0x5FbDB2315678afecb367f032d93F642f64180aa3"),
        (
            "TREASURY_PRIVATE_KEY",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        ),
    ];

    const OPTIONAL_VARS: &[&str] = &[
        "LOG_API_URL",
        "SOURCE_CHAIN_ID",
        "LOG_API_TIMEOUT_SECS",
        "GAS_LIMIT",
        "MIN_GAS_BALANCE_WEI",
        "RECEIPT_TIMEOUT_SECS",
        "POLL_INTERVAL_SECS",
        "MAX_BACKOFF_SECS",
        "BACKOFF_MULTIPLIER",
        "FORCE_RESCAN",
        "START_BLOCK",
        "STATE_FILE",
        "PROCESSED_CAPACITY",
        "API_PORT",
    ];

    fn set_required_env() {
        for (name, value) in VARS {
            env::set_var(name, value);
        }
        for name in OPTIONAL_VARS {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        set_required_env();
        let config = Config::from_env().unwrap();

        assert_eq!(config.source.log_api_url, "https://api.etherscan.io/v2/api");
        assert_eq!(config.source.chain_id, 1);
        assert_eq!(config.destination.chain_id, 102219);
        assert_eq!(config.destination.gas_limit, 200_000);
        assert_eq!(
            config.destination.min_gas_balance_wei,
            U256::from(1_000_000_000_000_000u64)
        );
        assert_eq!(config.relay.poll_interval_secs, 30);
        assert_eq!(config.relay.backoff_multiplier, 1.0);
        assert!(!config.relay.force_rescan);
        assert_eq!(config.relay.start_block, 0);
        assert_eq!(config.relay.state_file, PathBuf::from("bridge_state.json"));
        assert_eq!(config.relay.processed_capacity, 2000);
        assert_eq!(config.api_port, 9090);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        set_required_env();
        env::set_var("FORCE_RESCAN", "true");
        env::set_var("START_BLOCK", "23084945");
        env::set_var("POLL_INTERVAL_SECS", "5");
        env::set_var("STATE_FILE", "/var/lib/relayer/state.json");
        let config = Config::from_env().unwrap();

        assert!(config.relay.force_rescan);
        assert_eq!(config.relay.start_block, 23_084_945);
        assert_eq!(config.relay.poll_interval_secs, 5);
        assert_eq!(
            config.relay.state_file,
            PathBuf::from("/var/lib/relayer/state.json")
        );
        set_required_env();
    }

    #[test]
    #[serial]
    fn test_missing_private_key_is_fatal() {
        set_required_env();
        env::remove_var("TREASURY_PRIVATE_KEY");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            StartupError::MissingVar("TREASURY_PRIVATE_KEY")
        ));
        set_required_env();
    }

    #[test]
    #[serial]
    fn test_unparseable_number_is_fatal() {
        set_required_env();
        env::set_var("DEST_CHAIN_ID", "zugchain");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("DEST_CHAIN_ID"));
        set_required_env();
    }

    #[test]
    #[serial]
    fn test_validation() {
        set_required_env();
        let mut config = Config::from_env().unwrap();
        assert!(config.validate().is_ok());

        config.destination.treasury_private_key = "0x123".to_string();
        assert!(config.validate().is_err());

        // Unprefixed keys are accepted
        config.destination.treasury_private_key =
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string();
        assert!(config.validate().is_ok());

        config.relay.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        config.relay.backoff_multiplier = 2.0;
        config.relay.max_backoff_secs = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_debug_redacts_secrets() {
        set_required_env();
        let config = Config::from_env().unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("ac0974bec39a17e3"));
        assert!(!rendered.contains("test-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
