//! ZugChain Presale Relayer
//!
//! Watches presale token `Transfer` events on Ethereum through the Etherscan
//! log API and pays the matching vZUG amount from the ZugChain treasury.
//!
//! # Startup
//! 1. Load and validate configuration (fatal on error)
//! 2. Connect to the destination RPC and check its chain id (fatal on error)
//! 3. Load the state file, optionally rewinding the cursor (`FORCE_RESCAN`)
//! 4. Start the operator HTTP endpoint unless `API_PORT=0`
//! 5. Run the relay loop until SIGINT/SIGTERM

use presale_relayer::api::{self, SharedStatus};
use presale_relayer::config::Config;
use presale_relayer::relay::Relayer;
use presale_relayer::shutdown;
use presale_relayer::state::StateStore;
use presale_relayer::watchers::EtherscanScanner;
use presale_relayer::writers::{Erc20Disperser, RetryPolicy};
use tracing::{error, info, warn};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting ZugChain Presale Relayer");

    let config = Config::load()?;
    info!(
        source_chain_id = config.source.chain_id,
        source_token = %config.source.token_address,
        presale = %config.source.presale_address,
        dest_chain_id = config.destination.chain_id,
        dest_token = %config.destination.token_address,
        "Configuration loaded"
    );

    let disperser = Erc20Disperser::connect(&config.destination).await?;
    match disperser.treasury_balances().await {
        Ok((tokens, native)) => info!(
            treasury = %disperser.treasury_address(),
            reward_tokens = %tokens,
            native = %native,
            "Treasury balances"
        ),
        Err(e) => warn!(error = %e, "Could not read treasury balances"),
    }

    let scanner = EtherscanScanner::new(&config.source)?;

    let store = StateStore::new(
        config.relay.state_file.clone(),
        config.relay.start_block,
        config.relay.processed_capacity,
    );
    let state = store.load();

    let status = SharedStatus::default();
    let mut relayer = Relayer::new(
        scanner,
        disperser,
        store,
        state,
        RetryPolicy::from_config(&config.relay),
    )
    .with_status(status.clone());

    if config.relay.force_rescan {
        relayer.force_rescan(config.relay.start_block);
    }

    if config.api_port != 0 {
        let port = config.api_port;
        tokio::spawn(async move {
            if let Err(e) = api::start_server(port, status).await {
                error!(error = %e, "API server error");
            }
        });
    } else {
        info!("API server disabled");
    }

    let shutdown_rx = shutdown::forward_shutdown(shutdown::termination_signal());
    relayer.run(shutdown_rx).await;

    info!("ZugChain Presale Relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,presale_relayer=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}
