use std::path::PathBuf;
use std::sync::Arc;

use alloy::primitives::Address;
use alloy::providers::RootProvider;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aave_borrow_bot::config;
use aave_borrow_bot::core::price_oracle::PriceOracleClient;
use aave_borrow_bot::core::retry::RetryPolicy;
use aave_borrow_bot::core::session::{BorrowerSession, NetworkProfile};
use aave_borrow_bot::core::workflow::{PositionWorkflow, WorkflowSettings};
use aave_borrow_bot::execution::{AaveClient, TxSubmitter};
use aave_borrow_bot::logging;
use aave_borrow_bot::types::{WorkflowReport, WorkflowState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("BOT_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let config = config::load_config(&config_dir)?;

    // Hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.app.logging)?;
    config::log_env_overrides(&config.env_overrides);

    info!(
        chain_id = config.chain.chain_id,
        chain_name = %config.chain.chain_name,
        dry_run = config.workflow.dry_run,
        collateral = %config.chain.collateral_token,
        borrow = %config.chain.borrow_token,
        "Aave borrow bot starting"
    );

    // -----------------------------------------------------------------------
    // Signer and providers
    // -----------------------------------------------------------------------

    let signer = init_signer(config.workflow.dry_run)?;
    let borrower = signer.address();

    let rpc_url: Url = config
        .chain
        .rpc
        .http_url
        .parse()
        .context("failed to parse RPC URL")?;
    let provider = RootProvider::new_http(rpc_url);

    let submit_provider = match config.chain.rpc.submit_url.as_deref() {
        Some(url) => {
            let url: Url = url.parse().context("failed to parse submission RPC URL")?;
            RootProvider::new_http(url)
        }
        None => provider.clone(),
    };

    // -----------------------------------------------------------------------
    // Network profile and session (resolved once)
    // -----------------------------------------------------------------------

    let aave_client = Arc::new(AaveClient::new(provider.clone()));

    let addresses_provider: Address = config
        .chain
        .contracts
        .lending_pool_addresses_provider
        .parse()
        .context("failed to parse lending_pool_addresses_provider")?;
    let lending_pool = aave_client
        .resolve_lending_pool(addresses_provider)
        .await
        .context("failed to resolve lending pool")?;

    let network = NetworkProfile::from_config(&config.chain, lending_pool)?;
    let settings = WorkflowSettings::from_config(&config.workflow, &network)?;
    let session = BorrowerSession::new(borrower, network);

    info!(
        borrower = %session.borrower,
        lending_pool = %session.network.lending_pool,
        price_feed = %session.network.price_feed,
        "session initialized"
    );

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    let tx_submitter = Arc::new(TxSubmitter::new(
        provider,
        submit_provider,
        signer,
        &config.timing.transaction,
        config.chain.chain_id,
    ));

    let oracle = PriceOracleClient::new(
        aave_client.clone(),
        config.timing.oracle.max_price_age_seconds,
    );

    let cancel = CancellationToken::new();
    let workflow = PositionWorkflow::new(
        aave_client,
        tx_submitter,
        oracle,
        settings,
        RetryPolicy::from_config(&config.timing.read_retry),
        cancel.clone(),
    );

    // Ctrl+C stops the run before its next submission; an in-flight
    // submission is still awaited.
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("shutdown signal received, stopping before next submission");
            signal_cancel.cancel();
        }
    });

    // -----------------------------------------------------------------------
    // Run
    // -----------------------------------------------------------------------

    if config.workflow.dry_run {
        info!("dry run: reading position and planning only");
        let report = workflow
            .preview(&session)
            .await
            .context("preview failed")?;
        log_report(&report);
        return Ok(());
    }

    let start = resume_state()?;
    match workflow.run_from(&session, start).await {
        Ok(report) => {
            log_report(&report);
            info!("workflow complete");
            Ok(())
        }
        Err(e) => {
            error!(
                step = %e.step,
                last_confirmed = %e.last_confirmed,
                class = ?e.class(),
                error = %e.source,
                "workflow failed; resume with BOT_RESUME_FROM={}",
                e.last_confirmed
            );
            Err(e.into())
        }
    }
}

// ---------------------------------------------------------------------------
// Initialization helpers
// ---------------------------------------------------------------------------

/// Load the borrower key from `BORROWER_PRIVATE_KEY`.
///
/// In dry-run mode a missing key yields an ephemeral signer, since nothing
/// is submitted.
fn init_signer(dry_run: bool) -> Result<PrivateKeySigner> {
    match std::env::var("BORROWER_PRIVATE_KEY")
        .ok()
        .filter(|v| !v.is_empty())
    {
        Some(key) => {
            let key = key.strip_prefix("0x").unwrap_or(&key);
            key.parse::<PrivateKeySigner>()
                .context("failed to parse BORROWER_PRIVATE_KEY")
        }
        None => {
            if !dry_run {
                anyhow::bail!("BORROWER_PRIVATE_KEY is required in live mode");
            }
            info!("no private key set, generating ephemeral signer (dry run)");
            Ok(PrivateKeySigner::random())
        }
    }
}

/// Starting state from `BOT_RESUME_FROM`, or `idle`.
fn resume_state() -> Result<WorkflowState> {
    match std::env::var("BOT_RESUME_FROM")
        .ok()
        .filter(|v| !v.is_empty())
    {
        Some(state) => {
            let state = state
                .parse::<WorkflowState>()
                .map_err(anyhow::Error::msg)
                .context("invalid BOT_RESUME_FROM")?;
            info!(%state, "resuming workflow");
            Ok(state)
        }
        None => Ok(WorkflowState::Idle),
    }
}

fn log_report(report: &WorkflowReport) {
    for record in &report.submissions {
        info!(
            step = %record.step,
            tx_hash = ?record.tx_hash,
            inferred = record.inferred,
            "submission"
        );
    }
    if let Some(position) = report.latest_position() {
        info!(
            collateral = %position.collateral(),
            debt = %position.debt(),
            available = %position.available_to_borrow(),
            health_factor = %position.health_factor,
            "final position"
        );
    }
    if let Some(plan) = &report.plan {
        info!(
            asset = %plan.asset,
            amount = %plan.amount_in_asset_units,
            projected_hf = %plan.projected_health_factor.round_dp(4),
            "borrow plan"
        );
    }
    match serde_json::to_string(report) {
        Ok(json) => info!(report = %json, "workflow report"),
        Err(e) => warn!(error = %e, "failed to serialize workflow report"),
    }
}
