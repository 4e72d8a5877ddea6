use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::{BotConfig, RepayPolicy};
use crate::constants::{INTEREST_RATE_MODE_STABLE, INTEREST_RATE_MODE_VARIABLE};
use crate::types::fixed_point::MAX_POW10_EXP;

/// Validate invariants across the merged config that serde alone cannot enforce.
///
/// Called automatically by [`super::load_config`]. All violations are
/// collected and reported together.
pub fn validate_config(config: &BotConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    validate_chain_config(config, &mut errors);
    validate_workflow_config(config, &mut errors);
    validate_timing_config(config, &mut errors);
    validate_live_mode_requirements(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

// ---------------------------------------------------------------------------
// Chain config
// ---------------------------------------------------------------------------

fn validate_chain_config(config: &BotConfig, errors: &mut Vec<String>) {
    let chain = &config.chain;

    if chain.rpc.http_url.is_empty() {
        errors.push("chain.rpc: http_url is empty".into());
    }

    let contract_addrs = [
        (
            "lending_pool_addresses_provider",
            &chain.contracts.lending_pool_addresses_provider,
        ),
        ("protocol_data_provider", &chain.contracts.protocol_data_provider),
    ];

    for (name, addr) in &contract_addrs {
        if let Err(e) = validate_address(addr) {
            errors.push(format!("chain.contracts.{name}: {e}"));
        }
    }

    if let Err(e) = validate_address(&chain.price_feed.address) {
        errors.push(format!("chain.price_feed.address: {e}"));
    }

    for (name, token) in &chain.tokens {
        if let Err(e) = validate_address(&token.address) {
            errors.push(format!("chain.tokens.{name}.address: {e}"));
        }
        if let Err(e) = validate_decimals(token.decimals) {
            errors.push(format!("chain.tokens.{name}.decimals: {e}"));
        }
    }

    if let Err(e) = validate_decimals(chain.base_currency.decimals) {
        errors.push(format!("chain.base_currency.decimals: {e}"));
    }

    // Referenced symbols must resolve.
    for (field, symbol) in [
        ("collateral_token", &chain.collateral_token),
        ("borrow_token", &chain.borrow_token),
    ] {
        if !chain.tokens.contains_key(symbol) {
            errors.push(format!("chain.{field}: unknown token symbol '{symbol}'"));
        }
    }

    if chain.collateral_token == chain.borrow_token {
        errors.push("chain: collateral_token and borrow_token must differ".into());
    }

    if chain.price_feed.base != chain.borrow_token {
        errors.push(format!(
            "chain.price_feed.base ({}) must be the borrow token ({})",
            chain.price_feed.base, chain.borrow_token
        ));
    }

    if chain.price_feed.quote != chain.base_currency.symbol {
        errors.push(format!(
            "chain.price_feed.quote ({}) must be the base currency ({})",
            chain.price_feed.quote, chain.base_currency.symbol
        ));
    }
}

// ---------------------------------------------------------------------------
// Workflow config
// ---------------------------------------------------------------------------

fn validate_workflow_config(config: &BotConfig, errors: &mut Vec<String>) {
    let wf = &config.workflow;

    if wf.wrap_amount <= Decimal::ZERO {
        errors.push(format!(
            "workflow: wrap_amount ({}) must be > 0",
            wf.wrap_amount
        ));
    }

    // Never plan against 100% of capacity.
    if wf.utilization_fraction <= Decimal::ZERO || wf.utilization_fraction >= dec!(1) {
        errors.push(format!(
            "workflow: utilization_fraction ({}) must be in (0, 1)",
            wf.utilization_fraction
        ));
    }

    if !matches!(
        wf.interest_rate_mode,
        INTEREST_RATE_MODE_STABLE | INTEREST_RATE_MODE_VARIABLE
    ) {
        errors.push(format!(
            "workflow: interest_rate_mode ({}) must be 1 (stable) or 2 (variable)",
            wf.interest_rate_mode
        ));
    }

    if let RepayPolicy::Fraction { fraction } = wf.repay {
        if fraction <= Decimal::ZERO || fraction > dec!(1) {
            errors.push(format!(
                "workflow.repay: fraction ({fraction}) must be in (0, 1]"
            ));
        }
    }

    if wf.repay_dust < Decimal::ZERO {
        errors.push(format!(
            "workflow: repay_dust ({}) must be >= 0",
            wf.repay_dust
        ));
    }

    if wf.max_repay_rounds == 0 {
        errors.push("workflow: max_repay_rounds must be >= 1".into());
    }

    if let Some(min_hf) = wf.min_health_factor {
        if min_hf <= dec!(1) {
            errors.push(format!(
                "workflow: min_health_factor ({min_hf}) must be > 1.0"
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Timing config
// ---------------------------------------------------------------------------

fn validate_timing_config(config: &BotConfig, errors: &mut Vec<String>) {
    let timing = &config.timing;

    if timing.transaction.confirmations == 0 {
        errors.push("timing.transaction: confirmations must be >= 1".into());
    }
    if timing.transaction.confirmation_timeout_seconds == 0 {
        errors.push("timing.transaction: confirmation_timeout_seconds must be > 0".into());
    }
    if timing.transaction.max_gas_price_gwei == 0 {
        errors.push("timing.transaction: max_gas_price_gwei must be > 0".into());
    }
    if timing.oracle.max_price_age_seconds == 0 {
        errors.push("timing.oracle: max_price_age_seconds must be > 0".into());
    }
    if timing.read_retry.max_attempts == 0 {
        errors.push("timing.read_retry: max_attempts must be >= 1".into());
    }
    if timing.read_retry.base_delay_ms > timing.read_retry.max_delay_ms {
        errors.push(format!(
            "timing.read_retry: base_delay_ms ({}) must be <= max_delay_ms ({})",
            timing.read_retry.base_delay_ms, timing.read_retry.max_delay_ms
        ));
    }
}

// ---------------------------------------------------------------------------
// Live mode
// ---------------------------------------------------------------------------

fn validate_live_mode_requirements(config: &BotConfig, errors: &mut Vec<String>) {
    if config.workflow.dry_run {
        return;
    }

    if std::env::var("BORROWER_PRIVATE_KEY")
        .ok()
        .filter(|v| !v.is_empty())
        .is_none()
    {
        errors.push("live mode: BORROWER_PRIVATE_KEY env var is required when dry_run=false".into());
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Validate an Ethereum-style address string: must be 0x-prefixed and 42 chars
/// of hex.
fn validate_address(addr: &str) -> Result<(), String> {
    if addr.is_empty() {
        return Err("address is empty".into());
    }
    if !addr.starts_with("0x") && !addr.starts_with("0X") {
        return Err(format!("address '{addr}' must start with 0x"));
    }
    if addr.len() != 42 {
        return Err(format!(
            "address '{addr}' has length {} (expected 42)",
            addr.len()
        ));
    }
    if !addr[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("address '{addr}' contains non-hex characters"));
    }
    Ok(())
}

/// Amounts are scaled by `10^decimals` in 256-bit integers.
fn validate_decimals(decimals: u8) -> Result<(), String> {
    if decimals > MAX_POW10_EXP {
        return Err(format!(
            "{decimals} exceeds the maximum of {MAX_POW10_EXP}"
        ));
    }
    Ok(())
}
