pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Chain selected when `BOT_CHAIN_ID` is unset.
const DEFAULT_CHAIN_ID: u64 = 1;

/// Load and merge all config JSON files into a single [`BotConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   chains/<chain_id>.json
///   workflow.json
///   timing.json
/// ```
///
/// The chain file is chosen once, here, by `BOT_CHAIN_ID`.
///
/// # Environment variable overrides
///
/// | Env Var                | Config Field                              |
/// |------------------------|-------------------------------------------|
/// | `DRY_RUN`              | `workflow.dry_run`                        |
/// | `WRAP_AMOUNT`          | `workflow.wrap_amount`                    |
/// | `UTILIZATION_FRACTION` | `workflow.utilization_fraction`           |
/// | `RPC_URL_HTTP`         | `chain.rpc.http_url`                      |
/// | `RPC_URL_SUBMIT`       | `chain.rpc.submit_url`                    |
/// | `CONFIRMATIONS`        | `timing.transaction.confirmations`        |
/// | `MAX_GAS_PRICE_GWEI`   | `timing.transaction.max_gas_price_gwei`   |
///
/// Tracing is initialised from the loaded config, so overrides are recorded
/// in [`BotConfig::env_overrides`] for [`log_env_overrides`] instead of
/// being logged here.
pub fn load_config(config_dir: &Path) -> Result<BotConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let mut overrides = Vec::new();
    let chain_id = match env_parse::<u64>("BOT_CHAIN_ID", &mut overrides) {
        Some(id) => {
            overrides.push(EnvOverride::Applied { key: "BOT_CHAIN_ID" });
            id
        }
        None => DEFAULT_CHAIN_ID,
    };
    let chain_file = format!("chains/{chain_id}.json");

    let app: AppConfig =
        serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    let chain: ChainConfig = serde_json::from_str(&read(&chain_file)?)
        .with_context(|| format!("parsing {chain_file}"))?;

    let workflow: WorkflowConfig =
        serde_json::from_str(&read("workflow.json")?).context("parsing workflow.json")?;

    let timing: TimingConfig =
        serde_json::from_str(&read("timing.json")?).context("parsing timing.json")?;

    let mut config = BotConfig {
        app,
        chain,
        workflow,
        timing,
        env_overrides: overrides,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides to the loaded config.
///
/// Only non-empty env vars take effect. Parse failures are skipped
/// (the JSON value remains) and recorded as ignored.
fn apply_env_overrides(config: &mut BotConfig) {
    let mut notes = std::mem::take(&mut config.env_overrides);

    // -- Workflow ------------------------------------------------------------
    if let Some(val) = env_bool("DRY_RUN") {
        config.workflow.dry_run = val;
        notes.push(EnvOverride::Applied { key: "DRY_RUN" });
    }

    if let Some(val) = env_decimal("WRAP_AMOUNT", &mut notes) {
        config.workflow.wrap_amount = val;
        notes.push(EnvOverride::Applied { key: "WRAP_AMOUNT" });
    }

    if let Some(val) = env_decimal("UTILIZATION_FRACTION", &mut notes) {
        config.workflow.utilization_fraction = val;
        notes.push(EnvOverride::Applied {
            key: "UTILIZATION_FRACTION",
        });
    }

    // -- RPC URLs ------------------------------------------------------------
    if let Some(val) = env_string("RPC_URL_HTTP") {
        config.chain.rpc.http_url = val;
        notes.push(EnvOverride::Applied { key: "RPC_URL_HTTP" });
    }

    if let Some(val) = env_string("RPC_URL_SUBMIT") {
        config.chain.rpc.submit_url = Some(val);
        notes.push(EnvOverride::Applied {
            key: "RPC_URL_SUBMIT",
        });
    }

    // -- Timing --------------------------------------------------------------
    if let Some(val) = env_parse::<u64>("CONFIRMATIONS", &mut notes) {
        config.timing.transaction.confirmations = val;
        notes.push(EnvOverride::Applied {
            key: "CONFIRMATIONS",
        });
    }

    if let Some(val) = env_parse::<u64>("MAX_GAS_PRICE_GWEI", &mut notes) {
        config.timing.transaction.max_gas_price_gwei = val;
        notes.push(EnvOverride::Applied {
            key: "MAX_GAS_PRICE_GWEI",
        });
    }

    config.env_overrides = notes;
}

/// Log the overrides recorded by [`load_config`]. Call after tracing is
/// initialised.
pub fn log_env_overrides(overrides: &[EnvOverride]) {
    for note in overrides {
        match note {
            EnvOverride::Applied { key } => info!(key, "env override applied"),
            EnvOverride::Ignored { key, value } => {
                warn!(key, value = %value, "ignoring unparseable env override")
            }
        }
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var as a bool (`true`, `1`, `yes` → true).
fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Read a non-empty env var and parse it as `T`, noting a parse failure.
fn env_parse<T: FromStr>(key: &'static str, notes: &mut Vec<EnvOverride>) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(val) => Some(val),
        Err(_) => {
            notes.push(EnvOverride::Ignored { key, value: raw });
            None
        }
    }
}

/// Read a non-empty env var and parse it as `Decimal`.
fn env_decimal(key: &'static str, notes: &mut Vec<EnvOverride>) -> Option<Decimal> {
    env_parse::<Decimal>(key, notes)
}
