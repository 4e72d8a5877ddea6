use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub app: AppConfig,
    pub chain: ChainConfig,
    pub workflow: WorkflowConfig,
    pub timing: TimingConfig,
    /// Environment overrides seen during loading, logged once tracing is up.
    #[serde(skip)]
    pub env_overrides: Vec<EnvOverride>,
}

/// One environment variable that was applied to, or ignored by, the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvOverride {
    Applied { key: &'static str },
    Ignored { key: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    /// Rolling file name prefix; a date suffix is appended daily.
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub default_filter: String,
}

fn default_log_file_prefix() -> String {
    "borrow-bot.log".into()
}

fn default_log_filter() -> String {
    "aave_borrow_bot=info,warn".into()
}

// ---------------------------------------------------------------------------
// chains/<chain_id>.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc: RpcConfig,
    pub contracts: ContractsConfig,
    /// Symbol → token metadata.
    pub tokens: HashMap<String, TokenConfig>,
    /// Wrapped native token deposited as collateral.
    pub collateral_token: String,
    pub borrow_token: String,
    pub price_feed: PriceFeedConfig,
    pub base_currency: BaseCurrencyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub http_url: String,
    /// Private submission endpoint; raw transactions go here when set.
    #[serde(default)]
    pub submit_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    pub lending_pool_addresses_provider: String,
    pub protocol_data_provider: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub address: String,
    pub decimals: u8,
    #[serde(default)]
    pub requires_zero_reset: bool,
}

/// Chainlink feed pricing `base` in units of `quote`.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceFeedConfig {
    pub address: String,
    pub base: String,
    pub quote: String,
}

/// Unit of account the lending pool reports values in.
#[derive(Debug, Clone, Deserialize)]
pub struct BaseCurrencyConfig {
    pub symbol: String,
    pub decimals: u8,
}

// ---------------------------------------------------------------------------
// workflow.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    pub dry_run: bool,
    /// Amount of native asset to wrap and deposit, in whole units.
    #[serde(with = "rust_decimal::serde::str")]
    pub wrap_amount: Decimal,
    /// Share of available borrowing capacity to use; strictly in (0, 1).
    #[serde(with = "rust_decimal::serde::str")]
    pub utilization_fraction: Decimal,
    /// Aave rate mode: 1 = stable, 2 = variable.
    pub interest_rate_mode: u8,
    pub referral_code: u16,
    pub repay: RepayPolicy,
    /// Debt at or below this (whole borrow-token units) counts as repaid.
    #[serde(with = "rust_decimal::serde::str")]
    pub repay_dust: Decimal,
    pub max_repay_rounds: u32,
    /// Reject plans whose projected health factor falls below this.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub min_health_factor: Option<Decimal>,
}

/// First-round repayment sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RepayPolicy {
    /// The whole outstanding debt (clamped to wallet balance).
    Full,
    /// Exactly the amount this run borrowed.
    Borrowed,
    Fraction {
        #[serde(with = "rust_decimal::serde::str")]
        fraction: Decimal,
    },
}

// ---------------------------------------------------------------------------
// timing.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    pub transaction: TransactionTiming,
    pub oracle: OracleTiming,
    pub read_retry: ReadRetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionTiming {
    /// Blocks (including the inclusion block) before a submission counts
    /// as confirmed.
    pub confirmations: u64,
    pub confirmation_timeout_seconds: u64,
    pub receipt_poll_interval_ms: u64,
    pub simulation_timeout_seconds: u64,
    pub max_gas_price_gwei: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleTiming {
    /// A round older than this is rejected as stale.
    pub max_price_age_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}
