use thiserror::Error;

use crate::types::{WorkflowState, WorkflowStep};

/// Typed error hierarchy for the borrow bot.
///
/// Library-internal errors use specific variants; application code wraps with
/// `anyhow::Context` for propagation.
#[derive(Error, Debug)]
pub enum BotError {
    // -- Reads (transient) --------------------------------------------------
    #[error("price oracle unavailable: {reason} (feed: {feed})")]
    OracleUnavailable { feed: String, reason: String },

    #[error("price stale: {age_seconds}s old (max {max_seconds}s)")]
    StalePrice { age_seconds: u64, max_seconds: u64 },

    #[error("account query failed: {reason}")]
    AccountQueryFailed { reason: String },

    #[error("token query failed for {token}: {reason}")]
    TokenQueryFailed { token: String, reason: String },

    // -- Preconditions ------------------------------------------------------
    #[error("approval of {spender} on {token} failed: {reason}")]
    ApprovalFailed {
        token: String,
        spender: String,
        reason: String,
    },

    // -- Capacity -----------------------------------------------------------
    #[error("insufficient borrowing capacity: available {available}")]
    InsufficientCapacity { available: String },

    #[error("invalid utilization fraction {fraction}: must be in (0, 1)")]
    InvalidUtilization { fraction: String },

    #[error("over-repayment: requested {requested}, outstanding {outstanding}")]
    OverRepayment {
        requested: String,
        outstanding: String,
    },

    #[error("projected health factor {projected} below minimum {min}")]
    HealthFactorTooLow { projected: String, min: String },

    #[error("amount overflow while computing {context}")]
    AmountOverflow { context: String },

    // -- Submissions --------------------------------------------------------
    #[error("wrap failed: {reason}")]
    WrapFailed { reason: String },

    #[error("deposit failed: {reason}")]
    DepositFailed { reason: String },

    #[error("borrow failed: {reason}")]
    BorrowFailed { reason: String },

    #[error("repay failed: {reason}")]
    RepayFailed { reason: String },

    #[error("repay incomplete: {remaining} still outstanding after {rounds} round(s)")]
    RepayIncomplete { remaining: String, rounds: u32 },

    #[error("transaction simulation failed: {reason}")]
    SimulationFailed { reason: String },

    #[error("transaction reverted: {reason} (tx: {tx_hash})")]
    TxReverted { tx_hash: String, reason: String },

    #[error("transaction timed out after {timeout_seconds}s (tx: {tx_hash}, nonce: {nonce})")]
    TxTimeout {
        tx_hash: String,
        nonce: u64,
        timeout_seconds: u64,
    },

    /// The node answered the raw send with a JSON-RPC error; nothing was
    /// accepted into the mempool.
    #[error("transaction rejected by node: {reason}")]
    TxRejected { reason: String },

    /// The raw send failed below JSON-RPC (connection reset, HTTP timeout,
    /// undecodable reply). The node may or may not hold the transaction.
    #[error("transaction send outcome unknown: {reason} (tx: {tx_hash}, nonce: {nonce})")]
    TxUnknown {
        tx_hash: String,
        nonce: u64,
        reason: String,
    },

    #[error("safety gate blocked: {reason}")]
    SafetyBlocked { reason: String },

    // -- Control ------------------------------------------------------------
    #[error("workflow cancelled before submission")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Alloy(#[from] alloy::transports::TransportError),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification driving the propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Oracle/position/token reads. Retried locally with bounded backoff.
    TransientRead,
    /// Allowance could not be reconciled.
    Precondition,
    /// Caller must adjust inputs. Never retried.
    Capacity,
    /// A write was rejected or its outcome is unknown.
    Submission,
    Cancelled,
    Internal,
}

impl BotError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::OracleUnavailable { .. }
            | Self::StalePrice { .. }
            | Self::AccountQueryFailed { .. }
            | Self::TokenQueryFailed { .. }
            | Self::Alloy(_) => ErrorClass::TransientRead,
            Self::ApprovalFailed { .. } => ErrorClass::Precondition,
            Self::InsufficientCapacity { .. }
            | Self::InvalidUtilization { .. }
            | Self::OverRepayment { .. }
            | Self::HealthFactorTooLow { .. }
            | Self::AmountOverflow { .. } => ErrorClass::Capacity,
            Self::WrapFailed { .. }
            | Self::DepositFailed { .. }
            | Self::BorrowFailed { .. }
            | Self::RepayFailed { .. }
            | Self::RepayIncomplete { .. }
            | Self::SimulationFailed { .. }
            | Self::TxReverted { .. }
            | Self::TxTimeout { .. }
            | Self::TxRejected { .. }
            | Self::TxUnknown { .. }
            | Self::SafetyBlocked { .. } => ErrorClass::Submission,
            Self::Cancelled => ErrorClass::Cancelled,
            Self::Config(_) | Self::SerdeJson(_) | Self::Io(_) => ErrorClass::Internal,
        }
    }

    /// Whether a read that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::TransientRead
    }

    /// The submission was issued but its effect could not be confirmed.
    pub fn is_unknown_outcome(&self) -> bool {
        self.pending_nonce().is_some()
    }

    /// Nonce of a signed transaction whose outcome is unknown.
    pub fn pending_nonce(&self) -> Option<u64> {
        match self {
            Self::TxTimeout { nonce, .. } | Self::TxUnknown { nonce, .. } => Some(*nonce),
            _ => None,
        }
    }
}

/// A failed workflow run: which step failed, and where the position was
/// left on-chain so the caller can resume.
#[derive(Error, Debug)]
#[error("{step} failed (last confirmed state: {last_confirmed}): {source}")]
pub struct WorkflowError {
    pub step: WorkflowStep,
    pub last_confirmed: WorkflowState,
    #[source]
    pub source: BotError,
}

impl WorkflowError {
    pub fn new(step: WorkflowStep, last_confirmed: WorkflowState, source: BotError) -> Self {
        Self {
            step,
            last_confirmed,
            source,
        }
    }

    /// The last step whose on-chain effect was confirmed, if any.
    pub fn last_confirmed_step(&self) -> Option<WorkflowStep> {
        self.last_confirmed.confirmed_by()
    }

    pub fn class(&self) -> ErrorClass {
        self.source.class()
    }
}
