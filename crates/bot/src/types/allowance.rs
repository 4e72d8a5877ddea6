use alloy::primitives::{Address, B256, U256};

/// Observed ERC-20 allowance. Owned by the token contract; the bot only
/// reads it and raises it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowance {
    pub owner: Address,
    pub spender: Address,
    pub asset: Address,
    pub approved_amount: U256,
}

impl Allowance {
    pub fn covers(&self, required: U256) -> bool {
        self.approved_amount >= required
    }
}

/// What `ensure_allowance` had to do.
///
/// A `None` hash marks an approval whose receipt never arrived but whose
/// effect was observed by re-reading the allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowanceOutcome {
    AlreadySufficient,
    Approved { tx_hash: Option<B256> },
    /// Reset to zero, then raised.
    ResetAndApproved {
        reset_tx: Option<B256>,
        tx_hash: Option<B256>,
    },
}

impl AllowanceOutcome {
    /// Approval transactions issued, in order.
    pub fn submissions(&self) -> Vec<Option<B256>> {
        match *self {
            Self::AlreadySufficient => Vec::new(),
            Self::Approved { tx_hash } => vec![tx_hash],
            Self::ResetAndApproved { reset_tx, tx_hash } => vec![reset_tx, tx_hash],
        }
    }
}
