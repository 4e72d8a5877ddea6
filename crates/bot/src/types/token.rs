use alloy::primitives::Address;
use serde::Serialize;

/// Resolved ERC-20 token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    /// Token reverts when changing a nonzero allowance to another nonzero
    /// value (USDT-style); approvals must go through zero first.
    pub requires_zero_reset: bool,
}

impl std::fmt::Display for TokenInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}
