use alloy::primitives::{I256, U256};
use rust_decimal::Decimal;
use serde::Serialize;

use super::fixed_point::units_to_decimal;

/// Raw Chainlink `latestRoundData()` result with the feed's decimals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundData {
    pub round_id: u128,
    pub answer: I256,
    pub started_at: u64,
    pub updated_at: u64,
    pub answered_in_round: u128,
    pub decimals: u8,
}

/// A single price observation: one unit of `base_asset` costs
/// `rate / 10^decimals` units of `quote_asset`.
///
/// Valid only for the operation that requested it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub base_asset: String,
    pub quote_asset: String,
    pub rate: U256,
    pub decimals: u8,
    /// Unix seconds of the feed's last update.
    pub observed_at: u64,
}

impl PriceQuote {
    pub fn rate_decimal(&self) -> Decimal {
        units_to_decimal(self.rate, self.decimals)
    }
}
