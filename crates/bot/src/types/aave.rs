use alloy::primitives::U256;
use serde::Serialize;

use crate::constants::INTEREST_RATE_MODE_STABLE;

/// Raw result of `LendingPool.getUserAccountData()`.
///
/// Value fields are in the pool's base currency (wei-denominated ETH on
/// Aave V2); LTV and liquidation threshold are basis points; health factor
/// is WAD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawAccountData {
    pub total_collateral_base: U256,
    pub total_debt_base: U256,
    pub available_borrows_base: U256,
    pub current_liquidation_threshold_bps: U256,
    pub ltv_bps: U256,
    pub health_factor_wad: U256,
}

/// Outstanding debt of one reserve for one borrower, in asset-native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AssetDebt {
    pub stable: U256,
    pub variable: U256,
}

impl AssetDebt {
    /// Debt under a given Aave interest rate mode (1 = stable, 2 = variable).
    pub fn for_mode(&self, interest_rate_mode: u8) -> U256 {
        match interest_rate_mode {
            INTEREST_RATE_MODE_STABLE => self.stable,
            _ => self.variable,
        }
    }

    pub fn total(&self) -> U256 {
        self.stable.saturating_add(self.variable)
    }
}
