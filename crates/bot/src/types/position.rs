use alloy::primitives::U256;
use rust_decimal::Decimal;
use serde::Serialize;

use super::fixed_point::{units_to_decimal, Wad};

/// Immutable snapshot of a borrower's aggregate position.
///
/// Value fields share one unit of account with `decimals` precision. Each
/// read produces a new snapshot; nothing mutates one in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub collateral_value: U256,
    pub total_debt_value: U256,
    pub available_to_borrow_value: U256,
    /// Weighted liquidation threshold as a fraction (0.825 = 82.5%).
    #[serde(with = "rust_decimal::serde::str")]
    pub liquidation_threshold: Decimal,
    /// Weighted loan-to-value as a fraction.
    #[serde(with = "rust_decimal::serde::str")]
    pub loan_to_value: Decimal,
    #[serde(skip)]
    pub health_factor: Wad,
    /// Decimals of the unit of account.
    pub decimals: u8,
}

impl Position {
    pub fn collateral(&self) -> Decimal {
        units_to_decimal(self.collateral_value, self.decimals)
    }

    pub fn debt(&self) -> Decimal {
        units_to_decimal(self.total_debt_value, self.decimals)
    }

    pub fn available_to_borrow(&self) -> Decimal {
        units_to_decimal(self.available_to_borrow_value, self.decimals)
    }

    pub fn has_capacity(&self) -> bool {
        self.available_to_borrow_value > U256::ZERO
    }
}
