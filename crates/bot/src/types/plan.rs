use alloy::primitives::U256;
use rust_decimal::Decimal;
use serde::Serialize;

/// A concrete borrow instruction derived from one position + quote pair.
///
/// `amount_in_unit_of_account <= available_to_borrow * utilization_fraction`
/// always holds; both amounts are rounded down.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorrowPlan {
    pub asset: String,
    pub amount_in_asset_units: U256,
    pub amount_in_unit_of_account: U256,
    #[serde(with = "rust_decimal::serde::str")]
    pub utilization_fraction: Decimal,
    /// Health factor after the borrow, assuming the quoted price.
    #[serde(with = "rust_decimal::serde::str")]
    pub projected_health_factor: Decimal,
}

/// How much debt a repayment should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepayRequest {
    /// The whole outstanding debt.
    Full,
    /// An exact amount in asset-native units.
    Amount(U256),
    /// A fraction of the outstanding debt, rounded down.
    Fraction(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepayPlan {
    pub asset: String,
    pub amount: U256,
    pub outstanding: U256,
}

impl RepayPlan {
    pub fn closes_debt(&self) -> bool {
        self.amount == self.outstanding
    }
}
