//! Amount planner: pure borrow and repay sizing in integer fixed point.
//!
//! Every conversion rounds toward zero. Overshooting capacity by a single
//! raw unit must be impossible, so no intermediate value is ever rounded up
//! and overflow is reported instead of wrapped.
//!
//! Fractions are applied as `floor(value * mantissa / 10^scale)`; price
//! conversion is a single integer floor
//! `floor(uoa * 10^rate_decimals * 10^asset_decimals / (rate * 10^uoa_decimals))`.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::errors::BotError;
use crate::types::fixed_point::{pow10, units_to_decimal};
use crate::types::{BorrowPlan, Position, PriceQuote, RepayPlan, RepayRequest, TokenInfo};

// ---------------------------------------------------------------------------
// Fixed-point primitives
// ---------------------------------------------------------------------------

/// `floor(value * fraction)` for a non-negative `Decimal` fraction.
pub fn apply_fraction(value: U256, fraction: Decimal) -> Result<U256, BotError> {
    if fraction.is_sign_negative() {
        return Err(BotError::InvalidUtilization {
            fraction: fraction.to_string(),
        });
    }
    let mantissa = U256::from(fraction.mantissa().unsigned_abs());
    let scaled = value
        .checked_mul(mantissa)
        .ok_or_else(|| overflow("fraction of amount"))?;
    Ok(scaled / scale_factor(fraction.scale() as u8, "fraction of amount")?)
}

/// Unit-of-account value to asset-native units, rounding down.
pub fn to_asset_units(
    value: U256,
    quote: &PriceQuote,
    uoa_decimals: u8,
    asset_decimals: u8,
) -> Result<U256, BotError> {
    if quote.rate.is_zero() {
        return Err(BotError::OracleUnavailable {
            feed: format!("{}/{}", quote.base_asset, quote.quote_asset),
            reason: "zero rate".into(),
        });
    }
    let numerator = value
        .checked_mul(scale_factor(quote.decimals, "asset amount")?)
        .and_then(|v| v.checked_mul(pow10(asset_decimals)?))
        .ok_or_else(|| overflow("asset amount"))?;
    let denominator = quote
        .rate
        .checked_mul(scale_factor(uoa_decimals, "asset amount")?)
        .ok_or_else(|| overflow("asset amount"))?;
    Ok(numerator / denominator)
}

/// Asset-native units to unit-of-account value, rounding down.
pub fn to_unit_of_account(
    amount: U256,
    quote: &PriceQuote,
    asset_decimals: u8,
    uoa_decimals: u8,
) -> Result<U256, BotError> {
    let numerator = amount
        .checked_mul(quote.rate)
        .and_then(|v| v.checked_mul(pow10(uoa_decimals)?))
        .ok_or_else(|| overflow("unit-of-account value"))?;
    let denominator = scale_factor(quote.decimals, "unit-of-account value")?
        .checked_mul(scale_factor(asset_decimals, "unit-of-account value")?)
        .ok_or_else(|| overflow("unit-of-account value"))?;
    Ok(numerator / denominator)
}

/// `collateral * liquidation_threshold / (debt + additional_debt)`.
///
/// `Decimal::MAX` when there would be no debt.
pub fn projected_health_factor(position: &Position, additional_debt: U256) -> Decimal {
    let debt = position.total_debt_value.saturating_add(additional_debt);
    if debt.is_zero() {
        return Decimal::MAX;
    }
    let collateral = position.collateral();
    let debt = units_to_decimal(debt, position.decimals);
    collateral
        .checked_mul(position.liquidation_threshold)
        .and_then(|weighted| weighted.checked_div(debt))
        .unwrap_or(Decimal::MAX)
}

fn overflow(context: &str) -> BotError {
    BotError::AmountOverflow {
        context: context.to_string(),
    }
}

/// `10^exp`, or `AmountOverflow` when it does not fit in 256 bits.
fn scale_factor(exp: u8, context: &str) -> Result<U256, BotError> {
    pow10(exp).ok_or_else(|| overflow(context))
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Size a borrow of `asset` from the position's available capacity.
///
/// `amount_in_unit_of_account = floor(available * f)`, then converted to
/// asset units rounding down. Rejects `f` outside `(0, 1)`, a position with
/// no capacity, and (when `min_health_factor` is set) a plan whose projected
/// health factor would fall below the floor.
pub fn plan_borrow(
    position: &Position,
    quote: &PriceQuote,
    asset: &TokenInfo,
    utilization_fraction: Decimal,
    min_health_factor: Option<Decimal>,
) -> Result<BorrowPlan, BotError> {
    if utilization_fraction <= Decimal::ZERO || utilization_fraction >= dec!(1) {
        return Err(BotError::InvalidUtilization {
            fraction: utilization_fraction.to_string(),
        });
    }
    if !position.has_capacity() {
        return Err(BotError::InsufficientCapacity {
            available: position.available_to_borrow().to_string(),
        });
    }

    let amount_in_unit_of_account =
        apply_fraction(position.available_to_borrow_value, utilization_fraction)?;
    let amount_in_asset_units = to_asset_units(
        amount_in_unit_of_account,
        quote,
        position.decimals,
        asset.decimals,
    )?;

    // Capacity too small to express a single raw unit of the asset.
    if amount_in_asset_units.is_zero() {
        return Err(BotError::InsufficientCapacity {
            available: position.available_to_borrow().to_string(),
        });
    }

    let projected = projected_health_factor(position, amount_in_unit_of_account);
    if let Some(min) = min_health_factor {
        if projected < min {
            return Err(BotError::HealthFactorTooLow {
                projected: projected.round_dp(4).to_string(),
                min: min.to_string(),
            });
        }
    }

    Ok(BorrowPlan {
        asset: asset.symbol.clone(),
        amount_in_asset_units,
        amount_in_unit_of_account,
        utilization_fraction,
        projected_health_factor: projected,
    })
}

/// Size a repayment against the current outstanding debt of one asset.
///
/// A request above the outstanding debt is `OverRepayment`; nothing is
/// silently clamped.
pub fn plan_repay(
    asset: &TokenInfo,
    outstanding: U256,
    request: RepayRequest,
) -> Result<RepayPlan, BotError> {
    let amount = match request {
        RepayRequest::Full => outstanding,
        RepayRequest::Amount(amount) => {
            if amount > outstanding {
                return Err(over_repayment(amount, outstanding, asset));
            }
            amount
        }
        RepayRequest::Fraction(fraction) => {
            if fraction <= Decimal::ZERO {
                return Err(BotError::InvalidUtilization {
                    fraction: fraction.to_string(),
                });
            }
            if fraction > dec!(1) {
                return Err(BotError::OverRepayment {
                    requested: format!("{}x outstanding", fraction),
                    outstanding: units_to_decimal(outstanding, asset.decimals).to_string(),
                });
            }
            apply_fraction(outstanding, fraction)?
        }
    };

    Ok(RepayPlan {
        asset: asset.symbol.clone(),
        amount,
        outstanding,
    })
}

fn over_repayment(requested: U256, outstanding: U256, asset: &TokenInfo) -> BotError {
    BotError::OverRepayment {
        requested: units_to_decimal(requested, asset.decimals).to_string(),
        outstanding: units_to_decimal(outstanding, asset.decimals).to_string(),
    }
}
