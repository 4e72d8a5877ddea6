//! Fixed-point helpers for on-chain integer values.
//!
//! On-chain amounts stay `U256` end to end; `Decimal` only appears for
//! display and for ratios (health factor, LTV). Conversions that feed an
//! amount back on-chain round toward zero.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use std::str::FromStr;

use crate::constants::WAD;

// ---------------------------------------------------------------------------
// WAD (1e18) health factors
// ---------------------------------------------------------------------------

/// WAD-scaled value (18 decimals). Used for health factors.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wad(pub U256);

impl Wad {
    /// Convert on-chain WAD (U256) to off-chain `Decimal`.
    ///
    /// Aave reports `type(uint256).max` for accounts without debt; anything
    /// that does not fit a `Decimal` saturates to `Decimal::MAX`.
    pub fn to_decimal(self) -> Decimal {
        match Decimal::from_str(&self.0.to_string()) {
            Ok(raw) => raw / WAD,
            Err(_) => Decimal::MAX,
        }
    }

    pub fn from_raw(val: U256) -> Self {
        Self(val)
    }
}

impl fmt::Debug for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wad({})", self.to_decimal())
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

// ---------------------------------------------------------------------------
// Free-standing conversion helpers
// ---------------------------------------------------------------------------

/// Largest `exp` for which `10^exp` fits in a `U256`.
pub const MAX_POW10_EXP: u8 = 77;

/// `10^exp` as `U256`, or `None` past `10^77`.
pub fn pow10(exp: u8) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(exp))
}

/// Convert a raw integer amount with `decimals` to a display `Decimal`.
///
/// Saturates to `Decimal::MAX` when the value is out of `Decimal` range.
pub fn units_to_decimal(raw: U256, decimals: u8) -> Decimal {
    let Ok(mut value) = Decimal::from_str(&raw.to_string()) else {
        return Decimal::MAX;
    };
    // Decimal caps its scale at 28; divide in steps for larger exponents.
    let mut remaining = u32::from(decimals);
    while remaining > 0 {
        let step = remaining.min(18);
        value /= Decimal::from(10u64.pow(step));
        remaining -= step;
    }
    value
}

/// Convert a human-readable amount to raw integer units, truncating any
/// digits beyond `decimals`. Returns `None` for negative or oversized values.
pub fn decimal_to_units(value: Decimal, decimals: u8) -> Option<U256> {
    if value.is_sign_negative() {
        return None;
    }
    let mantissa = u128::try_from(value.mantissa()).ok()?;
    let scale = value.scale();
    let target = u32::from(decimals);
    let raw = U256::from(mantissa);
    let exp = u8::try_from(target.abs_diff(scale)).ok()?;
    let factor = pow10(exp)?;
    if scale <= target {
        raw.checked_mul(factor)
    } else {
        Some(raw / factor)
    }
}

/// Convert basis points (u256) to a fraction `Decimal`.
pub fn bps_to_decimal(bps: U256) -> Decimal {
    let raw_dec = Decimal::from_str(&bps.to_string()).unwrap_or_default();
    raw_dec / dec!(10_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow10_bounds() {
        assert_eq!(pow10(0), Some(U256::from(1u64)));
        assert_eq!(pow10(18), Some(U256::from(1_000_000_000_000_000_000u64)));
        assert!(pow10(MAX_POW10_EXP).is_some());
        assert_eq!(pow10(MAX_POW10_EXP + 1), None);
        assert_eq!(pow10(u8::MAX), None);
    }

    #[test]
    fn test_decimal_to_units_rejects_unrepresentable_decimals() {
        assert_eq!(decimal_to_units(dec!(1), 78), None);
        assert_eq!(decimal_to_units(dec!(1), 6), Some(U256::from(1_000_000u64)));
    }

    #[test]
    fn test_wad_health_factor() {
        // 1.5e18 = health factor of 1.5
        let hf = Wad::from_raw(U256::from(1_500_000_000_000_000_000u128));
        assert_eq!(hf.to_decimal(), dec!(1.5));
    }

    #[test]
    fn test_wad_max_saturates() {
        assert_eq!(Wad::from_raw(U256::MAX).to_decimal(), Decimal::MAX);
    }

    #[test]
    fn test_units_to_decimal() {
        // 2.5 ETH in wei
        let raw = U256::from(2_500_000_000_000_000_000u128);
        assert_eq!(units_to_decimal(raw, 18), dec!(2.5));
        assert_eq!(units_to_decimal(U256::from(1000u64), 2), dec!(10));
    }

    #[test]
    fn test_decimal_to_units_exact() {
        assert_eq!(
            decimal_to_units(dec!(1), 18),
            Some(U256::from(1_000_000_000_000_000_000u128))
        );
        assert_eq!(decimal_to_units(dec!(0.05), 6), Some(U256::from(50_000u64)));
    }

    #[test]
    fn test_decimal_to_units_truncates() {
        // 1.239 with 2 decimals → 123, never 124
        assert_eq!(decimal_to_units(dec!(1.239), 2), Some(U256::from(123u64)));
    }

    #[test]
    fn test_decimal_to_units_rejects_negative() {
        assert_eq!(decimal_to_units(dec!(-1), 18), None);
    }

    #[test]
    fn test_bps_to_decimal() {
        // 7500 bps = 0.75
        assert_eq!(bps_to_decimal(U256::from(7500u64)), dec!(0.75));
    }
}
