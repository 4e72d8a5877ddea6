use alloy::primitives::{address, Address};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Numeric Constants
// ---------------------------------------------------------------------------

/// WAD: 1e18, the fixed-point scale of Aave health factors.
pub const WAD: Decimal = dec!(1_000_000_000_000_000_000);

// ---------------------------------------------------------------------------
// Aave interest rate modes
// ---------------------------------------------------------------------------

pub const INTEREST_RATE_MODE_STABLE: u8 = 1;
pub const INTEREST_RATE_MODE_VARIABLE: u8 = 2;

// ---------------------------------------------------------------------------
// Ethereum mainnet addresses (also valid on a forked local node)
// ---------------------------------------------------------------------------

pub const AAVE_V2_LENDING_POOL_ADDRESSES_PROVIDER: Address =
    address!("B53C1a33016B2DC2fF3653530bfF1848a515c8c5");
pub const AAVE_V2_PROTOCOL_DATA_PROVIDER: Address =
    address!("057835Ad21a177dbdd3090bB1CAE03EaCF78Fc6d");

pub const CHAINLINK_DAI_ETH: Address = address!("773616E4d11A78F511299002da57A0a94577F1f4");

pub const TOKEN_WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
pub const TOKEN_DAI: Address = address!("6B175474E89094C44Da98b954EedeAC495271d0F");

// ---------------------------------------------------------------------------
// Transaction defaults
// ---------------------------------------------------------------------------

/// Gas limit used when the node cannot estimate (e.g. a reverting simulation
/// was already ruled out but estimation is unavailable).
pub const FALLBACK_GAS_LIMIT: u64 = 500_000;
