//! Compile-time ABI definitions for on-chain contracts via Alloy `sol!`.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

// ---------------------------------------------------------------------------
// Aave V2 LendingPoolAddressesProvider
// ---------------------------------------------------------------------------

sol! {
    /// Registry resolving the current LendingPool proxy.
    #[sol(rpc)]
    interface ILendingPoolAddressesProvider {
        function getLendingPool() external view returns (address);
    }
}

// ---------------------------------------------------------------------------
// Aave V2 LendingPool
// ---------------------------------------------------------------------------

sol! {
    /// Aave V2 LendingPool: deposit, borrow, repay and account data.
    #[sol(rpc)]
    interface ILendingPool {
        /// Deposit an asset as collateral.
        function deposit(
            address asset,
            uint256 amount,
            address onBehalfOf,
            uint16 referralCode
        ) external;

        /// Borrow an asset against deposited collateral.
        function borrow(
            address asset,
            uint256 amount,
            uint256 interestRateMode,
            uint16 referralCode,
            address onBehalfOf
        ) external;

        /// Repay borrowed asset. Returns the amount actually repaid.
        function repay(
            address asset,
            uint256 amount,
            uint256 rateMode,
            address onBehalfOf
        ) external returns (uint256);

        /// Aggregated user position data, values in ETH wei.
        function getUserAccountData(address user) external view returns (
            uint256 totalCollateralETH,
            uint256 totalDebtETH,
            uint256 availableBorrowsETH,
            uint256 currentLiquidationThreshold,
            uint256 ltv,
            uint256 healthFactor
        );
    }
}

// ---------------------------------------------------------------------------
// Aave V2 ProtocolDataProvider
// ---------------------------------------------------------------------------

sol! {
    /// Read-only per-reserve user data.
    #[sol(rpc)]
    interface IProtocolDataProvider {
        function getUserReserveData(address asset, address user) external view returns (
            uint256 currentATokenBalance,
            uint256 currentStableDebt,
            uint256 currentVariableDebt,
            uint256 principalStableDebt,
            uint256 scaledVariableDebt,
            uint256 stableBorrowRate,
            uint256 liquidityRate,
            uint40 stableRateLastUpdated,
            bool usageAsCollateralEnabled
        );
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
    }
}

sol! {
    /// Wrapped native token: `deposit()` mints 1:1 for the attached value.
    #[sol(rpc)]
    interface IWETH {
        function deposit() external payable;
        function withdraw(uint256 wad) external;
    }
}

// ---------------------------------------------------------------------------
// Chainlink Aggregator V3
// ---------------------------------------------------------------------------

sol! {
    /// Chainlink price feed interface.
    #[sol(rpc)]
    interface IAggregatorV3 {
        function latestRoundData() external view returns (
            uint80 roundId,
            int256 answer,
            uint256 startedAt,
            uint256 updatedAt,
            uint80 answeredInRound
        );

        function decimals() external view returns (uint8);
    }
}
