//! Aave V2 client: typed read layer over an Alloy HTTP provider.
//!
//! Reads account data, per-reserve debt, Chainlink rounds, and ERC-20
//! allowance/balance state. Calldata for writes lives in
//! [`super::protocol::ChainAction`]; submission is handled by
//! [`super::tx_submitter::TxSubmitter`].

use alloy::primitives::{Address, U256};
use alloy::providers::RootProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::types::{AssetDebt, RawAccountData, RoundData};

use super::contracts::{
    IAggregatorV3, ILendingPool, ILendingPoolAddressesProvider, IProtocolDataProvider, IERC20,
};
use super::protocol::ProtocolReader;

/// Concrete provider type: Alloy HTTP provider over Ethereum network.
pub type HttpProvider = RootProvider;

/// Async read wrapper for Aave V2, Chainlink and ERC-20 contracts.
///
/// Accepts an Alloy HTTP provider via dependency injection so the same
/// connection can be shared with the submitter. Contract instances are
/// built per call since the target address varies by reserve.
#[derive(Clone)]
pub struct AaveClient {
    provider: HttpProvider,
}

impl AaveClient {
    pub fn new(provider: HttpProvider) -> Self {
        Self { provider }
    }

    /// Resolve the LendingPool proxy from the addresses provider.
    ///
    /// Called once at startup; the result is pinned for the whole run.
    pub async fn resolve_lending_pool(&self, addresses_provider: Address) -> Result<Address> {
        let registry = ILendingPoolAddressesProvider::new(addresses_provider, self.provider.clone());
        let pool = registry
            .getLendingPool()
            .call()
            .await
            .context("getLendingPool RPC call failed")?;

        if pool == Address::ZERO {
            anyhow::bail!("addresses provider {addresses_provider} returned zero lending pool");
        }

        debug!(provider = %addresses_provider, pool = %pool, "lending pool resolved");
        Ok(pool)
    }
}

#[async_trait]
impl ProtocolReader for AaveClient {
    /// Query the LendingPool for a user's aggregate position data.
    async fn user_account_data(&self, pool: Address, user: Address) -> Result<RawAccountData> {
        let lending_pool = ILendingPool::new(pool, self.provider.clone());
        let result = lending_pool
            .getUserAccountData(user)
            .call()
            .await
            .context("getUserAccountData RPC call failed")?;

        Ok(RawAccountData {
            total_collateral_base: result.totalCollateralETH,
            total_debt_base: result.totalDebtETH,
            available_borrows_base: result.availableBorrowsETH,
            current_liquidation_threshold_bps: result.currentLiquidationThreshold,
            ltv_bps: result.ltv,
            health_factor_wad: result.healthFactor,
        })
    }

    async fn user_reserve_debt(
        &self,
        data_provider: Address,
        asset: Address,
        user: Address,
    ) -> Result<AssetDebt> {
        let dp = IProtocolDataProvider::new(data_provider, self.provider.clone());
        let result = dp
            .getUserReserveData(asset, user)
            .call()
            .await
            .context("getUserReserveData RPC call failed")?;

        let debt = AssetDebt {
            stable: result.currentStableDebt,
            variable: result.currentVariableDebt,
        };
        debug!(
            asset = %asset,
            stable = %debt.stable,
            variable = %debt.variable,
            "reserve debt"
        );
        Ok(debt)
    }

    async fn latest_round(&self, feed: Address) -> Result<RoundData> {
        let aggregator = IAggregatorV3::new(feed, self.provider.clone());

        let round_call = aggregator.latestRoundData();
        let decimals_call = aggregator.decimals();
        let (data, decimals) = tokio::try_join!(
            async {
                round_call
                    .call()
                    .await
                    .context("latestRoundData RPC call failed")
            },
            async {
                decimals_call
                    .call()
                    .await
                    .context("decimals RPC call failed")
            },
        )?;

        Ok(RoundData {
            round_id: data.roundId.to::<u128>(),
            answer: data.answer,
            started_at: data.startedAt.saturating_to::<u64>(),
            updated_at: data.updatedAt.saturating_to::<u64>(),
            answered_in_round: data.answeredInRound.to::<u128>(),
            decimals,
        })
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let erc20 = IERC20::new(token, self.provider.clone());
        erc20
            .allowance(owner, spender)
            .call()
            .await
            .with_context(|| format!("allowance RPC call failed for token {token}"))
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        let erc20 = IERC20::new(token, self.provider.clone());
        erc20
            .balanceOf(owner)
            .call()
            .await
            .with_context(|| format!("balanceOf RPC call failed for token {token}"))
    }
}
