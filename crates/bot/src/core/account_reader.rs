//! Account state reader: aggregate position, per-asset debt, wallet balance.
//!
//! Trusts a single protocol read as authoritative for its instant; no
//! reconciliation against a local ledger.

use std::sync::Arc;

use alloy::primitives::U256;
use tracing::debug;

use crate::errors::BotError;
use crate::execution::ProtocolReader;
use crate::types::fixed_point::bps_to_decimal;
use crate::types::{AssetDebt, Position, RawAccountData, TokenInfo, Wad};

use super::session::BorrowerSession;

pub struct AccountStateReader {
    reader: Arc<dyn ProtocolReader>,
}

impl AccountStateReader {
    pub fn new(reader: Arc<dyn ProtocolReader>) -> Self {
        Self { reader }
    }

    /// Fresh snapshot of the borrower's aggregate position.
    pub async fn get_position(&self, session: &BorrowerSession) -> Result<Position, BotError> {
        let network = &session.network;
        let raw = self
            .reader
            .user_account_data(network.lending_pool, session.borrower)
            .await
            .map_err(|e| BotError::AccountQueryFailed {
                reason: format!("{e:#}"),
            })?;

        let position = position_from_raw(&raw, network.unit_of_account_decimals);
        debug!(
            borrower = %session.borrower,
            collateral = %position.collateral(),
            debt = %position.debt(),
            available = %position.available_to_borrow(),
            health_factor = %position.health_factor,
            "position read"
        );
        Ok(position)
    }

    /// Outstanding stable and variable debt of one reserve.
    pub async fn get_asset_debt(
        &self,
        session: &BorrowerSession,
        asset: &TokenInfo,
    ) -> Result<AssetDebt, BotError> {
        self.reader
            .user_reserve_debt(session.network.data_provider, asset.address, session.borrower)
            .await
            .map_err(|e| BotError::AccountQueryFailed {
                reason: format!("reserve debt for {asset}: {e:#}"),
            })
    }

    /// Borrower's wallet balance of a token.
    pub async fn get_balance(
        &self,
        session: &BorrowerSession,
        token: &TokenInfo,
    ) -> Result<U256, BotError> {
        self.reader
            .balance_of(token.address, session.borrower)
            .await
            .map_err(|e| BotError::TokenQueryFailed {
                token: token.symbol.clone(),
                reason: format!("{e:#}"),
            })
    }
}

/// Convert raw `getUserAccountData` output into a `Position`.
pub fn position_from_raw(raw: &RawAccountData, decimals: u8) -> Position {
    Position {
        collateral_value: raw.total_collateral_base,
        total_debt_value: raw.total_debt_base,
        available_to_borrow_value: raw.available_borrows_base,
        liquidation_threshold: bps_to_decimal(raw.current_liquidation_threshold_bps),
        loan_to_value: bps_to_decimal(raw.ltv_bps),
        health_factor: Wad::from_raw(raw.health_factor_wad),
        decimals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{test_session, MockProtocol, ONE};
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_from_raw() {
        let raw = RawAccountData {
            total_collateral_base: U256::from(2u64) * ONE,
            total_debt_base: U256::ZERO,
            available_borrows_base: U256::from(16u64) * ONE / U256::from(10u64),
            current_liquidation_threshold_bps: U256::from(8_250u64),
            ltv_bps: U256::from(8_000u64),
            health_factor_wad: U256::MAX,
        };
        let position = position_from_raw(&raw, 18);
        assert_eq!(position.collateral(), dec!(2));
        assert_eq!(position.available_to_borrow(), dec!(1.6));
        assert_eq!(position.liquidation_threshold, dec!(0.825));
        assert_eq!(position.loan_to_value, dec!(0.8));
        assert!(position.has_capacity());
    }

    #[tokio::test]
    async fn test_get_position_reflects_ledger() {
        let mock = Arc::new(MockProtocol::new());
        let session = test_session();
        mock.set_collateral(ONE);

        let reader = AccountStateReader::new(mock.clone());
        let position = reader.get_position(&session).await.unwrap();
        assert_eq!(position.collateral_value, ONE);
        assert_eq!(position.total_debt_value, U256::ZERO);
        // 80% LTV on 1 ETH of collateral
        assert_eq!(position.available_to_borrow(), dec!(0.8));
    }

    #[tokio::test]
    async fn test_read_failure_maps_to_account_query_failed() {
        let mock = Arc::new(MockProtocol::new());
        mock.fail_reads(1);

        let reader = AccountStateReader::new(mock.clone());
        let err = reader.get_position(&test_session()).await.unwrap_err();
        assert!(matches!(err, BotError::AccountQueryFailed { .. }));
        assert!(err.is_transient());
    }
}
