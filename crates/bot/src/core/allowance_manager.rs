//! Allowance manager: make sure a spender may pull `required` of a token.
//!
//! Approves exactly the required amount, never an unbounded allowance.
//! Tokens that refuse to move a nonzero allowance to another nonzero value
//! are handled with a reset-to-zero first, either because the token is
//! flagged `requires_zero_reset` or because a direct raise was rejected
//! while a nonzero allowance was outstanding.

use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::BotError;
use crate::execution::{ActionSubmitter, ChainAction, ProtocolReader};
use crate::types::{Allowance, AllowanceOutcome, TokenInfo};

use super::retry::{retry_read, RetryPolicy};

pub struct AllowanceManager {
    reader: Arc<dyn ProtocolReader>,
    submitter: Arc<dyn ActionSubmitter>,
    retry: RetryPolicy,
}

impl AllowanceManager {
    pub fn new(
        reader: Arc<dyn ProtocolReader>,
        submitter: Arc<dyn ActionSubmitter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            reader,
            submitter,
            retry,
        }
    }

    pub async fn get_allowance(
        &self,
        owner: Address,
        spender: Address,
        token: &TokenInfo,
    ) -> Result<Allowance, BotError> {
        let reader = &self.reader;
        let approved_amount = retry_read(&self.retry, "allowance", move || async move {
            reader
                .allowance(token.address, owner, spender)
                .await
                .map_err(|e| BotError::TokenQueryFailed {
                    token: token.symbol.clone(),
                    reason: format!("{e:#}"),
                })
        })
        .await?;

        Ok(Allowance {
            owner,
            spender,
            asset: token.address,
            approved_amount,
        })
    }

    /// Ensure `spender` may move at least `required` of `token` from `owner`.
    ///
    /// Idempotent: a second call with the same amount finds the allowance
    /// already sufficient and submits nothing.
    pub async fn ensure_allowance(
        &self,
        owner: Address,
        spender: Address,
        token: &TokenInfo,
        required: U256,
        cancel: &CancellationToken,
    ) -> Result<AllowanceOutcome, BotError> {
        let current = self.get_allowance(owner, spender, token).await?;
        if current.covers(required) {
            return Ok(AllowanceOutcome::AlreadySufficient);
        }

        let outcome = if !current.approved_amount.is_zero() && token.requires_zero_reset {
            self.reset_and_raise(owner, spender, token, required, cancel)
                .await?
        } else {
            match self
                .approve(owner, spender, token, required, cancel)
                .await
            {
                Ok(tx_hash) => AllowanceOutcome::Approved { tx_hash },
                Err(BotError::Cancelled) => return Err(BotError::Cancelled),
                Err(e) if !current.approved_amount.is_zero() => {
                    warn!(
                        token = %token,
                        current = %current.approved_amount,
                        error = %e,
                        "direct allowance raise rejected, retrying via reset to zero"
                    );
                    self.reset_and_raise(owner, spender, token, required, cancel)
                        .await?
                }
                Err(e) => return Err(approval_failed(token, spender, &e)),
            }
        };

        let after = self.get_allowance(owner, spender, token).await?;
        if !after.covers(required) {
            return Err(BotError::ApprovalFailed {
                token: token.symbol.clone(),
                spender: spender.to_string(),
                reason: format!(
                    "allowance {} still below required {required} after approval",
                    after.approved_amount
                ),
            });
        }

        info!(token = %token, spender = %spender, amount = %required, ?outcome, "allowance ensured");
        Ok(outcome)
    }

    async fn reset_and_raise(
        &self,
        owner: Address,
        spender: Address,
        token: &TokenInfo,
        required: U256,
        cancel: &CancellationToken,
    ) -> Result<AllowanceOutcome, BotError> {
        let reset_tx = self
            .approve(owner, spender, token, U256::ZERO, cancel)
            .await
            .map_err(|e| approval_failed(token, spender, &e))?;
        let tx_hash = self
            .approve(owner, spender, token, required, cancel)
            .await
            .map_err(|e| approval_failed(token, spender, &e))?;
        Ok(AllowanceOutcome::ResetAndApproved { reset_tx, tx_hash })
    }

    /// Submit one approval. An unknown outcome is resolved by re-reading the
    /// allowance, settling the nonce if needed and re-reading again; the
    /// approval counts only if the allowance now equals `amount`.
    async fn approve(
        &self,
        owner: Address,
        spender: Address,
        token: &TokenInfo,
        amount: U256,
        cancel: &CancellationToken,
    ) -> Result<Option<B256>, BotError> {
        if cancel.is_cancelled() {
            return Err(BotError::Cancelled);
        }

        let action = ChainAction::Approve {
            token: token.address,
            spender,
            amount,
        };
        match self.submitter.submit(&action).await {
            Ok(confirmation) => Ok(Some(confirmation.tx_hash)),
            Err(e) if e.is_unknown_outcome() => {
                let mut observed = self.get_allowance(owner, spender, token).await?;
                if observed.approved_amount != amount {
                    if let Some(nonce) = e.pending_nonce() {
                        self.submitter.release_nonce(nonce).await?;
                        observed = self.get_allowance(owner, spender, token).await?;
                    }
                }
                if observed.approved_amount == amount {
                    warn!(token = %token, amount = %amount, "approval outcome inferred from allowance");
                    Ok(None)
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }
}

fn approval_failed(token: &TokenInfo, spender: Address, source: &BotError) -> BotError {
    match source {
        BotError::Cancelled => BotError::Cancelled,
        other => BotError::ApprovalFailed {
            token: token.symbol.clone(),
            spender: spender.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{test_network, MockProtocol, Outcome, ONE};
    use crate::types::WorkflowStep;

    fn manager(mock: &Arc<MockProtocol>) -> AllowanceManager {
        AllowanceManager::new(mock.clone(), mock.clone(), RetryPolicy::none())
    }

    fn usdt() -> TokenInfo {
        TokenInfo {
            symbol: "USDT".into(),
            address: Address::repeat_byte(0xdd),
            decimals: 6,
            requires_zero_reset: true,
        }
    }

    #[tokio::test]
    async fn test_approves_exact_amount_once() {
        let mock = Arc::new(MockProtocol::new());
        let network = test_network();
        let owner = mock.borrower();
        let cancel = CancellationToken::new();
        let mgr = manager(&mock);

        let first = mgr
            .ensure_allowance(owner, network.lending_pool, &network.collateral, ONE, &cancel)
            .await
            .unwrap();
        assert!(matches!(first, AllowanceOutcome::Approved { tx_hash: Some(_) }));

        let second = mgr
            .ensure_allowance(owner, network.lending_pool, &network.collateral, ONE, &cancel)
            .await
            .unwrap();
        assert_eq!(second, AllowanceOutcome::AlreadySufficient);

        assert_eq!(mock.submissions(WorkflowStep::ApproveSpend), 1);
        assert_eq!(
            mock.allowance_of(network.collateral.address, network.lending_pool),
            ONE
        );
    }

    #[tokio::test]
    async fn test_zero_reset_token_goes_through_zero() {
        let mock = Arc::new(MockProtocol::new());
        let spender = test_network().lending_pool;
        let token = usdt();
        mock.set_allowance(token.address, spender, U256::from(5u64));

        let outcome = manager(&mock)
            .ensure_allowance(
                mock.borrower(),
                spender,
                &token,
                U256::from(100u64),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, AllowanceOutcome::ResetAndApproved { .. }));
        assert_eq!(outcome.submissions().len(), 2);
        assert_eq!(mock.approvals_issued(), vec![U256::ZERO, U256::from(100u64)]);
    }

    #[tokio::test]
    async fn test_rejected_raise_falls_back_to_reset() {
        let mock = Arc::new(MockProtocol::new());
        let network = test_network();
        let spender = network.lending_pool;
        // Not flagged, but the token enforces the zero-first rule anyway.
        mock.enforce_zero_reset(network.collateral.address);
        mock.set_allowance(network.collateral.address, spender, U256::from(5u64));

        let outcome = manager(&mock)
            .ensure_allowance(
                mock.borrower(),
                spender,
                &network.collateral,
                ONE,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, AllowanceOutcome::ResetAndApproved { .. }));
        assert_eq!(mock.allowance_of(network.collateral.address, spender), ONE);
    }

    #[tokio::test]
    async fn test_rejected_approval_fails() {
        let mock = Arc::new(MockProtocol::new());
        let network = test_network();
        mock.script(WorkflowStep::ApproveSpend, Outcome::Reject);

        let err = manager(&mock)
            .ensure_allowance(
                mock.borrower(),
                network.lending_pool,
                &network.collateral,
                ONE,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::ApprovalFailed { .. }));
    }

    #[tokio::test]
    async fn test_timed_out_approval_inferred_from_allowance() {
        let mock = Arc::new(MockProtocol::new());
        let network = test_network();
        mock.script(WorkflowStep::ApproveSpend, Outcome::TimeoutApplied);

        let outcome = manager(&mock)
            .ensure_allowance(
                mock.borrower(),
                network.lending_pool,
                &network.collateral,
                ONE,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, AllowanceOutcome::Approved { tx_hash: None });
    }

    #[tokio::test]
    async fn test_late_approval_inferred_once_nonce_settles() {
        let mock = Arc::new(MockProtocol::new());
        let network = test_network();
        mock.script(WorkflowStep::ApproveSpend, Outcome::TimeoutLandsLate);

        let outcome = manager(&mock)
            .ensure_allowance(
                mock.borrower(),
                network.lending_pool,
                &network.collateral,
                ONE,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, AllowanceOutcome::Approved { tx_hash: None });
        assert_eq!(mock.released_nonces(), vec![0]);
        assert_eq!(mock.submissions(WorkflowStep::ApproveSpend), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_submission() {
        let mock = Arc::new(MockProtocol::new());
        let network = test_network();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager(&mock)
            .ensure_allowance(
                mock.borrower(),
                network.lending_pool,
                &network.collateral,
                ONE,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Cancelled));
        assert_eq!(mock.submissions(WorkflowStep::ApproveSpend), 0);
    }
}
