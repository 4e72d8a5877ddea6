//! Position workflow: the borrow cycle as an explicit state machine.
//!
//! `Idle → Wrapped → Collateralized → PositionRead → Priced → Planned →
//! Borrowed → Repaid → Done`. Each submission blocks until confirmed; the
//! state only advances on a confirmed effect. Every failure carries the
//! failing step and the last confirmed state so a caller can resume with
//! [`PositionWorkflow::run_from`].
//!
//! Key rules:
//! - Reads retry on transient errors with bounded backoff; nothing else
//!   is retried.
//! - A submission whose outcome is unknown is never resubmitted. The state
//!   it should have changed is re-read; a visible effect counts as
//!   confirmed, otherwise the step fails.
//! - Cancellation is honoured only before a submission is issued.
//! - Position and price are read concurrently. The pair is not an atomic
//!   snapshot; the gap between the two reads is accepted as bounded
//!   staleness.

use std::sync::Arc;

use alloy::primitives::{B256, U256};
use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{RepayPolicy, WorkflowConfig};
use crate::errors::{BotError, WorkflowError};
use crate::execution::{ActionSubmitter, ChainAction, ProtocolReader};
use crate::types::fixed_point::{decimal_to_units, units_to_decimal};
use crate::types::{
    AllowanceOutcome, Position, PriceQuote, RepayRequest, StepRecord, WorkflowReport,
    WorkflowState, WorkflowStep,
};

use super::account_reader::AccountStateReader;
use super::allowance_manager::AllowanceManager;
use super::amount_planner::{plan_borrow, plan_repay};
use super::price_oracle::PriceOracleClient;
use super::retry::{retry_read, RetryPolicy};
use super::session::{BorrowerSession, NetworkProfile};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Workflow parameters in raw on-chain units, resolved against a network.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    /// Native amount to wrap and deposit, in collateral token units.
    pub wrap_amount: U256,
    pub utilization_fraction: Decimal,
    pub interest_rate_mode: u8,
    pub referral_code: u16,
    pub repay: RepayPolicy,
    /// Outstanding debt at or below this (borrow token units) counts as repaid.
    pub repay_dust: U256,
    pub max_repay_rounds: u32,
    pub min_health_factor: Option<Decimal>,
}

impl WorkflowSettings {
    pub fn from_config(config: &WorkflowConfig, network: &NetworkProfile) -> Result<Self> {
        let wrap_amount = decimal_to_units(config.wrap_amount, network.collateral.decimals)
            .ok_or_else(|| anyhow!("wrap_amount {} not representable", config.wrap_amount))?;
        let repay_dust = decimal_to_units(config.repay_dust, network.borrow.decimals)
            .ok_or_else(|| anyhow!("repay_dust {} not representable", config.repay_dust))?;

        Ok(Self {
            wrap_amount,
            utilization_fraction: config.utilization_fraction,
            interest_rate_mode: config.interest_rate_mode,
            referral_code: config.referral_code,
            repay: config.repay,
            repay_dust,
            max_repay_rounds: config.max_repay_rounds,
            min_health_factor: config.min_health_factor,
        })
    }
}

// ---------------------------------------------------------------------------
// Unknown-outcome effect checks
// ---------------------------------------------------------------------------

/// State a submission should have changed, captured before submitting.
#[derive(Debug, Clone, Copy)]
enum Effect {
    /// Wallet balance of the collateral token reached `at_least`.
    CollateralBalance { at_least: U256 },
    /// Collateral value rose above `above`.
    CollateralValue { above: U256 },
    /// Borrow-asset debt (for the configured mode) reached `at_least`.
    DebtAtLeast { at_least: U256 },
    /// Borrow-asset debt dropped below `below`.
    DebtBelow { below: U256 },
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

struct Run {
    state: WorkflowState,
    report: WorkflowReport,
    /// Amount borrowed by this run, if the borrow happened in this run.
    borrowed: Option<U256>,
}

impl Run {
    fn new(start: WorkflowState) -> Self {
        Self {
            state: start.last_confirmed(),
            report: WorkflowReport::starting_at(start),
            borrowed: None,
        }
    }

    fn advance(&mut self, to: WorkflowState) {
        info!(from = %self.state, to = %to, "workflow state transition");
        self.state = to;
    }

    fn fail(&self, step: WorkflowStep, source: BotError) -> WorkflowError {
        WorkflowError::new(step, self.state.last_confirmed(), source)
    }

    fn record(&mut self, step: WorkflowStep, tx_hash: Option<B256>) {
        self.report.submissions.push(StepRecord {
            step,
            tx_hash,
            inferred: tx_hash.is_none(),
        });
    }

    fn record_allowance(&mut self, outcome: AllowanceOutcome) {
        for tx_hash in outcome.submissions() {
            self.record(WorkflowStep::ApproveSpend, tx_hash);
        }
    }
}

// ---------------------------------------------------------------------------
// PositionWorkflow
// ---------------------------------------------------------------------------

pub struct PositionWorkflow {
    submitter: Arc<dyn ActionSubmitter>,
    accounts: AccountStateReader,
    oracle: PriceOracleClient,
    allowances: AllowanceManager,
    settings: WorkflowSettings,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl PositionWorkflow {
    pub fn new(
        reader: Arc<dyn ProtocolReader>,
        submitter: Arc<dyn ActionSubmitter>,
        oracle: PriceOracleClient,
        settings: WorkflowSettings,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            accounts: AccountStateReader::new(reader.clone()),
            allowances: AllowanceManager::new(reader, submitter.clone(), retry),
            submitter,
            oracle,
            settings,
            retry,
            cancel,
        }
    }

    /// Full cycle from `Idle`.
    pub async fn run(&self, session: &BorrowerSession) -> Result<WorkflowReport, WorkflowError> {
        self.run_from(session, WorkflowState::Idle).await
    }

    /// Resume from a previously reported state.
    ///
    /// Read-phase states re-read position and price, since snapshots never
    /// survive a run. Resuming from `Borrowed` sizes the first repayment
    /// from fresh debt; the `borrowed` repay policy falls back to `full`
    /// because the borrowed amount is not known to this run.
    pub async fn run_from(
        &self,
        session: &BorrowerSession,
        start: WorkflowState,
    ) -> Result<WorkflowReport, WorkflowError> {
        let mut run = Run::new(start);
        info!(
            borrower = %session.borrower,
            chain_id = session.network.chain_id,
            start = %start,
            resume_at = %run.state,
            "workflow starting"
        );

        loop {
            match run.state {
                WorkflowState::Idle => self.wrap(session, &mut run).await?,
                WorkflowState::Wrapped => self.deposit(session, &mut run).await?,
                WorkflowState::Collateralized
                | WorkflowState::PositionRead
                | WorkflowState::Priced
                | WorkflowState::Planned => self.plan_and_borrow(session, &mut run).await?,
                WorkflowState::Borrowed | WorkflowState::Repaid => {
                    self.repay(session, &mut run).await?
                }
                WorkflowState::Done => break,
            }
        }

        run.report.final_state = Some(WorkflowState::Done);
        info!(
            submissions = run.report.submissions.len(),
            repay_rounds = run.report.repayments.len(),
            "workflow done"
        );
        Ok(run.report)
    }

    /// Read position and price, and plan a borrow. Submits nothing.
    pub async fn preview(&self, session: &BorrowerSession) -> Result<WorkflowReport, BotError> {
        let mut report = WorkflowReport::starting_at(WorkflowState::Collateralized);
        let (position, quote) = self
            .read_inputs(session)
            .await
            .map_err(|(_, e)| e)?;

        let plan = plan_borrow(
            &position,
            &quote,
            &session.network.borrow,
            self.settings.utilization_fraction,
            self.settings.min_health_factor,
        )?;
        info!(
            asset = %plan.asset,
            amount = %units_to_decimal(plan.amount_in_asset_units, session.network.borrow.decimals),
            value = %units_to_decimal(plan.amount_in_unit_of_account, position.decimals),
            projected_hf = %plan.projected_health_factor.round_dp(4),
            "preview plan"
        );

        report.positions.push(position);
        report.quote = Some(quote);
        report.plan = Some(plan);
        report.final_state = Some(WorkflowState::Planned);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    /// `Idle → Wrapped`.
    async fn wrap(&self, session: &BorrowerSession, run: &mut Run) -> Result<(), WorkflowError> {
        let step = WorkflowStep::WrapBase;
        let collateral = &session.network.collateral;
        let amount = self.settings.wrap_amount;

        let before = self
            .collateral_balance(session)
            .await
            .map_err(|e| run.fail(step, e))?;
        let action = ChainAction::Wrap {
            token: collateral.address,
            amount,
        };
        let effect = Effect::CollateralBalance {
            at_least: before.saturating_add(amount),
        };
        let tx_hash = self
            .submit_step(session, step, &action, effect)
            .await
            .map_err(|e| run.fail(step, e))?;

        run.record(step, tx_hash);
        run.advance(WorkflowState::Wrapped);
        Ok(())
    }

    /// `Wrapped → Collateralized`.
    async fn deposit(&self, session: &BorrowerSession, run: &mut Run) -> Result<(), WorkflowError> {
        let network = &session.network;
        let amount = self.settings.wrap_amount;

        let outcome = self
            .allowances
            .ensure_allowance(
                session.borrower,
                network.lending_pool,
                &network.collateral,
                amount,
                &self.cancel,
            )
            .await
            .map_err(|e| run.fail(WorkflowStep::ApproveSpend, e))?;
        run.record_allowance(outcome);

        let step = WorkflowStep::Deposit;
        let before = self
            .read_position(session)
            .await
            .map_err(|e| run.fail(step, e))?;
        let action = ChainAction::Deposit {
            pool: network.lending_pool,
            asset: network.collateral.address,
            amount,
            on_behalf_of: session.borrower,
            referral_code: self.settings.referral_code,
        };
        let effect = Effect::CollateralValue {
            above: before.collateral_value,
        };
        let tx_hash = self
            .submit_step(session, step, &action, effect)
            .await
            .map_err(|e| run.fail(step, e))?;

        run.record(step, tx_hash);
        run.advance(WorkflowState::Collateralized);
        self.record_position(session, run).await
    }

    /// `Collateralized → PositionRead → Priced → Planned → Borrowed`.
    async fn plan_and_borrow(
        &self,
        session: &BorrowerSession,
        run: &mut Run,
    ) -> Result<(), WorkflowError> {
        let network = &session.network;

        let (position, quote) = self
            .read_inputs(session)
            .await
            .map_err(|(step, e)| run.fail(step, e))?;
        run.advance(WorkflowState::PositionRead);
        run.advance(WorkflowState::Priced);

        let plan = plan_borrow(
            &position,
            &quote,
            &network.borrow,
            self.settings.utilization_fraction,
            self.settings.min_health_factor,
        )
        .map_err(|e| run.fail(WorkflowStep::PlanBorrow, e))?;
        info!(
            asset = %plan.asset,
            amount = %units_to_decimal(plan.amount_in_asset_units, network.borrow.decimals),
            value = %units_to_decimal(plan.amount_in_unit_of_account, position.decimals),
            available = %position.available_to_borrow(),
            projected_hf = %plan.projected_health_factor.round_dp(4),
            "borrow planned"
        );
        run.report.positions.push(position);
        run.report.quote = Some(quote);
        run.report.plan = Some(plan.clone());
        run.advance(WorkflowState::Planned);

        let step = WorkflowStep::Borrow;
        let debt_before = self
            .read_debt(session)
            .await
            .map_err(|e| run.fail(step, e))?;
        let action = ChainAction::Borrow {
            pool: network.lending_pool,
            asset: network.borrow.address,
            amount: plan.amount_in_asset_units,
            interest_rate_mode: self.settings.interest_rate_mode,
            referral_code: self.settings.referral_code,
            on_behalf_of: session.borrower,
        };
        let effect = Effect::DebtAtLeast {
            at_least: debt_before.saturating_add(plan.amount_in_asset_units),
        };
        let tx_hash = self
            .submit_step(session, step, &action, effect)
            .await
            .map_err(|e| run.fail(step, e))?;

        run.record(step, tx_hash);
        run.borrowed = Some(plan.amount_in_asset_units);
        run.advance(WorkflowState::Borrowed);
        self.record_position(session, run).await
    }

    /// `Borrowed → Repaid → Done`. Re-reads the debt every round and stops
    /// once it is at or below the dust threshold.
    async fn repay(&self, session: &BorrowerSession, run: &mut Run) -> Result<(), WorkflowError> {
        let step = WorkflowStep::Repay;
        let network = &session.network;
        let asset = &network.borrow;
        let mut rounds: u32 = 0;

        loop {
            let outstanding = self
                .read_debt(session)
                .await
                .map_err(|e| run.fail(step, e))?;

            if outstanding <= self.settings.repay_dust {
                info!(
                    asset = %asset,
                    remaining = %units_to_decimal(outstanding, asset.decimals),
                    rounds,
                    "debt settled"
                );
                run.advance(WorkflowState::Done);
                return Ok(());
            }
            if rounds >= self.settings.max_repay_rounds {
                return Err(run.fail(
                    step,
                    BotError::RepayIncomplete {
                        remaining: units_to_decimal(outstanding, asset.decimals).to_string(),
                        rounds,
                    },
                ));
            }
            rounds += 1;

            let request = if rounds == 1 {
                self.first_repay_request(run.borrowed)
            } else {
                RepayRequest::Full
            };
            let mut plan =
                plan_repay(asset, outstanding, request).map_err(|e| run.fail(step, e))?;

            // Interest accrued since the borrow may exceed what the wallet holds.
            let balance = self
                .accounts
                .get_balance(session, asset)
                .await
                .map_err(|e| run.fail(step, e))?;
            if plan.amount > balance {
                warn!(
                    asset = %asset,
                    planned = %plan.amount,
                    balance = %balance,
                    "repay clamped to wallet balance"
                );
                plan.amount = balance;
            }
            if plan.amount.is_zero() {
                return Err(run.fail(
                    step,
                    BotError::RepayIncomplete {
                        remaining: units_to_decimal(outstanding, asset.decimals).to_string(),
                        rounds: rounds - 1,
                    },
                ));
            }

            let outcome = self
                .allowances
                .ensure_allowance(
                    session.borrower,
                    network.lending_pool,
                    asset,
                    plan.amount,
                    &self.cancel,
                )
                .await
                .map_err(|e| run.fail(WorkflowStep::ApproveSpend, e))?;
            run.record_allowance(outcome);

            let action = ChainAction::Repay {
                pool: network.lending_pool,
                asset: asset.address,
                amount: plan.amount,
                interest_rate_mode: self.settings.interest_rate_mode,
                on_behalf_of: session.borrower,
            };
            let tx_hash = self
                .submit_step(session, step, &action, Effect::DebtBelow { below: outstanding })
                .await
                .map_err(|e| run.fail(step, e))?;

            info!(
                round = rounds,
                amount = %units_to_decimal(plan.amount, asset.decimals),
                outstanding = %units_to_decimal(outstanding, asset.decimals),
                "repay confirmed"
            );
            run.record(step, tx_hash);
            run.report.repayments.push(plan);
            if run.state != WorkflowState::Repaid {
                run.advance(WorkflowState::Repaid);
            }
            self.record_position(session, run).await?;
        }
    }

    fn first_repay_request(&self, borrowed: Option<U256>) -> RepayRequest {
        match self.settings.repay {
            RepayPolicy::Full => RepayRequest::Full,
            RepayPolicy::Borrowed => borrowed.map_or(RepayRequest::Full, RepayRequest::Amount),
            RepayPolicy::Fraction { fraction } => RepayRequest::Fraction(fraction),
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Submit one action. Returns the confirmed hash, or `None` when the
    /// outcome was unknown and the effect was observed by re-reading.
    ///
    /// An unknown outcome with no visible effect is only reported as safe to
    /// retry after the submitter has settled its nonce, so the original can
    /// no longer land behind a retry.
    async fn submit_step(
        &self,
        session: &BorrowerSession,
        step: WorkflowStep,
        action: &ChainAction,
        effect: Effect,
    ) -> Result<Option<B256>, BotError> {
        if self.cancel.is_cancelled() {
            warn!(step = %step, "cancelled before submission");
            return Err(BotError::Cancelled);
        }

        info!(step = %step, action = action.name(), "submitting");
        match self.submitter.submit(action).await {
            Ok(confirmation) => {
                info!(
                    step = %step,
                    tx_hash = %confirmation.tx_hash,
                    block = confirmation.block_number,
                    gas_used = confirmation.gas_used,
                    "step confirmed"
                );
                Ok(Some(confirmation.tx_hash))
            }
            Err(e) if e.is_unknown_outcome() => {
                warn!(step = %step, error = %e, "submission outcome unknown, re-reading state");
                if self.effect_visible(session, effect).await? {
                    warn!(step = %step, "effect observed, treating step as confirmed");
                    return Ok(None);
                }
                let Some(nonce) = e.pending_nonce() else {
                    return Err(step_failed(step, e.to_string()));
                };

                warn!(step = %step, nonce, "no effect yet, settling nonce before deciding");
                if let Err(settle) = self.submitter.release_nonce(nonce).await {
                    return Err(step_failed(
                        step,
                        format!("{e}; nonce {nonce} still unresolved ({settle}), do not retry until it is mined"),
                    ));
                }
                if self.effect_visible(session, effect).await? {
                    warn!(step = %step, nonce, "effect landed before nonce settled, treating step as confirmed");
                    Ok(None)
                } else {
                    Err(step_failed(
                        step,
                        format!("{e}; no effect observed after nonce {nonce} settled, safe to retry"),
                    ))
                }
            }
            Err(e) => Err(step_failed(step, e.to_string())),
        }
    }

    async fn effect_visible(
        &self,
        session: &BorrowerSession,
        effect: Effect,
    ) -> Result<bool, BotError> {
        Ok(match effect {
            Effect::CollateralBalance { at_least } => {
                self.collateral_balance(session).await? >= at_least
            }
            Effect::CollateralValue { above } => {
                self.read_position(session).await?.collateral_value > above
            }
            Effect::DebtAtLeast { at_least } => self.read_debt(session).await? >= at_least,
            Effect::DebtBelow { below } => self.read_debt(session).await? < below,
        })
    }

    // -----------------------------------------------------------------------
    // Reads (retried)
    // -----------------------------------------------------------------------

    /// Position and price, read concurrently.
    async fn read_inputs(
        &self,
        session: &BorrowerSession,
    ) -> Result<(Position, PriceQuote), (WorkflowStep, BotError)> {
        let network = &session.network;
        let oracle = &self.oracle;
        let (position, quote) = tokio::join!(
            self.read_position(session),
            retry_read(&self.retry, "price", move || oracle.get_price(
                network,
                &network.borrow.symbol,
                &network.unit_of_account,
            )),
        );
        let position = position.map_err(|e| (WorkflowStep::ReadPosition, e))?;
        let quote = quote.map_err(|e| (WorkflowStep::QuotePrice, e))?;
        Ok((position, quote))
    }

    async fn read_position(&self, session: &BorrowerSession) -> Result<Position, BotError> {
        let accounts = &self.accounts;
        retry_read(&self.retry, "position", move || accounts.get_position(session)).await
    }

    /// Outstanding borrow-asset debt for the configured rate mode.
    async fn read_debt(&self, session: &BorrowerSession) -> Result<U256, BotError> {
        let accounts = &self.accounts;
        let mode = self.settings.interest_rate_mode;
        let debt = retry_read(&self.retry, "asset debt", move || {
            accounts.get_asset_debt(session, &session.network.borrow)
        })
        .await?;
        Ok(debt.for_mode(mode))
    }

    async fn collateral_balance(&self, session: &BorrowerSession) -> Result<U256, BotError> {
        let accounts = &self.accounts;
        retry_read(&self.retry, "collateral balance", move || {
            accounts.get_balance(session, &session.network.collateral)
        })
        .await
    }

    /// Re-read and record the position after a value-changing step.
    async fn record_position(
        &self,
        session: &BorrowerSession,
        run: &mut Run,
    ) -> Result<(), WorkflowError> {
        let position = self
            .read_position(session)
            .await
            .map_err(|e| run.fail(WorkflowStep::ReadPosition, e))?;
        info!(
            state = %run.state,
            collateral = %position.collateral(),
            debt = %position.debt(),
            available = %position.available_to_borrow(),
            health_factor = %position.health_factor,
            "position after step"
        );
        run.report.positions.push(position);
        Ok(())
    }
}

fn step_failed(step: WorkflowStep, reason: String) -> BotError {
    match step {
        WorkflowStep::WrapBase => BotError::WrapFailed { reason },
        WorkflowStep::Deposit => BotError::DepositFailed { reason },
        WorkflowStep::Borrow => BotError::BorrowFailed { reason },
        WorkflowStep::Repay => BotError::RepayFailed { reason },
        other => BotError::SimulationFailed {
            reason: format!("{other}: {reason}"),
        },
    }
}
