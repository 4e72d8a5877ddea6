//! In-memory lending ledger implementing both collaborator traits.
//!
//! Models one borrower against one pool: native balance, token balances,
//! allowances, collateral, per-asset debt, and a single price feed
//! (borrow asset priced in the unit of account). Submissions can be
//! scripted per step to reject, to time out with or without effect, to
//! lose the send reply, or to land only once its nonce is released.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use alloy::primitives::{address, Address, B256, I256, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::constants::{
    AAVE_V2_PROTOCOL_DATA_PROVIDER, CHAINLINK_DAI_ETH, TOKEN_DAI, TOKEN_WETH,
};
use crate::errors::BotError;
use crate::execution::{ActionSubmitter, ChainAction, Confirmation, ProtocolReader};
use crate::types::{AssetDebt, RawAccountData, RoundData, TokenInfo, WorkflowStep};

use super::price_oracle::system_clock;
use super::session::{BorrowerSession, NetworkProfile};

/// 1e18.
pub const ONE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

pub const TEST_POOL: Address = address!("7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9");
pub const TEST_BORROWER: Address = address!("b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0");

/// 1 DAI = 0.0005 ETH.
pub const DAI_ETH_RATE: U256 = U256::from_limbs([500_000_000_000_000, 0, 0, 0]);

pub fn test_network() -> NetworkProfile {
    NetworkProfile {
        chain_id: 31337,
        chain_name: "test".into(),
        lending_pool: TEST_POOL,
        data_provider: AAVE_V2_PROTOCOL_DATA_PROVIDER,
        collateral: TokenInfo {
            symbol: "WETH".into(),
            address: TOKEN_WETH,
            decimals: 18,
            requires_zero_reset: false,
        },
        borrow: TokenInfo {
            symbol: "DAI".into(),
            address: TOKEN_DAI,
            decimals: 18,
            requires_zero_reset: false,
        },
        price_feed: CHAINLINK_DAI_ETH,
        unit_of_account: "ETH".into(),
        unit_of_account_decimals: 18,
    }
}

pub fn test_session() -> BorrowerSession {
    BorrowerSession::new(TEST_BORROWER, test_network())
}

/// Scripted result for the next submission of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Rejected by the chain; no effect.
    Reject,
    /// Applied, but confirmation timed out.
    TimeoutApplied,
    /// Never landed, and confirmation timed out.
    TimeoutDropped,
    /// Confirmation timed out while still pending; lands when its nonce is
    /// released.
    TimeoutLandsLate,
    /// Pending, and its nonce cannot be settled in time.
    TimeoutStuck,
    /// Applied, but the send reply was lost in transport.
    SendLostApplied,
}

struct Ledger {
    native: U256,
    balances: HashMap<Address, U256>,
    /// (token, spender) → allowance granted by the borrower.
    allowances: HashMap<(Address, Address), U256>,
    /// Collateral is the wrapped native token, valued 1:1.
    collateral: U256,
    debts: HashMap<Address, AssetDebt>,
    ltv_bps: u64,
    liquidation_threshold_bps: u64,
    round: RoundData,
    zero_reset_tokens: HashSet<Address>,
    scripts: HashMap<WorkflowStep, VecDeque<Outcome>>,
    failing_reads: u32,
    repay_cap: Option<U256>,
    submitted: Vec<(WorkflowStep, ChainAction)>,
    block: u64,
    nonce: u64,
    /// Unresolved transactions by nonce; `None` never settles.
    pending: HashMap<u64, Option<ChainAction>>,
    released: Vec<u64>,
}

pub struct MockProtocol {
    ledger: Mutex<Ledger>,
}

impl Default for MockProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProtocol {
    /// Borrower with 10 native units, nothing wrapped or deposited, and a
    /// fresh DAI/ETH round.
    pub fn new() -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                native: U256::from(10u64) * ONE,
                balances: HashMap::new(),
                allowances: HashMap::new(),
                collateral: U256::ZERO,
                debts: HashMap::new(),
                ltv_bps: 8_000,
                liquidation_threshold_bps: 8_250,
                round: RoundData {
                    round_id: 1,
                    answer: I256::from_raw(DAI_ETH_RATE),
                    started_at: system_clock(),
                    updated_at: system_clock(),
                    answered_in_round: 1,
                    decimals: 18,
                },
                zero_reset_tokens: HashSet::new(),
                scripts: HashMap::new(),
                failing_reads: 0,
                repay_cap: None,
                submitted: Vec::new(),
                block: 100,
                nonce: 0,
                pending: HashMap::new(),
                released: Vec::new(),
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        let mut guard = self.ledger.lock().unwrap();
        f(&mut guard)
    }

    pub fn borrower(&self) -> Address {
        TEST_BORROWER
    }

    // -- setup ---------------------------------------------------------------

    pub fn set_collateral(&self, amount: U256) {
        self.with(|l| l.collateral = amount);
    }

    pub fn set_balance(&self, token: Address, amount: U256) {
        self.with(|l| {
            l.balances.insert(token, amount);
        });
    }

    pub fn set_debt(&self, asset: Address, debt: AssetDebt) {
        self.with(|l| {
            l.debts.insert(asset, debt);
        });
    }

    pub fn set_allowance(&self, token: Address, spender: Address, amount: U256) {
        self.with(|l| {
            l.allowances.insert((token, spender), amount);
        });
    }

    pub fn set_round(&self, answer: I256, updated_at: u64, decimals: u8) {
        self.with(|l| {
            l.round = RoundData {
                round_id: 2,
                answer,
                started_at: updated_at,
                updated_at,
                answered_in_round: 2,
                decimals,
            };
        });
    }

    /// The token reverts a nonzero → nonzero allowance change.
    pub fn enforce_zero_reset(&self, token: Address) {
        self.with(|l| {
            l.zero_reset_tokens.insert(token);
        });
    }

    /// Fail the next `n` reads of any kind.
    pub fn fail_reads(&self, n: u32) {
        self.with(|l| l.failing_reads = n);
    }

    /// Each repay closes at most `cap`, mimicking partial fills.
    pub fn set_repay_cap(&self, cap: U256) {
        self.with(|l| l.repay_cap = Some(cap));
    }

    pub fn script(&self, step: WorkflowStep, outcome: Outcome) {
        self.with(|l| l.scripts.entry(step).or_default().push_back(outcome));
    }

    // -- inspection ----------------------------------------------------------

    pub fn submissions(&self, step: WorkflowStep) -> usize {
        self.with(|l| l.submitted.iter().filter(|(s, _)| *s == step).count())
    }

    /// Nonces handed to `release_nonce`, in order.
    pub fn released_nonces(&self) -> Vec<u64> {
        self.with(|l| l.released.clone())
    }

    pub fn approvals_issued(&self) -> Vec<U256> {
        self.with(|l| {
            l.submitted
                .iter()
                .filter_map(|(_, action)| match action {
                    ChainAction::Approve { amount, .. } => Some(*amount),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn allowance_of(&self, token: Address, spender: Address) -> U256 {
        self.with(|l| l.allowances.get(&(token, spender)).copied().unwrap_or_default())
    }

    pub fn balance(&self, token: Address) -> U256 {
        self.with(|l| l.balances.get(&token).copied().unwrap_or_default())
    }

    pub fn collateral(&self) -> U256 {
        self.with(|l| l.collateral)
    }

    pub fn debt_of(&self, asset: Address) -> AssetDebt {
        self.with(|l| l.debts.get(&asset).copied().unwrap_or_default())
    }

    fn check_read(&self) -> Result<()> {
        self.with(|l| {
            if l.failing_reads > 0 {
                l.failing_reads -= 1;
                Err(anyhow!("injected read failure"))
            } else {
                Ok(())
            }
        })
    }
}

fn step_of(action: &ChainAction) -> WorkflowStep {
    match action {
        ChainAction::Wrap { .. } => WorkflowStep::WrapBase,
        ChainAction::Approve { .. } => WorkflowStep::ApproveSpend,
        ChainAction::Deposit { .. } => WorkflowStep::Deposit,
        ChainAction::Borrow { .. } => WorkflowStep::Borrow,
        ChainAction::Repay { .. } => WorkflowStep::Repay,
    }
}

impl Ledger {
    fn debt_value(&self) -> U256 {
        let rate = self.round.answer.into_raw();
        self.debts
            .values()
            .map(|d| d.total() * rate / ONE)
            .fold(U256::ZERO, |acc, v| acc + v)
    }

    fn available(&self) -> U256 {
        let max_debt = self.collateral * U256::from(self.ltv_bps) / U256::from(10_000u64);
        max_debt.saturating_sub(self.debt_value())
    }

    fn balance_mut(&mut self, token: Address) -> &mut U256 {
        self.balances.entry(token).or_default()
    }

    fn apply(&mut self, action: &ChainAction) -> Result<(), String> {
        match *action {
            ChainAction::Wrap { token, amount } => {
                if self.native < amount {
                    return Err("insufficient native balance".into());
                }
                self.native -= amount;
                *self.balance_mut(token) += amount;
            }
            ChainAction::Approve {
                token,
                spender,
                amount,
            } => {
                let current = self.allowances.get(&(token, spender)).copied().unwrap_or_default();
                if self.zero_reset_tokens.contains(&token) && !current.is_zero() && !amount.is_zero()
                {
                    return Err("approve from non-zero to non-zero allowance".into());
                }
                self.allowances.insert((token, spender), amount);
            }
            ChainAction::Deposit {
                pool,
                asset,
                amount,
                ..
            } => {
                self.pull(asset, pool, amount)?;
                self.collateral += amount;
            }
            ChainAction::Borrow {
                asset,
                amount,
                interest_rate_mode,
                ..
            } => {
                let value = amount * self.round.answer.into_raw() / ONE;
                if value > self.available() {
                    return Err("borrow exceeds available capacity".into());
                }
                let debt = self.debts.entry(asset).or_default();
                match interest_rate_mode {
                    1 => debt.stable += amount,
                    _ => debt.variable += amount,
                }
                *self.balance_mut(asset) += amount;
            }
            ChainAction::Repay {
                pool,
                asset,
                amount,
                interest_rate_mode,
                ..
            } => {
                let outstanding = self
                    .debts
                    .get(&asset)
                    .copied()
                    .unwrap_or_default()
                    .for_mode(interest_rate_mode);
                if outstanding.is_zero() {
                    return Err("no debt of this type".into());
                }
                let mut paid = amount.min(outstanding);
                if let Some(cap) = self.repay_cap {
                    paid = paid.min(cap);
                }
                self.pull(asset, pool, paid)?;
                let debt = self.debts.entry(asset).or_default();
                match interest_rate_mode {
                    1 => debt.stable -= paid,
                    _ => debt.variable -= paid,
                }
            }
        }
        Ok(())
    }

    /// Move `amount` of `token` from the borrower to `spender`'s custody.
    fn pull(&mut self, token: Address, spender: Address, amount: U256) -> Result<(), String> {
        let allowance = self.allowances.get(&(token, spender)).copied().unwrap_or_default();
        if allowance < amount {
            return Err("transfer amount exceeds allowance".into());
        }
        let balance = self.balances.get(&token).copied().unwrap_or_default();
        if balance < amount {
            return Err("transfer amount exceeds balance".into());
        }
        self.allowances.insert((token, spender), allowance - amount);
        self.balances.insert(token, balance - amount);
        Ok(())
    }
}

#[async_trait]
impl ProtocolReader for MockProtocol {
    async fn user_account_data(&self, _pool: Address, _user: Address) -> Result<RawAccountData> {
        self.check_read()?;
        Ok(self.with(|l| {
            let debt = l.debt_value();
            let health_factor_wad = if debt.is_zero() {
                U256::MAX
            } else {
                l.collateral * U256::from(l.liquidation_threshold_bps) * ONE
                    / (U256::from(10_000u64) * debt)
            };
            RawAccountData {
                total_collateral_base: l.collateral,
                total_debt_base: debt,
                available_borrows_base: l.available(),
                current_liquidation_threshold_bps: U256::from(l.liquidation_threshold_bps),
                ltv_bps: U256::from(l.ltv_bps),
                health_factor_wad,
            }
        }))
    }

    async fn user_reserve_debt(
        &self,
        _data_provider: Address,
        asset: Address,
        _user: Address,
    ) -> Result<AssetDebt> {
        self.check_read()?;
        Ok(self.debt_of(asset))
    }

    async fn latest_round(&self, _feed: Address) -> Result<RoundData> {
        self.check_read()?;
        Ok(self.with(|l| l.round.clone()))
    }

    async fn allowance(&self, token: Address, _owner: Address, spender: Address) -> Result<U256> {
        self.check_read()?;
        Ok(self.allowance_of(token, spender))
    }

    async fn balance_of(&self, token: Address, _owner: Address) -> Result<U256> {
        self.check_read()?;
        Ok(self.balance(token))
    }
}

#[async_trait]
impl ActionSubmitter for MockProtocol {
    async fn submit(&self, action: &ChainAction) -> Result<Confirmation, BotError> {
        let step = step_of(action);
        self.with(|l| {
            l.submitted.push((step, action.clone()));
            l.block += 1;
            let nonce = l.nonce;
            l.nonce += 1;
            let tx_hash = B256::left_padding_from(&l.block.to_be_bytes());
            let scripted = l.scripts.get_mut(&step).and_then(|q| q.pop_front());

            let timeout = || BotError::TxTimeout {
                tx_hash: tx_hash.to_string(),
                nonce,
                timeout_seconds: 180,
            };
            match scripted {
                Some(Outcome::Reject) => Err(BotError::TxReverted {
                    tx_hash: tx_hash.to_string(),
                    reason: "scripted rejection".into(),
                }),
                Some(Outcome::TimeoutDropped) => Err(timeout()),
                Some(Outcome::TimeoutApplied) => {
                    l.apply(action).map_err(|reason| BotError::TxReverted {
                        tx_hash: tx_hash.to_string(),
                        reason,
                    })?;
                    Err(timeout())
                }
                Some(Outcome::TimeoutLandsLate) => {
                    l.pending.insert(nonce, Some(action.clone()));
                    Err(timeout())
                }
                Some(Outcome::TimeoutStuck) => {
                    l.pending.insert(nonce, None);
                    Err(timeout())
                }
                Some(Outcome::SendLostApplied) => {
                    l.apply(action).map_err(|reason| BotError::TxReverted {
                        tx_hash: tx_hash.to_string(),
                        reason,
                    })?;
                    Err(BotError::TxUnknown {
                        tx_hash: tx_hash.to_string(),
                        nonce,
                        reason: "connection reset by peer".into(),
                    })
                }
                None => {
                    l.apply(action).map_err(|reason| BotError::TxReverted {
                        tx_hash: tx_hash.to_string(),
                        reason,
                    })?;
                    Ok(Confirmation {
                        tx_hash,
                        block_number: l.block,
                        gas_used: 100_000,
                    })
                }
            }
        })
    }

    /// A late original wins the race against the replacement.
    async fn release_nonce(&self, nonce: u64) -> Result<(), BotError> {
        self.with(|l| {
            l.released.push(nonce);
            match l.pending.remove(&nonce) {
                Some(Some(action)) => {
                    l.block += 1;
                    l.apply(&action).map_err(|reason| BotError::TxReverted {
                        tx_hash: String::new(),
                        reason,
                    })
                }
                Some(None) => {
                    l.pending.insert(nonce, None);
                    Err(BotError::TxTimeout {
                        tx_hash: String::new(),
                        nonce,
                        timeout_seconds: 180,
                    })
                }
                None => Ok(()),
            }
        })
    }
}
