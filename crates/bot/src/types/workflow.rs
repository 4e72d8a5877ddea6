use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::plan::{BorrowPlan, RepayPlan};
use super::position::Position;
use super::quote::PriceQuote;

/// One action of the borrow cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    WrapBase,
    ApproveSpend,
    Deposit,
    ReadPosition,
    QuotePrice,
    PlanBorrow,
    Borrow,
    Repay,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrapBase => "wrap_base",
            Self::ApproveSpend => "approve_spend",
            Self::Deposit => "deposit",
            Self::ReadPosition => "read_position",
            Self::QuotePrice => "quote_price",
            Self::PlanBorrow => "plan_borrow",
            Self::Borrow => "borrow",
            Self::Repay => "repay",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow states, in strict order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    Wrapped,
    Collateralized,
    PositionRead,
    Priced,
    Planned,
    Borrowed,
    Repaid,
    Done,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Wrapped => "wrapped",
            Self::Collateralized => "collateralized",
            Self::PositionRead => "position_read",
            Self::Priced => "priced",
            Self::Planned => "planned",
            Self::Borrowed => "borrowed",
            Self::Repaid => "repaid",
            Self::Done => "done",
        }
    }

    /// The submission step whose confirmation produced this state, if any.
    /// Read-phase states carry no on-chain effect of their own.
    pub fn confirmed_by(&self) -> Option<WorkflowStep> {
        match self {
            Self::Idle => None,
            Self::Wrapped => Some(WorkflowStep::WrapBase),
            Self::Collateralized | Self::PositionRead | Self::Priced | Self::Planned => {
                Some(WorkflowStep::Deposit)
            }
            Self::Borrowed => Some(WorkflowStep::Borrow),
            Self::Repaid | Self::Done => Some(WorkflowStep::Repay),
        }
    }

    /// The last state reached by a confirmed submission. Read-phase states
    /// collapse to `Collateralized` since their snapshots are not durable.
    pub fn last_confirmed(&self) -> WorkflowState {
        match self {
            Self::PositionRead | Self::Priced | Self::Planned => Self::Collateralized,
            other => *other,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "wrapped" => Ok(Self::Wrapped),
            "collateralized" => Ok(Self::Collateralized),
            "position_read" => Ok(Self::PositionRead),
            "priced" => Ok(Self::Priced),
            "planned" => Ok(Self::Planned),
            "borrowed" => Ok(Self::Borrowed),
            "repaid" => Ok(Self::Repaid),
            "done" => Ok(Self::Done),
            other => Err(format!("unknown workflow state: {other}")),
        }
    }
}

/// A confirmed submission recorded by the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: WorkflowStep,
    pub tx_hash: Option<B256>,
    /// Confirmed by re-reading state after an unknown outcome.
    pub inferred: bool,
}

/// Everything a workflow run observed, in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowReport {
    pub started_from: Option<WorkflowState>,
    pub final_state: Option<WorkflowState>,
    pub submissions: Vec<StepRecord>,
    pub positions: Vec<Position>,
    pub quote: Option<PriceQuote>,
    pub plan: Option<BorrowPlan>,
    pub repayments: Vec<RepayPlan>,
}

impl WorkflowReport {
    pub fn starting_at(state: WorkflowState) -> Self {
        Self {
            started_from: Some(state),
            ..Self::default()
        }
    }

    pub fn latest_position(&self) -> Option<&Position> {
        self.positions.last()
    }

    pub fn submission_count(&self, step: WorkflowStep) -> usize {
        self.submissions.iter().filter(|s| s.step == step).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_are_ordered() {
        assert!(WorkflowState::Idle < WorkflowState::Wrapped);
        assert!(WorkflowState::Planned < WorkflowState::Borrowed);
        assert!(WorkflowState::Repaid < WorkflowState::Done);
    }

    #[test]
    fn test_state_parse_roundtrip() {
        for state in [
            WorkflowState::Idle,
            WorkflowState::Collateralized,
            WorkflowState::PositionRead,
            WorkflowState::Borrowed,
        ] {
            assert_eq!(state.as_str().parse::<WorkflowState>().unwrap(), state);
        }
        assert!("halfway".parse::<WorkflowState>().is_err());
    }

    #[test]
    fn test_read_states_collapse_to_collateralized() {
        assert_eq!(
            WorkflowState::Planned.last_confirmed(),
            WorkflowState::Collateralized
        );
        assert_eq!(WorkflowState::Borrowed.last_confirmed(), WorkflowState::Borrowed);
        assert_eq!(WorkflowState::Idle.confirmed_by(), None);
    }
}
