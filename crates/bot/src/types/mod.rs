pub mod aave;
pub mod allowance;
pub mod fixed_point;
pub mod plan;
pub mod position;
pub mod quote;
pub mod token;
pub mod workflow;

pub use aave::{AssetDebt, RawAccountData};
pub use allowance::{Allowance, AllowanceOutcome};
pub use fixed_point::Wad;
pub use plan::{BorrowPlan, RepayPlan, RepayRequest};
pub use position::Position;
pub use quote::{PriceQuote, RoundData};
pub use token::TokenInfo;
pub use workflow::{StepRecord, WorkflowReport, WorkflowState, WorkflowStep};
