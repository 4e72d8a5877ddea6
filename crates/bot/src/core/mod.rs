pub mod account_reader;
pub mod allowance_manager;
pub mod amount_planner;
pub mod price_oracle;
pub mod retry;
pub mod session;
pub mod workflow;

#[cfg(test)]
pub mod testing;
