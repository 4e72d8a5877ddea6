pub mod aave_client;
pub mod contracts;
pub mod protocol;
pub mod tx_submitter;

pub use aave_client::{AaveClient, HttpProvider};
pub use protocol::{ActionSubmitter, ChainAction, Confirmation, EncodedCall, ProtocolReader};
pub use tx_submitter::TxSubmitter;
