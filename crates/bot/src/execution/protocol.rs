//! Collaborator seams between the workflow core and the chain.
//!
//! The core needs three things from the outside world: read account and
//! reserve state, read a price, and submit an irreversible action and learn
//! whether it was accepted. `ProtocolReader` and `ActionSubmitter` are
//! exactly those seams; `AaveClient` and `TxSubmitter` implement them
//! against a live node.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use anyhow::Result;
use async_trait::async_trait;

use crate::errors::BotError;
use crate::types::{AssetDebt, RawAccountData, RoundData};

use super::contracts::{ILendingPool, IERC20, IWETH};

/// Side-effect-free queries against the lending protocol, oracle and tokens.
#[async_trait]
pub trait ProtocolReader: Send + Sync {
    async fn user_account_data(&self, pool: Address, user: Address) -> Result<RawAccountData>;

    async fn user_reserve_debt(
        &self,
        data_provider: Address,
        asset: Address,
        user: Address,
    ) -> Result<AssetDebt>;

    async fn latest_round(&self, feed: Address) -> Result<RoundData>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;
}

/// Submits one state-changing action and blocks until it is confirmed at
/// the configured depth, reverted, or its outcome becomes unknown
/// (`BotError::TxTimeout` or `BotError::TxUnknown`).
#[async_trait]
pub trait ActionSubmitter: Send + Sync {
    async fn submit(&self, action: &ChainAction) -> Result<Confirmation, BotError>;

    /// Settle a nonce whose transaction has an unknown outcome.
    ///
    /// Returns once a transaction at `nonce` is mined: either the original
    /// or a zero-value replacement. After `Ok`, the original can no longer
    /// land, so its effect is either visible to reads or never will be.
    async fn release_nonce(&self, nonce: u64) -> Result<(), BotError>;
}

/// Proof that a submission was accepted and is visible to later reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
}

/// Every irreversible action the workflow can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainAction {
    /// Wrap native asset into the wrapped token.
    Wrap { token: Address, amount: U256 },
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    Deposit {
        pool: Address,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
        referral_code: u16,
    },
    Borrow {
        pool: Address,
        asset: Address,
        amount: U256,
        interest_rate_mode: u8,
        referral_code: u16,
        on_behalf_of: Address,
    },
    Repay {
        pool: Address,
        asset: Address,
        amount: U256,
        interest_rate_mode: u8,
        on_behalf_of: Address,
    },
}

/// A fully encoded call: target, attached native value, calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCall {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

impl ChainAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Wrap { .. } => "wrap",
            Self::Approve { .. } => "approve",
            Self::Deposit { .. } => "deposit",
            Self::Borrow { .. } => "borrow",
            Self::Repay { .. } => "repay",
        }
    }

    /// Encode calldata with the compile-time ABI bindings.
    pub fn encode(&self) -> EncodedCall {
        match *self {
            Self::Wrap { token, amount } => EncodedCall {
                to: token,
                value: amount,
                input: Bytes::from(IWETH::depositCall {}.abi_encode()),
            },
            Self::Approve {
                token,
                spender,
                amount,
            } => EncodedCall {
                to: token,
                value: U256::ZERO,
                input: Bytes::from(IERC20::approveCall { spender, amount }.abi_encode()),
            },
            Self::Deposit {
                pool,
                asset,
                amount,
                on_behalf_of,
                referral_code,
            } => {
                let call = ILendingPool::depositCall {
                    asset,
                    amount,
                    onBehalfOf: on_behalf_of,
                    referralCode: referral_code,
                };
                EncodedCall {
                    to: pool,
                    value: U256::ZERO,
                    input: Bytes::from(call.abi_encode()),
                }
            }
            Self::Borrow {
                pool,
                asset,
                amount,
                interest_rate_mode,
                referral_code,
                on_behalf_of,
            } => {
                let call = ILendingPool::borrowCall {
                    asset,
                    amount,
                    interestRateMode: U256::from(interest_rate_mode),
                    referralCode: referral_code,
                    onBehalfOf: on_behalf_of,
                };
                EncodedCall {
                    to: pool,
                    value: U256::ZERO,
                    input: Bytes::from(call.abi_encode()),
                }
            }
            Self::Repay {
                pool,
                asset,
                amount,
                interest_rate_mode,
                on_behalf_of,
            } => {
                let call = ILendingPool::repayCall {
                    asset,
                    amount,
                    rateMode: U256::from(interest_rate_mode),
                    onBehalfOf: on_behalf_of,
                };
                EncodedCall {
                    to: pool,
                    value: U256::ZERO,
                    input: Bytes::from(call.abi_encode()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const POOL: Address = address!("7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9");
    const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
    const DAI: Address = address!("6B175474E89094C44Da98b954EedeAC495271d0F");
    const USER: Address = address!("0000000000000000000000000000000000000001");

    #[test]
    fn test_encode_wrap_attaches_value() {
        let amount = U256::from(1_000_000_000_000_000_000u128);
        let call = ChainAction::Wrap { token: WETH, amount }.encode();
        assert_eq!(call.to, WETH);
        assert_eq!(call.value, amount);
        // WETH.deposit() selector = 0xd0e30db0
        assert_eq!(call.input.as_ref(), &[0xd0, 0xe3, 0x0d, 0xb0]);
    }

    #[test]
    fn test_encode_approve_selector() {
        let call = ChainAction::Approve {
            token: WETH,
            spender: POOL,
            amount: U256::from(1u64),
        }
        .encode();
        // approve(address,uint256) selector = 0x095ea7b3
        assert_eq!(&call.input[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(call.value, U256::ZERO);
    }

    #[test]
    fn test_encode_deposit_selector() {
        let call = ChainAction::Deposit {
            pool: POOL,
            asset: WETH,
            amount: U256::from(1u64),
            on_behalf_of: USER,
            referral_code: 0,
        }
        .encode();
        // LendingPool.deposit(address,uint256,address,uint16) selector = 0xe8eda9df
        assert_eq!(&call.input[..4], &[0xe8, 0xed, 0xa9, 0xdf]);
        assert_eq!(call.to, POOL);
    }

    #[test]
    fn test_encode_borrow_selector() {
        let call = ChainAction::Borrow {
            pool: POOL,
            asset: DAI,
            amount: U256::from(1u64),
            interest_rate_mode: 2,
            referral_code: 0,
            on_behalf_of: USER,
        }
        .encode();
        // LendingPool.borrow(address,uint256,uint256,uint16,address) selector = 0xa415bcad
        assert_eq!(&call.input[..4], &[0xa4, 0x15, 0xbc, 0xad]);
    }

    #[test]
    fn test_encode_repay_roundtrip() {
        let amount = U256::from(250_000_000_000_000_000_000u128);
        let call = ChainAction::Repay {
            pool: POOL,
            asset: DAI,
            amount,
            interest_rate_mode: 1,
            on_behalf_of: USER,
        }
        .encode();
        // LendingPool.repay(address,uint256,uint256,address) selector = 0x573ade81
        assert_eq!(&call.input[..4], &[0x57, 0x3a, 0xde, 0x81]);

        let decoded = ILendingPool::repayCall::abi_decode(&call.input).unwrap();
        assert_eq!(decoded.asset, DAI);
        assert_eq!(decoded.amount, amount);
        assert_eq!(decoded.rateMode, U256::from(1u64));
        assert_eq!(decoded.onBehalfOf, USER);
    }
}
