//! Borrower session and the network profile it runs against.
//!
//! Both are plain values resolved once at startup and passed explicitly to
//! every component call. Nothing here is re-queried mid-workflow.

use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};

use crate::config::{ChainConfig, TokenConfig};
use crate::types::TokenInfo;

/// Addresses and token metadata for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub chain_id: u64,
    pub chain_name: String,
    /// LendingPool proxy, resolved from the addresses provider at startup.
    pub lending_pool: Address,
    pub data_provider: Address,
    pub collateral: TokenInfo,
    pub borrow: TokenInfo,
    pub price_feed: Address,
    /// Symbol the pool reports position values in (ETH on Aave V2).
    pub unit_of_account: String,
    pub unit_of_account_decimals: u8,
}

impl NetworkProfile {
    /// Build from chain config and the already-resolved lending pool.
    pub fn from_config(chain: &ChainConfig, lending_pool: Address) -> Result<Self> {
        let data_provider: Address = chain
            .contracts
            .protocol_data_provider
            .parse()
            .context("invalid protocol_data_provider address")?;
        let price_feed: Address = chain
            .price_feed
            .address
            .parse()
            .context("invalid price_feed address")?;

        Ok(Self {
            chain_id: chain.chain_id,
            chain_name: chain.chain_name.clone(),
            lending_pool,
            data_provider,
            collateral: resolve_token(chain, &chain.collateral_token)?,
            borrow: resolve_token(chain, &chain.borrow_token)?,
            price_feed,
            unit_of_account: chain.base_currency.symbol.clone(),
            unit_of_account_decimals: chain.base_currency.decimals,
        })
    }
}

/// Look up a token symbol in the chain's token table.
pub fn resolve_token(chain: &ChainConfig, symbol: &str) -> Result<TokenInfo> {
    let token: &TokenConfig = chain
        .tokens
        .get(symbol)
        .ok_or_else(|| anyhow!("token '{symbol}' not found in chain {} config", chain.chain_id))?;
    let address: Address = token
        .address
        .parse()
        .with_context(|| format!("invalid address for token '{symbol}'"))?;

    Ok(TokenInfo {
        symbol: symbol.to_string(),
        address,
        decimals: token.decimals,
        requires_zero_reset: token.requires_zero_reset,
    })
}

/// One borrower's session: the account acting and where it acts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowerSession {
    pub borrower: Address,
    pub network: NetworkProfile,
}

impl BorrowerSession {
    pub fn new(borrower: Address, network: NetworkProfile) -> Self {
        Self { borrower, network }
    }
}
