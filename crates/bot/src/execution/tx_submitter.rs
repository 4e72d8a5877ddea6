//! Transaction submitter: simulate, sign, send and confirm.
//!
//! Signs transactions locally, simulates via `eth_call`, submits raw bytes
//! (optionally through a private submission endpoint) and waits until the
//! receipt is buried under the configured number of blocks. Nonce state is
//! held behind an async mutex and re-synced from chain after a failed send.
//!
//! A send that fails below JSON-RPC, or a receipt that never arrives, leaves
//! the outcome unknown. `release_nonce` settles such a nonce with a
//! same-nonce zero-value self-transfer so the original can no longer land
//! after the caller has given up on it.
//!
//! Provider split:
//! - **Read RPC**: simulation (`eth_call`), gas estimation, nonce queries,
//!   receipt polling.
//! - **Submit RPC**: `send_raw_transaction` only. Falls back to the read RPC
//!   when no submission endpoint is configured.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::transports::TransportError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::TransactionTiming;
use crate::constants::FALLBACK_GAS_LIMIT;
use crate::errors::BotError;
use crate::execution::aave_client::HttpProvider;
use crate::execution::protocol::{ActionSubmitter, ChainAction, Confirmation};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// `Error(string)` selector: `keccak256("Error(string)")[0..4]`.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// `Panic(uint256)` selector: `keccak256("Panic(uint256)")[0..4]`.
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Gas price safety buffer, percent above the node's quoted price.
const GAS_PRICE_BUFFER_PCT: u128 = 10;

/// Headroom added on top of `eth_estimateGas`, percent.
const GAS_LIMIT_HEADROOM_PCT: u64 = 20;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Replacement gas price bump over the current buffered price, per mille.
const REPLACEMENT_BUMP_PER_MILLE: u128 = 125;

/// Gas for a plain value transfer.
const SIMPLE_TRANSFER_GAS: u64 = 21_000;

// ---------------------------------------------------------------------------
// TxSubmitter
// ---------------------------------------------------------------------------

/// Transaction submitter with nonce management and a gas price ceiling.
pub struct TxSubmitter {
    /// Read provider for simulation, gas estimation and receipts.
    provider: HttpProvider,
    /// Provider that receives raw signed transactions.
    submit_provider: HttpProvider,
    signer: PrivateKeySigner,
    /// Async-safe nonce counter. `None` until first chain query.
    nonce: Mutex<Option<u64>>,
    simulation_timeout: Duration,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    /// Blocks, including the inclusion block, before a receipt counts.
    confirmations: u64,
    max_gas_price_gwei: u64,
    chain_id: u64,
}

impl TxSubmitter {
    /// Construct from pre-built providers and config.
    ///
    /// Pass the same provider twice when no private submission endpoint
    /// is configured.
    pub fn new(
        provider: HttpProvider,
        submit_provider: HttpProvider,
        signer: PrivateKeySigner,
        timing: &TransactionTiming,
        chain_id: u64,
    ) -> Self {
        info!(
            address = %signer.address(),
            chain_id,
            confirmations = timing.confirmations,
            max_gas_price_gwei = timing.max_gas_price_gwei,
            confirmation_timeout = timing.confirmation_timeout_seconds,
            "TxSubmitter initialized"
        );

        Self {
            provider,
            submit_provider,
            signer,
            nonce: Mutex::new(None),
            simulation_timeout: Duration::from_secs(timing.simulation_timeout_seconds),
            confirmation_timeout: Duration::from_secs(timing.confirmation_timeout_seconds),
            poll_interval: Duration::from_millis(timing.receipt_poll_interval_ms),
            confirmations: timing.confirmations,
            max_gas_price_gwei: timing.max_gas_price_gwei,
            chain_id,
        }
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Build an unsigned request for an action from the signer's account.
    pub fn build_request(&self, action: &ChainAction) -> TransactionRequest {
        let call = action.encode();
        let mut tx = TransactionRequest::default();
        tx.set_from(self.signer.address());
        tx.set_to(call.to);
        tx.set_value(call.value);
        tx.set_input(call.input);
        tx
    }

    /// Simulate a transaction via `eth_call` with timeout protection.
    ///
    /// Returns raw output bytes on success. Returns
    /// `BotError::SimulationFailed` on revert or timeout.
    pub async fn simulate(&self, tx: &TransactionRequest) -> Result<Bytes, BotError> {
        let provider = &self.provider;
        let tx_clone = tx.clone();
        match tokio::time::timeout(self.simulation_timeout, async move {
            provider.call(tx_clone).await
        })
        .await
        {
            Ok(Ok(result)) => {
                debug!(output_len = result.len(), "simulation succeeded");
                Ok(result)
            }
            Ok(Err(e)) => {
                let reason = e
                    .as_error_resp()
                    .and_then(|payload| payload.as_revert_data())
                    .map(|data| Self::decode_revert_reason(&data))
                    .unwrap_or_else(|| e.to_string());
                Err(BotError::SimulationFailed {
                    reason: format!("simulation reverted: {reason}"),
                })
            }
            Err(_) => Err(BotError::SimulationFailed {
                reason: format!(
                    "simulation timed out after {}s",
                    self.simulation_timeout.as_secs()
                ),
            }),
        }
    }

    /// Full submission flow: simulate → gas ceiling → sign + send → wait.
    pub async fn submit_and_wait(&self, tx: TransactionRequest) -> Result<Confirmation, BotError> {
        // 1. Simulate via eth_call
        self.simulate(&tx).await?;

        // 2. Gas ceiling
        let gas_price = self.get_gas_price().await?;
        let gas_price_gwei = (gas_price / WEI_PER_GWEI) as u64;
        if gas_price_gwei > self.max_gas_price_gwei {
            return Err(BotError::SafetyBlocked {
                reason: format!(
                    "gas price {gas_price_gwei} gwei exceeds ceiling {} gwei",
                    self.max_gas_price_gwei
                ),
            });
        }

        // 3. Sign + send
        let (tx_hash, nonce) = self.send(tx, gas_price).await?;

        // 4. Wait for confirmation depth
        self.wait_for_confirmation(tx_hash, nonce).await
    }

    /// Poll until the receipt is `confirmations` blocks deep or the timeout
    /// expires.
    ///
    /// Returns `BotError::TxReverted` if the receipt has `status == 0` and
    /// `BotError::TxTimeout` when the outcome could not be determined in time.
    pub async fn wait_for_confirmation(
        &self,
        tx_hash: B256,
        nonce: u64,
    ) -> Result<Confirmation, BotError> {
        let start = tokio::time::Instant::now();

        loop {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if !receipt.status() {
                        return Err(BotError::TxReverted {
                            tx_hash: tx_hash.to_string(),
                            reason: "transaction reverted on-chain".into(),
                        });
                    }
                    if let Some(block_number) = receipt.block_number {
                        match self.provider.get_block_number().await {
                            Ok(head) if head + 1 >= block_number + self.confirmations => {
                                info!(
                                    tx_hash = %tx_hash,
                                    block_number,
                                    gas_used = receipt.gas_used,
                                    "transaction confirmed"
                                );
                                return Ok(Confirmation {
                                    tx_hash,
                                    block_number,
                                    gas_used: receipt.gas_used,
                                });
                            }
                            Ok(head) => {
                                debug!(tx_hash = %tx_hash, block_number, head, "awaiting depth");
                            }
                            Err(e) => {
                                warn!(error = %e, "block number poll error, retrying");
                            }
                        }
                    }
                }
                Ok(None) => {
                    // Not yet mined, keep polling.
                }
                Err(e) => {
                    warn!(error = %e, tx_hash = %tx_hash, "receipt poll error, retrying");
                }
            }

            if start.elapsed() >= self.confirmation_timeout {
                return Err(BotError::TxTimeout {
                    tx_hash: tx_hash.to_string(),
                    nonce,
                    timeout_seconds: self.confirmation_timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Settle a nonce whose transaction outcome is unknown.
    ///
    /// Sends a zero-value self-transfer at the same nonce with a 12.5%
    /// higher gas price, then polls until the account's mined nonce moves
    /// past it. Whichever of the two transactions was mined, the other can
    /// no longer land. Returns `BotError::TxTimeout` if the nonce is still
    /// unmined when the confirmation timeout expires.
    pub async fn replace_pending(&self, nonce: u64) -> Result<(), BotError> {
        let address = self.signer.address();
        if self.mined_nonce(address).await? > nonce {
            debug!(nonce, "nonce already mined, no replacement needed");
            return Ok(());
        }

        let gas_price = bump_gas_price(self.get_gas_price().await?);
        let replacement = match self
            .sign_and_send(
                nonce,
                gas_price,
                SIMPLE_TRANSFER_GAS,
                TxKind::Call(address),
                U256::ZERO,
                Bytes::new(),
            )
            .await
        {
            Ok(tx_hash) => {
                warn!(nonce, replacement = %tx_hash, gas_price, "replacement sent for unresolved transaction");
                Some(tx_hash)
            }
            // "nonce too low" here means the original was mined meanwhile.
            Err(e) => {
                warn!(nonce, error = %e, "replacement not accepted");
                None
            }
        };

        let start = tokio::time::Instant::now();
        loop {
            match self.mined_nonce(address).await {
                Ok(mined) if mined > nonce => break,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "nonce poll error, retrying"),
            }
            if start.elapsed() >= self.confirmation_timeout {
                return Err(BotError::TxTimeout {
                    tx_hash: replacement.map(|h| h.to_string()).unwrap_or_default(),
                    nonce,
                    timeout_seconds: self.confirmation_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        info!(nonce, "unresolved nonce settled");
        if let Err(e) = self.recover_nonce().await {
            warn!(error = %e, "nonce re-sync failed");
        }
        Ok(())
    }

    /// Current gas price in wei with a 10% buffer applied.
    pub async fn get_gas_price(&self) -> Result<u128, BotError> {
        let base_price = self.provider.get_gas_price().await?;
        Ok(apply_gas_buffer(base_price))
    }

    /// Re-sync local nonce counter from on-chain pending state.
    pub async fn recover_nonce(&self) -> Result<(), BotError> {
        let mut guard = self.nonce.lock().await;
        let chain_nonce = self
            .provider
            .get_transaction_count(self.signer.address())
            .pending()
            .await?;
        let old = *guard;
        *guard = Some(chain_nonce);
        warn!(old_nonce = ?old, chain_nonce, "nonce recovered from chain");
        Ok(())
    }

    /// Number of transactions from `address` included in the latest block.
    async fn mined_nonce(&self, address: Address) -> Result<u64, BotError> {
        Ok(self
            .provider
            .get_transaction_count(address)
            .latest()
            .await?)
    }

    // -----------------------------------------------------------------------
    // Revert decoding
    // -----------------------------------------------------------------------

    /// Decode a Solidity revert reason from raw return data.
    ///
    /// Handles:
    /// - `Error(string)` (0x08c379a0), standard revert messages such as
    ///   Aave's numeric error codes.
    /// - `Panic(uint256)` (0x4e487b71), arithmetic and assertion panics.
    /// - Unknown selectors, falling back to hex encoding.
    pub fn decode_revert_reason(data: &[u8]) -> String {
        if data.is_empty() {
            return "Unknown revert".into();
        }

        if data.len() < 4 {
            return hex::encode(data);
        }

        // Error(string): selector(4) + offset(32) + length(32) + data
        if data[..4] == ERROR_SELECTOR && data.len() >= 68 {
            if let Ok(len_bytes) = <[u8; 8]>::try_from(&data[60..68]) {
                let str_len = u64::from_be_bytes(len_bytes) as usize;
                if data.len() >= 68 + str_len {
                    return String::from_utf8_lossy(&data[68..68 + str_len]).into_owned();
                }
            }
        }

        // Panic(uint256): selector(4) + code(32)
        if data[..4] == PANIC_SELECTOR && data.len() >= 36 {
            let code = U256::from_be_slice(&data[4..36]);
            return match code.saturating_to::<u64>() {
                0x01 => "Panic: assertion failed".into(),
                0x11 => "Panic: arithmetic overflow/underflow".into(),
                0x12 => "Panic: division by zero".into(),
                0x21 => "Panic: enum conversion out of range".into(),
                0x31 => "Panic: pop on empty array".into(),
                0x32 => "Panic: array index out of bounds".into(),
                _ => format!("Panic(0x{code:x})"),
            };
        }

        hex::encode(data)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Assign nonce and gas limit, sign, and send. Re-syncs the nonce from
    /// chain if the send fails.
    async fn send(
        &self,
        tx: TransactionRequest,
        gas_price: u128,
    ) -> Result<(B256, u64), BotError> {
        let gas_limit = self.estimate_gas_limit(&tx).await;
        let nonce = self.get_next_nonce().await?;

        let to = tx.to.unwrap_or(TxKind::Create);
        let value = tx.value.unwrap_or_default();
        let input = tx.input.into_input().unwrap_or_default();

        match self
            .sign_and_send(nonce, gas_price, gas_limit, to, value, input)
            .await
        {
            Ok(tx_hash) => {
                info!(tx_hash = %tx_hash, nonce, gas_price, gas_limit, "transaction submitted");
                Ok((tx_hash, nonce))
            }
            Err(e) => {
                warn!(error = %e, nonce, "raw transaction send failed");
                if let Err(sync_err) = self.recover_nonce().await {
                    warn!(error = %sync_err, "nonce re-sync failed");
                }
                Err(e)
            }
        }
    }

    async fn estimate_gas_limit(&self, tx: &TransactionRequest) -> u64 {
        match self.provider.estimate_gas(tx.clone()).await {
            Ok(estimate) => estimate + estimate * GAS_LIMIT_HEADROOM_PCT / 100,
            Err(e) => {
                warn!(error = %e, fallback = FALLBACK_GAS_LIMIT, "gas estimation failed, using fallback");
                FALLBACK_GAS_LIMIT
            }
        }
    }

    /// Get the next nonce, initialising from chain on the first call.
    async fn get_next_nonce(&self) -> Result<u64, BotError> {
        let mut guard = self.nonce.lock().await;
        let nonce = match *guard {
            Some(n) => n,
            None => {
                let n = self
                    .provider
                    .get_transaction_count(self.signer.address())
                    .pending()
                    .await?;
                info!(nonce = n, "nonce initialized from chain");
                n
            }
        };
        *guard = Some(nonce + 1);
        Ok(nonce)
    }

    /// Build a legacy transaction, sign it locally, and submit raw bytes.
    ///
    /// The hash is computed before sending so a failed send can still name
    /// the transaction it may have delivered.
    async fn sign_and_send(
        &self,
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
        to: TxKind,
        value: U256,
        input: Bytes,
    ) -> Result<B256, BotError> {
        let tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            input,
        };

        let sig_hash = tx.signature_hash();
        let sig = self
            .signer
            .sign_hash_sync(&sig_hash)
            .map_err(|e| BotError::SimulationFailed {
                reason: format!("transaction signing failed: {e}"),
            })?;

        let signed = tx.into_signed(sig);
        let envelope = TxEnvelope::Legacy(signed);
        let tx_hash = *envelope.tx_hash();
        let raw = envelope.encoded_2718();

        match self.submit_provider.send_raw_transaction(&raw).await {
            Ok(pending) => Ok(*pending.tx_hash()),
            Err(e) => send_outcome(&e, tx_hash, nonce),
        }
    }
}

#[async_trait]
impl ActionSubmitter for TxSubmitter {
    async fn submit(&self, action: &ChainAction) -> Result<Confirmation, BotError> {
        let tx = self.build_request(action);
        debug!(action = action.name(), "submitting action");
        self.submit_and_wait(tx).await
    }

    async fn release_nonce(&self, nonce: u64) -> Result<(), BotError> {
        self.replace_pending(nonce).await
    }
}

/// Classify a failed `eth_sendRawTransaction`.
///
/// A JSON-RPC error reply means the node refused the transaction, except
/// when it reports the transaction as already known. Anything else (a
/// dropped connection, an HTTP timeout, a garbled reply) leaves open whether
/// the node accepted it.
fn send_outcome(err: &TransportError, tx_hash: B256, nonce: u64) -> Result<B256, BotError> {
    match err.as_error_resp() {
        Some(payload) => {
            let message = payload.message.to_lowercase();
            if message.contains("already known") || message.contains("known transaction") {
                debug!(tx_hash = %tx_hash, "node already holds transaction");
                return Ok(tx_hash);
            }
            Err(BotError::TxRejected {
                reason: payload.message.to_string(),
            })
        }
        None => Err(BotError::TxUnknown {
            tx_hash: tx_hash.to_string(),
            nonce,
            reason: err.to_string(),
        }),
    }
}

fn apply_gas_buffer(base_price: u128) -> u128 {
    base_price.saturating_add(base_price.saturating_mul(GAS_PRICE_BUFFER_PCT) / 100)
}

fn bump_gas_price(gas_price: u128) -> u128 {
    gas_price.saturating_add(gas_price.saturating_mul(REPLACEMENT_BUMP_PER_MILLE) / 1000)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
