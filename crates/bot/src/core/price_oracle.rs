//! Price oracle client: one Chainlink round turned into a `PriceQuote`.
//!
//! Never substitutes a default price. A feed that cannot be read, reports a
//! non-positive answer, or has not updated recently aborts the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::BotError;
use crate::execution::ProtocolReader;
use crate::types::{PriceQuote, RoundData};

use super::session::NetworkProfile;

/// Source of "now" in unix seconds.
pub type Clock = fn() -> u64;

pub fn system_clock() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

pub struct PriceOracleClient {
    reader: Arc<dyn ProtocolReader>,
    max_price_age_seconds: u64,
    clock: Clock,
}

impl PriceOracleClient {
    pub fn new(reader: Arc<dyn ProtocolReader>, max_price_age_seconds: u64) -> Self {
        Self::with_clock(reader, max_price_age_seconds, system_clock)
    }

    pub fn with_clock(
        reader: Arc<dyn ProtocolReader>,
        max_price_age_seconds: u64,
        clock: Clock,
    ) -> Self {
        Self {
            reader,
            max_price_age_seconds,
            clock,
        }
    }

    /// Current price of one `base` in `quote` units.
    ///
    /// Only the pair served by the network's configured feed is available;
    /// any other pair is `OracleUnavailable`.
    pub async fn get_price(
        &self,
        network: &NetworkProfile,
        base: &str,
        quote: &str,
    ) -> Result<PriceQuote, BotError> {
        let feed = network.price_feed;
        if base != network.borrow.symbol || quote != network.unit_of_account {
            return Err(BotError::OracleUnavailable {
                feed: feed.to_string(),
                reason: format!("no feed configured for {base}/{quote}"),
            });
        }

        let round = self
            .reader
            .latest_round(feed)
            .await
            .map_err(|e| BotError::OracleUnavailable {
                feed: feed.to_string(),
                reason: format!("{e:#}"),
            })?;

        let quote = self.validate_round(round, base, quote, &feed.to_string())?;
        debug!(
            base = %quote.base_asset,
            quote = %quote.quote_asset,
            rate = %quote.rate_decimal(),
            observed_at = quote.observed_at,
            "price quote"
        );
        Ok(quote)
    }

    fn validate_round(
        &self,
        round: RoundData,
        base: &str,
        quote: &str,
        feed: &str,
    ) -> Result<PriceQuote, BotError> {
        if round.answer.is_negative() || round.answer.is_zero() {
            return Err(BotError::OracleUnavailable {
                feed: feed.to_string(),
                reason: format!("non-positive answer {}", round.answer),
            });
        }

        // A round never updated, or answered in an earlier round, carries
        // no fresh observation.
        if round.updated_at == 0 || round.answered_in_round < round.round_id {
            warn!(
                feed,
                round_id = round.round_id,
                answered_in_round = round.answered_in_round,
                "oracle round incomplete"
            );
            return Err(BotError::StalePrice {
                age_seconds: u64::MAX,
                max_seconds: self.max_price_age_seconds,
            });
        }

        let now = (self.clock)();
        let age = now.saturating_sub(round.updated_at);
        if age > self.max_price_age_seconds {
            warn!(feed, age, max = self.max_price_age_seconds, "oracle data stale");
            return Err(BotError::StalePrice {
                age_seconds: age,
                max_seconds: self.max_price_age_seconds,
            });
        }

        Ok(PriceQuote {
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
            rate: round.answer.into_raw(),
            decimals: round.decimals,
            observed_at: round.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{test_network, MockProtocol};
    use alloy::primitives::{I256, U256};

    const NOW: u64 = 1_700_000_000;

    fn fixed_clock() -> u64 {
        NOW
    }

    fn oracle(mock: &Arc<MockProtocol>) -> PriceOracleClient {
        PriceOracleClient::with_clock(mock.clone(), 3_600, fixed_clock)
    }

    #[tokio::test]
    async fn test_fresh_round_quoted() {
        let mock = Arc::new(MockProtocol::new());
        mock.set_round(I256::try_from(500_000_000_000_000i64).unwrap(), NOW - 60, 18);

        let quote = oracle(&mock)
            .get_price(&test_network(), "DAI", "ETH")
            .await
            .unwrap();
        assert_eq!(quote.rate, U256::from(500_000_000_000_000u64));
        assert_eq!(quote.decimals, 18);
        assert_eq!(quote.observed_at, NOW - 60);
        assert_eq!(quote.base_asset, "DAI");
    }

    #[tokio::test]
    async fn test_old_round_is_stale() {
        let mock = Arc::new(MockProtocol::new());
        mock.set_round(I256::try_from(1i64).unwrap(), NOW - 7_200, 18);

        let err = oracle(&mock)
            .get_price(&test_network(), "DAI", "ETH")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BotError::StalePrice {
                age_seconds: 7_200,
                max_seconds: 3_600
            }
        ));
    }

    #[tokio::test]
    async fn test_non_positive_answer_rejected() {
        let mock = Arc::new(MockProtocol::new());
        mock.set_round(I256::ZERO, NOW, 18);

        let err = oracle(&mock)
            .get_price(&test_network(), "DAI", "ETH")
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::OracleUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_feed_failure_is_unavailable() {
        let mock = Arc::new(MockProtocol::new());
        mock.fail_reads(1);

        let err = oracle(&mock)
            .get_price(&test_network(), "DAI", "ETH")
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::OracleUnavailable { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unknown_pair_rejected() {
        let mock = Arc::new(MockProtocol::new());
        let err = oracle(&mock)
            .get_price(&test_network(), "USDT", "ETH")
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::OracleUnavailable { .. }));
    }
}
