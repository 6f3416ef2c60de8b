//! Stage 4: Batched quote requests
//!
//! One option contract per (strike, expiration) cell, requested in
//! serialized batches no larger than the broker limit with a fixed pause in
//! between. The pause is a throttle for the upstream rate limit; batches are
//! never issued concurrently.

use std::thread;
use std::time::Duration;

use super::config::{SurfaceConfig, BROKER_BATCH_LIMIT, MAX_BATCH_PAUSE_SECONDS};
use super::universe::SurfaceUniverse;
use crate::core::{ContractDescriptor, OptionContract, QuoteTable, SurfaceError, SurfaceResult, TickerSnapshot};
use crate::data::MarketDataSource;

/// Quote batcher settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteBatcher {
    max_batch_size: usize,
    pause: Duration,
}

/// Result of a batched quote pass
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub table: QuoteTable,
    pub contracts_requested: usize,
    pub batches: usize,
}

impl Default for QuoteBatcher {
    fn default() -> Self {
        Self::new(BROKER_BATCH_LIMIT, Duration::from_secs(1))
    }
}

impl From<&SurfaceConfig> for QuoteBatcher {
    /// Pause is clamped to `[0, MAX_BATCH_PAUSE_SECONDS]`; NaN means no pause
    fn from(config: &SurfaceConfig) -> Self {
        let seconds = config.batch_pause_seconds.clamp(0.0, MAX_BATCH_PAUSE_SECONDS);
        let pause = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO);
        Self::new(config.max_batch_size, pause)
    }
}

/// Number of requests needed for `contracts` contracts
pub fn batch_count(contracts: usize, max_batch_size: usize) -> usize {
    contracts.div_ceil(max_batch_size.max(1))
}

/// Contracts for every cell, expiration-major, strikes ascending within
pub fn build_contracts(
    underlying: &ContractDescriptor,
    close: f64,
    universe: &SurfaceUniverse,
    option_exchange: &str,
) -> Vec<OptionContract> {
    universe
        .expirations
        .iter()
        .flat_map(|&expiry| {
            universe
                .strikes
                .iter()
                .map(move |&strike| OptionContract::for_cell(underlying, close, strike, expiry, option_exchange))
        })
        .collect()
}

/// Line a batch response up with the request
///
/// Snapshots are matched back to their contract so the table keeps request
/// order; a contract the broker skipped gets an empty snapshot.
fn align(requested: &[OptionContract], mut received: Vec<TickerSnapshot>) -> Vec<TickerSnapshot> {
    let in_order = received.len() == requested.len()
        && received
            .iter()
            .zip(requested)
            .all(|(t, c)| t.contract.same_listing(c));
    if in_order {
        return received;
    }

    tracing::warn!(
        "Batch returned {} snapshots for {} contracts; realigning",
        received.len(),
        requested.len()
    );

    requested
        .iter()
        .map(|c| match received.iter().position(|t| t.contract.same_listing(c)) {
            Some(i) => received.swap_remove(i),
            None => TickerSnapshot::empty(c.clone()),
        })
        .collect()
}

impl QuoteBatcher {
    pub fn new(max_batch_size: usize, pause: Duration) -> Self {
        Self {
            max_batch_size: max_batch_size.clamp(1, BROKER_BATCH_LIMIT),
            pause,
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Request quotes for the given contracts, batch by batch
    pub fn request<S: MarketDataSource + ?Sized>(
        &self,
        source: &mut S,
        contracts: &[OptionContract],
    ) -> SurfaceResult<BatchOutcome> {
        let total = batch_count(contracts.len(), self.max_batch_size);
        let mut snapshots = Vec::with_capacity(contracts.len());

        for (i, chunk) in contracts.chunks(self.max_batch_size).enumerate() {
            if i > 0 && !self.pause.is_zero() {
                thread::sleep(self.pause);
            }

            tracing::info!("Retrieving batch {} of {} ({} contracts)", i + 1, total, chunk.len());
            let received = source.tickers(chunk)?;
            if received.is_empty() {
                return Err(SurfaceError::data_unavailable(format!(
                    "Quote batch {} of {} came back empty",
                    i + 1,
                    total
                )));
            }

            snapshots.extend(align(chunk, received));
        }

        Ok(BatchOutcome {
            table: QuoteTable::from_snapshots(snapshots),
            contracts_requested: contracts.len(),
            batches: total,
        })
    }

    /// Build the contracts for a universe and request them
    pub fn fetch<S: MarketDataSource + ?Sized>(
        &self,
        source: &mut S,
        underlying: &ContractDescriptor,
        close: f64,
        universe: &SurfaceUniverse,
        option_exchange: &str,
    ) -> SurfaceResult<BatchOutcome> {
        let contracts = build_contracts(underlying, close, universe, option_exchange);
        tracing::info!(
            "Requesting {} contracts in {} batches",
            contracts.len(),
            batch_count(contracts.len(), self.max_batch_size)
        );
        self.request(source, &contracts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OptionRight, TickerSnapshot};
    use crate::data::{Bar, ChainDefinition, ChainRequest, HistoryRequest, MarketDataType};
    use crate::pipeline::testing::{future, FakeSource};
    use chrono::NaiveDate;

    fn universe(strikes: usize, expirations: usize) -> SurfaceUniverse {
        SurfaceUniverse {
            strikes: (0..strikes).map(|i| 80.0 + i as f64).collect(),
            expirations: (0..expirations)
                .map(|i| NaiveDate::from_ymd_opt(2024, 2, 1).unwrap() + chrono::Duration::days(7 * i as i64))
                .collect(),
        }
    }

    #[test]
    fn test_pause_from_config() {
        let config = SurfaceConfig { batch_pause_seconds: 0.5, ..Default::default() };
        assert_eq!(QuoteBatcher::from(&config).pause, Duration::from_millis(500));

        let huge = SurfaceConfig { batch_pause_seconds: 1e300, ..Default::default() };
        assert_eq!(QuoteBatcher::from(&huge).pause, Duration::from_secs(3600));

        let negative = SurfaceConfig { batch_pause_seconds: -2.0, ..Default::default() };
        assert_eq!(QuoteBatcher::from(&negative).pause, Duration::ZERO);

        let nan = SurfaceConfig { batch_pause_seconds: f64::NAN, ..Default::default() };
        assert_eq!(QuoteBatcher::from(&nan).pause, Duration::ZERO);
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(batch_count(0, 100), 0);
        assert_eq!(batch_count(1, 100), 1);
        assert_eq!(batch_count(100, 100), 1);
        assert_eq!(batch_count(101, 100), 2);
        assert_eq!(batch_count(250, 100), 3);
    }

    #[test]
    fn test_build_contracts_order_and_rights() {
        let und = future(1, "ESH4", "20240315");
        let contracts = build_contracts(&und, 81.0, &universe(3, 2), "GLOBEX");

        assert_eq!(contracts.len(), 6);
        // Expiration-major
        assert_eq!(contracts[0].expiry, contracts[2].expiry);
        assert!(contracts[3].expiry > contracts[2].expiry);
        // 80 < 81 is a put, 81 and 82 are calls
        assert_eq!(contracts[0].right, OptionRight::Put);
        assert_eq!(contracts[1].right, OptionRight::Call);
        assert_eq!(contracts[2].right, OptionRight::Call);
        assert!(contracts.iter().all(|c| c.exchange == "GLOBEX"));
    }

    #[test]
    fn test_batches_are_capped_and_ordered() {
        let mut source = FakeSource::es();
        let und = future(1, "ESH4", "20240315");
        let batcher = QuoteBatcher::new(100, Duration::ZERO);

        let outcome = batcher.fetch(&mut source, &und, 100.0, &universe(45, 5), "GLOBEX").unwrap();

        assert_eq!(outcome.contracts_requested, 225);
        assert_eq!(outcome.batches, 3);
        assert_eq!(source.batch_sizes, vec![100, 100, 25]);

        let expected = build_contracts(&und, 100.0, &universe(45, 5), "GLOBEX");
        assert_eq!(source.requested, expected);
        for (row, contract) in outcome.table.rows.iter().zip(&expected) {
            assert!(row.contract.same_listing(contract));
        }
    }

    #[test]
    fn test_out_of_order_response_realigned() {
        let und = future(1, "ESH4", "20240315");
        let contracts = build_contracts(&und, 100.0, &universe(3, 1), "GLOBEX");

        let mut received: Vec<TickerSnapshot> = contracts.iter().rev().cloned().map(TickerSnapshot::empty).collect();
        received.pop();

        let aligned = align(&contracts, received);
        assert_eq!(aligned.len(), 3);
        for (snap, contract) in aligned.iter().zip(&contracts) {
            assert!(snap.contract.same_listing(contract));
        }
    }

    #[test]
    fn test_empty_batch_is_fatal() {
        struct Silent;

        impl MarketDataSource for Silent {
            fn set_market_data_type(&mut self, _: MarketDataType) -> SurfaceResult<()> {
                Ok(())
            }

            fn qualify(&mut self, _: i64) -> SurfaceResult<Vec<ContractDescriptor>> {
                Ok(vec![])
            }

            fn historical_bars(&mut self, _: &HistoryRequest) -> SurfaceResult<Vec<Bar>> {
                Ok(vec![])
            }

            fn option_chains(&mut self, _: &ChainRequest) -> SurfaceResult<Vec<ChainDefinition>> {
                Ok(vec![])
            }

            fn tickers(&mut self, _: &[OptionContract]) -> SurfaceResult<Vec<TickerSnapshot>> {
                Ok(vec![])
            }
        }

        let batcher = QuoteBatcher::new(100, Duration::ZERO);
        let und = future(1, "ESH4", "20240315");

        let err = batcher.fetch(&mut Silent, &und, 100.0, &universe(2, 1), "GLOBEX").unwrap_err();
        assert!(matches!(err, SurfaceError::DataUnavailable(_)));
    }
}
