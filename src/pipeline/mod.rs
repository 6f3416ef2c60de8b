//! Surface construction pipeline
//!
//! Single pass, strictly sequential:
//! 1. **Resolve**: qualify the underlying and read its prior close
//! 2. **Chain**: union of advertised strikes and expirations
//! 3. **Universe**: strike band, forward window, tenor rule
//! 4. **Quotes**: batched snapshots, final implied vol per contract
//! 5. **Matrix**: strike × expiration pivot with drop rules
//!
//! followed by the persistence sync, which replaces the mandate's stored
//! surface in one transaction.

mod batcher;
mod chain;
mod config;
mod resolver;
mod universe;

#[cfg(test)]
pub(crate) mod testing;

pub use batcher::*;
pub use chain::*;
pub use config::*;
pub use resolver::*;
pub use universe::*;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ContractDescriptor, QuoteTable, SurfaceError, SurfaceResult, VolMatrix};
use crate::data::{MarketDataSource, SecurityIds, SurfaceStore, WriteSummary};

/// Everything produced by stages 1-5
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceBuild {
    pub underlying: ResolvedUnderlying,
    /// Next futures contract, when configured
    pub roll: Option<ContractDescriptor>,
    pub chain_strikes: usize,
    pub chain_expirations: usize,
    pub universe: SurfaceUniverse,
    pub contracts_requested: usize,
    pub batches: usize,
    pub missing_quotes: usize,
    pub quotes: QuoteTable,
    pub matrix: VolMatrix,
}

impl SurfaceBuild {
    /// Security ids for the persisted expirations
    pub fn security_ids(&self) -> SurfaceResult<SecurityIds> {
        Ok(SecurityIds {
            front: self.underlying.descriptor.local_symbol.clone(),
            front_last_trade: self.underlying.descriptor.last_trade_date()?,
            roll: self.roll.as_ref().map(|r| r.local_symbol.clone()),
        })
    }
}

/// Result of a full run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub build: SurfaceBuild,
    pub written: WriteSummary,
}

/// Surface job facade
pub struct SurfaceJob {
    config: SurfaceConfig,
}

impl SurfaceJob {
    pub fn new(config: SurfaceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    /// Contract id of the underlying: config override, else the store
    pub fn contract_id(&self, store: &SurfaceStore) -> SurfaceResult<i64> {
        if let Some(id) = self.config.contract_id {
            return Ok(id);
        }

        store.contract_id_for(&self.config.mandate_id)?.ok_or_else(|| {
            SurfaceError::resolution(format!(
                "Mandate {} has no contract id in tblSecurity",
                self.config.mandate_id
            ))
        })
    }

    /// Run stages 1-5 against a market data source
    pub fn build<S: MarketDataSource + ?Sized>(
        &self,
        source: &mut S,
        contract_id: i64,
        today: NaiveDate,
    ) -> SurfaceResult<SurfaceBuild> {
        source.set_market_data_type(self.config.market_data_type)?;

        let underlying = resolve_underlying(source, contract_id)?;
        let roll = match self.config.roll_contract_id {
            Some(id) => Some(qualify_underlying(source, id)?),
            None => None,
        };

        let chain = fetch_chain(source, &underlying.descriptor, &self.config.option_exchange)?;
        let universe = UniverseFilter::from(&self.config).apply(&chain, underlying.close, today)?;

        let outcome = QuoteBatcher::from(&self.config).fetch(
            source,
            &underlying.descriptor,
            underlying.close,
            &universe,
            &self.config.option_exchange,
        )?;

        let source_column = self.config.matrix_source;
        let missing_quotes = outcome.table.missing_count(source_column);
        if missing_quotes > 0 {
            tracing::warn!(
                "{} of {} contracts have no usable implied vol",
                missing_quotes,
                outcome.contracts_requested
            );
        }

        let matrix = VolMatrix::from_quotes(&outcome.table, &universe.strikes, source_column);
        if matrix.is_empty() {
            return Err(SurfaceError::data_unavailable(
                "No strike has a complete row of implied vols",
            ));
        }

        let (rows, cols) = matrix.shape();
        tracing::info!("Constructed matrix: {} strikes x {} expirations", rows, cols);

        Ok(SurfaceBuild {
            underlying,
            roll,
            chain_strikes: chain.strikes.len(),
            chain_expirations: chain.expirations.len(),
            universe,
            contracts_requested: outcome.contracts_requested,
            batches: outcome.batches,
            missing_quotes,
            quotes: outcome.table,
            matrix,
        })
    }

    /// Full run: build the surface and replace the mandate's stored copy
    pub fn run<S: MarketDataSource + ?Sized>(
        &self,
        source: &mut S,
        store: &mut SurfaceStore,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> SurfaceResult<RunSummary> {
        let contract_id = self.contract_id(store)?;
        let build = self.build(source, contract_id, today)?;

        tracing::info!("Updating surface store for {}", self.config.mandate_id);
        let ids = build.security_ids()?;
        let written = store.replace_surface(&self.config.mandate_id, &build.matrix, &ids, now)?;

        Ok(RunSummary { build, written })
    }
}
