//! Stage 2: Option chain aggregation
//!
//! Unions the strikes and expirations advertised by every chain definition
//! for the underlying on the option exchange. No filtering happens here.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::{parse_expiration, ContractDescriptor, SurfaceError, SurfaceResult};
use crate::data::{ChainDefinition, ChainRequest, MarketDataSource};

/// Raw strike and expiration universe of an underlying
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainUniverse {
    /// Distinct strikes, ascending
    pub strikes: Vec<f64>,
    /// Distinct expirations, ascending
    pub expirations: Vec<NaiveDate>,
}

impl ChainUniverse {
    /// Union of all chain definitions
    ///
    /// Expirations that do not parse are logged and skipped.
    pub fn from_definitions(definitions: &[ChainDefinition]) -> Self {
        let mut strikes: Vec<f64> = definitions
            .iter()
            .flat_map(|d| d.strikes.iter().copied())
            .filter(|s| s.is_finite())
            .collect();
        strikes.sort_by(|a, b| a.total_cmp(b));
        strikes.dedup();

        let mut expirations: Vec<NaiveDate> = definitions
            .iter()
            .flat_map(|d| d.expirations.iter())
            .filter_map(|e| match parse_expiration(e) {
                Ok(date) => Some(date),
                Err(err) => {
                    tracing::warn!("Skipping chain expiration: {}", err);
                    None
                }
            })
            .collect();
        expirations.sort();
        expirations.dedup();

        Self { strikes, expirations }
    }
}

/// Request and aggregate the option chains of an underlying
pub fn fetch_chain<S: MarketDataSource + ?Sized>(
    source: &mut S,
    underlying: &ContractDescriptor,
    option_exchange: &str,
) -> SurfaceResult<ChainUniverse> {
    let request = ChainRequest {
        symbol: underlying.symbol.clone(),
        exchange: option_exchange.to_string(),
        sec_type: underlying.sec_type,
        con_id: underlying.con_id,
    };

    let definitions = source.option_chains(&request)?;
    let universe = ChainUniverse::from_definitions(&definitions);

    if universe.strikes.is_empty() || universe.expirations.is_empty() {
        return Err(SurfaceError::data_unavailable(format!(
            "Empty option chain for {} on {} ({} definitions)",
            underlying.symbol,
            option_exchange,
            definitions.len()
        )));
    }

    tracing::info!(
        "Option chain for {} on {}: {} definitions, {} strikes, {} expirations",
        underlying.symbol,
        option_exchange,
        definitions.len(),
        universe.strikes.len(),
        universe.expirations.len()
    );

    Ok(universe)
}
