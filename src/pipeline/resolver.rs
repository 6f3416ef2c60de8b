//! Stage 1: Underlying resolution
//!
//! Qualifies the broker contract id to exactly one descriptor and reads the
//! prior session's close from the last daily bar.

use serde::{Deserialize, Serialize};

use crate::core::{ContractDescriptor, SurfaceError, SurfaceResult};
use crate::data::{HistoryRequest, MarketDataSource};

/// Qualified underlying with its prior close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedUnderlying {
    pub descriptor: ContractDescriptor,
    pub close: f64,
}

/// Qualify a contract id; anything but exactly one match is fatal
pub fn qualify_underlying<S: MarketDataSource + ?Sized>(
    source: &mut S,
    con_id: i64,
) -> SurfaceResult<ContractDescriptor> {
    let mut matches = source.qualify(con_id)?;

    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(SurfaceError::resolution(format!(
            "Contract id {} did not resolve to any contract",
            con_id
        ))),
        n => Err(SurfaceError::resolution(format!(
            "Contract id {} is ambiguous: {} matches",
            con_id, n
        ))),
    }
}

/// Close of the most recent daily bar
pub fn prior_close<S: MarketDataSource + ?Sized>(
    source: &mut S,
    underlying: &ContractDescriptor,
) -> SurfaceResult<f64> {
    let bars = source.historical_bars(&HistoryRequest::prior_close(underlying.con_id))?;

    let bar = bars.last().ok_or_else(|| {
        SurfaceError::data_unavailable(format!("No daily bar returned for {}", underlying.local_symbol))
    })?;

    if !(bar.close.is_finite() && bar.close > 0.0) {
        return Err(SurfaceError::data_unavailable(format!(
            "Unusable close {} for {} on {}",
            bar.close, underlying.local_symbol, bar.date
        )));
    }

    Ok(bar.close)
}

/// Qualify and price the underlying
pub fn resolve_underlying<S: MarketDataSource + ?Sized>(
    source: &mut S,
    con_id: i64,
) -> SurfaceResult<ResolvedUnderlying> {
    let descriptor = qualify_underlying(source, con_id)?;
    let close = prior_close(source, &descriptor)?;

    tracing::info!(
        "Resolved {} ({} {}) close {:.4}",
        descriptor.local_symbol,
        descriptor.symbol,
        descriptor.sec_type.code(),
        close
    );

    Ok(ResolvedUnderlying { descriptor, close })
}
