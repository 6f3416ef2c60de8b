//! Option quote data
//!
//! Ticker snapshots as returned by the batched quote request, and the flat
//! per-contract table derived from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::greeks::{bundle_iv, OptionComputation};
use super::option::OptionContract;

/// Quote snapshot for one contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSnapshot {
    /// The contract the snapshot belongs to
    pub contract: OptionContract,
    /// Last trade close
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub bid_greeks: Option<OptionComputation>,
    #[serde(default)]
    pub ask_greeks: Option<OptionComputation>,
    #[serde(default)]
    pub last_greeks: Option<OptionComputation>,
    #[serde(default)]
    pub model_greeks: Option<OptionComputation>,
}

impl TickerSnapshot {
    /// Snapshot with no market data at all
    pub fn empty(contract: OptionContract) -> Self {
        Self {
            contract,
            close: None,
            bid_greeks: None,
            ask_greeks: None,
            last_greeks: None,
            model_greeks: None,
        }
    }
}

/// Which implied vol column feeds the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IvSource {
    /// Bid/ask midpoint with ask fallback
    #[default]
    Final,
    /// Broker model implied vol
    Model,
}

/// Final implied vol from the bid and ask sides
///
/// Midpoint when both sides are present, the ask alone when only the ask
/// is present, otherwise missing. A missing side is never averaged in.
pub fn final_implied_vol(bid_iv: Option<f64>, ask_iv: Option<f64>) -> Option<f64> {
    match (bid_iv, ask_iv) {
        (Some(bid), Some(ask)) => Some(0.5 * (bid + ask)),
        (None, Some(ask)) => Some(ask),
        _ => None,
    }
}

/// One row of the flat quote table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRow {
    pub contract: OptionContract,
    pub strike: f64,
    pub expiry: NaiveDate,
    /// Last trade close
    pub close: Option<f64>,
    /// Model implied vol
    pub implied_vol: Option<f64>,
    pub bid_iv: Option<f64>,
    pub ask_iv: Option<f64>,
    pub final_iv: Option<f64>,
}

impl QuoteRow {
    pub fn from_snapshot(snapshot: TickerSnapshot) -> Self {
        let bid_iv = bundle_iv(snapshot.bid_greeks.as_ref());
        let ask_iv = bundle_iv(snapshot.ask_greeks.as_ref());

        Self {
            strike: snapshot.contract.strike,
            expiry: snapshot.contract.expiry,
            close: snapshot.close,
            implied_vol: bundle_iv(snapshot.model_greeks.as_ref()),
            bid_iv,
            ask_iv,
            final_iv: final_implied_vol(bid_iv, ask_iv),
            contract: snapshot.contract,
        }
    }

    /// Value for the chosen column
    pub fn iv(&self, source: IvSource) -> Option<f64> {
        match source {
            IvSource::Final => self.final_iv,
            IvSource::Model => self.implied_vol,
        }
    }
}

/// Flat table, one row per requested contract, in request order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteTable {
    pub rows: Vec<QuoteRow>,
}

impl QuoteTable {
    pub fn from_snapshots(snapshots: Vec<TickerSnapshot>) -> Self {
        Self {
            rows: snapshots.into_iter().map(QuoteRow::from_snapshot).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose chosen implied vol is missing
    pub fn missing_count(&self, source: IvSource) -> usize {
        self.rows.iter().filter(|r| r.iv(source).is_none()).count()
    }

    /// Distinct expirations, ascending
    pub fn expiries(&self) -> Vec<NaiveDate> {
        let mut expiries: Vec<NaiveDate> = self.rows.iter().map(|r| r.expiry).collect();
        expiries.sort();
        expiries.dedup();
        expiries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::option::{OptionRight, SecurityType};

    fn contract(strike: f64) -> OptionContract {
        OptionContract {
            symbol: "CL".into(),
            sec_type: SecurityType::FutureOption,
            expiry: NaiveDate::from_ymd_opt(2024, 2, 15).unwrap(),
            strike,
            right: OptionRight::Call,
            exchange: "NYMEX".into(),
        }
    }

    #[test]
    fn test_final_implied_vol() {
        assert_eq!(final_implied_vol(Some(0.20), Some(0.24)), Some(0.22));
        assert_eq!(final_implied_vol(None, Some(0.24)), Some(0.24));
        assert_eq!(final_implied_vol(Some(0.20), None), None);
        assert_eq!(final_implied_vol(None, None), None);
    }

    #[test]
    fn test_row_from_snapshot() {
        let mut snap = TickerSnapshot::empty(contract(75.0));
        snap.bid_greeks = Some(OptionComputation::with_iv(0.30));
        snap.ask_greeks = Some(OptionComputation::with_iv(0.34));
        snap.model_greeks = Some(OptionComputation::with_iv(0.31));
        snap.close = Some(1.25);

        let row = QuoteRow::from_snapshot(snap);
        assert_eq!(row.strike, 75.0);
        assert_eq!(row.bid_iv, Some(0.30));
        assert!((row.final_iv.unwrap() - 0.32).abs() < 1e-12);
        assert_eq!(row.iv(IvSource::Model), Some(0.31));
    }

    #[test]
    fn test_missing_bundles_stay_missing() {
        let row = QuoteRow::from_snapshot(TickerSnapshot::empty(contract(80.0)));
        assert_eq!(row.implied_vol, None);
        assert_eq!(row.final_iv, None);

        let table = QuoteTable::from_snapshots(vec![
            TickerSnapshot::empty(contract(80.0)),
            {
                let mut s = TickerSnapshot::empty(contract(85.0));
                s.ask_greeks = Some(OptionComputation::with_iv(0.28));
                s
            },
        ]);
        assert_eq!(table.missing_count(IvSource::Final), 1);
        assert_eq!(table.missing_count(IvSource::Model), 2);
        assert_eq!(table.expiries().len(), 1);
    }
}
