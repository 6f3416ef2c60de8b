//! Capture and replay of market data
//!
//! Records every response of a live run into a JSON book so the job can be
//! re-run offline against exactly the same inputs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::market::{Bar, ChainDefinition, ChainRequest, HistoryRequest, MarketDataSource, MarketDataType};
use crate::core::{ContractDescriptor, OptionContract, SurfaceResult, TickerSnapshot};

/// Recorded market data for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayBook {
    /// Qualification results by contract id
    #[serde(default)]
    pub qualified: BTreeMap<i64, Vec<ContractDescriptor>>,
    /// Daily bars by contract id
    #[serde(default)]
    pub bars: BTreeMap<i64, Vec<Bar>>,
    /// Chain definitions by `SYMBOL@EXCHANGE`
    #[serde(default)]
    pub chains: BTreeMap<String, Vec<ChainDefinition>>,
    /// Every quote snapshot received
    #[serde(default)]
    pub tickers: Vec<TickerSnapshot>,
}

fn chain_key(request: &ChainRequest) -> String {
    format!("{}@{}", request.symbol, request.exchange)
}

impl ReplayBook {
    pub fn load(path: impl AsRef<Path>) -> SurfaceResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let book: ReplayBook = serde_json::from_str(&json)?;

        tracing::info!(
            "Loaded replay book from {:?} ({} tickers)",
            path,
            book.tickers.len()
        );
        Ok(book)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> SurfaceResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;

        tracing::info!("Saved replay book to {:?}", path);
        Ok(())
    }
}

/// Serves a recorded book through the market data contract
pub struct ReplaySource {
    book: ReplayBook,
}

impl ReplaySource {
    pub fn new(book: ReplayBook) -> Self {
        Self { book }
    }

    pub fn from_file(path: impl AsRef<Path>) -> SurfaceResult<Self> {
        Ok(Self::new(ReplayBook::load(path)?))
    }
}

impl MarketDataSource for ReplaySource {
    fn set_market_data_type(&mut self, _kind: MarketDataType) -> SurfaceResult<()> {
        Ok(())
    }

    fn qualify(&mut self, con_id: i64) -> SurfaceResult<Vec<ContractDescriptor>> {
        Ok(self.book.qualified.get(&con_id).cloned().unwrap_or_default())
    }

    fn historical_bars(&mut self, request: &HistoryRequest) -> SurfaceResult<Vec<Bar>> {
        Ok(self.book.bars.get(&request.con_id).cloned().unwrap_or_default())
    }

    fn option_chains(&mut self, request: &ChainRequest) -> SurfaceResult<Vec<ChainDefinition>> {
        Ok(self.book.chains.get(&chain_key(request)).cloned().unwrap_or_default())
    }

    /// Contracts absent from the book come back with no market data
    fn tickers(&mut self, contracts: &[OptionContract]) -> SurfaceResult<Vec<TickerSnapshot>> {
        Ok(contracts
            .iter()
            .map(|c| {
                self.book
                    .tickers
                    .iter()
                    .find(|t| t.contract.same_listing(c))
                    .cloned()
                    .unwrap_or_else(|| TickerSnapshot::empty(c.clone()))
            })
            .collect())
    }
}

/// Wraps a source and records everything it returns
pub struct Recorder<S> {
    inner: S,
    book: ReplayBook,
}

impl<S: MarketDataSource> Recorder<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            book: ReplayBook::default(),
        }
    }

    pub fn into_book(self) -> ReplayBook {
        self.book
    }
}

impl<S: MarketDataSource> MarketDataSource for Recorder<S> {
    fn set_market_data_type(&mut self, kind: MarketDataType) -> SurfaceResult<()> {
        self.inner.set_market_data_type(kind)
    }

    fn qualify(&mut self, con_id: i64) -> SurfaceResult<Vec<ContractDescriptor>> {
        let matches = self.inner.qualify(con_id)?;
        self.book.qualified.insert(con_id, matches.clone());
        Ok(matches)
    }

    fn historical_bars(&mut self, request: &HistoryRequest) -> SurfaceResult<Vec<Bar>> {
        let bars = self.inner.historical_bars(request)?;
        self.book.bars.insert(request.con_id, bars.clone());
        Ok(bars)
    }

    fn option_chains(&mut self, request: &ChainRequest) -> SurfaceResult<Vec<ChainDefinition>> {
        let chains = self.inner.option_chains(request)?;
        self.book.chains.insert(chain_key(request), chains.clone());
        Ok(chains)
    }

    fn tickers(&mut self, contracts: &[OptionContract]) -> SurfaceResult<Vec<TickerSnapshot>> {
        let tickers = self.inner.tickers(contracts)?;
        self.book.tickers.extend(tickers.iter().cloned());
        Ok(tickers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OptionComputation, OptionRight, SecurityType};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn option(strike: f64) -> OptionContract {
        OptionContract {
            symbol: "ES".into(),
            sec_type: SecurityType::FutureOption,
            expiry: NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
            strike,
            right: OptionRight::Call,
            exchange: "CME".into(),
        }
    }

    fn sample_book() -> ReplayBook {
        let mut book = ReplayBook::default();
        book.bars.insert(
            7,
            vec![Bar {
                date: "20240102".into(),
                open: 99.0,
                high: 101.0,
                low: 98.5,
                close: 100.0,
                volume: 1200.0,
            }],
        );
        let mut ticker = TickerSnapshot::empty(option(100.0));
        ticker.ask_greeks = Some(OptionComputation::with_iv(0.2));
        book.tickers.push(ticker);
        book
    }

    #[test]
    fn test_replay_serves_book() {
        let mut source = ReplaySource::new(sample_book());

        let bars = source.historical_bars(&HistoryRequest::prior_close(7)).unwrap();
        assert_eq!(bars[0].close, 100.0);
        assert!(source.qualify(7).unwrap().is_empty());

        let tickers = source.tickers(&[option(100.0), option(105.0)]).unwrap();
        assert_eq!(tickers.len(), 2);
        assert!(tickers[0].ask_greeks.is_some());
        assert!(tickers[1].ask_greeks.is_none());
        assert_eq!(tickers[1].contract.strike, 105.0);
    }

    #[test]
    fn test_recorder_captures_responses() {
        let mut recorder = Recorder::new(ReplaySource::new(sample_book()));
        recorder.historical_bars(&HistoryRequest::prior_close(7)).unwrap();
        recorder.tickers(&[option(100.0)]).unwrap();

        let book = recorder.into_book();
        assert_eq!(book.bars.len(), 1);
        assert_eq!(book.tickers.len(), 1);
    }

    #[test]
    fn test_book_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("books").join("run.json");

        sample_book().save(&path).unwrap();
        let mut source = ReplaySource::from_file(&path).unwrap();

        let bars = source.historical_bars(&HistoryRequest::prior_close(7)).unwrap();
        assert_eq!(bars.len(), 1);
    }
}
