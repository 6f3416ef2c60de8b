//! Market data collaborator
//!
//! The narrow request/response contract the job consumes from the
//! brokerage side: qualify an instrument, read daily bars, list option
//! chain definitions and snapshot quotes for a batch of contracts.

use serde::{Deserialize, Serialize};

use crate::core::{ContractDescriptor, OptionContract, SecurityType, SurfaceResult, TickerSnapshot};

/// Market data type requested from the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarketDataType {
    Live,
    /// Last recorded quotes when the market is closed
    #[default]
    Frozen,
    Delayed,
    DelayedFrozen,
}

impl MarketDataType {
    /// Broker numeric code
    pub fn code(&self) -> u8 {
        match self {
            MarketDataType::Live => 1,
            MarketDataType::Frozen => 2,
            MarketDataType::Delayed => 3,
            MarketDataType::DelayedFrozen => 4,
        }
    }
}

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

/// Historical bar request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub con_id: i64,
    /// Empty means "now"
    pub end_date_time: String,
    pub duration: String,
    pub bar_size: String,
    pub what_to_show: String,
    /// Regular trading hours only
    pub use_rth: bool,
}

impl HistoryRequest {
    /// One daily trades bar ending now, regular hours
    pub fn prior_close(con_id: i64) -> Self {
        Self {
            con_id,
            end_date_time: String::new(),
            duration: "1 D".into(),
            bar_size: "1 day".into(),
            what_to_show: "TRADES".into(),
            use_rth: true,
        }
    }
}

/// Option chain parameters request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRequest {
    pub symbol: String,
    pub exchange: String,
    pub sec_type: SecurityType,
    pub con_id: i64,
}

/// One option chain definition (a trading class on an exchange)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDefinition {
    pub exchange: String,
    #[serde(default)]
    pub underlying_con_id: i64,
    #[serde(default)]
    pub trading_class: String,
    #[serde(default)]
    pub multiplier: String,
    /// Expirations as `YYYYMMDD`
    pub expirations: Vec<String>,
    pub strikes: Vec<f64>,
}

/// Source of market data for one run
pub trait MarketDataSource {
    /// Switch the market data type used by later quote requests
    fn set_market_data_type(&mut self, kind: MarketDataType) -> SurfaceResult<()>;

    /// Qualify a contract id; every match is returned
    fn qualify(&mut self, con_id: i64) -> SurfaceResult<Vec<ContractDescriptor>>;

    /// Historical bars, oldest first
    fn historical_bars(&mut self, request: &HistoryRequest) -> SurfaceResult<Vec<Bar>>;

    /// Option chain definitions for an underlying on an exchange
    fn option_chains(&mut self, request: &ChainRequest) -> SurfaceResult<Vec<ChainDefinition>>;

    /// Quote snapshots, one per contract, in request order
    fn tickers(&mut self, contracts: &[OptionContract]) -> SurfaceResult<Vec<TickerSnapshot>>;
}

impl<S: MarketDataSource + ?Sized> MarketDataSource for Box<S> {
    fn set_market_data_type(&mut self, kind: MarketDataType) -> SurfaceResult<()> {
        (**self).set_market_data_type(kind)
    }

    fn qualify(&mut self, con_id: i64) -> SurfaceResult<Vec<ContractDescriptor>> {
        (**self).qualify(con_id)
    }

    fn historical_bars(&mut self, request: &HistoryRequest) -> SurfaceResult<Vec<Bar>> {
        (**self).historical_bars(request)
    }

    fn option_chains(&mut self, request: &ChainRequest) -> SurfaceResult<Vec<ChainDefinition>> {
        (**self).option_chains(request)
    }

    fn tickers(&mut self, contracts: &[OptionContract]) -> SurfaceResult<Vec<TickerSnapshot>> {
        (**self).tickers(contracts)
    }
}
