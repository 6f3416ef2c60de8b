//! Market data bridge client
//!
//! Blocking JSON client for the bridge service that fronts the brokerage
//! gateway. The bridge holds the gateway session for the configured client
//! id; this side only issues request/response calls.
//!
//! Endpoints:
//! - `POST /contracts/qualify` → matching contract descriptors
//! - `POST /history` → daily bars
//! - `POST /secdef/options` → option chain definitions
//! - `POST /tickers` → quote snapshots for up to 100 contracts

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::market::{Bar, ChainDefinition, ChainRequest, HistoryRequest, MarketDataSource, MarketDataType};
use crate::core::{ContractDescriptor, OptionContract, SurfaceError, SurfaceResult, TickerSnapshot};

const CLIENT_ID_HEADER: &str = "X-Client-Id";

/// Bridge API client
pub struct BridgeClient {
    client: reqwest::blocking::Client,
    base_url: String,
    client_id: i32,
    market_data_type: MarketDataType,
}

#[derive(Debug, Serialize)]
struct QualifyRequest {
    con_id: i64,
}

#[derive(Debug, Serialize)]
struct TickersRequest<'a> {
    market_data_type: u8,
    contracts: &'a [OptionContract],
}

impl BridgeClient {
    pub fn new(host: &str, port: u16, client_id: i32) -> SurfaceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("fop-surface/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SurfaceError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", host, port),
            client_id,
            market_data_type: MarketDataType::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> SurfaceResult<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {}", url);

        self.client
            .post(&url)
            .header(CLIENT_ID_HEADER, self.client_id.to_string())
            .json(body)
            .send()
            .map_err(|e| SurfaceError::network(e.to_string()))?
            .error_for_status()
            .map_err(|e| SurfaceError::network(e.to_string()))?
            .json()
            .map_err(|e| SurfaceError::Serialization(format!("Failed to parse {} response: {}", path, e)))
    }
}

impl MarketDataSource for BridgeClient {
    fn set_market_data_type(&mut self, kind: MarketDataType) -> SurfaceResult<()> {
        self.market_data_type = kind;
        Ok(())
    }

    fn qualify(&mut self, con_id: i64) -> SurfaceResult<Vec<ContractDescriptor>> {
        self.post("/contracts/qualify", &QualifyRequest { con_id })
    }

    fn historical_bars(&mut self, request: &HistoryRequest) -> SurfaceResult<Vec<Bar>> {
        self.post("/history", request)
    }

    fn option_chains(&mut self, request: &ChainRequest) -> SurfaceResult<Vec<ChainDefinition>> {
        self.post("/secdef/options", request)
    }

    fn tickers(&mut self, contracts: &[OptionContract]) -> SurfaceResult<Vec<TickerSnapshot>> {
        let body = TickersRequest {
            market_data_type: self.market_data_type.code(),
            contracts,
        };
        self.post("/tickers", &body)
    }
}
