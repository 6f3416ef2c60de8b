//! In-memory market data source for pipeline tests

use std::collections::HashMap;

use crate::core::{
    ContractDescriptor, OptionComputation, OptionContract, SecurityType, SurfaceResult, TickerSnapshot,
};
use crate::data::{Bar, ChainDefinition, ChainRequest, HistoryRequest, MarketDataSource, MarketDataType};

type QuoteFn = Box<dyn Fn(&OptionContract) -> TickerSnapshot>;

pub(crate) struct FakeSource {
    pub qualified: HashMap<i64, Vec<ContractDescriptor>>,
    pub bars: Vec<Bar>,
    pub chains: Vec<ChainDefinition>,
    pub quote: QuoteFn,
    pub batch_sizes: Vec<usize>,
    pub requested: Vec<OptionContract>,
    pub market_data_type: Option<MarketDataType>,
}

pub(crate) fn future(con_id: i64, local_symbol: &str, last_trade: &str) -> ContractDescriptor {
    ContractDescriptor {
        con_id,
        symbol: "ES".into(),
        sec_type: SecurityType::Future,
        local_symbol: local_symbol.into(),
        exchange: "CME".into(),
        currency: "USD".into(),
        last_trade_date_or_contract_month: last_trade.into(),
        multiplier: Some("50".into()),
    }
}

/// Bid/ask/model vols that vary with strike and expiry
pub(crate) fn smile_quote(contract: &OptionContract) -> TickerSnapshot {
    let base = 0.20 + (contract.strike - 100.0).abs() / 1000.0;
    let mut snap = TickerSnapshot::empty(contract.clone());
    snap.close = Some(1.0);
    snap.bid_greeks = Some(OptionComputation::with_iv(base - 0.01));
    snap.ask_greeks = Some(OptionComputation::with_iv(base + 0.01));
    snap.model_greeks = Some(OptionComputation::with_iv(base));
    snap
}

impl FakeSource {
    /// ES future (front ESH4, roll ESM4) closing at 100
    pub fn es() -> Self {
        let mut qualified = HashMap::new();
        qualified.insert(1, vec![future(1, "ESH4", "20240315")]);
        qualified.insert(2, vec![future(2, "ESM4", "20240621")]);

        Self {
            qualified,
            bars: vec![
                Bar {
                    date: "20231228".into(),
                    open: 98.0,
                    high: 99.5,
                    low: 97.0,
                    close: 99.0,
                    volume: 10.0,
                },
                Bar {
                    date: "20231229".into(),
                    open: 99.0,
                    high: 101.0,
                    low: 98.0,
                    close: 100.0,
                    volume: 12.0,
                },
            ],
            chains: vec![
                ChainDefinition {
                    exchange: "GLOBEX".into(),
                    underlying_con_id: 1,
                    trading_class: "ES".into(),
                    multiplier: "50".into(),
                    expirations: vec!["20240315".into(), "20240630".into(), "20250201".into()],
                    strikes: vec![70.0, 80.0, 90.0, 95.0, 100.0],
                },
                ChainDefinition {
                    exchange: "GLOBEX".into(),
                    underlying_con_id: 1,
                    trading_class: "EW3".into(),
                    multiplier: "50".into(),
                    expirations: vec!["20240119".into(), "20240216".into()],
                    strikes: vec![95.0, 100.0, 105.0, 110.0, 130.0, 102.5],
                },
            ],
            quote: Box::new(smile_quote),
            batch_sizes: Vec::new(),
            requested: Vec::new(),
            market_data_type: None,
        }
    }

    pub fn with_quotes(mut self, quote: impl Fn(&OptionContract) -> TickerSnapshot + 'static) -> Self {
        self.quote = Box::new(quote);
        self
    }
}

impl MarketDataSource for FakeSource {
    fn set_market_data_type(&mut self, kind: MarketDataType) -> SurfaceResult<()> {
        self.market_data_type = Some(kind);
        Ok(())
    }

    fn qualify(&mut self, con_id: i64) -> SurfaceResult<Vec<ContractDescriptor>> {
        Ok(self.qualified.get(&con_id).cloned().unwrap_or_default())
    }

    fn historical_bars(&mut self, _request: &HistoryRequest) -> SurfaceResult<Vec<Bar>> {
        Ok(self.bars.clone())
    }

    fn option_chains(&mut self, _request: &ChainRequest) -> SurfaceResult<Vec<ChainDefinition>> {
        Ok(self.chains.clone())
    }

    fn tickers(&mut self, contracts: &[OptionContract]) -> SurfaceResult<Vec<TickerSnapshot>> {
        self.batch_sizes.push(contracts.len());
        self.requested.extend(contracts.iter().cloned());
        Ok(contracts.iter().map(|c| (self.quote)(c)).collect())
    }
}
