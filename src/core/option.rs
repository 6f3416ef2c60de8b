//! Contract definitions
//!
//! Represents the futures underlying as the broker qualifies it and the
//! option-on-future contracts requested for the surface.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::SurfaceResult;
use super::expiry::{broker_date, parse_contract_month};

/// Option right (Call or Put)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    #[serde(rename = "C")]
    Call,
    #[serde(rename = "P")]
    Put,
}

impl OptionRight {
    /// Right requested for a strike: puts below the close, calls at or above
    pub fn for_strike(strike: f64, close: f64) -> Self {
        if strike < close {
            OptionRight::Put
        } else {
            OptionRight::Call
        }
    }

    /// Broker code
    pub fn code(&self) -> &'static str {
        match self {
            OptionRight::Call => "C",
            OptionRight::Put => "P",
        }
    }
}

/// Security type codes used by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityType {
    #[serde(rename = "FUT")]
    Future,
    #[serde(rename = "FOP")]
    FutureOption,
    #[serde(rename = "OPT")]
    Option,
    #[serde(rename = "STK")]
    Stock,
    #[serde(rename = "IND")]
    Index,
}

impl SecurityType {
    pub fn code(&self) -> &'static str {
        match self {
            SecurityType::Future => "FUT",
            SecurityType::FutureOption => "FOP",
            SecurityType::Option => "OPT",
            SecurityType::Stock => "STK",
            SecurityType::Index => "IND",
        }
    }
}

/// Fully qualified instrument as returned by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDescriptor {
    /// Broker contract id
    pub con_id: i64,
    /// Root symbol (e.g., "ES", "CL")
    pub symbol: String,
    /// Security type
    pub sec_type: SecurityType,
    /// Exchange-local symbol (e.g., "ESH4"), stored as the security id
    pub local_symbol: String,
    /// Listing exchange
    pub exchange: String,
    /// Currency
    #[serde(default)]
    pub currency: String,
    /// Last trade date or contract month (`YYYYMMDD` or `YYYYMM`)
    pub last_trade_date_or_contract_month: String,
    /// Contract multiplier
    #[serde(default)]
    pub multiplier: Option<String>,
}

impl ContractDescriptor {
    /// Last trade date of the underlying contract
    pub fn last_trade_date(&self) -> SurfaceResult<NaiveDate> {
        parse_contract_month(&self.last_trade_date_or_contract_month)
    }
}

/// Option-on-future contract specification sent to the quote request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Underlying root symbol
    pub symbol: String,
    /// Always `FOP` for this job
    pub sec_type: SecurityType,
    /// Expiration date
    #[serde(with = "broker_date")]
    pub expiry: NaiveDate,
    /// Strike price
    pub strike: f64,
    /// Right, fixed by strike vs. close
    pub right: OptionRight,
    /// Option exchange
    pub exchange: String,
}

impl OptionContract {
    /// Build the contract for one (strike, expiration) cell
    pub fn for_cell(
        underlying: &ContractDescriptor,
        close: f64,
        strike: f64,
        expiry: NaiveDate,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            symbol: underlying.symbol.clone(),
            sec_type: SecurityType::FutureOption,
            expiry,
            strike,
            right: OptionRight::for_strike(strike, close),
            exchange: exchange.into(),
        }
    }

    /// Same listing, strikes compared with a small tolerance
    pub fn same_listing(&self, other: &OptionContract) -> bool {
        self.symbol == other.symbol
            && self.expiry == other.expiry
            && self.right == other.right
            && (self.strike - other.strike).abs() < 1e-9
    }
}
