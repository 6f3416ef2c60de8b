//! Core data types for the surface job
//!
//! Defines fundamental types:
//! - ContractDescriptor / OptionContract: underlying and option specs
//! - OptionComputation: per-side implied vol and Greeks
//! - TickerSnapshot / QuoteTable: batched quote results
//! - VolMatrix: strike × expiration implied vol grid

pub mod error;
pub mod expiry;
pub mod greeks;
pub mod option;
pub mod quote;
pub mod surface;

pub use error::*;
pub use expiry::{
    format_expiration, is_borderline_monthly, next_month, parse_contract_month,
    parse_expiration, weekly_slot,
};
pub use greeks::*;
pub use option::*;
pub use quote::*;
pub use surface::*;
