//! # FOP Surface - Futures Option Implied Volatility Matrix
//!
//! Builds a strike × expiration implied volatility matrix for the options
//! on one futures underlying and publishes it to a relational store.
//!
//! ## Overview
//!
//! A run is a single sequential pass:
//! - **Resolve**: qualify the underlying's contract id, read the prior close
//! - **Chain**: union of strikes and expirations over all chain definitions
//! - **Universe**: whole strikes within ±25% of close, expirations within a year
//! - **Quotes**: snapshots in batches of at most 100 contracts, paced
//! - **Matrix**: bid/ask midpoint implied vols pivoted by strike and expiration
//! - **Sync**: the mandate's stored surface is replaced in one transaction
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fop_surface::prelude::*;
//!
//! let config = SurfaceConfig::load("surface.toml").unwrap();
//! let mut source = BridgeClient::new(&config.host, config.port, config.client_id).unwrap();
//! let mut store = SurfaceStore::open(&config.db_path).unwrap();
//!
//! let today = chrono::Local::now().date_naive();
//! let job = SurfaceJob::new(config);
//! let summary = job.run(&mut source, &mut store, today, chrono::Utc::now()).unwrap();
//!
//! println!("{} x {} surface written", summary.build.matrix.shape().0, summary.build.matrix.shape().1);
//! ```
//!
//! ## What This Job Does NOT Do
//!
//! - Retry or reconnect to the broker
//! - Authenticate or handle rate-limit errors (it only paces batches)
//! - Compute implied vols itself (the broker's option computations are used)

pub mod core;
pub mod data;
pub mod pipeline;

/// Prelude with commonly used types
pub mod prelude {
    // Core types
    pub use crate::core::{
        final_implied_vol, ContractDescriptor, IvSource, OptionComputation, OptionContract,
        OptionRight, QuoteRow, QuoteTable, SecurityType, SurfaceError, SurfaceResult,
        TickerSnapshot, VolMatrix,
    };

    // Collaborators
    pub use crate::data::{
        BridgeClient, MarketDataSource, MarketDataType, Recorder, ReplayBook, ReplaySource,
        SecurityIds, StoredSurface, SurfaceStore, WriteSummary,
    };

    // Pipeline
    pub use crate::pipeline::{
        filter_expirations, filter_strikes, QuoteBatcher, RunSummary, SurfaceBuild,
        SurfaceConfig, SurfaceJob, SurfaceUniverse, UniverseFilter,
    };
}

// Re-export main types at crate root
pub use crate::core::{SurfaceError, SurfaceResult, VolMatrix};
pub use crate::pipeline::{SurfaceConfig, SurfaceJob};
