//! External collaborators
//!
//! Handles:
//! - Market data contract and the bridge client that implements it
//! - JSON capture/replay of a run's market data
//! - Relational store for the published surface

pub mod bridge;
pub mod market;
pub mod replay;
pub mod store;

pub use bridge::*;
pub use market::*;
pub use replay::*;
pub use store::*;
