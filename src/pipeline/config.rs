//! Configuration for the surface job
//!
//! Loaded from a TOML file; every field has a default so a file only needs
//! the values that differ.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{IvSource, SurfaceError, SurfaceResult};
use crate::data::MarketDataType;

/// Upper bound imposed by the broker on one quote request
pub const BROKER_BATCH_LIMIT: usize = 100;

/// Longest accepted forward expiration window, in days
pub const MAX_FORWARD_WINDOW_DAYS: i64 = 3650;

/// Longest accepted pause between quote requests, in seconds
pub const MAX_BATCH_PAUSE_SECONDS: f64 = 3600.0;

/// Surface job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Bridge host
    #[serde(default = "default_host")]
    pub host: String,
    /// Bridge port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Gateway client id
    #[serde(default = "default_client_id")]
    pub client_id: i32,
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Mandate / underlying key the surface is stored under
    #[serde(default = "default_mandate_id")]
    pub mandate_id: String,
    /// Exchange the options are listed on
    #[serde(default = "default_option_exchange")]
    pub option_exchange: String,
    /// Strike band around the close, as a fraction (0.25 = ±25%)
    #[serde(default = "default_strike_band_pct")]
    pub strike_band_pct: f64,
    /// Forward expiration window in calendar days
    #[serde(default = "default_forward_window_days")]
    pub forward_window_days: i64,
    /// Contracts per quote request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Pause between quote requests
    #[serde(default = "default_batch_pause_seconds")]
    pub batch_pause_seconds: f64,
    /// Contract id override; otherwise looked up in the store by mandate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<i64>,
    /// Contract id of the next futures contract, for expirations past the
    /// front contract's last trade date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_contract_id: Option<i64>,
    /// Market data type for quote requests
    #[serde(default)]
    pub market_data_type: MarketDataType,
    /// Drop next month's 4th-slot expiration (off unless asked for)
    #[serde(default)]
    pub skip_borderline_monthly: bool,
    /// Implied vol column feeding the matrix
    #[serde(default)]
    pub matrix_source: IvSource,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 7496 }
fn default_client_id() -> i32 { 13 }
fn default_db_path() -> PathBuf { PathBuf::from("VolSurface.db") }
fn default_mandate_id() -> String { "DUMMY".to_string() }
fn default_option_exchange() -> String { "GLOBEX".to_string() }
fn default_strike_band_pct() -> f64 { 0.25 }
fn default_forward_window_days() -> i64 { 365 }
fn default_max_batch_size() -> usize { BROKER_BATCH_LIMIT }
fn default_batch_pause_seconds() -> f64 { 1.0 }

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            db_path: default_db_path(),
            mandate_id: default_mandate_id(),
            option_exchange: default_option_exchange(),
            strike_band_pct: default_strike_band_pct(),
            forward_window_days: default_forward_window_days(),
            max_batch_size: default_max_batch_size(),
            batch_pause_seconds: default_batch_pause_seconds(),
            contract_id: None,
            roll_contract_id: None,
            market_data_type: MarketDataType::default(),
            skip_borderline_monthly: false,
            matrix_source: IvSource::default(),
        }
    }
}

impl SurfaceConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> SurfaceResult<Self> {
        let path = path.as_ref();
        tracing::info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: SurfaceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> SurfaceResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SurfaceError::config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> SurfaceResult<()> {
        if self.mandate_id.trim().is_empty() {
            return Err(SurfaceError::config("mandate_id must not be empty"));
        }
        if self.option_exchange.trim().is_empty() {
            return Err(SurfaceError::config("option_exchange must not be empty"));
        }
        if !(self.strike_band_pct > 0.0 && self.strike_band_pct < 1.0) {
            return Err(SurfaceError::config(format!(
                "strike_band_pct must be in (0, 1), got {}",
                self.strike_band_pct
            )));
        }
        if self.forward_window_days <= 0 || self.forward_window_days > MAX_FORWARD_WINDOW_DAYS {
            return Err(SurfaceError::config(format!(
                "forward_window_days must be in 1..={}, got {}",
                MAX_FORWARD_WINDOW_DAYS, self.forward_window_days
            )));
        }
        if self.max_batch_size == 0 || self.max_batch_size > BROKER_BATCH_LIMIT {
            return Err(SurfaceError::config(format!(
                "max_batch_size must be in 1..={}, got {}",
                BROKER_BATCH_LIMIT, self.max_batch_size
            )));
        }
        if !(0.0..=MAX_BATCH_PAUSE_SECONDS).contains(&self.batch_pause_seconds) {
            return Err(SurfaceError::config(format!(
                "batch_pause_seconds must be in [0, {}], got {}",
                MAX_BATCH_PAUSE_SECONDS, self.batch_pause_seconds
            )));
        }
        Ok(())
    }
}
