//! Stage 3: Universe filter
//!
//! Narrows the raw chain to the strikes and expirations the surface is
//! built on:
//! - Strikes: whole numbers strictly inside close × (1 ± band)
//! - Expirations: strictly between today and today + window
//! - Optionally drops next month's 4th weekly slot (see `is_borderline_monthly`)

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::chain::ChainUniverse;
use super::config::SurfaceConfig;
use crate::core::{is_borderline_monthly, SurfaceError, SurfaceResult};

/// Filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniverseFilter {
    pub strike_band_pct: f64,
    pub forward_window_days: i64,
    pub skip_borderline_monthly: bool,
}

impl Default for UniverseFilter {
    fn default() -> Self {
        Self {
            strike_band_pct: 0.25,
            forward_window_days: 365,
            skip_borderline_monthly: false,
        }
    }
}

impl From<&SurfaceConfig> for UniverseFilter {
    fn from(config: &SurfaceConfig) -> Self {
        Self {
            strike_band_pct: config.strike_band_pct,
            forward_window_days: config.forward_window_days,
            skip_borderline_monthly: config.skip_borderline_monthly,
        }
    }
}

/// Strikes and expirations selected for the surface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceUniverse {
    /// Ascending
    pub strikes: Vec<f64>,
    /// Ascending
    pub expirations: Vec<NaiveDate>,
}

impl SurfaceUniverse {
    /// Number of (strike, expiration) cells
    pub fn cell_count(&self) -> usize {
        self.strikes.len() * self.expirations.len()
    }
}

/// Whole-number strikes strictly inside the band around `close`, ascending
pub fn filter_strikes(strikes: &[f64], close: f64, band_pct: f64) -> Vec<f64> {
    let lower = close * (1.0 - band_pct);
    let upper = close * (1.0 + band_pct);

    let mut kept: Vec<f64> = strikes
        .iter()
        .copied()
        .filter(|s| s.is_finite() && s.fract() == 0.0 && lower < *s && *s < upper)
        .collect();
    kept.sort_by(|a, b| a.total_cmp(b));
    kept.dedup();
    kept
}

/// Expirations strictly between `today` and `today + window_days`, ascending
///
/// A window reaching past the last representable date keeps every future
/// expiration.
pub fn filter_expirations(expirations: &[NaiveDate], today: NaiveDate, window_days: i64) -> Vec<NaiveDate> {
    if window_days <= 0 {
        return Vec::new();
    }
    let horizon = Duration::try_days(window_days)
        .and_then(|window| today.checked_add_signed(window))
        .unwrap_or(NaiveDate::MAX);

    let mut kept: Vec<NaiveDate> = expirations
        .iter()
        .copied()
        .filter(|e| today < *e && *e < horizon)
        .collect();
    kept.sort();
    kept.dedup();
    kept
}

impl UniverseFilter {
    /// Apply the filter; an empty result on either axis is fatal
    pub fn apply(&self, chain: &ChainUniverse, close: f64, today: NaiveDate) -> SurfaceResult<SurfaceUniverse> {
        let strikes = filter_strikes(&chain.strikes, close, self.strike_band_pct);

        let mut expirations = filter_expirations(&chain.expirations, today, self.forward_window_days);
        if self.skip_borderline_monthly {
            expirations.retain(|&e| {
                let borderline = is_borderline_monthly(e, today);
                if borderline {
                    tracing::debug!("Dropping borderline monthly expiration {}", e);
                }
                !borderline
            });
        }

        tracing::info!(
            "Universe: {}/{} strikes in ({:.2}, {:.2}), {}/{} expirations",
            strikes.len(),
            chain.strikes.len(),
            close * (1.0 - self.strike_band_pct),
            close * (1.0 + self.strike_band_pct),
            expirations.len(),
            chain.expirations.len()
        );

        if strikes.is_empty() {
            return Err(SurfaceError::data_unavailable(format!(
                "No whole-number strike within {:.0}% of close {}",
                self.strike_band_pct * 100.0,
                close
            )));
        }
        if expirations.is_empty() {
            return Err(SurfaceError::data_unavailable(format!(
                "No expiration within {} days of {}",
                self.forward_window_days, today
            )));
        }

        Ok(SurfaceUniverse { strikes, expirations })
    }
}
