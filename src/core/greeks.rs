//! Option computations
//!
//! Model output the broker attaches to each side of a quote (bid, ask,
//! last, model). Any field may be absent; a whole bundle may be absent when
//! the side has no market data.

use serde::{Deserialize, Serialize};

/// One side's option computation (implied vol plus sensitivities)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionComputation {
    /// Implied volatility (annualized, decimal)
    #[serde(default)]
    pub implied_vol: Option<f64>,
    /// Delta: dV/dF
    #[serde(default)]
    pub delta: Option<f64>,
    /// Gamma: d²V/dF²
    #[serde(default)]
    pub gamma: Option<f64>,
    /// Vega: dV/dσ
    #[serde(default)]
    pub vega: Option<f64>,
    /// Theta: dV/dt
    #[serde(default)]
    pub theta: Option<f64>,
    /// Option price the computation was run on
    #[serde(default)]
    pub option_price: Option<f64>,
    /// Present value of dividends
    #[serde(default)]
    pub pv_dividend: Option<f64>,
    /// Underlying price the computation was run on
    #[serde(default)]
    pub underlying_price: Option<f64>,
}

impl OptionComputation {
    pub fn with_iv(implied_vol: f64) -> Self {
        Self {
            implied_vol: Some(implied_vol),
            ..Default::default()
        }
    }

    /// Implied vol if usable: finite and positive
    pub fn usable_iv(&self) -> Option<f64> {
        self.implied_vol.filter(|v| v.is_finite() && *v > 0.0)
    }
}

/// Implied vol of an optional bundle (missing bundle → missing value)
pub fn bundle_iv(bundle: Option<&OptionComputation>) -> Option<f64> {
    bundle.and_then(|b| b.usable_iv())
}
