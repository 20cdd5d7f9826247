//! Engine, session and inference configuration
//!
//! All structs deserialize with `#[serde(default)]`, so a partial JSON or
//! TOML document only has to name the values it changes. Call `validate()`
//! (the builders do) before use.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{PatternError, Period, Result};

// ============================================================
// ENGINE
// ============================================================

/// Thresholds of the analysis cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Candle buffer capacity per session
    pub capacity: Period,
    /// Below this many candles the engine keeps scanning
    pub min_window: Period,
    /// Trailing candles analysed per cycle
    pub analysis_window: Period,
    /// Trailing candles left out of the neckline search
    pub neckline_exclusion: usize,
    /// Trend sensitivity in percent; `|change| >= sensitivity` is a directional trend
    pub sensitivity_pct: f64,
    /// Probability reported when trend agrees with the signal
    pub high_probability: f64,
    /// Probability reported otherwise
    pub standard_probability: f64,
    /// Multiple of the pattern height projected past the neckline
    pub projection_factor: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: Period::new_const(120),
            min_window: Period::new_const(40),
            analysis_window: Period::new_const(40),
            neckline_exclusion: 5,
            sensitivity_pct: 0.05,
            high_probability: 94.2,
            standard_probability: 68.5,
            projection_factor: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let capacity = self.capacity.get();
        let min_window = self.min_window.get();
        let analysis_window = self.analysis_window.get();

        if min_window > capacity {
            return Err(PatternError::InvalidConfig(format!(
                "min_window {min_window} exceeds buffer capacity {capacity}"
            )));
        }
        if analysis_window < min_window || analysis_window > capacity {
            return Err(PatternError::InvalidConfig(format!(
                "analysis_window {analysis_window} must lie within [{min_window}, {capacity}]"
            )));
        }
        // first extreme, neckline and at least one candle after it
        if min_window < self.neckline_exclusion + 4 {
            return Err(PatternError::InvalidConfig(format!(
                "min_window {min_window} too small for neckline_exclusion {}",
                self.neckline_exclusion
            )));
        }
        // zero would class an unchanged window as overbought
        if !self.sensitivity_pct.is_finite() || self.sensitivity_pct <= 0.0 {
            return Err(PatternError::InvalidValue("sensitivity_pct must be a positive number"));
        }
        for (field, value) in [
            ("high_probability", self.high_probability),
            ("standard_probability", self.standard_probability),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(PatternError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: 100.0,
                });
            }
        }
        if self.standard_probability > self.high_probability {
            return Err(PatternError::InvalidConfig(
                "standard_probability above high_probability".to_string(),
            ));
        }
        if !self.projection_factor.is_finite() || self.projection_factor < 0.0 {
            return Err(PatternError::InvalidValue("projection_factor must be a non-negative number"));
        }
        Ok(())
    }
}

// ============================================================
// SESSION
// ============================================================

/// Scheduling of one streaming symbol session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum spacing of analyses triggered by in-progress ticks
    pub analysis_interval_ms: u64,
    /// Fixed delay before re-subscribing a dropped feed
    pub reconnect_delay_ms: u64,
    /// Closed candles requested from feed history before going live (0 = none)
    pub history_limit: usize,
    /// Capacity of the alert broadcast channel
    pub alert_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            analysis_interval_ms: 5_000,
            reconnect_delay_ms: 5_000,
            history_limit: 30,
            alert_capacity: 16,
        }
    }
}

impl SessionConfig {
    #[inline]
    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms)
    }

    #[inline]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.alert_capacity == 0 {
            return Err(PatternError::InvalidValue("alert_capacity must be > 0"));
        }
        Ok(())
    }
}

// ============================================================
// INFERENCE
// ============================================================

/// What to do when the remote matcher cannot be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Run the local matcher instead
    #[default]
    Local,
    /// Report an OFFLINE verdict
    Offline,
}

/// Remote structure-inference collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
    pub fallback: FallbackPolicy,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5001/analyze-structure".to_string(),
            timeout_ms: 3_000,
            fallback: FallbackPolicy::Local,
        }
    }
}

impl InferenceConfig {
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(PatternError::InvalidConfig(format!(
                "inference endpoint must be http(s): {}",
                self.endpoint
            )));
        }
        if self.timeout_ms == 0 {
            return Err(PatternError::InvalidValue("timeout_ms must be > 0"));
        }
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================
