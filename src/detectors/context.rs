//! Per-bar context shared by all detectors

use super::helpers::{self, AVERAGING_PERIOD};
use crate::{Candle, Period, Ratio};

/// Short-term direction of the candles leading into a bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Trend {
    Up,
    #[default]
    Sideways,
    Down,
}

/// Context at one bar index, computed from the bars *before* it
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CandleContext {
    pub trend: Trend,
    pub avg_body: f64,
    pub avg_range: f64,
}

/// Precomputes [`CandleContext`] for every bar of a window
#[derive(Debug, Clone)]
pub struct ContextProvider {
    /// Bars looked back to classify the trend
    pub trend_period: Period,
    /// Relative close change that counts as a trend
    pub trend_threshold: Ratio,
    /// Bars averaged for body/range size
    pub candle_period: Period,
}

impl Default for ContextProvider {
    fn default() -> Self {
        Self {
            trend_period: Period::new_const(5),
            trend_threshold: Ratio::new_const(0.002),
            candle_period: Period::new_const(AVERAGING_PERIOD),
        }
    }
}

impl ContextProvider {
    pub fn compute_all(&self, bars: &[Candle]) -> Vec<CandleContext> {
        (0..bars.len()).map(|i| self.compute_at(bars, i)).collect()
    }

    pub fn compute_at(&self, bars: &[Candle], index: usize) -> CandleContext {
        if index >= bars.len() {
            return CandleContext::default();
        }
        let period = self.candle_period.get();
        CandleContext {
            trend: self.trend(bars, index),
            avg_body: helpers::trailing_avg_body(bars, index, period),
            avg_range: helpers::trailing_avg_range(bars, index, period),
        }
    }

    fn trend(&self, bars: &[Candle], index: usize) -> Trend {
        let period = self.trend_period.get();
        if index < period {
            return Trend::Sideways;
        }
        let first = bars[index - period].close;
        let last = bars[index - 1].close;
        if first <= f64::EPSILON {
            return Trend::Sideways;
        }

        let change = (last - first) / first;
        let threshold = self.trend_threshold.get();
        if change >= threshold {
            Trend::Up
        } else if change <= -threshold {
            Trend::Down
        } else {
            Trend::Sideways
        }
    }
}
