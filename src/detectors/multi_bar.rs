//! Five-bar continuation detectors

use super::helpers::{self, has_range, is_long_body, AVERAGING_PERIOD, LONG_BODY_FACTOR};
use super::{CandleContext, Direction, PatternDetector, PatternId, PatternMatch};
use crate::{Candle, PatternError, Result};

impl_with_defaults!(RiseFallThreeMethodsDetector);

/// Rising / falling three methods - a long candle, three small candles held
/// inside its range, then a long candle of the first color breaking past it.
/// Emits `RISING_THREE_METHODS` or `FALLING_THREE_METHODS`.
#[derive(Debug, Clone, Copy)]
pub struct RiseFallThreeMethodsDetector {
    pub long_body_factor: f64,
    /// Inner bodies as max share of the first body
    pub max_inner_ratio: f64,
}

impl Default for RiseFallThreeMethodsDetector {
    fn default() -> Self {
        Self {
            long_body_factor: LONG_BODY_FACTOR,
            max_inner_ratio: 0.5,
        }
    }
}

impl RiseFallThreeMethodsDetector {
    fn rising(&self, first: &Candle, inner: &[Candle], last: &Candle) -> bool {
        first.is_bullish()
            && last.is_bullish()
            && last.close > first.close
            && last.body() >= first.body() * self.max_inner_ratio
            && inner.iter().all(|c| c.low >= first.low && c.high <= first.high)
            && inner.iter().any(Candle::is_bearish)
    }

    fn falling(&self, first: &Candle, inner: &[Candle], last: &Candle) -> bool {
        first.is_bearish()
            && last.is_bearish()
            && last.close < first.close
            && last.body() >= first.body() * self.max_inner_ratio
            && inner.iter().all(|c| c.low >= first.low && c.high <= first.high)
            && inner.iter().any(Candle::is_bullish)
    }
}

impl PatternDetector for RiseFallThreeMethodsDetector {
    fn id(&self) -> PatternId {
        PatternId("THREE_METHODS")
    }

    fn min_bars(&self) -> usize {
        5
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        if index < 4 {
            return None;
        }
        let window = bars.get(index - 4..=index)?;
        if !window.iter().all(has_range) {
            return None;
        }
        let (first, inner, last) = (&window[0], &window[1..4], &window[4]);

        let avg = if index > 4 {
            helpers::trailing_avg_body(bars, index - 4, AVERAGING_PERIOD)
        } else {
            0.0
        };
        if !is_long_body(first.body(), avg, self.long_body_factor)
            || inner.iter().any(|c| c.body() > first.body() * self.max_inner_ratio)
        {
            return None;
        }

        let (id, direction) = if self.rising(first, inner, last) {
            (PatternId("RISING_THREE_METHODS"), Direction::Bullish)
        } else if self.falling(first, inner, last) {
            (PatternId("FALLING_THREE_METHODS"), Direction::Bearish)
        } else {
            return None;
        };

        Some(PatternMatch {
            pattern_id: id,
            direction,
            strength: 0.7,
            start_index: index - 4,
            end_index: index,
        })
    }

    fn validate_config(&self) -> Result<()> {
        if !(self.max_inner_ratio > 0.0 && self.max_inner_ratio < 1.0) {
            return Err(PatternError::OutOfRange {
                field: "RiseFallThreeMethodsDetector.max_inner_ratio",
                value: self.max_inner_ratio,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}
