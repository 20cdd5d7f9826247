//! Three-bar candlestick detectors
//!
//! Morning/evening star and three white soldiers / three black crows. The
//! bar at `index` is the third candle; the long-body test on the first
//! candle uses the average body in front of it.

use super::helpers::{self, has_range, is_long_body, AVERAGING_PERIOD, LONG_BODY_FACTOR, STAR_BODY_RATIO};
use super::{CandleContext, Direction, PatternDetector, PatternId, PatternMatch};
use crate::{Candle, PatternError, Result};

impl_with_defaults!(
    MorningStarDetector,
    EveningStarDetector,
    ThreeWhiteSoldiersDetector,
    ThreeBlackCrowsDetector,
);

fn triple(bars: &[Candle], index: usize) -> Option<[&Candle; 3]> {
    if index < 2 {
        return None;
    }
    let window = bars.get(index - 2..=index)?;
    window
        .iter()
        .all(has_range)
        .then(|| [&window[0], &window[1], &window[2]])
}

fn three(id: PatternId, direction: Direction, strength: f64, index: usize) -> PatternMatch {
    PatternMatch {
        pattern_id: id,
        direction,
        strength,
        start_index: index - 2,
        end_index: index,
    }
}

// ============================================================
// STARS
// ============================================================

/// Star parameters shared by morning and evening star
#[derive(Debug, Clone, Copy)]
pub struct StarShape {
    pub long_body_factor: f64,
    /// Star body as max share of the first body
    pub star_body_ratio: f64,
}

impl Default for StarShape {
    fn default() -> Self {
        Self {
            long_body_factor: LONG_BODY_FACTOR,
            star_body_ratio: STAR_BODY_RATIO,
        }
    }
}

impl StarShape {
    fn first_is_long(&self, bars: &[Candle], index: usize, first: &Candle) -> bool {
        let avg = if index > 2 {
            helpers::trailing_avg_body(bars, index - 2, AVERAGING_PERIOD)
        } else {
            0.0
        };
        is_long_body(first.body(), avg, self.long_body_factor)
    }

    fn is_star(&self, first: &Candle, star: &Candle) -> bool {
        star.body() < first.body() * self.star_body_ratio
    }

    fn validate(&self, name: &'static str) -> Result<()> {
        if !(self.star_body_ratio > 0.0 && self.star_body_ratio < 1.0) {
            return Err(PatternError::InvalidConfig(format!(
                "{name}: star_body_ratio must be in (0, 1)"
            )));
        }
        Ok(())
    }
}

/// Morning star - long bearish candle, small star, bullish candle closing
/// above the first body's midpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct MorningStarDetector {
    pub shape: StarShape,
}

impl PatternDetector for MorningStarDetector {
    fn id(&self) -> PatternId {
        PatternId("MORNING_STAR")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let [first, star, third] = triple(bars, index)?;
        if !first.is_bearish() || !third.is_bullish() {
            return None;
        }
        if !self.shape.first_is_long(bars, index, first) || !self.shape.is_star(first, star) {
            return None;
        }
        if star.body_top() > first.close + first.body() * 0.5 || third.close <= first.body_mid() {
            return None;
        }
        Some(three(PatternDetector::id(self), Direction::Bullish, 0.75, index))
    }

    fn validate_config(&self) -> Result<()> {
        self.shape.validate("MorningStarDetector")
    }
}

/// Evening star - long bullish candle, small star, bearish candle closing
/// below the first body's midpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct EveningStarDetector {
    pub shape: StarShape,
}

impl PatternDetector for EveningStarDetector {
    fn id(&self) -> PatternId {
        PatternId("EVENING_STAR")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let [first, star, third] = triple(bars, index)?;
        if !first.is_bullish() || !third.is_bearish() {
            return None;
        }
        if !self.shape.first_is_long(bars, index, first) || !self.shape.is_star(first, star) {
            return None;
        }
        if star.body_bottom() < first.close - first.body() * 0.5 || third.close >= first.body_mid() {
            return None;
        }
        Some(three(PatternDetector::id(self), Direction::Bearish, 0.75, index))
    }

    fn validate_config(&self) -> Result<()> {
        self.shape.validate("EveningStarDetector")
    }
}

// ============================================================
// SOLDIERS / CROWS
// ============================================================

/// Three white soldiers - three rising bullish candles, each opening inside
/// the previous body, with short upper shadows
#[derive(Debug, Clone, Copy)]
pub struct ThreeWhiteSoldiersDetector {
    /// Min body as share of range for each candle
    pub min_body_ratio: f64,
    /// Max closing shadow as share of body
    pub max_shadow_ratio: f64,
}

impl Default for ThreeWhiteSoldiersDetector {
    fn default() -> Self {
        Self {
            min_body_ratio: 0.5,
            max_shadow_ratio: 0.3,
        }
    }
}

impl PatternDetector for ThreeWhiteSoldiersDetector {
    fn id(&self) -> PatternId {
        PatternId("THREE_WHITE_SOLDIERS")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let candles = triple(bars, index)?;
        let solid = candles.iter().all(|c| {
            c.is_bullish()
                && c.body_ratio().is_some_and(|r| r >= self.min_body_ratio)
                && c.upper_shadow() <= c.body() * self.max_shadow_ratio
        });
        if !solid {
            return None;
        }
        let stepping = candles.windows(2).all(|w| {
            let (prev, curr) = (w[0], w[1]);
            curr.close > prev.close && curr.open >= prev.open && curr.open <= prev.close
        });
        stepping.then(|| three(PatternDetector::id(self), Direction::Bullish, 0.75, index))
    }
}

/// Three black crows - three falling bearish candles, each opening inside
/// the previous body, with short lower shadows
#[derive(Debug, Clone, Copy)]
pub struct ThreeBlackCrowsDetector {
    pub min_body_ratio: f64,
    pub max_shadow_ratio: f64,
}

impl Default for ThreeBlackCrowsDetector {
    fn default() -> Self {
        Self {
            min_body_ratio: 0.5,
            max_shadow_ratio: 0.3,
        }
    }
}

impl PatternDetector for ThreeBlackCrowsDetector {
    fn id(&self) -> PatternId {
        PatternId("THREE_BLACK_CROWS")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let candles = triple(bars, index)?;
        let solid = candles.iter().all(|c| {
            c.is_bearish()
                && c.body_ratio().is_some_and(|r| r >= self.min_body_ratio)
                && c.lower_shadow() <= c.body() * self.max_shadow_ratio
        });
        if !solid {
            return None;
        }
        let stepping = candles.windows(2).all(|w| {
            let (prev, curr) = (w[0], w[1]);
            curr.close < prev.close && curr.open <= prev.open && curr.open >= prev.close
        });
        stepping.then(|| three(PatternDetector::id(self), Direction::Bearish, 0.75, index))
    }
}
