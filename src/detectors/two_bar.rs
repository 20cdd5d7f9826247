//! Two-bar candlestick detectors
//!
//! Engulfing, harami, piercing line, dark cloud cover and tweezers. The bar
//! at `index` is the second (confirming) candle.

use super::helpers::{has_range, is_long_body, EQUAL_RATIO, LONG_BODY_FACTOR};
use super::{CandleContext, Direction, PatternDetector, PatternId, PatternMatch, Trend};
use crate::{Candle, PatternError, Result};

impl_with_defaults!(
    EngulfingDetector,
    HaramiDetector,
    PiercingDetector,
    DarkCloudCoverDetector,
    TweezerDetector,
);

fn pair(bars: &[Candle], index: usize) -> Option<(&Candle, &Candle)> {
    if index < 1 {
        return None;
    }
    let prev = bars.get(index - 1)?;
    let curr = bars.get(index)?;
    (has_range(prev) && has_range(curr)).then_some((prev, curr))
}

fn two(id: PatternId, direction: Direction, strength: f64, index: usize) -> PatternMatch {
    PatternMatch {
        pattern_id: id,
        direction,
        strength,
        start_index: index - 1,
        end_index: index,
    }
}

// ============================================================
// ENGULFING
// ============================================================

/// Engulfing - second body swallows the opposite-colored first body.
/// Emits `BULLISH_ENGULFING` or `BEARISH_ENGULFING`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngulfingDetector;

impl PatternDetector for EngulfingDetector {
    fn id(&self) -> PatternId {
        PatternId("ENGULFING")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let (prev, curr) = pair(bars, index)?;
        if curr.body() <= prev.body() {
            return None;
        }

        let covers = curr.body_top() >= prev.body_top() && curr.body_bottom() <= prev.body_bottom();
        if !covers {
            return None;
        }
        let strict = curr.body_top() > prev.body_top() && curr.body_bottom() < prev.body_bottom();
        let strength = if strict { 0.75 } else { 0.7 };

        if prev.is_bearish() && curr.is_bullish() {
            Some(two(PatternId("BULLISH_ENGULFING"), Direction::Bullish, strength, index))
        } else if prev.is_bullish() && curr.is_bearish() {
            Some(two(PatternId("BEARISH_ENGULFING"), Direction::Bearish, strength, index))
        } else {
            None
        }
    }
}

// ============================================================
// HARAMI
// ============================================================

/// Harami - small second body inside a long first body.
/// Emits `BULLISH_HARAMI` after a bearish first candle, `BEARISH_HARAMI` after a bullish one.
#[derive(Debug, Clone, Copy)]
pub struct HaramiDetector {
    pub long_body_factor: f64,
    /// Second body as a max share of the first
    pub max_inner_ratio: f64,
}

impl Default for HaramiDetector {
    fn default() -> Self {
        Self {
            long_body_factor: LONG_BODY_FACTOR,
            max_inner_ratio: 0.5,
        }
    }
}

impl PatternDetector for HaramiDetector {
    fn id(&self) -> PatternId {
        PatternId("HARAMI")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect(&self, bars: &[Candle], index: usize, ctx: &CandleContext) -> Option<PatternMatch> {
        let (prev, curr) = pair(bars, index)?;
        if !is_long_body(prev.body(), ctx.avg_body, self.long_body_factor) {
            return None;
        }
        let inside = curr.body_top() <= prev.body_top() && curr.body_bottom() >= prev.body_bottom();
        if !inside || curr.body() > prev.body() * self.max_inner_ratio {
            return None;
        }

        if prev.is_bearish() {
            Some(two(PatternId("BULLISH_HARAMI"), Direction::Bullish, 0.6, index))
        } else if prev.is_bullish() {
            Some(two(PatternId("BEARISH_HARAMI"), Direction::Bearish, 0.6, index))
        } else {
            None
        }
    }

    fn validate_config(&self) -> Result<()> {
        if !(self.max_inner_ratio > 0.0 && self.max_inner_ratio < 1.0) {
            return Err(PatternError::OutOfRange {
                field: "HaramiDetector.max_inner_ratio",
                value: self.max_inner_ratio,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

// ============================================================
// PIERCING / DARK CLOUD
// ============================================================

/// Piercing line - bullish candle opening below the prior low and closing
/// above the midpoint of a long bearish body
#[derive(Debug, Clone, Copy)]
pub struct PiercingDetector {
    pub long_body_factor: f64,
}

impl Default for PiercingDetector {
    fn default() -> Self {
        Self {
            long_body_factor: LONG_BODY_FACTOR,
        }
    }
}

impl PatternDetector for PiercingDetector {
    fn id(&self) -> PatternId {
        PatternId("PIERCING_LINE")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect(&self, bars: &[Candle], index: usize, ctx: &CandleContext) -> Option<PatternMatch> {
        let (prev, curr) = pair(bars, index)?;
        if !prev.is_bearish()
            || !curr.is_bullish()
            || !is_long_body(prev.body(), ctx.avg_body, self.long_body_factor)
        {
            return None;
        }
        if curr.open < prev.low && curr.close > prev.body_mid() && curr.close < prev.open {
            Some(two(PatternDetector::id(self), Direction::Bullish, 0.7, index))
        } else {
            None
        }
    }
}

/// Dark cloud cover - bearish candle opening above the prior high and
/// closing below the midpoint of a long bullish body
#[derive(Debug, Clone, Copy)]
pub struct DarkCloudCoverDetector {
    pub long_body_factor: f64,
}

impl Default for DarkCloudCoverDetector {
    fn default() -> Self {
        Self {
            long_body_factor: LONG_BODY_FACTOR,
        }
    }
}

impl PatternDetector for DarkCloudCoverDetector {
    fn id(&self) -> PatternId {
        PatternId("DARK_CLOUD_COVER")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect(&self, bars: &[Candle], index: usize, ctx: &CandleContext) -> Option<PatternMatch> {
        let (prev, curr) = pair(bars, index)?;
        if !prev.is_bullish()
            || !curr.is_bearish()
            || !is_long_body(prev.body(), ctx.avg_body, self.long_body_factor)
        {
            return None;
        }
        if curr.open > prev.high && curr.close < prev.body_mid() && curr.close > prev.open {
            Some(two(PatternDetector::id(self), Direction::Bearish, 0.7, index))
        } else {
            None
        }
    }
}

// ============================================================
// TWEEZERS
// ============================================================

/// Tweezers - matching lows after a decline (`TWEEZER_BOTTOM`) or matching
/// highs after an advance (`TWEEZER_TOP`), with a color flip.
#[derive(Debug, Clone, Copy)]
pub struct TweezerDetector {
    /// Max extreme difference as share of the average range
    pub tolerance: f64,
}

impl Default for TweezerDetector {
    fn default() -> Self {
        Self {
            tolerance: EQUAL_RATIO,
        }
    }
}

impl PatternDetector for TweezerDetector {
    fn id(&self) -> PatternId {
        PatternId("TWEEZER")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect(&self, bars: &[Candle], index: usize, ctx: &CandleContext) -> Option<PatternMatch> {
        let (prev, curr) = pair(bars, index)?;
        let scale = if ctx.avg_range > 0.0 {
            ctx.avg_range
        } else {
            prev.range().max(curr.range())
        };
        let limit = scale * self.tolerance;

        match ctx.trend {
            Trend::Down
                if prev.is_bearish() && curr.is_bullish() && (prev.low - curr.low).abs() <= limit =>
            {
                Some(two(PatternId("TWEEZER_BOTTOM"), Direction::Bullish, 0.6, index))
            },
            Trend::Up
                if prev.is_bullish() && curr.is_bearish() && (prev.high - curr.high).abs() <= limit =>
            {
                Some(two(PatternId("TWEEZER_TOP"), Direction::Bearish, 0.6, index))
            },
            _ => None,
        }
    }

    fn validate_config(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(PatternError::InvalidValue("TweezerDetector.tolerance must be >= 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(trend: Trend, avg_body: f64) -> CandleContext {
        CandleContext {
            trend,
            avg_body,
            avg_range: 4.0,
        }
    }

    #[test]
    fn test_engulfing_both_directions() {
        let bullish = [Candle::new(101.0, 101.5, 99.5, 100.0), Candle::new(99.8, 102.5, 99.5, 102.0)];
        let bearish = [Candle::new(100.0, 101.5, 99.5, 101.0), Candle::new(101.2, 101.5, 98.5, 99.0)];
        let c = ctx(Trend::Sideways, 1.0);
        let d = EngulfingDetector::with_defaults();

        let m = d.detect(&bullish, 1, &c).unwrap();
        assert_eq!(m.pattern_id, PatternId("BULLISH_ENGULFING"));
        assert_eq!((m.start_index, m.end_index), (0, 1));
        let m = d.detect(&bearish, 1, &c).unwrap();
        assert_eq!(m.pattern_id, PatternId("BEARISH_ENGULFING"));
        assert!(d.detect(&bullish, 0, &c).is_none());
    }

    #[test]
    fn test_harami_needs_long_first_body() {
        let bars = [Candle::new(106.0, 106.5, 99.5, 100.0), Candle::new(102.0, 103.5, 101.5, 103.0)];
        let d = HaramiDetector::with_defaults();
        let m = d.detect(&bars, 1, &ctx(Trend::Sideways, 2.0)).unwrap();
        assert_eq!(m.pattern_id, PatternId("BULLISH_HARAMI"));
        assert!(d.detect(&bars, 1, &ctx(Trend::Sideways, 10.0)).is_none());
    }

    #[test]
    fn test_piercing_and_dark_cloud() {
        let piercing = [Candle::new(106.0, 106.5, 99.5, 100.0), Candle::new(99.0, 104.5, 98.8, 104.0)];
        let dark = [Candle::new(100.0, 106.5, 99.5, 106.0), Candle::new(107.0, 107.2, 101.5, 102.0)];
        let c = ctx(Trend::Sideways, 2.0);
        assert!(PiercingDetector::with_defaults().detect(&piercing, 1, &c).is_some());
        assert!(DarkCloudCoverDetector::with_defaults().detect(&dark, 1, &c).is_some());
        assert!(PiercingDetector::with_defaults().detect(&dark, 1, &c).is_none());
    }

    #[test]
    fn test_tweezers() {
        let bottom = [Candle::new(102.0, 102.5, 98.0, 99.0), Candle::new(99.0, 101.5, 98.05, 101.0)];
        let top = [Candle::new(98.0, 102.0, 97.5, 101.0), Candle::new(101.0, 102.05, 98.5, 99.0)];
        let d = TweezerDetector::with_defaults();
        let m = d.detect(&bottom, 1, &ctx(Trend::Down, 2.0)).unwrap();
        assert_eq!(m.pattern_id, PatternId("TWEEZER_BOTTOM"));
        let m = d.detect(&top, 1, &ctx(Trend::Up, 2.0)).unwrap();
        assert_eq!(m.pattern_id, PatternId("TWEEZER_TOP"));
        assert!(d.detect(&bottom, 1, &ctx(Trend::Up, 2.0)).is_none());
    }
}
