//! Single-bar candlestick detectors
//!
//! Doji family, spinning top, hammer family and marubozu. Shapes are measured
//! against the candle's own range; the hammer family additionally needs the
//! preceding trend from [`CandleContext`].

use super::helpers::{
    has_range, is_doji, is_tiny_shadow, DOJI_BODY_RATIO, LONG_SHADOW_FACTOR, MARUBOZU_BODY_RATIO,
    SMALL_BODY_RATIO, SPINNING_BODY_RATIO, TINY_SHADOW_RATIO,
};
use super::{CandleContext, Direction, PatternDetector, PatternId, PatternMatch, Trend};
use crate::{Candle, PatternError, Result};

impl_with_defaults!(
    DojiDetector,
    DragonflyDojiDetector,
    GravestoneDojiDetector,
    SpinningTopDetector,
    HammerDetector,
    InvertedHammerDetector,
    HangingManDetector,
    ShootingStarDetector,
    MarubozuDetector,
);

fn single(id: PatternId, direction: Direction, strength: f64, index: usize) -> PatternMatch {
    PatternMatch {
        pattern_id: id,
        direction,
        strength: strength.clamp(0.0, 1.0),
        start_index: index,
        end_index: index,
    }
}

fn check_ratio(field: &'static str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(PatternError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

// ============================================================
// DOJI FAMILY
// ============================================================

/// Doji - open and close (nearly) equal
#[derive(Debug, Clone, Copy)]
pub struct DojiDetector {
    pub body_ratio: f64,
}

impl Default for DojiDetector {
    fn default() -> Self {
        Self {
            body_ratio: DOJI_BODY_RATIO,
        }
    }
}

impl PatternDetector for DojiDetector {
    fn id(&self) -> PatternId {
        PatternId("DOJI")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let ratio = bar.body_ratio()?;
        if ratio > self.body_ratio {
            return None;
        }
        let strength = 0.6 + 0.3 * (1.0 - ratio / self.body_ratio);
        Some(single(PatternDetector::id(self), Direction::Neutral, strength, index))
    }

    fn validate_config(&self) -> Result<()> {
        check_ratio("DojiDetector.body_ratio", self.body_ratio)
    }
}

/// Dragonfly doji - doji at the top of a long lower shadow
#[derive(Debug, Clone, Copy)]
pub struct DragonflyDojiDetector {
    pub body_ratio: f64,
    pub tiny_shadow_ratio: f64,
    /// Lower shadow as share of range
    pub min_shadow_ratio: f64,
}

impl Default for DragonflyDojiDetector {
    fn default() -> Self {
        Self {
            body_ratio: DOJI_BODY_RATIO,
            tiny_shadow_ratio: TINY_SHADOW_RATIO,
            min_shadow_ratio: 0.6,
        }
    }
}

impl PatternDetector for DragonflyDojiDetector {
    fn id(&self) -> PatternId {
        PatternId("DRAGONFLY_DOJI")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let range = bar.range();
        if !is_doji(bar, self.body_ratio)
            || !is_tiny_shadow(bar.upper_shadow(), range, self.tiny_shadow_ratio)
            || bar.lower_shadow() < range * self.min_shadow_ratio
        {
            return None;
        }
        Some(single(PatternDetector::id(self), Direction::Bullish, 0.7, index))
    }

    fn validate_config(&self) -> Result<()> {
        check_ratio("DragonflyDojiDetector.body_ratio", self.body_ratio)?;
        check_ratio("DragonflyDojiDetector.min_shadow_ratio", self.min_shadow_ratio)
    }
}

/// Gravestone doji - doji at the bottom of a long upper shadow
#[derive(Debug, Clone, Copy)]
pub struct GravestoneDojiDetector {
    pub body_ratio: f64,
    pub tiny_shadow_ratio: f64,
    pub min_shadow_ratio: f64,
}

impl Default for GravestoneDojiDetector {
    fn default() -> Self {
        Self {
            body_ratio: DOJI_BODY_RATIO,
            tiny_shadow_ratio: TINY_SHADOW_RATIO,
            min_shadow_ratio: 0.6,
        }
    }
}

impl PatternDetector for GravestoneDojiDetector {
    fn id(&self) -> PatternId {
        PatternId("GRAVESTONE_DOJI")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let range = bar.range();
        if !is_doji(bar, self.body_ratio)
            || !is_tiny_shadow(bar.lower_shadow(), range, self.tiny_shadow_ratio)
            || bar.upper_shadow() < range * self.min_shadow_ratio
        {
            return None;
        }
        Some(single(PatternDetector::id(self), Direction::Bearish, 0.7, index))
    }

    fn validate_config(&self) -> Result<()> {
        check_ratio("GravestoneDojiDetector.body_ratio", self.body_ratio)?;
        check_ratio("GravestoneDojiDetector.min_shadow_ratio", self.min_shadow_ratio)
    }
}

/// Spinning top - small body, both shadows longer than the body
#[derive(Debug, Clone, Copy)]
pub struct SpinningTopDetector {
    pub max_body_ratio: f64,
    pub doji_ratio: f64,
}

impl Default for SpinningTopDetector {
    fn default() -> Self {
        Self {
            max_body_ratio: SPINNING_BODY_RATIO,
            doji_ratio: DOJI_BODY_RATIO,
        }
    }
}

impl PatternDetector for SpinningTopDetector {
    fn id(&self) -> PatternId {
        PatternId("SPINNING_TOP")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let ratio = bar.body_ratio()?;
        if ratio <= self.doji_ratio || ratio > self.max_body_ratio {
            return None;
        }
        let body = bar.body();
        if bar.upper_shadow() <= body || bar.lower_shadow() <= body {
            return None;
        }
        Some(single(PatternDetector::id(self), Direction::Neutral, 0.55, index))
    }

    fn validate_config(&self) -> Result<()> {
        check_ratio("SpinningTopDetector.max_body_ratio", self.max_body_ratio)?;
        if self.doji_ratio >= self.max_body_ratio {
            return Err(PatternError::InvalidConfig(
                "SpinningTopDetector: doji_ratio must be below max_body_ratio".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// HAMMER FAMILY
// ============================================================

/// Shape parameters shared by the hammer family
#[derive(Debug, Clone, Copy)]
pub struct ShadowShape {
    /// Max body as share of range
    pub max_body_ratio: f64,
    /// Long shadow must be >= body * factor
    pub shadow_factor: f64,
    /// Opposite shadow must be <= range * ratio
    pub tiny_shadow_ratio: f64,
}

impl Default for ShadowShape {
    fn default() -> Self {
        Self {
            max_body_ratio: SMALL_BODY_RATIO,
            shadow_factor: LONG_SHADOW_FACTOR,
            tiny_shadow_ratio: TINY_SHADOW_RATIO,
        }
    }
}

impl ShadowShape {
    /// Small body at the top, long lower shadow
    fn long_lower(&self, bar: &Candle) -> bool {
        self.fits(bar, bar.lower_shadow(), bar.upper_shadow())
    }

    /// Small body at the bottom, long upper shadow
    fn long_upper(&self, bar: &Candle) -> bool {
        self.fits(bar, bar.upper_shadow(), bar.lower_shadow())
    }

    fn fits(&self, bar: &Candle, long: f64, short: f64) -> bool {
        if !has_range(bar) {
            return false;
        }
        let range = bar.range();
        let body = bar.body();
        body <= range * self.max_body_ratio
            && long >= body * self.shadow_factor
            && long >= range * 0.5
            && is_tiny_shadow(short, range, self.tiny_shadow_ratio)
    }

    fn validate(&self, name: &'static str) -> Result<()> {
        check_ratio(name, self.max_body_ratio)?;
        if !(self.shadow_factor.is_finite() && self.shadow_factor > 0.0) {
            return Err(PatternError::InvalidConfig(format!(
                "{name}: shadow_factor must be positive"
            )));
        }
        Ok(())
    }
}

macro_rules! shadow_detector {
    ($(#[$doc:meta])* $name:ident, $id:literal, $shape:ident, $trend:expr, $direction:expr, $strength:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name {
            pub shape: ShadowShape,
        }

        impl PatternDetector for $name {
            fn id(&self) -> PatternId {
                PatternId($id)
            }

            fn min_bars(&self) -> usize {
                1
            }

            fn detect(&self, bars: &[Candle], index: usize, ctx: &CandleContext) -> Option<PatternMatch> {
                let bar = bars.get(index)?;
                if ctx.trend != $trend || !self.shape.$shape(bar) {
                    return None;
                }
                Some(single(PatternDetector::id(self), $direction, $strength, index))
            }

            fn validate_config(&self) -> Result<()> {
                self.shape.validate(stringify!($name))
            }
        }
    };
}

shadow_detector!(
    /// Hammer - long lower shadow after a decline
    HammerDetector, "HAMMER", long_lower, Trend::Down, Direction::Bullish, 0.65
);
shadow_detector!(
    /// Hanging man - hammer shape after an advance
    HangingManDetector, "HANGING_MAN", long_lower, Trend::Up, Direction::Bearish, 0.6
);
shadow_detector!(
    /// Inverted hammer - long upper shadow after a decline
    InvertedHammerDetector, "INVERTED_HAMMER", long_upper, Trend::Down, Direction::Bullish, 0.6
);
shadow_detector!(
    /// Shooting star - long upper shadow after an advance
    ShootingStarDetector, "SHOOTING_STAR", long_upper, Trend::Up, Direction::Bearish, 0.65
);

// ============================================================
// MARUBOZU
// ============================================================

/// Marubozu - body covers (almost) the whole range.
/// Emits `WHITE_MARUBOZU` or `BLACK_MARUBOZU`.
#[derive(Debug, Clone, Copy)]
pub struct MarubozuDetector {
    pub min_body_ratio: f64,
}

impl Default for MarubozuDetector {
    fn default() -> Self {
        Self {
            min_body_ratio: MARUBOZU_BODY_RATIO,
        }
    }
}

impl PatternDetector for MarubozuDetector {
    fn id(&self) -> PatternId {
        PatternId("MARUBOZU")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let ratio = bar.body_ratio()?;
        if ratio < self.min_body_ratio {
            return None;
        }
        let (id, direction) = if bar.is_bullish() {
            (PatternId("WHITE_MARUBOZU"), Direction::Bullish)
        } else {
            (PatternId("BLACK_MARUBOZU"), Direction::Bearish)
        };
        Some(single(id, direction, 0.6 + 0.1 * ratio, index))
    }

    fn validate_config(&self) -> Result<()> {
        check_ratio("MarubozuDetector.min_body_ratio", self.min_body_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(trend: Trend) -> CandleContext {
        CandleContext {
            trend,
            avg_body: 1.0,
            avg_range: 2.0,
        }
    }

    #[test]
    fn test_doji() {
        let bars = [Candle::new(100.0, 101.0, 99.0, 100.05)];
        let m = DojiDetector::with_defaults()
            .detect(&bars, 0, &ctx(Trend::Sideways))
            .unwrap();
        assert_eq!(m.pattern_id, PatternId("DOJI"));
        assert!(m.strength > 0.6);
    }

    #[test]
    fn test_flat_candle_is_nothing() {
        let bars = [Candle::new(5.0, 5.0, 5.0, 5.0)];
        let c = ctx(Trend::Down);
        assert!(DojiDetector::with_defaults().detect(&bars, 0, &c).is_none());
        assert!(HammerDetector::with_defaults().detect(&bars, 0, &c).is_none());
        assert!(MarubozuDetector::with_defaults().detect(&bars, 0, &c).is_none());
    }

    #[test]
    fn test_dragonfly_and_gravestone() {
        let dragonfly = [Candle::new(100.0, 100.05, 96.0, 100.0)];
        let gravestone = [Candle::new(100.0, 104.0, 99.95, 100.0)];
        let c = ctx(Trend::Sideways);
        assert!(DragonflyDojiDetector::with_defaults().detect(&dragonfly, 0, &c).is_some());
        assert!(GravestoneDojiDetector::with_defaults().detect(&dragonfly, 0, &c).is_none());
        assert!(GravestoneDojiDetector::with_defaults().detect(&gravestone, 0, &c).is_some());
    }

    #[test]
    fn test_hammer_depends_on_trend() {
        let bars = [Candle::new(99.0, 100.1, 95.0, 100.0)];
        assert!(HammerDetector::with_defaults().detect(&bars, 0, &ctx(Trend::Down)).is_some());
        assert!(HammerDetector::with_defaults().detect(&bars, 0, &ctx(Trend::Up)).is_none());
        let hanging = HangingManDetector::with_defaults()
            .detect(&bars, 0, &ctx(Trend::Up))
            .unwrap();
        assert_eq!(hanging.direction, Direction::Bearish);
    }

    #[test]
    fn test_shooting_star() {
        let bars = [Candle::new(100.0, 105.0, 99.9, 100.8)];
        let m = ShootingStarDetector::with_defaults()
            .detect(&bars, 0, &ctx(Trend::Up))
            .unwrap();
        assert_eq!(m.direction, Direction::Bearish);
        assert!(InvertedHammerDetector::with_defaults()
            .detect(&bars, 0, &ctx(Trend::Down))
            .is_some());
    }

    #[test]
    fn test_spinning_top() {
        let bars = [Candle::new(100.0, 102.0, 98.0, 100.8)];
        assert!(SpinningTopDetector::with_defaults()
            .detect(&bars, 0, &ctx(Trend::Sideways))
            .is_some());
    }

    #[test]
    fn test_marubozu_color() {
        let white = [Candle::new(100.0, 110.0, 99.9, 109.9)];
        let black = [Candle::new(110.0, 110.1, 100.0, 100.1)];
        let c = ctx(Trend::Sideways);
        let d = MarubozuDetector::with_defaults();
        assert_eq!(d.detect(&white, 0, &c).unwrap().pattern_id, PatternId("WHITE_MARUBOZU"));
        assert_eq!(d.detect(&black, 0, &c).unwrap().pattern_id, PatternId("BLACK_MARUBOZU"));
    }

    #[test]
    fn test_validate_config() {
        assert!(DojiDetector { body_ratio: 0.0 }.validate_config().is_err());
        assert!(HammerDetector::with_defaults().validate_config().is_ok());
        let bad = SpinningTopDetector {
            max_body_ratio: 0.1,
            doji_ratio: 0.2,
        };
        assert!(bad.validate_config().is_err());
    }
}
