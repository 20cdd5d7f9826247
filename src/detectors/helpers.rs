//! Shared thresholds and shape predicates for the candlestick detectors

use crate::Candle;

/// Body is doji-like: body <= range * DOJI_BODY_RATIO
pub const DOJI_BODY_RATIO: f64 = 0.1;
/// Upper bound of a "small" body for the hammer family (vs range)
pub const SMALL_BODY_RATIO: f64 = 0.35;
/// Upper bound of a spinning-top body (vs range)
pub const SPINNING_BODY_RATIO: f64 = 0.3;
/// Lower bound of a marubozu body (vs range)
pub const MARUBOZU_BODY_RATIO: f64 = 0.9;
/// Long shadow: shadow >= body * LONG_SHADOW_FACTOR
pub const LONG_SHADOW_FACTOR: f64 = 2.0;
/// Tiny shadow: shadow <= range * TINY_SHADOW_RATIO
pub const TINY_SHADOW_RATIO: f64 = 0.1;
/// Long body: body > trailing average body * LONG_BODY_FACTOR
pub const LONG_BODY_FACTOR: f64 = 1.0;
/// Star / harami body relative to the body it sits against
pub const STAR_BODY_RATIO: f64 = 0.3;
/// Equal extremes for tweezers (vs average range)
pub const EQUAL_RATIO: f64 = 0.05;
/// Trailing candles used for body/range averages
pub const AVERAGING_PERIOD: usize = 10;

/// Non-degenerate candle. Flat (zero-range) candles never form a pattern.
#[inline]
pub fn has_range(bar: &Candle) -> bool {
    bar.range() > f64::EPSILON
}

#[inline]
pub fn is_doji(bar: &Candle, max_body_ratio: f64) -> bool {
    bar.body_ratio().is_some_and(|r| r <= max_body_ratio)
}

/// Long body against the trailing average; falls back to "non-zero" when the
/// average is unavailable.
#[inline]
pub fn is_long_body(body: f64, avg_body: f64, factor: f64) -> bool {
    if avg_body > 0.0 {
        body > avg_body * factor
    } else {
        body > 0.0
    }
}

#[inline]
pub fn is_tiny_shadow(shadow: f64, range: f64, ratio: f64) -> bool {
    shadow <= range * ratio
}

/// Mean body of the `period` candles before `at` (the candle itself when `at == 0`).
pub fn trailing_avg_body(bars: &[Candle], at: usize, period: usize) -> f64 {
    trailing_mean(bars, at, period, Candle::body)
}

/// Mean range of the `period` candles before `at` (the candle itself when `at == 0`).
pub fn trailing_avg_range(bars: &[Candle], at: usize, period: usize) -> f64 {
    trailing_mean(bars, at, period, Candle::range)
}

fn trailing_mean(bars: &[Candle], at: usize, period: usize, f: fn(&Candle) -> f64) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    let at = at.min(bars.len() - 1);
    if at == 0 {
        return f(&bars[0]);
    }
    let slice = &bars[at.saturating_sub(period.max(1))..at];
    slice.iter().map(f).sum::<f64>() / slice.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_means_exclude_current() {
        let bars = vec![
            Candle::new(10.0, 12.0, 9.0, 11.0),
            Candle::new(11.0, 14.0, 10.0, 13.0),
            Candle::new(13.0, 30.0, 0.0, 25.0),
        ];
        assert!((trailing_avg_body(&bars, 2, 10) - 1.5).abs() < 1e-12);
        assert!((trailing_avg_range(&bars, 2, 1) - 4.0).abs() < 1e-12);
        assert!((trailing_avg_body(&bars, 0, 10) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_shape_predicates() {
        let doji = Candle::new(10.0, 11.0, 9.0, 10.05);
        assert!(is_doji(&doji, DOJI_BODY_RATIO));
        assert!(!has_range(&Candle::new(5.0, 5.0, 5.0, 5.0)));
        assert!(!is_doji(&Candle::new(5.0, 5.0, 5.0, 5.0), DOJI_BODY_RATIO));
        assert!(is_long_body(2.0, 1.0, LONG_BODY_FACTOR));
        assert!(!is_long_body(1.0, 1.0, LONG_BODY_FACTOR));
        assert!(is_tiny_shadow(0.1, 2.0, TINY_SHADOW_RATIO));
    }
}
