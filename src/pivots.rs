//! Pivot extraction over an analysis window
//!
//! Macro pivots are taken from the close series, the high/low extremes from
//! the raw OHLC values. Ties always resolve to the earliest index, so the
//! same window always yields the same pivots.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{Candle, PatternError, Result};

/// Neighbours on each side a swing pivot must dominate
pub const SWING_ORDER: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PivotKind {
    High,
    Low,
}

impl PivotKind {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            PivotKind::High => PivotKind::Low,
            PivotKind::Low => PivotKind::High,
        }
    }
}

/// A local or global extreme at a window position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
}

/// Max and min close of one half of the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfExtrema {
    pub max: Pivot,
    pub min: Pivot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PivotSummary {
    pub len: usize,
    pub max_close: Pivot,
    pub min_close: Pivot,
    pub max_high: Pivot,
    pub min_low: Pivot,
    /// Candles `[0, len / 2)`
    pub first_half: HalfExtrema,
    /// Candles `[len / 2, len)`
    pub second_half: HalfExtrema,
    /// Zig-zag skeleton: both endpoints plus strict swing extremes
    pub swings: Vec<Pivot>,
}

impl PivotSummary {
    /// Distance between the highest and lowest close
    #[inline]
    pub fn close_spread(&self) -> f64 {
        self.max_close.price - self.min_close.price
    }

    /// Every close equal (up to rounding)
    pub fn is_flat(&self) -> bool {
        self.close_spread() <= f64::EPSILON * self.max_close.price.abs().max(1.0)
    }
}

/// Extract pivots from `window`.
///
/// Fails with `InsufficientData` below `min_window` candles (and below 2 in
/// any case, so both halves are non-empty).
pub fn extract(window: &[Candle], min_window: usize) -> Result<PivotSummary> {
    let need = min_window.max(2);
    if window.len() < need {
        return Err(PatternError::InsufficientData {
            need,
            got: window.len(),
        });
    }

    summarize(window).ok_or(PatternError::InsufficientData {
        need,
        got: window.len(),
    })
}

fn summarize(window: &[Candle]) -> Option<PivotSummary> {
    let len = window.len();
    let half = len / 2;
    let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
    let highs: Vec<f64> = window.iter().map(|c| c.high).collect();
    let lows: Vec<f64> = window.iter().map(|c| c.low).collect();

    Some(PivotSummary {
        len,
        max_close: extreme_in(&closes, 0..len, PivotKind::High)?,
        min_close: extreme_in(&closes, 0..len, PivotKind::Low)?,
        max_high: extreme_in(&highs, 0..len, PivotKind::High)?,
        min_low: extreme_in(&lows, 0..len, PivotKind::Low)?,
        first_half: half_extrema(&closes, 0..half)?,
        second_half: half_extrema(&closes, half..len)?,
        swings: swing_pivots(&closes, SWING_ORDER),
    })
}

fn half_extrema(values: &[f64], range: Range<usize>) -> Option<HalfExtrema> {
    Some(HalfExtrema {
        max: extreme_in(values, range.clone(), PivotKind::High)?,
        min: extreme_in(values, range, PivotKind::Low)?,
    })
}

/// Highest (`High`) or lowest (`Low`) value within `range`, earliest index on
/// ties. Indices are absolute. `None` for an empty or out-of-bounds range.
pub fn extreme_in(values: &[f64], range: Range<usize>, kind: PivotKind) -> Option<Pivot> {
    let slice = values.get(range.clone())?;
    let mut best: Option<(usize, f64)> = None;
    for (offset, &value) in slice.iter().enumerate() {
        let better = match (best, kind) {
            (None, _) => true,
            (Some((_, b)), PivotKind::High) => value > b,
            (Some((_, b)), PivotKind::Low) => value < b,
        };
        if better {
            best = Some((range.start + offset, value));
        }
    }
    best.map(|(index, price)| Pivot { index, price, kind })
}

/// Strict local extrema dominating `order` neighbours on both sides, framed by
/// the first and last point. Plateaus produce no interior pivot.
pub fn swing_pivots(values: &[f64], order: usize) -> Vec<Pivot> {
    let len = values.len();
    if len == 0 {
        return Vec::new();
    }
    if len == 1 {
        return vec![Pivot {
            index: 0,
            price: values[0],
            kind: PivotKind::High,
        }];
    }

    let endpoint_kind = |index: usize, neighbour: usize| {
        if values[index] >= values[neighbour] {
            PivotKind::High
        } else {
            PivotKind::Low
        }
    };

    let mut pivots = vec![Pivot {
        index: 0,
        price: values[0],
        kind: endpoint_kind(0, 1),
    }];

    let order = order.max(1);
    for i in order..len.saturating_sub(order) {
        let neighbours = (i - order..=i + order).filter(|&j| j != i);
        let value = values[i];
        if neighbours.clone().all(|j| value > values[j]) {
            pivots.push(Pivot {
                index: i,
                price: value,
                kind: PivotKind::High,
            });
        } else if neighbours.clone().all(|j| value < values[j]) {
            pivots.push(Pivot {
                index: i,
                price: value,
                kind: PivotKind::Low,
            });
        }
    }

    pivots.push(Pivot {
        index: len - 1,
        price: values[len - 1],
        kind: endpoint_kind(len - 1, len - 2),
    });
    pivots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .map(|&c| Candle::new(c, c + 0.5, c - 0.5, c))
            .collect()
    }

    #[test]
    fn test_insufficient_data() {
        let window = from_closes(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            extract(&window, 4),
            Err(PatternError::InsufficientData { need: 4, got: 3 })
        ));
    }

    #[test]
    fn test_ties_break_to_earliest() {
        let values = [3.0, 5.0, 1.0, 5.0, 1.0];
        let high = extreme_in(&values, 0..5, PivotKind::High).unwrap();
        let low = extreme_in(&values, 0..5, PivotKind::Low).unwrap();
        assert_eq!((high.index, high.price), (1, 5.0));
        assert_eq!((low.index, low.price), (2, 1.0));
    }

    #[test]
    fn test_extreme_in_uses_absolute_index() {
        let values = [9.0, 1.0, 4.0, 7.0, 2.0];
        let high = extreme_in(&values, 2..5, PivotKind::High).unwrap();
        assert_eq!(high.index, 3);
        assert!(extreme_in(&values, 3..3, PivotKind::High).is_none());
        assert!(extreme_in(&values, 4..9, PivotKind::High).is_none());
    }

    #[test]
    fn test_halves_and_ohlc_extremes() {
        let closes = [5.0, 3.0, 8.0, 6.0, 2.0, 9.0];
        let summary = extract(&from_closes(&closes), 4).unwrap();
        assert_eq!(summary.first_half.min.index, 1);
        assert_eq!(summary.first_half.max.index, 2);
        assert_eq!(summary.second_half.min.index, 4);
        assert_eq!(summary.second_half.max.index, 5);
        assert_eq!(summary.max_high.price, 9.5);
        assert_eq!(summary.min_low.price, 1.5);
        assert_eq!(summary.max_close.index, 5);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 7) % 11) as f64).collect();
        let window = from_closes(&closes);
        assert_eq!(extract(&window, 30).unwrap(), extract(&window, 30).unwrap());
    }

    #[test]
    fn test_swing_skeleton() {
        // valley at 3, peak at 7, valley at 11
        let closes = [
            10.0, 8.0, 6.0, 4.0, 6.0, 8.0, 10.0, 12.0, 10.0, 8.0, 6.0, 4.0, 6.0, 8.0, 10.0,
        ];
        let swings = swing_pivots(&closes, 3);
        let indices: Vec<usize> = swings.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 3, 7, 11, 14]);
        assert_eq!(swings[1].kind, PivotKind::Low);
        assert_eq!(swings[2].kind, PivotKind::High);
    }

    #[test]
    fn test_plateau_has_no_interior_swing() {
        let swings = swing_pivots(&[1.0; 12], 3);
        assert_eq!(swings.len(), 2);
    }
}
