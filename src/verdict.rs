//! Verdict synthesis: classification + trend context -> signal, confidence,
//! target and status

use serde::{Deserialize, Serialize};

use crate::{
    config::EngineConfig,
    detectors::CandlestickGroup,
    matcher::{Classification, MacroMatch, MicroMatch, StructureStatus},
    pivots::PivotKind,
    templates::GeometryClass,
    Candle,
};

/// Tolerance on the sensitivity boundary, so a move of exactly the
/// configured percentage counts as overbought/oversold
const BOUNDARY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLabel {
    High,
    Standard,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Scanning,
    Forming,
    Breakout,
    Breakdown,
    Locked,
    Offline,
}

impl From<StructureStatus> for Status {
    fn from(status: StructureStatus) -> Self {
        match status {
            StructureStatus::Forming => Status::Forming,
            StructureStatus::Breakout => Status::Breakout,
            StructureStatus::Breakdown => Status::Breakdown,
        }
    }
}

/// Support and resistance of a macro structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edges {
    pub support: f64,
    pub resistance: f64,
}

/// One analysis cycle's result, as delivered to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub name: String,
    pub pattern_type: String,
    #[serde(rename = "signalClass")]
    pub signal: Signal,
    /// Percent, 0..=100
    pub similarity: f64,
    pub probability: f64,
    #[serde(rename = "confidenceLabel")]
    pub confidence: ConfidenceLabel,
    /// 0 when the pattern has no geometric edge (micro patterns)
    pub target_price: f64,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Edges>,
    /// `[first extreme, neckline, first extreme, current close]` for macro matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skeleton: Vec<f64>,
    /// Percent change from the window's first to last close
    #[serde(default)]
    pub trend_pct: f64,
}

impl Verdict {
    /// Buffer still filling up
    pub fn scanning(got: usize, need: usize) -> Self {
        Self {
            pattern_type: format!("BUFFERING {got}/{need}"),
            ..Self::empty("SCANNING...", Signal::Wait, Status::Scanning)
        }
    }

    /// Inference unavailable and no local fallback
    pub fn offline() -> Self {
        Self::empty("OFFLINE", Signal::Wait, Status::Offline)
    }

    /// Full window without any recognized structure. Reported as FORMING;
    /// SCANNING stays reserved for a buffer below the minimum window.
    pub fn stable(trend_pct: f64) -> Self {
        Self {
            trend_pct,
            ..Self::empty("STABLE STRUCTURE", Signal::Hold, Status::Forming)
        }
    }

    fn empty(name: &str, signal: Signal, status: Status) -> Self {
        Self {
            name: name.to_string(),
            pattern_type: "NONE".to_string(),
            signal,
            similarity: 0.0,
            probability: 0.0,
            confidence: ConfidenceLabel::Low,
            target_price: 0.0,
            status,
            edges: None,
            skeleton: Vec::new(),
            trend_pct: 0.0,
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.status == Status::Locked
    }
}

// ============================================================
// TREND CONTEXT
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendBias {
    Oversold,
    Neutral,
    Overbought,
}

/// Percentage move across the analysis window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendContext {
    pub change_pct: f64,
}

impl TrendContext {
    pub fn from_window(window: &[Candle]) -> Self {
        let change_pct = match (window.first(), window.last()) {
            (Some(first), Some(last)) if first.close.abs() > f64::EPSILON => {
                (last.close - first.close) / first.close * 100.0
            },
            _ => 0.0,
        };
        Self { change_pct }
    }

    pub fn from_change_pct(change_pct: f64) -> Self {
        Self { change_pct }
    }

    /// Inclusive on both sides: a move of exactly `sensitivity_pct` counts.
    pub fn bias(&self, sensitivity_pct: f64) -> TrendBias {
        if self.change_pct >= sensitivity_pct - BOUNDARY_EPSILON {
            TrendBias::Overbought
        } else if self.change_pct <= -sensitivity_pct + BOUNDARY_EPSILON {
            TrendBias::Oversold
        } else {
            TrendBias::Neutral
        }
    }
}

// ============================================================
// SYNTHESIZER
// ============================================================

#[derive(Debug, Clone)]
pub struct VerdictSynthesizer {
    sensitivity_pct: f64,
    high_probability: f64,
    standard_probability: f64,
    projection_factor: f64,
}

impl VerdictSynthesizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            sensitivity_pct: config.sensitivity_pct,
            high_probability: config.high_probability,
            standard_probability: config.standard_probability,
            projection_factor: config.projection_factor,
        }
    }

    pub fn synthesize(&self, classification: &Classification, trend: TrendContext) -> Verdict {
        match classification {
            Classification::Macro(m) => self.from_macro(m, trend),
            Classification::Micro(m) => self.from_micro(m, trend),
            Classification::Stable => Verdict::stable(trend.change_pct),
        }
    }

    /// Two fixed tiers: trend agreeing with the signal, or not
    pub fn tier(&self, signal: Signal, bias: TrendBias) -> (ConfidenceLabel, f64) {
        match (signal, bias) {
            (Signal::Buy, TrendBias::Oversold) | (Signal::Sell, TrendBias::Overbought) => {
                (ConfidenceLabel::High, self.high_probability)
            },
            (Signal::Buy | Signal::Sell | Signal::Hold, _) => {
                (ConfidenceLabel::Standard, self.standard_probability)
            },
            (Signal::Wait, _) => (ConfidenceLabel::Low, 0.0),
        }
    }

    fn from_macro(&self, m: &MacroMatch, trend: TrendContext) -> Verdict {
        let signal = match m.template.geometry {
            GeometryClass::WShape => Signal::Buy,
            GeometryClass::MShape => Signal::Sell,
            GeometryClass::CandlestickMicro => Signal::Hold,
        };
        let (confidence, probability) = self.tier(signal, trend.bias(self.sensitivity_pct));

        let first = m.first_extreme.price;
        let neck = m.neckline.price;
        let height = (neck - first).abs() * self.projection_factor;
        let (target_price, edges) = match m.first_extreme.kind {
            PivotKind::Low => (
                neck + height,
                Edges {
                    support: first,
                    resistance: neck,
                },
            ),
            PivotKind::High => (
                (neck - height).max(0.0),
                Edges {
                    support: neck,
                    resistance: first,
                },
            ),
        };

        let status = if m.similarity > m.template.lock_threshold && confidence == ConfidenceLabel::High {
            Status::Locked
        } else {
            m.status.into()
        };

        Verdict {
            name: m.template.display_name.to_string(),
            pattern_type: m.template.geometry.label().to_string(),
            signal,
            similarity: m.similarity,
            probability,
            confidence,
            target_price,
            status,
            edges: Some(edges),
            skeleton: vec![first, neck, first, m.current_close],
            trend_pct: trend.change_pct,
        }
    }

    fn from_micro(&self, m: &MicroMatch, trend: TrendContext) -> Verdict {
        let signal = match m.group {
            CandlestickGroup::BullishReversal => Signal::Buy,
            CandlestickGroup::BearishReversal => Signal::Sell,
            CandlestickGroup::Continuation => Signal::Hold,
            CandlestickGroup::Indecision => Signal::Wait,
        };
        let (confidence, probability) = self.tier(signal, trend.bias(self.sensitivity_pct));
        let status = if m.similarity > m.template.lock_threshold && confidence == ConfidenceLabel::High {
            Status::Locked
        } else {
            Status::Forming
        };

        Verdict {
            name: m.display_name.clone(),
            pattern_type: m.group.label().to_string(),
            signal,
            similarity: m.similarity,
            probability,
            confidence,
            target_price: 0.0,
            status,
            edges: None,
            skeleton: Vec::new(),
            trend_pct: trend.change_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::PatternId;
    use crate::pivots::Pivot;
    use crate::templates::{CANDLESTICK_EDGE, DOUBLE_BOTTOM, DOUBLE_TOP};

    fn synthesizer() -> VerdictSynthesizer {
        VerdictSynthesizer::new(&EngineConfig::default())
    }

    fn pivot(index: usize, price: f64, kind: PivotKind) -> Pivot {
        Pivot { index, price, kind }
    }

    fn double_bottom(similarity: f64) -> Classification {
        Classification::Macro(MacroMatch {
            template: DOUBLE_BOTTOM,
            similarity,
            first_extreme: pivot(8, 100.0, PivotKind::Low),
            neckline: pivot(18, 110.0, PivotKind::High),
            retest: pivot(39, 100.3, PivotKind::Low),
            current_close: 100.3,
            status: StructureStatus::Forming,
        })
    }

    fn micro(group: CandlestickGroup, similarity: f64) -> Classification {
        Classification::Micro(MicroMatch {
            template: CANDLESTICK_EDGE,
            pattern_id: PatternId("X"),
            display_name: "X".into(),
            group,
            direction: group.direction(),
            similarity,
            start_index: 0,
            end_index: 0,
        })
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let s = 0.05;
        assert_eq!(TrendContext::from_change_pct(0.05).bias(s), TrendBias::Overbought);
        assert_eq!(TrendContext::from_change_pct(-0.05).bias(s), TrendBias::Oversold);
        assert_eq!(TrendContext::from_change_pct(0.0499).bias(s), TrendBias::Neutral);
        assert_eq!(TrendContext::from_change_pct(-0.0499).bias(s), TrendBias::Neutral);
    }

    #[test]
    fn test_trend_from_window() {
        let window = [Candle::new(100.0, 100.0, 100.0, 100.0), Candle::new(99.0, 101.0, 98.0, 101.0)];
        assert!((TrendContext::from_window(&window).change_pct - 1.0).abs() < 1e-12);
        assert_eq!(TrendContext::from_window(&[]).change_pct, 0.0);
    }

    #[test]
    fn test_two_tiers() {
        let s = synthesizer();
        assert_eq!(s.tier(Signal::Buy, TrendBias::Oversold), (ConfidenceLabel::High, 94.2));
        assert_eq!(s.tier(Signal::Buy, TrendBias::Neutral), (ConfidenceLabel::Standard, 68.5));
        assert_eq!(s.tier(Signal::Buy, TrendBias::Overbought), (ConfidenceLabel::Standard, 68.5));
        assert_eq!(s.tier(Signal::Sell, TrendBias::Overbought), (ConfidenceLabel::High, 94.2));
        assert_eq!(s.tier(Signal::Wait, TrendBias::Oversold), (ConfidenceLabel::Low, 0.0));
    }

    #[test]
    fn test_double_bottom_target_and_lock() {
        let s = synthesizer();
        let locked = s.synthesize(&double_bottom(99.7), TrendContext::from_change_pct(-2.0));
        assert_eq!(locked.signal, Signal::Buy);
        assert_eq!(locked.status, Status::Locked);
        assert!((locked.target_price - 120.0).abs() < 1e-9);
        assert_eq!(locked.skeleton, vec![100.0, 110.0, 100.0, 100.3]);
        assert_eq!(
            locked.edges,
            Some(Edges {
                support: 100.0,
                resistance: 110.0
            })
        );

        let forming = s.synthesize(&double_bottom(99.7), TrendContext::from_change_pct(1.0));
        assert_eq!(forming.confidence, ConfidenceLabel::Standard);
        assert_eq!(forming.status, Status::Forming);
    }

    #[test]
    fn test_double_top_target() {
        let m = MacroMatch {
            template: DOUBLE_TOP,
            similarity: 98.0,
            first_extreme: pivot(5, 110.0, PivotKind::High),
            neckline: pivot(15, 100.0, PivotKind::Low),
            retest: pivot(39, 109.0, PivotKind::High),
            current_close: 109.0,
            status: StructureStatus::Forming,
        };
        let v = synthesizer().synthesize(&Classification::Macro(m), TrendContext::from_change_pct(0.0));
        assert_eq!(v.signal, Signal::Sell);
        assert!((v.target_price - 90.0).abs() < 1e-9);
        assert_eq!(v.pattern_type, "M-SHAPE");
    }

    #[test]
    fn test_micro_groups() {
        let s = synthesizer();
        let t = TrendContext::from_change_pct(-1.0);
        let bull = s.synthesize(&micro(CandlestickGroup::BullishReversal, 75.0), t);
        assert_eq!((bull.signal, bull.status), (Signal::Buy, Status::Locked));
        assert_eq!(bull.target_price, 0.0);

        let weak = s.synthesize(&micro(CandlestickGroup::BullishReversal, 65.0), t);
        assert_eq!(weak.status, Status::Forming);

        let cont = s.synthesize(&micro(CandlestickGroup::Continuation, 75.0), t);
        assert_eq!((cont.signal, cont.confidence), (Signal::Hold, ConfidenceLabel::Standard));

        let doji = s.synthesize(&micro(CandlestickGroup::Indecision, 90.0), t);
        assert_eq!((doji.signal, doji.status), (Signal::Wait, Status::Forming));
        assert_eq!(doji.probability, 0.0);
        assert_eq!(doji.pattern_type, "INDECISION");
    }

    #[test]
    fn test_stable() {
        let v = synthesizer().synthesize(&Classification::Stable, TrendContext::from_change_pct(0.0));
        assert_eq!(v.signal, Signal::Hold);
        assert_eq!(v.similarity, 0.0);
        assert_eq!(v.name, "STABLE STRUCTURE");
        assert_eq!(v.status, Status::Forming);
        assert_ne!(v.status, Verdict::scanning(40, 40).status);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(Verdict::scanning(12, 40)).unwrap();
        assert_eq!(json["signalClass"], "WAIT");
        assert_eq!(json["confidenceLabel"], "LOW");
        assert_eq!(json["status"], "SCANNING");
        assert_eq!(json["patternType"], "BUFFERING 12/40");
        assert!(json.get("edges").is_none());
    }
}
