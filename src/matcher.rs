//! Template matching: macro W/M geometry first, candlestick micro-patterns
//! second, a stable (no pattern) classification otherwise.

use std::sync::Arc;

use crate::{
    config::EngineConfig,
    detectors::{CandlestickGroup, Direction, MicroPatternProvider, PatternId},
    pivots::{self, Pivot, PivotKind, PivotSummary},
    templates::{GeometryClass, PatternTemplate, TemplateCatalog},
    Candle, Result,
};

/// Turns an analysis window into a [`Classification`].
///
/// Implemented locally by [`LocalMatcher`]; a remote service can stand in
/// behind the same contract (see [`crate::inference`]).
pub trait TemplateMatcher: Send + Sync {
    fn classify(&self, window: &[Candle]) -> Result<Classification>;
}

/// Where price stands relative to the neckline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureStatus {
    Forming,
    Breakout,
    Breakdown,
}

/// A W/M structure that cleared its template's similarity threshold
#[derive(Debug, Clone, PartialEq)]
pub struct MacroMatch {
    pub template: PatternTemplate,
    /// Percent, `(1 - |second - first| / first) * 100`
    pub similarity: f64,
    pub first_extreme: Pivot,
    pub neckline: Pivot,
    /// Second extreme the similarity was measured on: the current close
    /// while forming, the retest trough/peak once the neckline is crossed
    pub retest: Pivot,
    pub current_close: f64,
    pub status: StructureStatus,
}

/// The most recent candlestick pattern of the window
#[derive(Debug, Clone, PartialEq)]
pub struct MicroMatch {
    pub template: PatternTemplate,
    pub pattern_id: PatternId,
    pub display_name: String,
    pub group: CandlestickGroup,
    pub direction: Direction,
    /// Detector strength in percent
    pub similarity: f64,
    pub start_index: usize,
    pub end_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Macro(MacroMatch),
    Micro(MicroMatch),
    Stable,
}

impl Classification {
    pub fn name(&self) -> &str {
        match self {
            Classification::Macro(m) => &m.template.display_name,
            Classification::Micro(m) => &m.display_name,
            Classification::Stable => "STABLE STRUCTURE",
        }
    }

    pub fn similarity(&self) -> f64 {
        match self {
            Classification::Macro(m) => m.similarity,
            Classification::Micro(m) => m.similarity,
            Classification::Stable => 0.0,
        }
    }
}

// ============================================================
// LOCAL MATCHER
// ============================================================

pub struct LocalMatcher {
    templates: TemplateCatalog,
    candlesticks: Arc<dyn MicroPatternProvider>,
    min_window: usize,
    neckline_exclusion: usize,
}

impl LocalMatcher {
    pub fn new(
        templates: TemplateCatalog,
        candlesticks: Arc<dyn MicroPatternProvider>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            templates,
            candlesticks,
            min_window: config.min_window.get(),
            neckline_exclusion: config.neckline_exclusion,
        }
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.templates
    }

    /// First macro template (catalog order) that matches
    pub fn match_macro(&self, window: &[Candle], summary: &PivotSummary) -> Option<MacroMatch> {
        let closes: Vec<f64> = window.iter().map(|c| c.close).collect();
        self.templates
            .macro_templates()
            .find_map(|template| self.match_template(template, &closes, summary))
    }

    fn match_template(
        &self,
        template: &PatternTemplate,
        closes: &[f64],
        summary: &PivotSummary,
    ) -> Option<MacroMatch> {
        let (kind, crossed_status) = match template.geometry {
            GeometryClass::WShape => (PivotKind::Low, StructureStatus::Breakout),
            GeometryClass::MShape => (PivotKind::High, StructureStatus::Breakdown),
            GeometryClass::CandlestickMicro => return None,
        };

        let len = closes.len();
        let first = match kind {
            PivotKind::Low => summary.first_half.min,
            PivotKind::High => summary.first_half.max,
        };
        if first.price <= f64::EPSILON {
            return None;
        }

        let end = len.saturating_sub(self.neckline_exclusion);
        let neckline = pivots::extreme_in(closes, first.index..end, kind.opposite())?;
        if first.index >= neckline.index {
            return None;
        }

        let current = closes[len - 1];
        let crossed = match kind {
            PivotKind::Low => current > neckline.price,
            PivotKind::High => current < neckline.price,
        };
        let retest = if crossed {
            pivots::extreme_in(closes, neckline.index + 1..len, kind)?
        } else {
            Pivot {
                index: len - 1,
                price: current,
                kind,
            }
        };

        let similarity = (1.0 - (retest.price - first.price).abs() / first.price) * 100.0;
        if similarity <= template.match_threshold() {
            return None;
        }
        if summary.swings.len() < template.required_pivots {
            tracing::debug!(
                template = %template.id,
                swings = summary.swings.len(),
                "similar extremes but too few swing pivots"
            );
            return None;
        }

        Some(MacroMatch {
            template: template.clone(),
            similarity,
            first_extreme: first,
            neckline,
            retest,
            current_close: current,
            status: if crossed {
                crossed_status
            } else {
                StructureStatus::Forming
            },
        })
    }

    /// Most recent candlestick pattern, if it clears the micro template
    pub fn match_micro(&self, window: &[Candle]) -> Option<MicroMatch> {
        let template = self.templates.micro_template()?;
        let detection = self.candlesticks.latest(window)?;
        let similarity = detection.pattern.strength * 100.0;
        if similarity <= template.match_threshold() {
            return None;
        }

        Some(MicroMatch {
            template: template.clone(),
            pattern_id: detection.pattern.pattern_id,
            display_name: detection.display_name,
            group: detection.group,
            direction: detection.pattern.direction,
            similarity,
            start_index: detection.pattern.start_index,
            end_index: detection.pattern.end_index,
        })
    }
}

impl TemplateMatcher for LocalMatcher {
    fn classify(&self, window: &[Candle]) -> Result<Classification> {
        let summary = pivots::extract(window, self.min_window)?;

        if let Some(m) = self.match_macro(window, &summary) {
            return Ok(Classification::Macro(m));
        }
        // candle shapes on a flat close series carry no signal
        if summary.is_flat() {
            return Ok(Classification::Stable);
        }
        if let Some(m) = self.match_micro(window) {
            return Ok(Classification::Micro(m));
        }
        Ok(Classification::Stable)
    }
}

impl std::fmt::Debug for LocalMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMatcher")
            .field("templates", &self.templates.len())
            .field("min_window", &self.min_window)
            .field("neckline_exclusion", &self.neckline_exclusion)
            .finish()
    }
}
