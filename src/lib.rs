//! # Candlescope - structural pattern engine for live candle streams
//!
//! Classifies the most recent window of OHLC candles into a named chart
//! structure (double bottom / double top) or a candlestick micro-pattern and
//! turns it into a trading verdict with a similarity score.
//!
//! ## Quick Start
//!
//! ```rust
//! use candlescope::prelude::*;
//!
//! let engine = EngineBuilder::new()
//!     .with_all_defaults()
//!     .build()
//!     .unwrap();
//!
//! let candles: Vec<Candle> = (0..40)
//!     .map(|i| {
//!         let p = 100.0 + (i % 3) as f64;
//!         Candle::new(p, p + 0.5, p - 0.5, p + 0.1)
//!     })
//!     .collect();
//!
//! let verdict = engine.analyze(&candles);
//! println!("{} -> {:?}", verdict.name, verdict.signal);
//! ```

pub mod alert;
pub mod buffer;
pub mod config;
pub mod detectors;
pub mod feed;
pub mod inference;
pub mod matcher;
pub mod pivots;
pub mod session;
pub mod templates;
pub mod verdict;

use std::sync::Arc;

use rayon::prelude::*;

use crate::{
    config::EngineConfig,
    detectors::{BuiltinDetector, CandlestickCatalog, CandlestickGroup, MicroPatternProvider, PatternDetector},
    matcher::{Classification, LocalMatcher, TemplateMatcher},
    templates::{PatternTemplate, TemplateCatalog},
    verdict::{TrendContext, Verdict, VerdictSynthesizer},
};

pub mod prelude {
    pub use crate::{
        // Alerts
        alert::{Alert, AlertController, AlertSink, LockPhase, LogAlertSink},
        // Streaming
        analyze_watchlist,
        buffer::CandleBuffer,
        config::{EngineConfig, FallbackPolicy, InferenceConfig, SessionConfig},
        // Candlesticks
        detectors::{
            BuiltinDetector, CandleContext, CandlestickCatalog, CandlestickGroup, Direction,
            MicroDetection, MicroPatternProvider, PatternDetector, PatternId, PatternMatch, Trend,
        },
        feed::{BinanceFeed, FeedSource, FeedTick},
        inference::{FallbackAnalyzer, InferenceClient, LocalAnalyzer, StructureAnalyzer},
        matcher::{Classification, LocalMatcher, MacroMatch, MicroMatch, StructureStatus, TemplateMatcher},
        pivots::{Pivot, PivotKind, PivotSummary},
        session::{SessionBuilder, SymbolSession},
        templates::{GeometryClass, PatternTemplate, TemplateCatalog},
        verdict::{ConfidenceLabel, Signal, Status, TrendBias, TrendContext, Verdict},
        // Core
        Candle,
        EngineBuilder,
        PatternError,
        Period,
        Ratio,
        Result,
        ScanError,
        StructureEngine,
        WatchlistVerdict,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised by the engine, the buffer and the streaming session.
///
/// None of them is fatal to a session: the session downgrades them to a
/// `SCANNING` or `OFFLINE` verdict.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} candles, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: &'static str },

    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("Stale result: analysis #{issued} arrived after #{applied} was applied")]
    StaleResult { issued: u64, applied: u64 },

    #[error("Feed error: {0}")]
    Feed(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(PatternError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Count of candles (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// CANDLE
// ============================================================

/// One OHLC observation. Immutable once accepted by a buffer.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Candle {
    /// Unchecked constructor; see [`Candle::try_new`] for validation.
    pub const fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume: 0.0,
            timestamp: None,
        }
    }

    pub fn try_new(open: f64, high: f64, low: f64, close: f64) -> Result<Self> {
        let candle = Self::new(open, high, low, close);
        candle.validate()?;
        Ok(candle)
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Validate OHLC consistency
    pub fn validate(&self) -> Result<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) || !self.volume.is_finite() {
            return Err(PatternError::InvalidCandle {
                index: 0,
                reason: "non-finite value",
            });
        }
        if self.high < self.low {
            return Err(PatternError::InvalidCandle {
                index: 0,
                reason: "high < low",
            });
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Err(PatternError::InvalidCandle {
                index: 0,
                reason: "body outside high/low range",
            });
        }
        Ok(())
    }

    #[inline]
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    #[inline]
    pub fn body_top(&self) -> f64 {
        self.open.max(self.close)
    }

    #[inline]
    pub fn body_bottom(&self) -> f64 {
        self.open.min(self.close)
    }

    #[inline]
    pub fn body_mid(&self) -> f64 {
        (self.open + self.close) / 2.0
    }

    #[inline]
    pub fn upper_shadow(&self) -> f64 {
        self.high - self.body_top()
    }

    #[inline]
    pub fn lower_shadow(&self) -> f64 {
        self.body_bottom() - self.low
    }

    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    #[inline]
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    pub fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }
}

// ============================================================
// STRUCTURE ENGINE
// ============================================================

/// Pivot extraction, template matching and verdict synthesis over one
/// analysis window. Holds no per-session state.
#[derive(Debug)]
pub struct StructureEngine {
    config: EngineConfig,
    matcher: LocalMatcher,
    synthesizer: VerdictSynthesizer,
}

impl StructureEngine {
    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn min_window(&self) -> usize {
        self.config.min_window.get()
    }

    pub fn matcher(&self) -> &LocalMatcher {
        &self.matcher
    }

    /// Trailing slice of `candles` the engine looks at.
    pub fn window<'a>(&self, candles: &'a [Candle]) -> &'a [Candle] {
        let keep = self.config.analysis_window.get();
        &candles[candles.len().saturating_sub(keep)..]
    }

    /// Raw matcher output for the trailing window.
    pub fn classify(&self, candles: &[Candle]) -> Result<Classification> {
        self.matcher.classify(self.window(candles))
    }

    /// Full analysis cycle. Never fails: short input yields a SCANNING verdict.
    pub fn analyze(&self, candles: &[Candle]) -> Verdict {
        let window = self.window(candles);
        match self.matcher.classify(window) {
            Ok(classification) => self
                .synthesizer
                .synthesize(&classification, TrendContext::from_window(window)),
            Err(PatternError::InsufficientData { need, got }) => Verdict::scanning(got, need),
            Err(error) => {
                tracing::warn!(%error, "analysis failed, reporting scanning");
                Verdict::scanning(window.len(), self.min_window())
            },
        }
    }

    /// Like [`StructureEngine::analyze`] but rejects malformed candles first.
    pub fn analyze_checked(&self, candles: &[Candle]) -> Result<Verdict> {
        validate_candles(candles)?;
        Ok(self.analyze(candles))
    }
}

fn validate_candles(candles: &[Candle]) -> Result<()> {
    for (i, candle) in candles.iter().enumerate() {
        candle.validate().map_err(|e| match e {
            PatternError::InvalidCandle { reason, .. } => PatternError::InvalidCandle { index: i, reason },
            other => other,
        })?;
    }
    Ok(())
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating StructureEngine instances
pub struct EngineBuilder {
    config: EngineConfig,
    templates: TemplateCatalog,
    candlesticks: CandlestickCatalog,
    provider: Option<Arc<dyn MicroPatternProvider>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            templates: TemplateCatalog::new(),
            candlesticks: CandlestickCatalog::new(),
            provider: None,
        }
    }

    /// Default geometric templates plus the full candlestick catalog
    pub fn with_all_defaults(self) -> Self {
        self.with_default_templates().with_default_candlesticks()
    }

    /// Double bottom, double top and the candlestick micro template
    pub fn with_default_templates(mut self) -> Self {
        self.templates = TemplateCatalog::with_defaults();
        self
    }

    pub fn with_default_candlesticks(mut self) -> Self {
        self.candlesticks = CandlestickCatalog::with_defaults();
        self
    }

    pub fn template(mut self, template: PatternTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn templates(mut self, templates: TemplateCatalog) -> Self {
        self.templates = templates;
        self
    }

    /// Add a builtin candlestick detector
    pub fn candlestick(mut self, detector: BuiltinDetector) -> Self {
        self.candlesticks = self.candlesticks.add(detector);
        self
    }

    /// Add a custom candlestick detector with its display name and group
    pub fn custom_candlestick<D: PatternDetector + 'static>(
        mut self,
        detector: D,
        display_name: impl Into<String>,
        group: CandlestickGroup,
    ) -> Self {
        self.candlesticks = self.candlesticks.add_custom(detector, display_name, group);
        self
    }

    /// Replace the candlestick catalog with another provider
    pub fn micro_provider(mut self, provider: Arc<dyn MicroPatternProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<StructureEngine> {
        self.config.validate()?;
        self.templates.validate()?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => {
                self.candlesticks.validate()?;
                Arc::new(self.candlesticks)
            },
        };

        Ok(StructureEngine {
            matcher: LocalMatcher::new(self.templates, provider, &self.config),
            synthesizer: VerdictSynthesizer::new(&self.config),
            config: self.config,
        })
    }
}

// ============================================================
// WATCHLIST (PARALLEL) ANALYSIS
// ============================================================

/// Verdict for one watchlist symbol
#[derive(Debug)]
pub struct WatchlistVerdict {
    pub symbol: String,
    pub verdict: Verdict,
}

/// Error from analysing a single symbol
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel analysis of many symbol snapshots
pub fn analyze_watchlist<'a, I>(
    engine: &StructureEngine,
    instruments: I,
) -> (Vec<WatchlistVerdict>, Vec<ScanError>)
where
    I: IntoParallelIterator<Item = (&'a str, &'a [Candle])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, candles)| {
            engine
                .analyze_checked(candles)
                .map(|verdict| WatchlistVerdict {
                    symbol: symbol.to_string(),
                    verdict,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut verdicts = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(v) => verdicts.push(v),
            Err(e) => errors.push(e),
        }
    }

    (verdicts, errors)
}

// ============================================================
// TESTS
// ============================================================
