//! Candlestick catalog: pattern groups and the micro-pattern provider

use serde::{Deserialize, Serialize};

use super::{
    BuiltinDetector, CandleContext, ContextProvider, Direction, PatternDetector, PatternId,
    PatternMatch,
};
use super::{
    DarkCloudCoverDetector, DojiDetector, DragonflyDojiDetector, EngulfingDetector,
    EveningStarDetector, GravestoneDojiDetector, HammerDetector, HangingManDetector,
    HaramiDetector, InvertedHammerDetector, MarubozuDetector, MorningStarDetector,
    PiercingDetector, RiseFallThreeMethodsDetector, ShootingStarDetector, SpinningTopDetector,
    ThreeBlackCrowsDetector, ThreeWhiteSoldiersDetector, TweezerDetector,
};
use crate::{Candle, PatternError, Result};

// ============================================================
// GROUPS
// ============================================================

/// What a candlestick pattern implies for the next move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandlestickGroup {
    BullishReversal,
    BearishReversal,
    Continuation,
    Indecision,
}

impl CandlestickGroup {
    pub fn label(self) -> &'static str {
        match self {
            CandlestickGroup::BullishReversal => "BULLISH REVERSAL",
            CandlestickGroup::BearishReversal => "BEARISH REVERSAL",
            CandlestickGroup::Continuation => "CONTINUATION",
            CandlestickGroup::Indecision => "INDECISION",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            CandlestickGroup::BullishReversal => Direction::Bullish,
            CandlestickGroup::BearishReversal => Direction::Bearish,
            CandlestickGroup::Continuation | CandlestickGroup::Indecision => Direction::Neutral,
        }
    }
}

/// Display name and group of a builtin pattern id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternInfo {
    pub id: PatternId,
    pub display_name: &'static str,
    pub group: CandlestickGroup,
}

const fn info(id: &'static str, display_name: &'static str, group: CandlestickGroup) -> PatternInfo {
    PatternInfo {
        id: PatternId(id),
        display_name,
        group,
    }
}

use CandlestickGroup::{BearishReversal, BullishReversal, Continuation, Indecision};

/// Every pattern id the builtin detectors emit
pub const PATTERN_TABLE: &[PatternInfo] = &[
    info("HAMMER", "HAMMER", BullishReversal),
    info("INVERTED_HAMMER", "INVERTED HAMMER", BullishReversal),
    info("DRAGONFLY_DOJI", "DRAGONFLY DOJI", BullishReversal),
    info("BULLISH_ENGULFING", "BULLISH ENGULFING", BullishReversal),
    info("BULLISH_HARAMI", "BULLISH HARAMI", BullishReversal),
    info("PIERCING_LINE", "PIERCING LINE", BullishReversal),
    info("TWEEZER_BOTTOM", "TWEEZER BOTTOM", BullishReversal),
    info("MORNING_STAR", "MORNING STAR", BullishReversal),
    info("THREE_WHITE_SOLDIERS", "THREE WHITE SOLDIERS", BullishReversal),
    info("HANGING_MAN", "HANGING MAN", BearishReversal),
    info("SHOOTING_STAR", "SHOOTING STAR", BearishReversal),
    info("GRAVESTONE_DOJI", "GRAVESTONE DOJI", BearishReversal),
    info("BEARISH_ENGULFING", "BEARISH ENGULFING", BearishReversal),
    info("BEARISH_HARAMI", "BEARISH HARAMI", BearishReversal),
    info("DARK_CLOUD_COVER", "DARK CLOUD COVER", BearishReversal),
    info("TWEEZER_TOP", "TWEEZER TOP", BearishReversal),
    info("EVENING_STAR", "EVENING STAR", BearishReversal),
    info("THREE_BLACK_CROWS", "THREE BLACK CROWS", BearishReversal),
    info("WHITE_MARUBOZU", "WHITE MARUBOZU", Continuation),
    info("BLACK_MARUBOZU", "BLACK MARUBOZU", Continuation),
    info("RISING_THREE_METHODS", "RISING THREE METHODS", Continuation),
    info("FALLING_THREE_METHODS", "FALLING THREE METHODS", Continuation),
    info("DOJI", "DOJI", Indecision),
    info("SPINNING_TOP", "SPINNING TOP", Indecision),
];

pub fn pattern_info(id: PatternId) -> Option<&'static PatternInfo> {
    PATTERN_TABLE.iter().find(|info| info.id == id)
}

// ============================================================
// PROVIDER
// ============================================================

/// One candlestick match with its catalog metadata
#[derive(Debug, Clone, PartialEq)]
pub struct MicroDetection {
    pub pattern: PatternMatch,
    pub display_name: String,
    pub group: CandlestickGroup,
}

/// Source of candlestick micro-patterns for the matcher
pub trait MicroPatternProvider: Send + Sync {
    /// Every match in the window, ordered by end index, then catalog order.
    fn detect_chain(&self, candles: &[Candle]) -> Vec<MicroDetection>;

    /// The most recent match: greatest end index, first registered on ties.
    fn latest(&self, candles: &[Candle]) -> Option<MicroDetection> {
        let chain = self.detect_chain(candles);
        let last_end = chain.last()?.pattern.end_index;
        chain.into_iter().find(|d| d.pattern.end_index == last_end)
    }
}

struct CustomEntry {
    detector: Box<dyn PatternDetector>,
    display_name: String,
    group: CandlestickGroup,
}

/// Ordered set of candlestick detectors. Registration order is priority
/// order among matches ending on the same candle.
pub struct CandlestickCatalog {
    builtin: Vec<BuiltinDetector>,
    custom: Vec<CustomEntry>,
    context: ContextProvider,
}

impl Default for CandlestickCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl CandlestickCatalog {
    pub fn new() -> Self {
        Self {
            builtin: Vec::new(),
            custom: Vec::new(),
            context: ContextProvider::default(),
        }
    }

    /// Every builtin detector, multi-bar patterns ahead of the single-bar
    /// shapes they contain
    pub fn with_defaults() -> Self {
        use BuiltinDetector as B;
        [
            B::RiseFallThreeMethods(RiseFallThreeMethodsDetector::default()),
            B::MorningStar(MorningStarDetector::default()),
            B::EveningStar(EveningStarDetector::default()),
            B::ThreeWhiteSoldiers(ThreeWhiteSoldiersDetector::default()),
            B::ThreeBlackCrows(ThreeBlackCrowsDetector::default()),
            B::Engulfing(EngulfingDetector),
            B::Piercing(PiercingDetector::default()),
            B::DarkCloudCover(DarkCloudCoverDetector::default()),
            B::Harami(HaramiDetector::default()),
            B::Tweezer(TweezerDetector::default()),
            B::Hammer(HammerDetector::default()),
            B::InvertedHammer(InvertedHammerDetector::default()),
            B::HangingMan(HangingManDetector::default()),
            B::ShootingStar(ShootingStarDetector::default()),
            B::DragonflyDoji(DragonflyDojiDetector::default()),
            B::GravestoneDoji(GravestoneDojiDetector::default()),
            B::Marubozu(MarubozuDetector::default()),
            B::SpinningTop(SpinningTopDetector::default()),
            B::Doji(DojiDetector::default()),
        ]
        .into_iter()
        .fold(Self::new(), Self::add)
    }

    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    pub fn add_custom<D: PatternDetector + 'static>(
        mut self,
        detector: D,
        display_name: impl Into<String>,
        group: CandlestickGroup,
    ) -> Self {
        self.custom.push(CustomEntry {
            detector: Box::new(detector),
            display_name: display_name.into(),
            group,
        });
        self
    }

    pub fn context_provider(mut self, provider: ContextProvider) -> Self {
        self.context = provider;
        self
    }

    pub fn len(&self) -> usize {
        self.builtin.len() + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<()> {
        for detector in &self.builtin {
            detector.validate_config()?;
        }
        for entry in &self.custom {
            entry.detector.validate_config()?;
            if entry.display_name.trim().is_empty() {
                return Err(PatternError::InvalidConfig(format!(
                    "custom detector {} has an empty display name",
                    entry.detector.id().as_str()
                )));
            }
        }
        Ok(())
    }

    fn scan_at(&self, bars: &[Candle], index: usize, ctx: &CandleContext) -> Vec<MicroDetection> {
        let mut found = Vec::new();

        for detector in &self.builtin {
            if index + 1 < detector.min_bars() {
                continue;
            }
            let Some(pattern) = detector.detect(bars, index, ctx) else {
                continue;
            };
            match pattern_info(pattern.pattern_id) {
                Some(info) => found.push(MicroDetection {
                    pattern,
                    display_name: info.display_name.to_string(),
                    group: info.group,
                }),
                None => tracing::debug!(
                    pattern = pattern.pattern_id.as_str(),
                    "pattern id missing from catalog table"
                ),
            }
        }

        for entry in &self.custom {
            if index + 1 < entry.detector.min_bars() {
                continue;
            }
            if let Some(pattern) = entry.detector.detect(bars, index, ctx) {
                found.push(MicroDetection {
                    pattern,
                    display_name: entry.display_name.clone(),
                    group: entry.group,
                });
            }
        }

        found
    }
}

impl MicroPatternProvider for CandlestickCatalog {
    fn detect_chain(&self, candles: &[Candle]) -> Vec<MicroDetection> {
        self.context
            .compute_all(candles)
            .iter()
            .enumerate()
            .flat_map(|(index, ctx)| self.scan_at(candles, index, ctx))
            .collect()
    }

    fn latest(&self, candles: &[Candle]) -> Option<MicroDetection> {
        (0..candles.len()).rev().find_map(|index| {
            let ctx = self.context.compute_at(candles, index);
            self.scan_at(candles, index, &ctx).into_iter().next()
        })
    }
}

impl std::fmt::Debug for CandlestickCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandlestickCatalog")
            .field("builtin", &self.builtin.len())
            .field("custom", &self.custom.len())
            .finish()
    }
}
