//! Candlestick micro-pattern detectors
//!
//! Detectors look at one bar index (and the bars before it) and report a
//! [`PatternMatch`]. Which reversal/continuation/indecision group a match
//! belongs to is catalog data ([`catalog::PATTERN_TABLE`]), not detector logic.
//!
//! # Pattern Categories
//!
//! - **Single-bar**: doji family, spinning top, hammer family, marubozu
//! - **Two-bar**: engulfing, harami, piercing line, dark cloud cover, tweezers
//! - **Three-bar**: morning/evening star, three white soldiers, three black crows
//! - **Multi-bar**: rising/falling three methods

use serde::{Deserialize, Serialize};

use crate::{Candle, Result};

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod catalog;
pub mod context;
pub mod multi_bar;
pub mod single_bar;
pub mod three_bar;
pub mod two_bar;

pub use catalog::*;
pub use context::*;
pub use multi_bar::*;
pub use single_bar::*;
pub use three_bar::*;
pub use two_bar::*;

// ============================================================
// MATCH TYPES
// ============================================================

/// Identifier of a detected candlestick pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternId(pub &'static str);

impl PatternId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Direction/bias of a single match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

/// Result of one detector at one bar - Copy, no allocations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub pattern_id: PatternId,
    pub direction: Direction,
    /// Quality score 0.0..=1.0
    pub strength: f64,
    pub start_index: usize,
    pub end_index: usize,
}

// ============================================================
// DETECTOR TRAIT
// ============================================================

pub trait PatternDetector: Send + Sync {
    fn id(&self) -> PatternId;
    fn min_bars(&self) -> usize;
    fn detect(&self, bars: &[Candle], index: usize, ctx: &CandleContext) -> Option<PatternMatch>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - enum dispatch, no vtable
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect(
                &self,
                bars: &[Candle],
                index: usize,
                ctx: &CandleContext,
            ) -> Option<PatternMatch> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, index, ctx)),*
                }
            }

            #[inline]
            pub fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(d) => PatternDetector::id(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Single bar
    Doji(DojiDetector),
    DragonflyDoji(DragonflyDojiDetector),
    GravestoneDoji(GravestoneDojiDetector),
    SpinningTop(SpinningTopDetector),
    Hammer(HammerDetector),
    InvertedHammer(InvertedHammerDetector),
    HangingMan(HangingManDetector),
    ShootingStar(ShootingStarDetector),
    Marubozu(MarubozuDetector),

    // Two bar
    Engulfing(EngulfingDetector),
    Harami(HaramiDetector),
    Piercing(PiercingDetector),
    DarkCloudCover(DarkCloudCoverDetector),
    Tweezer(TweezerDetector),

    // Three bar
    MorningStar(MorningStarDetector),
    EveningStar(EveningStarDetector),
    ThreeWhiteSoldiers(ThreeWhiteSoldiersDetector),
    ThreeBlackCrows(ThreeBlackCrowsDetector),

    // Multi bar
    RiseFallThreeMethods(RiseFallThreeMethodsDetector),
}
