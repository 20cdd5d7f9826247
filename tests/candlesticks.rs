//! Candlestick catalog: detection in context, metadata and priority

use candlescope::detectors::{pattern_info, HammerDetector, ShootingStarDetector};
use candlescope::prelude::*;

fn declining(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = 110.0 - i as f64;
            Candle::new(close + 0.5, close + 0.7, close - 0.2, close)
        })
        .collect()
}

fn rising(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = 90.0 + i as f64;
            Candle::new(close - 0.5, close + 0.2, close - 0.7, close)
        })
        .collect()
}

/// Fires on every candle with a range
struct AnyRange(&'static str);

impl PatternDetector for AnyRange {
    fn id(&self) -> PatternId {
        PatternId(self.0)
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect(&self, bars: &[Candle], index: usize, _ctx: &CandleContext) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        (bar.range() > 0.0).then_some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Neutral,
            strength: 0.8,
            start_index: index,
            end_index: index,
        })
    }
}

#[test]
fn test_hammer_needs_prior_decline() {
    let catalog = CandlestickCatalog::new().add(BuiltinDetector::Hammer(HammerDetector::default()));
    let hammer = Candle::new(99.0, 100.1, 95.0, 100.0);

    let mut after_decline = declining(8);
    after_decline.push(hammer);
    let found = catalog.latest(&after_decline).unwrap();
    assert_eq!(found.pattern.pattern_id, PatternId("HAMMER"));
    assert_eq!(found.pattern.end_index, 8);
    assert_eq!(found.group, CandlestickGroup::BullishReversal);

    let mut after_rally = rising(8);
    after_rally.push(hammer);
    assert!(catalog.latest(&after_rally).is_none());
}

#[test]
fn test_shooting_star_after_rally() {
    let catalog =
        CandlestickCatalog::new().add(BuiltinDetector::ShootingStar(ShootingStarDetector::default()));
    let mut candles = rising(8);
    candles.push(Candle::new(98.0, 103.0, 97.9, 98.8));

    let found = catalog.latest(&candles).unwrap();
    assert_eq!(found.display_name, "SHOOTING STAR");
    assert_eq!(found.group, CandlestickGroup::BearishReversal);
    assert_eq!(found.group.direction(), Direction::Bearish);
}

#[test]
fn test_pattern_table_lookup() {
    let info = pattern_info(PatternId("MORNING_STAR")).unwrap();
    assert_eq!(info.display_name, "MORNING STAR");
    assert_eq!(info.group, CandlestickGroup::BullishReversal);

    assert_eq!(
        pattern_info(PatternId("RISING_THREE_METHODS")).unwrap().group,
        CandlestickGroup::Continuation
    );
    assert_eq!(pattern_info(PatternId("DOJI")).unwrap().group, CandlestickGroup::Indecision);
    assert!(pattern_info(PatternId("NOT_A_PATTERN")).is_none());
}

#[test]
fn test_latest_prefers_first_registered() {
    let catalog = CandlestickCatalog::new()
        .add_custom(AnyRange("FIRST"), "FIRST", CandlestickGroup::Continuation)
        .add_custom(AnyRange("SECOND"), "SECOND", CandlestickGroup::Indecision);
    let candles = declining(5);

    let chain = catalog.detect_chain(&candles);
    assert_eq!(chain.len(), 10);
    assert!(chain.windows(2).all(|w| w[0].pattern.end_index <= w[1].pattern.end_index));

    let latest = catalog.latest(&candles).unwrap();
    assert_eq!(latest.display_name, "FIRST");
    assert_eq!(latest.pattern.end_index, 4);
}

#[test]
fn test_latest_prefers_most_recent() {
    let catalog = CandlestickCatalog::new()
        .add_custom(AnyRange("LATE"), "LATE", CandlestickGroup::Continuation);
    let mut candles = declining(5);
    // zero-range candles never match
    candles.push(Candle::new(100.0, 100.0, 100.0, 100.0));

    let latest = catalog.latest(&candles).unwrap();
    assert_eq!(latest.pattern.end_index, 4);
}

#[test]
fn test_custom_detector_through_engine() {
    let engine = EngineBuilder::new()
        .with_default_templates()
        .custom_candlestick(AnyRange("WIDE_BAR"), "WIDE BAR", CandlestickGroup::Continuation)
        .build()
        .unwrap();

    let candles: Vec<Candle> = (0..40)
        .map(|i| {
            let close = 100.0 + i as f64 * 0.2;
            Candle::new(close, close + 0.5, close - 0.5, close)
        })
        .collect();
    let verdict = engine.analyze(&candles);
    assert_eq!(verdict.name, "WIDE BAR");
    assert_eq!(verdict.pattern_type, "CONTINUATION");
    assert_eq!(verdict.signal, Signal::Hold);
    assert!((verdict.similarity - 80.0).abs() < 1e-9);
}

#[test]
fn test_custom_detector_needs_display_name() {
    let built = EngineBuilder::new()
        .with_default_templates()
        .custom_candlestick(AnyRange("NAMELESS"), "  ", CandlestickGroup::Indecision)
        .build();
    assert!(matches!(built, Err(PatternError::InvalidConfig(_))));
}

#[test]
fn test_default_catalog_is_valid() {
    let catalog = CandlestickCatalog::with_defaults();
    assert_eq!(catalog.len(), 19);
    assert!(catalog.validate().is_ok());

    let flat = vec![Candle::new(100.0, 100.0, 100.0, 100.0); 20];
    assert!(catalog.detect_chain(&flat).is_empty());
}
