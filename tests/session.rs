//! Streaming session behaviour under a paused tokio clock

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use candlescope::feed::TickStream;
use candlescope::prelude::*;
use futures_util::{stream, StreamExt};

fn candle(close: f64) -> Candle {
    Candle::new(close, close + 1.0, close - 1.0, close)
}

fn locked(name: &str) -> Verdict {
    Verdict {
        name: name.to_string(),
        signal: Signal::Buy,
        similarity: 99.0,
        probability: 94.2,
        confidence: ConfidenceLabel::High,
        status: Status::Locked,
        ..Verdict::offline()
    }
}

fn named(name: String) -> Verdict {
    Verdict {
        name,
        status: Status::Forming,
        ..Verdict::offline()
    }
}

/// Names each verdict after its window length; 40-candle windows are slow
struct SlowOnForty;

#[async_trait]
impl StructureAnalyzer for SlowOnForty {
    async fn analyze(&self, window: Vec<Candle>) -> Result<Verdict> {
        let delay = if window.len() == 40 { 200 } else { 10 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(named(format!("WINDOW-{}", window.len())))
    }
}

#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
}

#[async_trait]
impl StructureAnalyzer for Counting {
    async fn analyze(&self, window: Vec<Candle>) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(named(format!("WINDOW-{}", window.len())))
    }
}

struct AlwaysLocked;

#[async_trait]
impl StructureAnalyzer for AlwaysLocked {
    async fn analyze(&self, _window: Vec<Candle>) -> Result<Verdict> {
        Ok(locked("DOUBLE BOTTOM"))
    }
}

struct Slow;

#[async_trait]
impl StructureAnalyzer for Slow {
    async fn analyze(&self, _window: Vec<Candle>) -> Result<Verdict> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(locked("DOUBLE BOTTOM"))
    }
}

struct Failing;

#[async_trait]
impl StructureAnalyzer for Failing {
    async fn analyze(&self, _window: Vec<Candle>) -> Result<Verdict> {
        Err(PatternError::InferenceUnavailable("connection refused".into()))
    }
}

fn session(analyzer: Arc<dyn StructureAnalyzer>) -> SymbolSession {
    SymbolSession::builder("BTCUSDT").analyzer(analyzer).build().unwrap()
}

async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_late_result_is_discarded() {
    let session = session(Arc::new(SlowOnForty));
    for i in 0..41 {
        session.on_candle(candle(100.0 + i as f64));
    }
    settle(500).await;

    // 41-candle analysis finished first; the slower 40-candle one is stale
    assert_eq!(session.latest().name, "WINDOW-41");
}

#[tokio::test(start_paused = true)]
async fn test_in_progress_ticks_are_throttled() {
    let counting = Arc::new(Counting::default());
    let session = session(counting.clone());
    for i in 0..40 {
        session.on_candle(candle(100.0 + i as f64));
    }
    settle(10).await;
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

    for _ in 0..10 {
        session.on_tick(FeedTick::live(candle(140.0)));
        settle(100).await;
    }
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

    settle(5_000).await;
    session.on_tick(FeedTick::live(candle(141.0)));
    session.on_tick(FeedTick::live(candle(142.0)));
    settle(10).await;
    assert_eq!(counting.calls.load(Ordering::SeqCst), 2);

    // the live candle joins the window but not the buffer
    assert_eq!(session.latest().name, "WINDOW-41");
    assert_eq!(session.buffered(), 40);

    // closed candles are never throttled
    session.on_candle(candle(143.0));
    settle(10).await;
    assert_eq!(counting.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_lock_alerts_once() {
    let fired = Arc::new(AtomicUsize::new(0));
    let sink_count = fired.clone();
    let session = SymbolSession::builder("ETHUSDT")
        .analyzer(Arc::new(AlwaysLocked))
        .alert_sink(Arc::new(move |_: &Alert| {
            sink_count.fetch_add(1, Ordering::SeqCst);
        }))
        .build()
        .unwrap();
    let mut alerts = session.subscribe_alerts();

    for i in 0..46 {
        session.on_candle(candle(100.0 + i as f64));
        settle(1).await;
    }

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    let alert = alerts.try_recv().unwrap();
    assert_eq!(alert.symbol, "ETHUSDT");
    assert_eq!(alert.name, "DOUBLE BOTTOM");
    assert!(alerts.try_recv().is_err());
    assert_eq!(session.lock_phase(), LockPhase::Locked);
}

#[tokio::test(start_paused = true)]
async fn test_no_updates_after_close() {
    let fired = Arc::new(AtomicUsize::new(0));
    let sink_count = fired.clone();
    let session = SymbolSession::builder("SOLUSDT")
        .analyzer(Arc::new(Slow))
        .alert_sink(Arc::new(move |_: &Alert| {
            sink_count.fetch_add(1, Ordering::SeqCst);
        }))
        .build()
        .unwrap();
    let verdicts = session.current_verdict();

    for i in 0..40 {
        session.on_candle(candle(100.0 + i as f64));
    }
    session.close();
    settle(300).await;

    assert!(!session.is_open());
    assert_eq!(verdicts.borrow().status, Status::Scanning);
    assert_eq!(verdicts.borrow().pattern_type, "BUFFERING 39/40");
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    session.on_candle(candle(200.0));
    assert_eq!(session.buffered(), 40);
}

#[tokio::test(start_paused = true)]
async fn test_analyzer_failure_reports_offline() {
    let session = session(Arc::new(Failing));
    for i in 0..40 {
        session.on_candle(candle(100.0 + i as f64));
    }
    settle(10).await;
    assert_eq!(session.latest().status, Status::Offline);
}

#[tokio::test(start_paused = true)]
async fn test_local_engine_session() {
    let engine = Arc::new(EngineBuilder::new().with_all_defaults().build().unwrap());
    let session = SymbolSession::builder("BTCUSDT").engine(engine).build().unwrap();
    let mut verdicts = session.current_verdict();

    for _ in 0..40 {
        session.on_candle(Candle::new(100.0, 100.0, 100.0, 100.0));
    }
    verdicts.changed().await.unwrap();
    settle(10).await;
    assert_eq!(session.latest().name, "STABLE STRUCTURE");
    assert_eq!(session.latest().signal, Signal::Hold);
}

// ============================================================
// FEED
// ============================================================

/// Two short-lived connections, then one that stays open
struct FlakyFeed {
    subscriptions: AtomicUsize,
}

#[async_trait]
impl FeedSource for FlakyFeed {
    async fn history(&self, _symbol: &str, limit: usize) -> Result<Vec<Candle>> {
        assert_eq!(limit, 30);
        Ok(vec![candle(90.0), candle(91.0)])
    }

    async fn subscribe(&self, _symbol: &str) -> Result<TickStream> {
        let attempt = self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let ticks = match attempt {
            0 => stream::iter(vec![
                Ok(FeedTick::closed(candle(100.0))),
                Ok(FeedTick::live(candle(100.5))),
                Ok(FeedTick::closed(candle(101.0))),
                Ok(FeedTick::closed(candle(102.0))),
                Err(PatternError::Feed("connection reset".into())),
            ])
            .boxed(),
            1 => stream::iter(vec![Ok(FeedTick::closed(candle(103.0))), Ok(FeedTick::closed(candle(104.0)))])
                .boxed(),
            _ => stream::pending().boxed(),
        };
        Ok(ticks)
    }
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_keeps_buffer() {
    let feed = Arc::new(FlakyFeed {
        subscriptions: AtomicUsize::new(0),
    });
    let session = session(Arc::new(Counting::default()));
    session.spawn_feed(feed.clone()).unwrap();

    settle(11_000).await;

    assert_eq!(feed.subscriptions.load(Ordering::SeqCst), 3);
    let closes: Vec<f64> = session.snapshot().iter().map(|c| c.close).collect();
    assert_eq!(closes, vec![90.0, 91.0, 100.0, 101.0, 102.0, 103.0, 104.0]);
    assert_eq!(session.latest().pattern_type, "BUFFERING 7/40");

    session.close();
    settle(20_000).await;
    assert_eq!(feed.subscriptions.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_spawn_feed_after_close_fails() {
    let session = session(Arc::new(Counting::default()));
    session.close();
    let feed = Arc::new(FlakyFeed {
        subscriptions: AtomicUsize::new(0),
    });
    assert!(matches!(session.spawn_feed(feed), Err(PatternError::Feed(_))));
}
