//! Streaming symbol session
//!
//! One [`SymbolSession`] per symbol owns the candle buffer and the lock
//! state. Feed ticks go in through [`SymbolSession::on_tick`]; verdicts come
//! out on a `watch` channel and lock alerts on a `broadcast` channel.
//!
//! - Only closed candles enter the buffer; an in-progress candle is appended
//!   to the analysis window alone.
//! - A closed candle always triggers analysis; in-progress ticks at most once
//!   per `analysis_interval`.
//! - Analyses run as spawned tasks tagged with an increasing id. A result
//!   whose id is not newer than the last applied one is dropped.
//! - After [`SymbolSession::close`] nothing touches the session state again.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::{
    runtime::Handle,
    sync::{broadcast, watch},
    task::JoinHandle,
    time::Instant,
};

pub use crate::config::SessionConfig;
use crate::{
    alert::{Alert, AlertController, AlertSink, LockPhase},
    buffer::CandleBuffer,
    config::EngineConfig,
    feed::{FeedSource, FeedTick},
    inference::{LocalAnalyzer, StructureAnalyzer},
    verdict::Verdict,
    Candle, EngineBuilder, PatternError, Result, StructureEngine,
};

// ============================================================
// THROTTLE
// ============================================================

#[derive(Debug, Clone)]
struct AnalysisThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl AnalysisThrottle {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    fn should_run(&mut self, closed: bool, now: Instant) -> bool {
        let due = closed
            || self
                .last
                .map_or(true, |last| now.duration_since(last) >= self.min_interval);
        if due {
            self.last = Some(now);
        }
        due
    }
}

// ============================================================
// SHARED STATE
// ============================================================

struct SessionState {
    buffer: CandleBuffer,
    alerts: AlertController,
    throttle: AnalysisThrottle,
    /// Id of the most recently issued analysis
    issued: u64,
    /// Id of the most recently applied result
    applied: u64,
}

struct Shared {
    symbol: String,
    config: SessionConfig,
    min_window: usize,
    analyzer: Arc<dyn StructureAnalyzer>,
    alert_sink: Option<Arc<dyn AlertSink>>,
    alive: AtomicBool,
    state: Mutex<SessionState>,
    verdict_tx: watch::Sender<Verdict>,
    alert_tx: broadcast::Sender<Alert>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn on_tick(self: &Arc<Self>, tick: FeedTick) {
        if !self.alive() {
            return;
        }
        if let Err(error) = tick.candle.validate() {
            tracing::warn!(symbol = %self.symbol, %error, "dropping malformed tick");
            return;
        }

        let request = {
            let mut state = self.lock();
            if tick.closed {
                if let Err(error) = state.buffer.append(tick.candle) {
                    tracing::warn!(symbol = %self.symbol, %error, "dropping malformed candle");
                    return;
                }
            }
            if !state.throttle.should_run(tick.closed, Instant::now()) {
                tracing::trace!(symbol = %self.symbol, "tick throttled");
                return;
            }

            let mut window = state.buffer.snapshot();
            if !tick.closed {
                window.push(tick.candle);
            }
            state.issued += 1;
            (state.issued, window)
        };

        self.dispatch(request);
    }

    /// Bulk-load closed candles (history prefill) and analyse once
    fn prefill(self: &Arc<Self>, candles: Vec<Candle>) {
        let request = {
            let mut state = self.lock();
            let mut accepted = 0usize;
            for (index, candle) in candles.into_iter().enumerate() {
                match state.buffer.append(candle) {
                    Ok(()) => accepted += 1,
                    Err(error) => {
                        tracing::warn!(symbol = %self.symbol, index, %error, "skipping history candle")
                    },
                }
            }
            tracing::info!(symbol = %self.symbol, accepted, "history prefilled");
            state.throttle.last = Some(Instant::now());
            state.issued += 1;
            (state.issued, state.buffer.snapshot())
        };
        self.dispatch(request);
    }

    fn dispatch(self: &Arc<Self>, (id, window): (u64, Vec<Candle>)) {
        if window.len() < self.min_window {
            self.apply(id, Verdict::scanning(window.len(), self.min_window));
            return;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(error) => {
                tracing::warn!(symbol = %self.symbol, %error, "no async runtime, analysis skipped");
                return;
            },
        };

        let shared = Arc::clone(self);
        handle.spawn(async move {
            let verdict = match shared.analyzer.analyze(window).await {
                Ok(verdict) => verdict,
                Err(error) => {
                    tracing::warn!(symbol = %shared.symbol, %error, "analysis failed");
                    Verdict::offline()
                },
            };
            shared.apply(id, verdict);
        });
    }

    fn apply(&self, id: u64, verdict: Verdict) {
        let alert = {
            let mut state = self.lock();
            if !self.alive() {
                tracing::debug!(symbol = %self.symbol, id, "session closed, result dropped");
                return;
            }
            if id <= state.applied {
                let error = PatternError::StaleResult {
                    issued: id,
                    applied: state.applied,
                };
                tracing::debug!(symbol = %self.symbol, %error, "discarding stale result");
                return;
            }
            state.applied = id;
            let alert = state.alerts.observe(&verdict);
            self.verdict_tx.send_replace(verdict);
            alert
        };

        if let Some(alert) = alert {
            if let Some(sink) = &self.alert_sink {
                sink.notify(&alert);
            }
            // no subscribers is fine
            let _ = self.alert_tx.send(alert);
        }
    }
}

async fn run_feed(shared: Arc<Shared>, feed: Arc<dyn FeedSource>) {
    let limit = shared.config.history_limit;
    if limit > 0 {
        match feed.history(&shared.symbol, limit).await {
            Ok(candles) if !candles.is_empty() => shared.prefill(candles),
            Ok(_) => {},
            Err(error) => tracing::warn!(symbol = %shared.symbol, %error, "history prefill failed"),
        }
    }

    while shared.alive() {
        match feed.subscribe(&shared.symbol).await {
            Ok(mut ticks) => {
                while let Some(next) = ticks.next().await {
                    if !shared.alive() {
                        return;
                    }
                    match next {
                        Ok(tick) => shared.on_tick(tick),
                        Err(error) => {
                            tracing::warn!(symbol = %shared.symbol, %error, "feed error");
                            break;
                        },
                    }
                }
            },
            Err(error) => tracing::warn!(symbol = %shared.symbol, %error, "feed subscribe failed"),
        }

        if !shared.alive() {
            break;
        }
        tracing::info!(
            symbol = %shared.symbol,
            delay_ms = shared.config.reconnect_delay_ms,
            "feed disconnected, reconnecting with buffer kept"
        );
        tokio::time::sleep(shared.config.reconnect_delay()).await;
    }
}

// ============================================================
// SESSION
// ============================================================

/// Live analysis of one symbol
pub struct SymbolSession {
    shared: Arc<Shared>,
    feed_task: Mutex<Option<JoinHandle<()>>>,
}

impl SymbolSession {
    pub fn builder(symbol: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(symbol)
    }

    pub fn symbol(&self) -> &str {
        &self.shared.symbol
    }

    /// Feed one tick in. Needs a tokio runtime once the window is full.
    pub fn on_tick(&self, tick: FeedTick) {
        self.shared.on_tick(tick);
    }

    /// Feed one closed candle in
    pub fn on_candle(&self, candle: Candle) {
        self.on_tick(FeedTick::closed(candle));
    }

    /// Receiver of the latest verdict
    pub fn current_verdict(&self) -> watch::Receiver<Verdict> {
        self.shared.verdict_tx.subscribe()
    }

    pub fn latest(&self) -> Verdict {
        self.shared.verdict_tx.borrow().clone()
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.shared.alert_tx.subscribe()
    }

    pub fn buffered(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn snapshot(&self) -> Vec<Candle> {
        self.shared.lock().buffer.snapshot()
    }

    pub fn lock_phase(&self) -> LockPhase {
        self.shared.lock().alerts.phase()
    }

    pub fn is_open(&self) -> bool {
        self.shared.alive()
    }

    /// Drive the session from `feed`: history prefill once, then the live
    /// stream, re-subscribing after `reconnect_delay` whenever it drops.
    pub fn spawn_feed(&self, feed: Arc<dyn FeedSource>) -> Result<()> {
        if !self.is_open() {
            return Err(PatternError::Feed(format!("session {} is closed", self.symbol())));
        }
        let handle =
            Handle::try_current().map_err(|e| PatternError::Feed(format!("no async runtime: {e}")))?;

        let task = handle.spawn(run_feed(Arc::clone(&self.shared), feed));
        let mut slot = self.feed_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Stop analysing and release the feed. Idempotent.
    pub fn close(&self) {
        if self.shared.alive.swap(false, Ordering::AcqRel) {
            tracing::info!(symbol = %self.shared.symbol, "session closed");
        }
        let task = self
            .feed_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Drop for SymbolSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SymbolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolSession")
            .field("symbol", &self.shared.symbol)
            .field("open", &self.is_open())
            .finish()
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`SymbolSession`]
pub struct SessionBuilder {
    symbol: String,
    engine_config: EngineConfig,
    config: SessionConfig,
    analyzer: Option<Arc<dyn StructureAnalyzer>>,
    alert_sink: Option<Arc<dyn AlertSink>>,
}

impl SessionBuilder {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            engine_config: EngineConfig::default(),
            config: SessionConfig::default(),
            analyzer: None,
            alert_sink: None,
        }
    }

    /// Buffer capacity and minimum window (and the local engine's thresholds
    /// when no analyzer is set)
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Analyse with a prebuilt engine
    pub fn engine(mut self, engine: Arc<StructureEngine>) -> Self {
        self.engine_config = engine.config().clone();
        self.analyzer = Some(Arc::new(LocalAnalyzer::new(engine)));
        self
    }

    /// Analyse with any strategy (remote, fallback, mock)
    pub fn analyzer(mut self, analyzer: Arc<dyn StructureAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<SymbolSession> {
        if self.symbol.trim().is_empty() {
            return Err(PatternError::InvalidConfig("session symbol must not be empty".into()));
        }
        self.engine_config.validate()?;
        self.config.validate()?;

        let analyzer: Arc<dyn StructureAnalyzer> = match self.analyzer {
            Some(analyzer) => analyzer,
            None => {
                let engine = EngineBuilder::new()
                    .with_all_defaults()
                    .config(self.engine_config.clone())
                    .build()?;
                Arc::new(LocalAnalyzer::new(Arc::new(engine)))
            },
        };

        let min_window = self.engine_config.min_window.get();
        let (verdict_tx, _) = watch::channel(Verdict::scanning(0, min_window));
        let (alert_tx, _) = broadcast::channel(self.config.alert_capacity);

        let state = SessionState {
            buffer: CandleBuffer::with_capacity(self.engine_config.capacity),
            alerts: AlertController::new(self.symbol.clone()),
            throttle: AnalysisThrottle::new(self.config.analysis_interval()),
            issued: 0,
            applied: 0,
        };

        Ok(SymbolSession {
            shared: Arc::new(Shared {
                symbol: self.symbol,
                config: self.config,
                min_window,
                analyzer,
                alert_sink: self.alert_sink,
                alive: AtomicBool::new(true),
                state: Mutex::new(state),
                verdict_tx,
                alert_tx,
            }),
            feed_task: Mutex::new(None),
        })
    }
}
