//! Analysis strategies for a streaming session
//!
//! [`LocalAnalyzer`] runs the in-process [`StructureEngine`]. [`InferenceClient`]
//! posts the window to an external structure-analysis service, and
//! [`FallbackAnalyzer`] degrades to the local engine (or an OFFLINE verdict)
//! when that service cannot be reached.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::config::InferenceConfig;
use crate::{
    config::FallbackPolicy,
    verdict::{ConfidenceLabel, Edges, Signal, Status, Verdict},
    Candle, PatternError, Result, StructureEngine,
};

/// Produces a verdict for one analysis window
#[async_trait]
pub trait StructureAnalyzer: Send + Sync {
    async fn analyze(&self, window: Vec<Candle>) -> Result<Verdict>;
}

// ============================================================
// LOCAL
// ============================================================

#[derive(Debug, Clone)]
pub struct LocalAnalyzer {
    engine: Arc<StructureEngine>,
}

impl LocalAnalyzer {
    pub fn new(engine: Arc<StructureEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &StructureEngine {
        &self.engine
    }
}

#[async_trait]
impl StructureAnalyzer for LocalAnalyzer {
    async fn analyze(&self, window: Vec<Candle>) -> Result<Verdict> {
        Ok(self.engine.analyze(&window))
    }
}

// ============================================================
// REMOTE
// ============================================================

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    ohlc: &'a [Candle],
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteEdges {
    neckline: f64,
    support: f64,
}

/// Response body of the structure-analysis service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVerdict {
    pub name: String,
    #[serde(default)]
    pub similarity: f64,
    #[serde(default)]
    pub target_price: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub signal: Option<String>,
    #[serde(default)]
    edges: Option<RemoteEdges>,
}

const BULLISH_KEYWORDS: &[&str] = &["BOTTOM", "BULLISH", "ASCENDING", "CUP", "FALLING WEDGE"];
const BEARISH_KEYWORDS: &[&str] = &["TOP", "BEARISH", "DESCENDING", "RISING WEDGE", "HEAD AND SHOULDERS"];

/// Signal implied by a pattern name; bullish keywords are checked first
pub fn signal_for_name(name: &str) -> Signal {
    let name = name.to_ascii_uppercase().replace('_', " ");
    if name.starts_with("SCANNING") || name == "NEUTRAL" {
        Signal::Wait
    } else if BULLISH_KEYWORDS.iter().any(|k| name.contains(k)) {
        Signal::Buy
    } else if BEARISH_KEYWORDS.iter().any(|k| name.contains(k)) {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

impl RemoteVerdict {
    pub fn into_verdict(self) -> Verdict {
        let signal = self
            .signal
            .as_deref()
            .and_then(parse_signal)
            .unwrap_or_else(|| signal_for_name(&self.name));

        let status = match self.status.as_deref() {
            Some("AI_LOCKED") | Some("LOCKED") => Status::Locked,
            Some("ACTIVE_BREAKOUT") | Some("BREAKOUT") | Some("BREAKDOWN") => match signal {
                Signal::Sell => Status::Breakdown,
                _ => Status::Breakout,
            },
            Some("SCANNING") => Status::Scanning,
            None if signal == Signal::Wait => Status::Scanning,
            // WAITING, WEAK_BREAKOUT (crossed without volume) and anything unknown
            _ => Status::Forming,
        };

        let confidence = match (signal, status) {
            (Signal::Wait, _) | (_, Status::Scanning) => ConfidenceLabel::Low,
            (_, Status::Locked) => ConfidenceLabel::High,
            _ => ConfidenceLabel::Standard,
        };
        let probability = if confidence == ConfidenceLabel::Low {
            0.0
        } else {
            self.similarity
        };

        let edges = self.edges.map(|e| {
            let (lo, hi) = if e.support <= e.neckline {
                (e.support, e.neckline)
            } else {
                (e.neckline, e.support)
            };
            Edges {
                support: lo,
                resistance: hi,
            }
        });

        Verdict {
            name: self.name.replace('_', " "),
            pattern_type: "REMOTE".to_string(),
            signal,
            similarity: self.similarity.clamp(0.0, 100.0),
            probability,
            confidence,
            target_price: self.target_price.unwrap_or(0.0),
            status,
            edges,
            skeleton: Vec::new(),
            trend_pct: 0.0,
        }
    }
}

fn parse_signal(s: &str) -> Option<Signal> {
    match s.to_ascii_uppercase().as_str() {
        "BUY" => Some(Signal::Buy),
        "SELL" => Some(Signal::Sell),
        "HOLD" => Some(Signal::Hold),
        "WAIT" => Some(Signal::Wait),
        _ => None,
    }
}

/// HTTP client for the structure-analysis service
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PatternError::InferenceUnavailable(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Wrap with the configured fallback policy, using `engine` for local fallback
    pub fn with_fallback(self, engine: Arc<StructureEngine>) -> FallbackAnalyzer<Self> {
        let policy = self.config.fallback;
        FallbackAnalyzer::new(self, LocalAnalyzer::new(engine), policy)
    }
}

#[async_trait]
impl StructureAnalyzer for InferenceClient {
    async fn analyze(&self, window: Vec<Candle>) -> Result<Verdict> {
        let unavailable = |e: reqwest::Error| PatternError::InferenceUnavailable(e.to_string());

        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&AnalyzeRequest { ohlc: &window })
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PatternError::InferenceUnavailable(format!(
                "{} answered HTTP {status}",
                self.config.endpoint
            )));
        }

        let remote: RemoteVerdict = response.json().await.map_err(unavailable)?;
        Ok(remote.into_verdict())
    }
}

// ============================================================
// FALLBACK
// ============================================================

/// Primary analyzer with a degraded path for `InferenceUnavailable`
pub struct FallbackAnalyzer<P> {
    primary: P,
    local: LocalAnalyzer,
    policy: FallbackPolicy,
}

impl<P: StructureAnalyzer> FallbackAnalyzer<P> {
    pub fn new(primary: P, local: LocalAnalyzer, policy: FallbackPolicy) -> Self {
        Self {
            primary,
            local,
            policy,
        }
    }
}

#[async_trait]
impl<P: StructureAnalyzer> StructureAnalyzer for FallbackAnalyzer<P> {
    async fn analyze(&self, window: Vec<Candle>) -> Result<Verdict> {
        match self.primary.analyze(window.clone()).await {
            Err(PatternError::InferenceUnavailable(reason)) => {
                tracing::warn!(%reason, policy = ?self.policy, "inference unavailable, degrading");
                match self.policy {
                    FallbackPolicy::Local => self.local.analyze(window).await,
                    FallbackPolicy::Offline => Ok(Verdict::offline()),
                }
            },
            other => other,
        }
    }
}
