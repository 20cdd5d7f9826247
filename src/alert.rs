//! Lock alerts with repeat suppression

use serde::{Deserialize, Serialize};

use crate::verdict::{Signal, Verdict};

/// Alert controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockPhase {
    #[default]
    Waiting,
    Locked,
}

/// Fired once when a symbol locks onto a new pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub symbol: String,
    pub name: String,
    pub signal: Signal,
    pub similarity: f64,
    pub target_price: f64,
}

/// WAITING/LOCKED state machine for one symbol session.
///
/// Entering LOCKED with a name different from the last locked one fires an
/// alert; staying LOCKED on the same name is silent; leaving LOCKED forgets
/// the name.
#[derive(Debug, Clone)]
pub struct AlertController {
    symbol: String,
    last_locked_name: Option<String>,
}

impl AlertController {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            last_locked_name: None,
        }
    }

    pub fn observe(&mut self, verdict: &Verdict) -> Option<Alert> {
        if !verdict.is_locked() {
            if let Some(name) = self.last_locked_name.take() {
                tracing::debug!(symbol = %self.symbol, %name, "lock released");
            }
            return None;
        }

        if self.last_locked_name.as_deref() == Some(verdict.name.as_str()) {
            return None;
        }

        self.last_locked_name = Some(verdict.name.clone());
        Some(Alert {
            symbol: self.symbol.clone(),
            name: verdict.name.clone(),
            signal: verdict.signal,
            similarity: verdict.similarity,
            target_price: verdict.target_price,
        })
    }

    pub fn phase(&self) -> LockPhase {
        if self.last_locked_name.is_some() {
            LockPhase::Locked
        } else {
            LockPhase::Waiting
        }
    }

    pub fn last_locked_name(&self) -> Option<&str> {
        self.last_locked_name.as_deref()
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

// ============================================================
// SINKS
// ============================================================

/// Side effect run for every fired alert
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert);
}

impl<F> AlertSink for F
where
    F: Fn(&Alert) + Send + Sync,
{
    fn notify(&self, alert: &Alert) {
        self(alert)
    }
}

/// Writes alerts to the `tracing` log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: &Alert) {
        tracing::info!(
            symbol = %alert.symbol,
            pattern = %alert.name,
            signal = ?alert.signal,
            similarity = alert.similarity,
            target = alert.target_price,
            "pattern locked"
        );
    }
}
