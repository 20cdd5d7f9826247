//! Candle feeds: the tick shape a session consumes and a Binance adapter
//!
//! A feed delivers in-progress (`closed = false`) and closed candles for one
//! symbol. Transport does not matter to the session; anything implementing
//! [`FeedSource`] can drive it.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::{Candle, PatternError, Result};

/// One feed update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedTick {
    pub candle: Candle,
    /// The interval is over and the candle is final
    pub closed: bool,
}

impl FeedTick {
    pub fn live(candle: Candle) -> Self {
        Self {
            candle,
            closed: false,
        }
    }

    pub fn closed(candle: Candle) -> Self {
        Self {
            candle,
            closed: true,
        }
    }
}

/// Live tick stream; ends (or yields an error) when the connection drops
pub type TickStream = BoxStream<'static, Result<FeedTick>>;

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Most recent closed candles, oldest first
    async fn history(&self, _symbol: &str, _limit: usize) -> Result<Vec<Candle>> {
        Ok(Vec::new())
    }

    async fn subscribe(&self, symbol: &str) -> Result<TickStream>;
}

// ============================================================
// BINANCE
// ============================================================

pub const BINANCE_REST: &str = "https://api.binance.com";
pub const BINANCE_WS: &str = "wss://stream.binance.com:9443/ws";

/// Binance spot klines: REST history plus the `<symbol>@kline_<interval>` stream
#[derive(Debug, Clone)]
pub struct BinanceFeed {
    http: reqwest::Client,
    rest_base: String,
    ws_base: String,
    interval: String,
}

impl BinanceFeed {
    pub fn new(interval: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            rest_base: BINANCE_REST.to_string(),
            ws_base: BINANCE_WS.to_string(),
            interval: interval.into(),
        }
    }

    /// Point at another REST / websocket base (testnet, proxy)
    pub fn with_endpoints(mut self, rest_base: impl Into<String>, ws_base: impl Into<String>) -> Self {
        self.rest_base = rest_base.into();
        self.ws_base = ws_base.into();
        self
    }

    pub fn interval(&self) -> &str {
        &self.interval
    }

    pub fn stream_url(&self, symbol: &str) -> String {
        format!(
            "{}/{}@kline_{}",
            self.ws_base.trim_end_matches('/'),
            symbol.to_ascii_lowercase(),
            self.interval
        )
    }
}

fn feed_error(e: impl std::fmt::Display) -> PatternError {
    PatternError::Feed(e.to_string())
}

#[async_trait]
impl FeedSource for BinanceFeed {
    async fn history(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.rest_base.trim_end_matches('/'));
        // one extra row: the newest kline is still open and gets dropped
        let limit = (limit + 1).to_string();
        let rows: Vec<Vec<serde_json::Value>> = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol.to_ascii_uppercase().as_str()),
                ("interval", self.interval.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(feed_error)?
            .error_for_status()
            .map_err(feed_error)?
            .json()
            .await
            .map_err(feed_error)?;

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(i64::MAX);

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            let close_time = row.get(6).and_then(serde_json::Value::as_i64).unwrap_or(i64::MAX);
            if close_time >= now_ms {
                continue;
            }
            candles.push(parse_rest_kline(row)?);
        }
        Ok(candles)
    }

    async fn subscribe(&self, symbol: &str) -> Result<TickStream> {
        let url = self.stream_url(symbol);
        let (ws, _) = connect_async(url.as_str()).await.map_err(feed_error)?;
        tracing::info!(%url, "kline stream connected");

        let ticks = ws.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(txt)) => Some(parse_kline_event(txt.as_str())),
                Ok(Message::Close(frame)) => Some(Err(PatternError::Feed(format!(
                    "stream closed by server: {frame:?}"
                )))),
                Ok(_) => None,
                Err(e) => Some(Err(feed_error(e))),
            }
        });
        Ok(ticks.boxed())
    }
}

// ============================================================
// PAYLOADS
// ============================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KlineEnvelope {
    Combined { data: KlineEvent },
    Direct(KlineEvent),
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "k")]
    kline: Kline,
}

#[derive(Debug, Deserialize)]
struct Kline {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    closed: bool,
}

fn number(text: &str, field: &'static str) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|_| PatternError::Feed(format!("kline {field} is not a number: {text:?}")))
}

/// Parse a Binance kline websocket event (plain or combined-stream envelope).
///
/// The candle is not validated here; the session drops malformed ticks.
pub fn parse_kline_event(text: &str) -> Result<FeedTick> {
    let envelope: KlineEnvelope =
        serde_json::from_str(text).map_err(|e| PatternError::Feed(format!("kline payload: {e}")))?;
    let k = match envelope {
        KlineEnvelope::Combined { data } => data.kline,
        KlineEnvelope::Direct(event) => event.kline,
    };

    let candle = Candle::new(
        number(&k.open, "open")?,
        number(&k.high, "high")?,
        number(&k.low, "low")?,
        number(&k.close, "close")?,
    )
    .with_volume(number(&k.volume, "volume")?)
    .with_timestamp(k.open_time);

    Ok(FeedTick {
        candle,
        closed: k.closed,
    })
}

/// Parse one row of `GET /api/v3/klines`:
/// `[openTime, open, high, low, close, volume, closeTime, ...]`
pub fn parse_rest_kline(row: &[serde_json::Value]) -> Result<Candle> {
    let field = |i: usize, name: &'static str| -> Result<f64> {
        let value = row
            .get(i)
            .ok_or_else(|| PatternError::Feed(format!("kline row missing {name}")))?;
        match value {
            serde_json::Value::String(s) => number(s, name),
            serde_json::Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| PatternError::Feed(format!("kline {name} out of range"))),
            other => Err(PatternError::Feed(format!("kline {name} has type {other}"))),
        }
    };

    let mut candle = Candle::new(field(1, "open")?, field(2, "high")?, field(3, "low")?, field(4, "close")?)
        .with_volume(field(5, "volume")?);
    if let Some(open_time) = row.first().and_then(serde_json::Value::as_i64) {
        candle = candle.with_timestamp(open_time);
    }
    Ok(candle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = r#"{
        "e": "kline", "E": 1700000001000, "s": "BTCUSDT",
        "k": {"t": 1700000000000, "T": 1700000059999, "s": "BTCUSDT", "i": "1m",
              "o": "37000.10", "c": "37010.50", "h": "37020.00", "l": "36990.00",
              "v": "12.5", "x": true}
    }"#;

    #[test]
    fn test_parse_kline_event() {
        let tick = parse_kline_event(EVENT).unwrap();
        assert!(tick.closed);
        assert_eq!(tick.candle.open, 37000.10);
        assert_eq!(tick.candle.close, 37010.50);
        assert_eq!(tick.candle.volume, 12.5);
        assert_eq!(tick.candle.timestamp, Some(1_700_000_000_000));
        assert!(tick.candle.validate().is_ok());
    }

    #[test]
    fn test_parse_combined_envelope() {
        let combined = format!(r#"{{"stream": "btcusdt@kline_1m", "data": {EVENT}}}"#);
        assert!(parse_kline_event(&combined).unwrap().closed);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_kline_event("not json"), Err(PatternError::Feed(_))));
        let bad = EVENT.replace("\"37000.10\"", "\"abc\"");
        assert!(matches!(parse_kline_event(&bad), Err(PatternError::Feed(_))));
    }

    #[test]
    fn test_parse_rest_row() {
        let row: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1700000000000, "1.0", "2.0", "0.5", "1.5", "100", 1700000059999, "150", 10, "50", "75", "0"]"#,
        )
        .unwrap();
        let candle = parse_rest_kline(&row).unwrap();
        assert_eq!((candle.open, candle.high, candle.low, candle.close), (1.0, 2.0, 0.5, 1.5));
        assert_eq!(candle.timestamp, Some(1_700_000_000_000));
        assert!(parse_rest_kline(&row[..3]).is_err());
    }

    #[test]
    fn test_stream_url() {
        let feed = BinanceFeed::new("1m");
        assert_eq!(
            feed.stream_url("BTCUSDT"),
            "wss://stream.binance.com:9443/ws/btcusdt@kline_1m"
        );
    }
}
