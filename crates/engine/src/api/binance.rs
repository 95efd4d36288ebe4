//! Binance public API client for market data (no authentication required)

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::config::DEFAULT_BINANCE_URL;
use crate::error::{SignalError, SignalResult};
use crate::types::{normalize_symbol, Candle, CandleSeries, Timeframe};

pub const MAX_KLINES_PER_REQUEST: u32 = 1000;

/// Source of candles and spot prices
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> SignalResult<CandleSeries>;

    async fn price(&self, symbol: &str) -> SignalResult<Decimal>;
}

/// Binance public market data client
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

/// Raw kline data from Binance API (array of arrays)
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    u64,    // 8: Number of trades
    String, // 9: Taker buy base
    String, // 10: Taker buy quote
    String, // 11: Ignore
);

/// Binance ticker price response
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TickerPrice {
    symbol: String,
    price: String,
}

impl BinanceClient {
    pub fn new(base_url: &str, timeout: Duration) -> SignalResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SignalError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Client against the public endpoint with a 20s timeout
    pub fn public() -> SignalResult<Self> {
        Self::new(DEFAULT_BINANCE_URL, Duration::from_secs(20))
    }

    /// Fetch klines; the interval is validated before any network call.
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> SignalResult<CandleSeries> {
        let timeframe: Timeframe = interval.parse()?;
        self.fetch_klines(symbol, timeframe, limit).await
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> SignalResult<CandleSeries> {
        let symbol = normalize_symbol(symbol);
        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, timeframe, limit
        );

        debug!(symbol = %symbol, interval = %timeframe, limit, "Fetching klines from Binance");

        let body = self.get_body(&url).await?;
        let series = parse_klines(&symbol, timeframe, &body)?;

        debug!(count = series.len(), "Fetched klines");
        Ok(series)
    }

    /// Get current price for a symbol
    pub async fn get_price(&self, symbol: &str) -> SignalResult<Decimal> {
        let symbol = normalize_symbol(symbol);
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);

        let body = self.get_body(&url).await?;
        parse_price(&body)
    }

    async fn get_body(&self, url: &str) -> SignalResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SignalError::DataUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SignalError::DataUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(SignalError::DataUnavailable(format!(
                "Binance API error {}: {}",
                status, body
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> SignalResult<CandleSeries> {
        self.fetch_klines(symbol, timeframe, limit).await
    }

    async fn price(&self, symbol: &str) -> SignalResult<Decimal> {
        self.get_price(symbol).await
    }
}

/// Parse a klines response positionally; any malformed row fails the whole batch.
pub fn parse_klines(symbol: &str, timeframe: Timeframe, body: &str) -> SignalResult<CandleSeries> {
    let raw_klines: Vec<RawKline> = serde_json::from_str(body)
        .map_err(|e| SignalError::DataUnavailable(format!("malformed klines: {}", e)))?;

    let candles = raw_klines
        .into_iter()
        .map(|raw| {
            Ok(Candle {
                open_time: raw.0,
                open: parse_f64(&raw.1)?,
                high: parse_f64(&raw.2)?,
                low: parse_f64(&raw.3)?,
                close: parse_f64(&raw.4)?,
                volume: parse_f64(&raw.5)?,
                close_time: raw.6,
            })
        })
        .collect::<SignalResult<Vec<_>>>()?;

    CandleSeries::new(symbol, timeframe, candles)
}

/// Parse a ticker response's string-encoded price
pub fn parse_price(body: &str) -> SignalResult<Decimal> {
    let ticker: TickerPrice = serde_json::from_str(body)
        .map_err(|e| SignalError::DataUnavailable(format!("malformed ticker: {}", e)))?;
    Decimal::from_str(&ticker.price)
        .map_err(|e| SignalError::DataUnavailable(format!("bad price '{}': {}", ticker.price, e)))
}

fn parse_f64(raw: &str) -> SignalResult<f64> {
    raw.parse::<f64>()
        .map_err(|_| SignalError::DataUnavailable(format!("bad numeric field '{}'", raw)))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::types::make_candles;

    /// Canned market: the same closes for every symbol, one fixed price
    #[derive(Default)]
    pub struct StubMarket {
        pub closes: Mutex<Vec<f64>>,
        pub price: Option<Decimal>,
        pub fail: bool,
        pub requests: Mutex<Vec<(String, Timeframe, u32)>>,
        pub calls: AtomicUsize,
    }

    impl StubMarket {
        pub fn with_closes(closes: Vec<f64>) -> Self {
            Self {
                closes: Mutex::new(closes),
                ..Self::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn set_closes(&self, closes: Vec<f64>) {
            *self.closes.lock().unwrap() = closes;
        }
    }

    #[async_trait]
    impl MarketData for StubMarket {
        async fn candles(
            &self,
            symbol: &str,
            timeframe: Timeframe,
            limit: u32,
        ) -> SignalResult<CandleSeries> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests
                .lock()
                .unwrap()
                .push((symbol.to_string(), timeframe, limit));
            if self.fail {
                return Err(SignalError::DataUnavailable("exchange down".into()));
            }
            let closes = self.closes.lock().unwrap().clone();
            let start = closes.len().saturating_sub(limit as usize);
            CandleSeries::new(symbol, timeframe, make_candles(&closes[start..]))
        }

        async fn price(&self, _symbol: &str) -> SignalResult<Decimal> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match (self.fail, self.price) {
                (false, Some(p)) => Ok(p),
                _ => Err(SignalError::DataUnavailable("Invalid symbol.".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const KLINES: &str = r#"[
        [1700000000000, "100.5", "102.0", "99.0", "101.25", "1500.3", 1700003599999, "151000.0", 420, "700.0", "70000.0", "0"],
        [1700003600000, "101.25", "103.5", "100.75", "103.0", "900.0", 1700007199999, "92000.0", 310, "450.0", "46000.0", "0"]
    ]"#;

    #[test]
    fn test_parse_klines_positional() {
        let series = parse_klines("ltcusdt", Timeframe::H1, KLINES).unwrap();
        assert_eq!(series.symbol, "LTCUSDT");
        assert_eq!(series.len(), 2);

        let first = series.candles()[0];
        assert_eq!(first.open_time, 1_700_000_000_000);
        assert_eq!(first.open, 100.5);
        assert_eq!(first.high, 102.0);
        assert_eq!(first.low, 99.0);
        assert_eq!(first.close, 101.25);
        assert_eq!(first.volume, 1500.3);
        assert_eq!(first.close_time, 1_700_003_599_999);
    }

    #[test]
    fn test_parse_klines_rejects_malformed_row() {
        let body = r#"[[1700000000000, "abc", "102.0", "99.0", "101.25", "1500.3", 1700003599999, "0", 1, "0", "0", "0"]]"#;
        assert!(matches!(
            parse_klines("LTCUSDT", Timeframe::H1, body),
            Err(SignalError::DataUnavailable(_))
        ));

        let short_row = r#"[[1700000000000, "100.5", "102.0"]]"#;
        assert!(parse_klines("LTCUSDT", Timeframe::H1, short_row).is_err());

        let error_doc = r#"{"code": -1121, "msg": "Invalid symbol."}"#;
        assert!(parse_klines("NOPE", Timeframe::H1, error_doc).is_err());
    }

    #[test]
    fn test_parse_price() {
        let price = parse_price(r#"{"symbol":"ETHUSDT","price":"3120.45000000"}"#).unwrap();
        assert_eq!(price, dec!(3120.45));

        assert!(parse_price(r#"{"symbol":"ETHUSDT","price":"n/a"}"#).is_err());
        assert!(parse_price("<html>").is_err());
    }

    #[tokio::test]
    async fn test_invalid_interval_rejected_before_network() {
        // Unroutable base URL: reaching the network would surface DataUnavailable instead
        let client = BinanceClient::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        let err = client.get_klines("BTCUSDT", "7h", 100).await.unwrap_err();
        assert!(matches!(err, SignalError::InvalidTimeframe(ref s) if s == "7h"));
    }
}
