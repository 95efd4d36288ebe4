//! Candle and timeframe types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SignalError, SignalResult};

/// A single candlestick (OHLCV)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time in epoch milliseconds
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

/// Candle granularities accepted by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1M")]
    Month1,
}

impl Timeframe {
    pub fn all() -> &'static [Timeframe] {
        &[
            Self::M1,
            Self::M3,
            Self::M5,
            Self::M15,
            Self::M30,
            Self::H1,
            Self::H2,
            Self::H4,
            Self::H6,
            Self::H8,
            Self::H12,
            Self::D1,
            Self::D3,
            Self::W1,
            Self::Month1,
        ]
    }

    /// Exchange interval string (case-sensitive: `1m` is a minute, `1M` a month)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H8 => "8h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::D3 => "3d",
            Self::W1 => "1w",
            Self::Month1 => "1M",
        }
    }

    /// Lenient parse for user input: exact match first, then lowercased.
    pub fn parse_lenient(input: &str) -> SignalResult<Self> {
        let trimmed = input.trim();
        trimmed
            .parse::<Timeframe>()
            .or_else(|_| trimmed.to_lowercase().parse::<Timeframe>())
            .map_err(|_: SignalError| SignalError::InvalidTimeframe(trimmed.to_string()))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| SignalError::InvalidTimeframe(s.to_string()))
    }
}

/// Normalize a trading symbol to the exchange's uppercase form
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Fixed window of candles for one symbol/timeframe, ordered by open time.
#[derive(Debug, Clone, Serialize)]
pub struct CandleSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Build a series, rejecting candles that are not strictly increasing by open time.
    pub fn new(symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> SignalResult<Self> {
        if let Some(pair) = candles
            .windows(2)
            .find(|pair| pair[1].open_time <= pair[0].open_time)
        {
            return Err(SignalError::DataUnavailable(format!(
                "candles out of order at open_time {}",
                pair[1].open_time
            )));
        }

        Ok(Self {
            symbol: normalize_symbol(symbol),
            timeframe,
            candles,
        })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    /// The last `n` candles (or all of them if the series is shorter)
    pub fn tail(&self, n: usize) -> CandleSeries {
        let start = self.candles.len().saturating_sub(n);
        Self {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            candles: self.candles[start..].to_vec(),
        }
    }
}

#[cfg(test)]
pub(crate) fn make_candles(prices: &[f64]) -> Vec<Candle> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| Candle {
            open_time: (i as i64) * 60_000,
            open: p,
            high: p + 1.0,
            low: p - 1.0,
            close: p,
            volume: 100.0,
            close_time: ((i + 1) as i64) * 60_000 - 1,
        })
        .collect()
}
