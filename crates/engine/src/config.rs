//! Bot configuration from environment variables (a `.env` file is loaded by the binary)

use std::str::FromStr;
use std::time::Duration;

use crate::alerts::{AlertThresholds, DEFAULT_PROXIMITY_TOLERANCE};
use crate::analysis::AnalysisParams;
use crate::error::{SignalError, SignalResult};
use crate::levels::{LevelPolicy, DEFAULT_SWING_WINDOW};
use crate::types::{normalize_symbol, Timeframe};

pub const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";
pub const DEFAULT_TELEGRAM_URL: &str = "https://api.telegram.org";

/// Upper bound for SMA/RSI periods and the swing window
pub const MAX_PERIOD: usize = 1000;
/// Shortest accepted ALERT_INTERVAL
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Shortest accepted ALERT_ERROR_BACKOFF and HTTP_TIMEOUT_SECS
pub const MIN_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub webhook_url: Option<String>,
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub kline_limit: u32,
    pub analysis: AnalysisParams,
    pub thresholds: AlertThresholds,
    pub binance_base_url: String,
    pub telegram_base_url: String,
    pub http_timeout: Duration,
    pub port: u16,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram_token: None,
            telegram_chat_id: None,
            webhook_url: None,
            symbols: vec!["LTCUSDT".to_string()],
            timeframe: Timeframe::H4,
            poll_interval: Duration::from_secs(300),
            error_backoff: Duration::from_secs(60),
            kline_limit: 500,
            analysis: AnalysisParams::default(),
            thresholds: AlertThresholds::default(),
            binance_base_url: DEFAULT_BINANCE_URL.to_string(),
            telegram_base_url: DEFAULT_TELEGRAM_URL.to_string(),
            http_timeout: Duration::from_secs(20),
            port: 5000,
        }
    }
}

impl BotConfig {
    /// Read the process environment
    pub fn from_env() -> SignalResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> SignalResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parse = |key: &str| -> SignalResult<Option<f64>> { parse_opt(key, get(key)) };
        let defaults = Self::default();

        let symbols = match get("ALERT_PAIR") {
            Some(raw) => raw
                .split(',')
                .map(normalize_symbol)
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.symbols,
        };
        if symbols.is_empty() {
            return Err(SignalError::Config("ALERT_PAIR lists no symbols".into()));
        }

        let timeframe = match get("ALERT_TF") {
            Some(raw) => raw
                .parse::<Timeframe>()
                .map_err(|e| SignalError::Config(format!("ALERT_TF: {}", e)))?,
            None => defaults.timeframe,
        };

        let analysis = AnalysisParams {
            sma_fast: parse_opt("SMA_FAST", get("SMA_FAST"))?.unwrap_or(defaults.analysis.sma_fast),
            sma_slow: parse_opt("SMA_SLOW", get("SMA_SLOW"))?.unwrap_or(defaults.analysis.sma_slow),
            rsi_period: parse_opt("RSI_PERIOD", get("RSI_PERIOD"))?
                .unwrap_or(defaults.analysis.rsi_period),
            swing_window: parse_opt("SWING_WINDOW", get("SWING_WINDOW"))?
                .unwrap_or(DEFAULT_SWING_WINDOW),
            level_policy: match get("LEVEL_POLICY").as_deref() {
                None | Some("global") => LevelPolicy::GlobalExtreme,
                Some("recent") => LevelPolicy::MostRecent,
                Some(other) => {
                    return Err(SignalError::Config(format!(
                        "LEVEL_POLICY must be 'global' or 'recent', got '{}'",
                        other
                    )))
                }
            },
            ..defaults.analysis
        };
        for (name, period) in [
            ("SMA_FAST", analysis.sma_fast),
            ("SMA_SLOW", analysis.sma_slow),
            ("RSI_PERIOD", analysis.rsi_period),
            ("SWING_WINDOW", analysis.swing_window),
        ] {
            if period == 0 || period > MAX_PERIOD {
                return Err(SignalError::Config(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_PERIOD, period
                )));
            }
        }

        let thresholds = AlertThresholds {
            rsi_overbought: parse("RSI_OVERBOUGHT")?.unwrap_or(defaults.thresholds.rsi_overbought),
            rsi_oversold: parse("RSI_OVERSOLD")?.unwrap_or(defaults.thresholds.rsi_oversold),
            proximity_tolerance: parse("PROXIMITY_TOLERANCE")?
                .unwrap_or(DEFAULT_PROXIMITY_TOLERANCE),
        };

        let secs = |key: &str, default: Duration, min: Duration| -> SignalResult<Duration> {
            let value = parse_opt::<u64>(key, get(key))?
                .map(Duration::from_secs)
                .unwrap_or(default);
            if value < min {
                return Err(SignalError::Config(format!(
                    "{} must be at least {}s",
                    key,
                    min.as_secs()
                )));
            }
            Ok(value)
        };

        Ok(Self {
            telegram_token: get("TELEGRAM_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
            webhook_url: get("WEBHOOK_URL").map(|u| u.trim_end_matches('/').to_string()),
            symbols,
            timeframe,
            poll_interval: secs("ALERT_INTERVAL", defaults.poll_interval, MIN_POLL_INTERVAL)?,
            error_backoff: secs("ALERT_ERROR_BACKOFF", defaults.error_backoff, MIN_BACKOFF)?,
            kline_limit: parse_opt("KLIMIT", get("KLIMIT"))?.unwrap_or(defaults.kline_limit),
            analysis,
            thresholds,
            binance_base_url: get("BINANCE_BASE_URL").unwrap_or(defaults.binance_base_url),
            telegram_base_url: get("TELEGRAM_BASE_URL").unwrap_or(defaults.telegram_base_url),
            http_timeout: secs("HTTP_TIMEOUT_SECS", defaults.http_timeout, MIN_BACKOFF)?,
            port: parse_opt("PORT", get("PORT"))?.unwrap_or(defaults.port),
        })
    }

    /// Token and chat id, required by anything that talks to the chat
    pub fn telegram_credentials(&self) -> SignalResult<(&str, &str)> {
        match (&self.telegram_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Ok((token, chat)),
            _ => Err(SignalError::Config(
                "TELEGRAM_TOKEN and TELEGRAM_CHAT_ID must be set".into(),
            )),
        }
    }
}

fn parse_opt<T: FromStr>(key: &str, raw: Option<String>) -> SignalResult<Option<T>> {
    raw.map(|v| {
        v.parse::<T>()
            .map_err(|_| SignalError::Config(format!("{} has invalid value '{}'", key, v)))
    })
    .transpose()
}
