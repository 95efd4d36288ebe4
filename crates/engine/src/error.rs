//! Error kinds shared by the fetch → compute → render → notify pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Invalid timeframe '{0}' (valid: 1m 3m 5m 15m 30m 1h 2h 4h 6h 8h 12h 1d 3d 1w 1M)")]
    InvalidTimeframe(String),

    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Insufficient history: need {needed} candles, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    #[error("Chart render failed: {0}")]
    RenderFailure(String),

    #[error("Notification failed: {0}")]
    NotifyFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type SignalResult<T> = Result<T, SignalError>;

impl SignalError {
    /// Short label used in chat diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTimeframe(_) => "invalid timeframe",
            Self::DataUnavailable(_) => "data unavailable",
            Self::InsufficientHistory { .. } => "insufficient history",
            Self::RenderFailure(_) => "render failure",
            Self::NotifyFailure(_) => "notify failure",
            Self::Config(_) => "config",
        }
    }
}
