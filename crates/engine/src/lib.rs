//! Chart Signal Engine: market data, indicators and alerting for the signal bot
//!
//! Provides:
//! - Binance public API client for candles and spot prices
//! - SMA / Wilder RSI / MACD, swing extrema, pivot and Fibonacci levels
//! - Edge-triggered alert state with one-shot proximity alerts
//! - Candlestick chart rendering and Telegram delivery
//! - The polling monitor and the `/price` `/chart` command dispatcher

pub mod alerts;
pub mod analysis;
pub mod api;
pub mod chart;
pub mod command;
pub mod config;
pub mod error;
pub mod indicators;
pub mod levels;
pub mod monitor;
pub mod notify;
pub mod types;

// Re-exports for convenience
pub use alerts::{Alert, AlertStateStore, AlertThresholds, SignalKind, SignalState};
pub use analysis::{analyze, AnalysisParams, MarketSnapshot};
pub use api::{BinanceClient, MarketData, TelegramClient, Update};
pub use chart::{render_chart, ChartRenderer, PlottersRenderer};
pub use command::{parse_command, Command, CommandDispatcher};
pub use config::BotConfig;
pub use error::{SignalError, SignalResult};
pub use levels::{FibonacciLevels, LevelPolicy, PivotLevels, SwingPoint};
pub use monitor::{Monitor, MonitorProgress, MonitorSettings, MonitorStatus};
pub use notify::Notifier;
pub use types::*;
