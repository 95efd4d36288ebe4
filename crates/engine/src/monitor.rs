//! Signal monitor: polls the configured symbols on a fixed interval, turns
//! each snapshot into edge-triggered alerts and pushes them to the alert chat.
//!
//! A failed cycle is reported to the chat (best effort) and retried after
//! `error_backoff`; the loop only exits when `MonitorProgress` is cancelled.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::alerts::{candidate_alerts, Alert, AlertStateStore, AlertThresholds, SignalState};
use crate::analysis::{analyze, AnalysisParams};
use crate::api::MarketData;
use crate::chart::{render_chart, ChartRenderer};
use crate::config::BotConfig;
use crate::error::SignalResult;
use crate::notify::{text_best_effort, Notifier};
use crate::types::{CandleSeries, Timeframe};

/// Candles drawn on an alert chart
pub const ALERT_CHART_WINDOW: usize = 400;
const SLEEP_SLICE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorStatus {
    Idle,
    Watching,
    Backoff,
}

/// Shared state of the running monitor, readable from the HTTP side
pub struct MonitorProgress {
    pub status: RwLock<MonitorStatus>,
    pub cancelled: AtomicBool,
    pub cycles: AtomicU32,
    pub last_error: RwLock<Option<String>>,
}

impl MonitorProgress {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(MonitorStatus::Idle),
            cancelled: AtomicBool::new(false),
            cycles: AtomicU32::new(0),
            last_error: RwLock::new(None),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> MonitorStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cycles(&self) -> u32 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_status(&self, status: MonitorStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn set_error(&self, error: Option<String>) {
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = error;
    }
}

impl Default for MonitorProgress {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub chat_id: String,
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub interval: Duration,
    pub error_backoff: Duration,
    pub kline_limit: u32,
    pub analysis: AnalysisParams,
    pub thresholds: AlertThresholds,
}

impl MonitorSettings {
    pub fn from_config(config: &BotConfig, chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            symbols: config.symbols.clone(),
            timeframe: config.timeframe,
            interval: config.poll_interval,
            error_backoff: config.error_backoff,
            kline_limit: config.kline_limit,
            analysis: config.analysis,
            thresholds: config.thresholds,
        }
    }
}

#[derive(Clone)]
pub struct Monitor {
    market: Arc<dyn MarketData>,
    notifier: Arc<dyn Notifier>,
    renderer: Arc<dyn ChartRenderer>,
    store: Arc<AlertStateStore>,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(
        market: Arc<dyn MarketData>,
        notifier: Arc<dyn Notifier>,
        renderer: Arc<dyn ChartRenderer>,
        store: Arc<AlertStateStore>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            market,
            notifier,
            renderer,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// One fetch/analyze/alert pass for a symbol. Delivery is strict: a failed
    /// send fails the cycle, and alerts are only recorded once delivered, so
    /// the undelivered ones come back on the next cycle.
    pub async fn run_cycle(&self, symbol: &str) -> SignalResult<Vec<Alert>> {
        let s = &self.settings;
        let series = self.market.candles(symbol, s.timeframe, s.kline_limit).await?;
        let snapshot = analyze(&series, &s.analysis)?;
        let candidates = candidate_alerts(
            &self.store,
            &series.symbol,
            s.timeframe,
            &snapshot,
            &s.thresholds,
        );

        let mut delivered = Vec::with_capacity(candidates.len());
        for alert in candidates {
            self.deliver(&series, &alert).await?;
            if self.store.commit(&alert) {
                info!(symbol = %alert.symbol, kind = alert.kind.as_str(), "Alert delivered");
                delivered.push(alert);
            } else {
                debug!(symbol = %alert.symbol, kind = alert.kind.as_str(), "Alert already recorded elsewhere");
            }
        }

        Ok(delivered)
    }

    async fn deliver(&self, series: &CandleSeries, alert: &Alert) -> SignalResult<()> {
        let s = &self.settings;
        if !alert.with_chart {
            return self.notifier.send_text(&s.chat_id, &alert.message).await;
        }

        let window = series.tail(ALERT_CHART_WINDOW);
        let window_snapshot = analyze(&window, &s.analysis)?;
        let title = format!("{} {} {}", window.symbol, s.timeframe, alert_title(alert));
        let png = render_chart(self.renderer.clone(), title, window, window_snapshot).await?;
        self.notifier
            .send_photo(&s.chat_id, png, Some(&alert.message))
            .await
    }

    /// Poll until cancelled.
    pub async fn run(&self, progress: &MonitorProgress) {
        let s = &self.settings;
        info!(
            symbols = ?s.symbols,
            timeframe = %s.timeframe,
            interval_secs = s.interval.as_secs(),
            "Monitor starting"
        );
        progress.set_status(MonitorStatus::Watching);

        let announcement = format!("🤖 Bot active: monitoring {} {}", s.symbols.join(", "), s.timeframe);
        text_best_effort(self.notifier.as_ref(), &s.chat_id, &announcement).await;

        while !progress.is_cancelled() {
            let mut failed = false;
            for symbol in &s.symbols {
                if progress.is_cancelled() {
                    break;
                }
                match self.run_cycle(symbol).await {
                    Ok(alerts) => {
                        if !alerts.is_empty() {
                            info!(symbol = %symbol, count = alerts.len(), "Alerts delivered");
                        }
                    }
                    Err(e) => {
                        failed = true;
                        error!(symbol = %symbol, kind = e.kind(), error = %e, "Monitor cycle failed");
                        progress.set_error(Some(format!("{}: {}", symbol, e)));
                        text_best_effort(
                            self.notifier.as_ref(),
                            &s.chat_id,
                            &format!("⚠️ Bot error: {}", e),
                        )
                        .await;
                    }
                }
            }
            progress.cycles.fetch_add(1, Ordering::Relaxed);

            let delay = if failed {
                progress.set_status(MonitorStatus::Backoff);
                s.error_backoff
            } else {
                progress.set_error(None);
                s.interval
            };
            sleep_unless_cancelled(delay, progress).await;
            progress.set_status(MonitorStatus::Watching);
        }

        progress.set_status(MonitorStatus::Idle);
        info!("Monitor stopped");
    }
}

fn alert_title(alert: &Alert) -> &'static str {
    match alert.state {
        Some(SignalState::Bear) => "DEATH CROSS",
        Some(SignalState::Bull) => "GOLDEN CROSS",
        _ => alert.kind.as_str(),
    }
}

async fn sleep_unless_cancelled(total: Duration, progress: &MonitorProgress) {
    let mut remaining = total;
    while !remaining.is_zero() {
        if progress.is_cancelled() {
            return;
        }
        let step = remaining.min(SLEEP_SLICE);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
}
