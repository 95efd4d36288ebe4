//! Edge-triggered alert state
//!
//! `AlertStateStore` remembers the last emitted state per (symbol, signal kind)
//! so a condition that persists across cycles alerts once. Proximity touches of
//! support/resistance are one-shot: a rounded level fires at most once for the
//! life of the process. Nothing here survives a restart.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::analysis::MarketSnapshot;
use crate::types::Timeframe;

pub const DEFAULT_PROXIMITY_TOLERANCE: f64 = 0.003;

// ============================================================================
// Keys and states
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    MaCross,
    MacdCross,
    Rsi,
    Support,
    Resistance,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaCross => "ma-cross",
            Self::MacdCross => "macd-cross",
            Self::Rsi => "rsi",
            Self::Support => "support",
            Self::Resistance => "resistance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    Bull,
    Bear,
    Overbought,
    Oversold,
}

impl SignalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bull => "bull",
            Self::Bear => "bear",
            Self::Overbought => "overbought",
            Self::Oversold => "oversold",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub symbol: String,
    pub kind: SignalKind,
}

impl AlertKey {
    pub fn new(symbol: &str, kind: SignalKind) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind,
        }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.symbol, self.kind.as_str())
    }
}

// ============================================================================
// State store
// ============================================================================

/// Process-lifetime alert memory shared by the monitor and command paths.
///
/// Each operation holds the lock for its whole read-modify-write.
#[derive(Debug, Default)]
pub struct AlertStateStore {
    states: Mutex<HashMap<AlertKey, SignalState>>,
    proximity_seen: Mutex<HashSet<String>>,
}

impl AlertStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `next` for `key`; returns true when it differs from the stored state.
    pub fn transition(&self, key: &AlertKey, next: SignalState) -> bool {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if states.get(key) == Some(&next) {
            return false;
        }
        states.insert(key.clone(), next);
        debug!(key = %key, state = ?next, "Alert state changed");
        true
    }

    pub fn current(&self, key: &AlertKey) -> Option<SignalState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    /// Mark a proximity touch; returns true only the first time for this rounded level.
    pub fn mark_proximity(&self, symbol: &str, kind: SignalKind, level: f64) -> bool {
        let key = proximity_key(symbol, kind, level);
        self.proximity_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }

    /// True when this rounded level already fired
    pub fn proximity_seen(&self, symbol: &str, kind: SignalKind, level: f64) -> bool {
        self.proximity_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&proximity_key(symbol, kind, level))
    }

    /// Record a delivered alert. Returns false when another caller already
    /// recorded the same state (or touch) first.
    pub fn commit(&self, alert: &Alert) -> bool {
        match (alert.state, alert.level) {
            (Some(state), _) => self.transition(&AlertKey::new(&alert.symbol, alert.kind), state),
            (None, Some(level)) => self.mark_proximity(&alert.symbol, alert.kind, level),
            (None, None) => false,
        }
    }

    /// Stored states for one symbol, in `SignalKind` order
    pub fn states_for(&self, symbol: &str) -> Vec<(SignalKind, SignalState)> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = states
            .iter()
            .filter(|(key, _)| key.symbol == symbol)
            .map(|(key, state)| (key.kind, *state))
            .collect();
        out.sort_by_key(|(kind, _)| *kind);
        out
    }

    pub fn len(&self) -> usize {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `SYMBOL-kind-level` with the level rounded to 4 decimals
pub fn proximity_key(symbol: &str, kind: SignalKind, level: f64) -> String {
    format!("{}-{}-{:.4}", symbol, kind.as_str(), level)
}

// ============================================================================
// Signal evaluation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    Up,
    Down,
}

/// Cross up: `prev_fast <= prev_slow && fast > slow`; cross down mirrors it.
pub fn detect_cross(prev_fast: f64, prev_slow: f64, fast: f64, slow: f64) -> Option<Cross> {
    if prev_fast <= prev_slow && fast > slow {
        Some(Cross::Up)
    } else if prev_fast >= prev_slow && fast < slow {
        Some(Cross::Down)
    } else {
        None
    }
}

/// Cross between the last two aligned points; needs both series defined there.
pub fn last_cross(fast: &[Option<f64>], slow: &[Option<f64>]) -> Option<Cross> {
    let n = fast.len().min(slow.len());
    if n < 2 {
        return None;
    }
    let (pf, ps) = (fast[n - 2]?, slow[n - 2]?);
    let (cf, cs) = (fast[n - 1]?, slow[n - 1]?);
    detect_cross(pf, ps, cf, cs)
}

/// RSI zone; readings inside the band yield no state.
pub fn rsi_zone(value: f64, overbought: f64, oversold: f64) -> Option<SignalState> {
    if value > overbought {
        Some(SignalState::Overbought)
    } else if value < oversold {
        Some(SignalState::Oversold)
    } else {
        None
    }
}

/// True when `price` is within `tolerance` (relative to `level`) of `level`
pub fn within_tolerance(price: f64, level: f64, tolerance: f64) -> bool {
    level != 0.0 && ((price - level) / level).abs() <= tolerance
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub symbol: String,
    pub kind: SignalKind,
    /// New state for crossover and RSI alerts
    pub state: Option<SignalState>,
    /// Touched level for proximity alerts
    pub level: Option<f64>,
    pub message: String,
    /// Golden/death crosses ship with a chart image
    pub with_chart: bool,
}

/// Thresholds used when turning a snapshot into alerts
#[derive(Debug, Clone, Copy)]
pub struct AlertThresholds {
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub proximity_tolerance: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            proximity_tolerance: DEFAULT_PROXIMITY_TOLERANCE,
        }
    }
}

/// Alerts whose state differs from the store, without recording anything.
///
/// Callers deliver each candidate and then `AlertStateStore::commit` it, so an
/// alert that fails to go out is offered again on the next cycle.
pub fn candidate_alerts(
    store: &AlertStateStore,
    symbol: &str,
    timeframe: Timeframe,
    snapshot: &MarketSnapshot,
    thresholds: &AlertThresholds,
) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let price = snapshot.last_close;
    let changed = |kind: SignalKind, state: SignalState| {
        store.current(&AlertKey::new(symbol, kind)) != Some(state)
    };

    if let Some(cross) = last_cross(&snapshot.sma_fast, &snapshot.sma_slow) {
        let (state, message) = match cross {
            Cross::Up => (
                SignalState::Bull,
                format!("🟢 GOLDEN CROSS {} {}\nPrice: {:.6}", symbol, timeframe, price),
            ),
            Cross::Down => (
                SignalState::Bear,
                format!("🔴 DEATH CROSS {} {}\nPrice: {:.6}", symbol, timeframe, price),
            ),
        };
        if changed(SignalKind::MaCross, state) {
            alerts.push(Alert {
                symbol: symbol.to_string(),
                kind: SignalKind::MaCross,
                state: Some(state),
                level: None,
                message,
                with_chart: true,
            });
        }
    }

    if let Some(&value) = snapshot.rsi.last() {
        if let Some(state) = rsi_zone(value, thresholds.rsi_overbought, thresholds.rsi_oversold) {
            if changed(SignalKind::Rsi, state) {
                let message = match state {
                    SignalState::Overbought => format!(
                        "⚠️ RSI OVERBOUGHT {} {}: RSI={:.1}",
                        symbol, timeframe, value
                    ),
                    _ => format!("✅ RSI OVERSOLD {} {}: RSI={:.1}", symbol, timeframe, value),
                };
                alerts.push(Alert {
                    symbol: symbol.to_string(),
                    kind: SignalKind::Rsi,
                    state: Some(state),
                    level: None,
                    message,
                    with_chart: false,
                });
            }
        }
    }

    let macd_line: Vec<Option<f64>> = snapshot.macd.line.iter().copied().map(Some).collect();
    let macd_signal: Vec<Option<f64>> = snapshot.macd.signal.iter().copied().map(Some).collect();
    if let Some(cross) = last_cross(&macd_line, &macd_signal) {
        let (state, direction) = match cross {
            Cross::Up => (SignalState::Bull, "UP"),
            Cross::Down => (SignalState::Bear, "DOWN"),
        };
        if changed(SignalKind::MacdCross, state) {
            alerts.push(Alert {
                symbol: symbol.to_string(),
                kind: SignalKind::MacdCross,
                state: Some(state),
                level: None,
                message: format!("🔔 MACD CROSS {} {} {}", direction, symbol, timeframe),
                with_chart: false,
            });
        }
    }

    let touches = [
        (SignalKind::Support, snapshot.support, "support"),
        (SignalKind::Resistance, snapshot.resistance, "resistance"),
    ];
    for (kind, level, label) in touches {
        let Some(level) = level else { continue };
        if within_tolerance(price, level, thresholds.proximity_tolerance)
            && !store.proximity_seen(symbol, kind, level)
        {
            alerts.push(Alert {
                symbol: symbol.to_string(),
                kind,
                state: None,
                level: Some(level),
                message: format!(
                    "📍 {} {} touching {} {:.4} (price {:.6})",
                    symbol, timeframe, label, level, price
                ),
                with_chart: false,
            });
        }
    }

    alerts
}

/// Candidates committed immediately, for callers with no delivery step.
pub fn evaluate_alerts(
    store: &AlertStateStore,
    symbol: &str,
    timeframe: Timeframe,
    snapshot: &MarketSnapshot,
    thresholds: &AlertThresholds,
) -> Vec<Alert> {
    candidate_alerts(store, symbol, timeframe, snapshot, thresholds)
        .into_iter()
        .filter(|alert| store.commit(alert))
        .collect()
}
