//! One-shot indicator + level computation over a candle series

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SignalError, SignalResult};
use crate::indicators::{macd, rsi, sma, MacdSeries};
use crate::levels::{
    fibonacci_levels, find_swing_points, select_support_resistance, swing_levels,
    FibonacciLevels, LevelPolicy, PivotLevels, SwingLevels, SwingPoint, DEFAULT_SWING_WINDOW,
};
use crate::types::CandleSeries;

/// Candles needed for pivots (prior bar) and crossovers (two points)
pub const MIN_CANDLES: usize = 2;

/// Indicator parameters for a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub swing_window: usize,
    pub level_policy: LevelPolicy,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            sma_fast: 50,
            sma_slow: 200,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            swing_window: DEFAULT_SWING_WINDOW,
            level_policy: LevelPolicy::GlobalExtreme,
        }
    }
}

/// Everything derived from one candle series. Series fields are aligned with it.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub sma_fast: Vec<Option<f64>>,
    pub sma_slow: Vec<Option<f64>>,
    pub rsi: Vec<f64>,
    pub macd: MacdSeries,
    pub swing_points: Vec<SwingPoint>,
    pub swings: SwingLevels,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    pub pivots: Option<PivotLevels>,
    /// Only present when support < resistance
    pub fibonacci: Option<FibonacciLevels>,
    pub last_close: f64,
}

pub fn analyze(series: &CandleSeries, params: &AnalysisParams) -> SignalResult<MarketSnapshot> {
    if series.len() < MIN_CANDLES {
        return Err(SignalError::InsufficientHistory {
            needed: MIN_CANDLES,
            got: series.len(),
        });
    }

    let closes = series.closes();
    let highs = series.highs();
    let lows = series.lows();

    let swing_points = find_swing_points(&highs, &lows, params.swing_window);
    let (support, resistance) = select_support_resistance(&swing_points, params.level_policy);

    let fibonacci = match (support, resistance) {
        (Some(s), Some(r)) => fibonacci_levels(s, r),
        _ => None,
    };

    let snapshot = MarketSnapshot {
        sma_fast: sma(&closes, params.sma_fast),
        sma_slow: sma(&closes, params.sma_slow),
        rsi: rsi(&closes, params.rsi_period)?,
        macd: macd(&closes, params.macd_fast, params.macd_slow, params.macd_signal)?,
        swings: swing_levels(&swing_points),
        swing_points,
        support,
        resistance,
        pivots: PivotLevels::from_candles(series.candles()),
        fibonacci,
        last_close: closes[closes.len() - 1],
    };

    debug!(
        symbol = %series.symbol,
        candles = series.len(),
        support = ?snapshot.support,
        resistance = ?snapshot.resistance,
        "Computed snapshot"
    );

    Ok(snapshot)
}

impl MarketSnapshot {
    pub fn last_rsi(&self) -> Option<f64> {
        self.rsi.last().copied()
    }

    /// Latest defined fast/slow SMA pair
    pub fn last_sma(&self) -> (Option<f64>, Option<f64>) {
        (
            self.sma_fast.last().copied().flatten(),
            self.sma_slow.last().copied().flatten(),
        )
    }

    /// Multi-line text summary used as a chart caption or CLI output
    pub fn summary(&self, symbol: &str, timeframe: &str) -> String {
        let fmt_opt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v));
        let (fast, slow) = self.last_sma();

        let mut lines = vec![
            format!("{} {} close {:.6}", symbol, timeframe, self.last_close),
            format!("SMA fast {} | SMA slow {}", fmt_opt(fast), fmt_opt(slow)),
            format!("RSI {}", self.last_rsi().map_or("n/a".into(), |v| format!("{:.1}", v))),
            format!("Support {} | Resistance {}", fmt_opt(self.support), fmt_opt(self.resistance)),
        ];
        if let Some(p) = &self.pivots {
            lines.push(format!(
                "Pivot {:.4} | R1 {:.4} S1 {:.4} | R2 {:.4} S2 {:.4}",
                p.pivot, p.r1, p.s1, p.r2, p.s2
            ));
        }
        if let Some(fib) = &self.fibonacci {
            let levels: Vec<String> = fib
                .iter()
                .map(|l| format!("{} {:.4}", l.label, l.price))
                .collect();
            lines.push(format!("Fib {}", levels.join(" | ")));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::SwingKind;
    use crate::types::{make_candles, Timeframe};

    fn series(prices: &[f64]) -> CandleSeries {
        CandleSeries::new("LTCUSDT", Timeframe::H4, make_candles(prices)).unwrap()
    }

    #[test]
    fn test_rejects_single_candle() {
        let err = analyze(&series(&[100.0]), &AnalysisParams::default()).unwrap_err();
        assert!(matches!(
            err,
            SignalError::InsufficientHistory { needed: 2, got: 1 }
        ));
    }

    #[test]
    fn test_short_series_keeps_undefined_values() {
        let snap = analyze(&series(&[100.0, 101.0, 102.0]), &AnalysisParams::default()).unwrap();
        assert_eq!(snap.sma_fast.len(), 3);
        assert!(snap.sma_slow.iter().all(Option::is_none));
        assert!(snap.support.is_none());
        assert!(snap.fibonacci.is_none());
        assert!(snap.pivots.is_some());
    }

    #[test]
    fn test_series_lengths_are_aligned() {
        let prices: Vec<f64> = (0..250).map(|i| 100.0 + (i as f64 * 0.2).sin() * 8.0).collect();
        let snap = analyze(&series(&prices), &AnalysisParams::default()).unwrap();
        assert_eq!(snap.sma_fast.len(), prices.len());
        assert_eq!(snap.sma_slow.len(), prices.len());
        assert_eq!(snap.rsi.len(), prices.len());
        assert_eq!(snap.macd.histogram.len(), prices.len());
        assert_eq!(snap.sma_slow.iter().filter(|v| v.is_some()).count(), 51);
    }

    #[test]
    fn test_ascending_then_descending_has_single_peak() {
        // 300 points: strictly up to index 149, strictly down afterwards
        let prices: Vec<f64> = (0..300)
            .map(|i| if i < 150 { 100.0 + i as f64 } else { 398.0 - i as f64 })
            .collect();
        let snap = analyze(&series(&prices), &AnalysisParams::default()).unwrap();

        let highs: Vec<_> = snap
            .swing_points
            .iter()
            .filter(|p| p.kind == SwingKind::High)
            .collect();
        assert_eq!(highs.len(), 1);
        assert_eq!(highs[0].index, 149);
        assert_eq!(snap.resistance, Some(250.0));

        // Troughs sit at the edges, outside the scan range
        assert!(snap.support.is_none());
        assert!(snap.fibonacci.is_none());
    }

    #[test]
    fn test_valley_then_peak_pipeline() {
        // Down to a trough at 60, up to a peak at 200, down again to 299
        let prices: Vec<f64> = (0..300)
            .map(|i| {
                let i = i as f64;
                if i <= 60.0 {
                    200.0 - i
                } else if i <= 200.0 {
                    140.0 + (i - 60.0)
                } else {
                    280.0 - (i - 200.0)
                }
            })
            .collect();
        let snap = analyze(&series(&prices), &AnalysisParams::default()).unwrap();

        let highs: Vec<_> = snap.swing_points.iter().filter(|p| p.kind == SwingKind::High).collect();
        let lows: Vec<_> = snap.swing_points.iter().filter(|p| p.kind == SwingKind::Low).collect();
        assert_eq!(highs.len(), 1);
        assert_eq!(highs[0].index, 200);
        assert_eq!(lows.len(), 1);
        assert_eq!(lows[0].index, 60);

        assert_eq!(snap.resistance, Some(281.0));
        assert_eq!(snap.support, Some(139.0));

        let fib = snap.fibonacci.as_ref().unwrap();
        assert_eq!(fib.get("0.5"), Some(210.0));
        assert_eq!(fib.get("0.0"), Some(281.0));
        assert_eq!(fib.get("1.0"), Some(139.0));
    }

    #[test]
    fn test_summary_mentions_levels() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.5).sin() * 4.0).collect();
        let snap = analyze(&series(&prices), &AnalysisParams::default()).unwrap();
        let text = snap.summary("LTCUSDT", "4h");
        assert!(text.starts_with("LTCUSDT 4h close"));
        assert!(text.contains("Pivot"));
        assert!(text.contains("SMA slow n/a"));
    }
}
