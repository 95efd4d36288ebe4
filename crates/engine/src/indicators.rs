//! Indicator series over candle closes
//!
//! Every function returns a series aligned index-for-index with its input.
//! SMA values are `None` during warm-up; EMA-based series (RSI, MACD) are
//! seeded from the first value and defined everywhere.

use serde::Serialize;
use ta::indicators::{
    ExponentialMovingAverage, MovingAverageConvergenceDivergence, SimpleMovingAverage,
};
use ta::Next;

use crate::error::{SignalError, SignalResult};

/// RSI reported when the smoothed loss is zero (including the flat-series case)
pub const RSI_NEUTRAL: f64 = 50.0;

// ============================================================================
// Moving averages
// ============================================================================

/// Trailing simple moving average; `None` for the first `period - 1` points.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut sma = match SimpleMovingAverage::new(period) {
        Ok(sma) => sma,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let avg = sma.next(v);
            (i + 1 >= period).then_some(avg)
        })
        .collect()
}

/// Recursive EMA with `k = 2 / (period + 1)`, seeded from the first value.
pub fn ema(values: &[f64], period: usize) -> SignalResult<Vec<f64>> {
    let mut ema = ExponentialMovingAverage::new(period)
        .map_err(|_| SignalError::Config(format!("invalid EMA period {}", period)))?;
    Ok(values.iter().map(|&v| ema.next(v)).collect())
}

// ============================================================================
// RSI (Wilder smoothing)
// ============================================================================

/// Relative strength index with Wilder smoothing (`alpha = 1 / period`).
///
/// Wilder smoothing over `period` is the same recursion as an EMA whose span is
/// `2 * period - 1`, so both streams reuse the `ta` EMA. Index 0 has no delta
/// and reads as neutral, as does any bar whose smoothed loss is zero.
pub fn rsi(closes: &[f64], period: usize) -> SignalResult<Vec<f64>> {
    if period == 0 {
        return Err(SignalError::Config("RSI period must be positive".into()));
    }

    let span = period
        .checked_mul(2)
        .map(|s| s - 1)
        .ok_or_else(|| SignalError::Config(format!("RSI period {} is too large", period)))?;
    let mut avg_gain = ExponentialMovingAverage::new(span)
        .map_err(|_| SignalError::Config(format!("invalid RSI period {}", period)))?;
    let mut avg_loss = ExponentialMovingAverage::new(span)
        .map_err(|_| SignalError::Config(format!("invalid RSI period {}", period)))?;

    let mut out = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return Ok(out);
    }
    out.push(RSI_NEUTRAL);

    for pair in closes.windows(2) {
        let delta = pair[1] - pair[0];
        let gain = avg_gain.next(delta.max(0.0));
        let loss = avg_loss.next((-delta).max(0.0));

        let value = if loss == 0.0 {
            RSI_NEUTRAL
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        };
        out.push(value);
    }

    Ok(out)
}

// ============================================================================
// MACD
// ============================================================================

/// MACD line, signal line and histogram, aligned with the input closes
#[derive(Debug, Clone, Default, Serialize)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD(fast, slow, signal); histogram is exactly `line - signal`.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> SignalResult<MacdSeries> {
    let mut macd = MovingAverageConvergenceDivergence::new(fast, slow, signal).map_err(|_| {
        SignalError::Config(format!(
            "invalid MACD periods {}/{}/{}",
            fast, slow, signal
        ))
    })?;

    let mut series = MacdSeries {
        line: Vec::with_capacity(closes.len()),
        signal: Vec::with_capacity(closes.len()),
        histogram: Vec::with_capacity(closes.len()),
    };

    for &close in closes {
        let out = macd.next(close);
        series.line.push(out.macd);
        series.signal.push(out.signal);
        series.histogram.push(out.histogram);
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn test_sma_warmup_and_values() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_sma_short_series_is_all_undefined() {
        for period in 1..10 {
            let values: Vec<f64> = (0..period - 1).map(|i| i as f64).collect();
            let out = sma(&values, period);
            assert_eq!(out.len(), values.len());
            assert!(out.iter().all(Option::is_none));
        }
    }

    #[test]
    fn test_sma_zero_period_is_undefined() {
        assert_eq!(sma(&[1.0, 2.0], 0), vec![None, None]);
    }

    #[test]
    fn test_ema_seeded_from_first_value() {
        let out = ema(&[10.0, 20.0], 3).unwrap();
        // k = 0.5
        assert_eq!(out, vec![10.0, 15.0]);
    }

    #[test]
    fn test_rsi_bounded_and_aligned() {
        let closes = wave(200);
        let out = rsi(&closes, 14).unwrap();
        assert_eq!(out.len(), closes.len());
        assert!(out.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn test_rsi_first_value_is_neutral() {
        let out = rsi(&[5.0, 4.0, 3.0], 14).unwrap();
        assert_eq!(out[0], RSI_NEUTRAL);
    }

    #[test]
    fn test_rsi_zero_loss_with_gains_reads_neutral() {
        // Arithmetic would give 100; the zero-loss policy overrides it.
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&closes, 14).unwrap();
        assert!(out.iter().all(|&v| v == RSI_NEUTRAL));
    }

    #[test]
    fn test_rsi_flat_series_reads_neutral() {
        let out = rsi(&[42.0; 20], 14).unwrap();
        assert!(out.iter().all(|&v| v == RSI_NEUTRAL));
    }

    #[test]
    fn test_rsi_only_losses_reads_zero() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&closes, 14).unwrap();
        assert!(out[1..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rsi_wilder_smoothing_matches_manual() {
        let closes = [10.0, 12.0, 11.0, 13.0];
        let out = rsi(&closes, 2).unwrap();

        // alpha = 1/2, seeded from the first delta
        let (mut g, mut l) = (2.0, 0.0);
        assert_eq!(out[1], RSI_NEUTRAL);
        g = 0.5 * 0.0 + 0.5 * g;
        l = 0.5 * 1.0 + 0.5 * l;
        let expected = 100.0 - 100.0 / (1.0 + g / l);
        assert!((out[2] - expected).abs() < 1e-12);
        g = 0.5 * 2.0 + 0.5 * g;
        l = 0.5 * 0.0 + 0.5 * l;
        let expected = 100.0 - 100.0 / (1.0 + g / l);
        assert!((out[3] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_rejects_zero_period() {
        assert!(matches!(rsi(&[1.0], 0), Err(SignalError::Config(_))));
        assert!(matches!(rsi(&[1.0], usize::MAX), Err(SignalError::Config(_))));
    }

    #[test]
    fn test_macd_histogram_is_exact_difference() {
        let closes = wave(120);
        let out = macd(&closes, 12, 26, 9).unwrap();
        assert_eq!(out.line.len(), closes.len());
        for i in 0..closes.len() {
            assert_eq!(out.histogram[i], out.line[i] - out.signal[i]);
        }
    }

    #[test]
    fn test_macd_line_is_fast_minus_slow_ema() {
        let closes = wave(60);
        let out = macd(&closes, 12, 26, 9).unwrap();
        let fast = ema(&closes, 12).unwrap();
        let slow = ema(&closes, 26).unwrap();
        for i in 0..closes.len() {
            assert!((out.line[i] - (fast[i] - slow[i])).abs() < 1e-9);
        }
    }
}
