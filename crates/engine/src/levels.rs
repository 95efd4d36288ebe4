//! Support/resistance levels: swing extrema, floor-trader pivots, Fibonacci

use serde::{Deserialize, Serialize};

use crate::types::Candle;

pub const DEFAULT_SWING_WINDOW: usize = 5;

// ============================================================================
// Swing detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

/// A local extremum anchored at its candle index
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
}

/// Distinct swing prices, sorted ascending.
///
/// Deduplicated by value: unrelated swings that share a price collapse into one
/// entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SwingLevels {
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
}

/// Index-retaining swing scan over `[window, n - window)`.
///
/// `i` is a swing high when `highs[i]` equals the max of the closed window
/// `[i - window, i + window]`, and a swing low symmetrically. Points are ordered
/// by index, a high before a low at the same index.
pub fn find_swing_points(highs: &[f64], lows: &[f64], window: usize) -> Vec<SwingPoint> {
    let n = highs.len().min(lows.len());
    let mut points = Vec::new();
    if n <= window.saturating_mul(2) {
        return points;
    }

    for i in window..n - window {
        let range = i - window..=i + window;

        let max_high = highs[range.clone()]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if highs[i] == max_high {
            points.push(SwingPoint {
                index: i,
                price: highs[i],
                kind: SwingKind::High,
            });
        }

        let min_low = lows[range].iter().copied().fold(f64::INFINITY, f64::min);
        if lows[i] == min_low {
            points.push(SwingPoint {
                index: i,
                price: lows[i],
                kind: SwingKind::Low,
            });
        }
    }

    points
}

/// Value-level swing scan: distinct sorted swing-high and swing-low prices
pub fn find_swings(highs: &[f64], lows: &[f64], window: usize) -> SwingLevels {
    swing_levels(&find_swing_points(highs, lows, window))
}

/// Collapse swing points into distinct sorted prices per kind
pub fn swing_levels(points: &[SwingPoint]) -> SwingLevels {
    let collect = |kind: SwingKind| {
        let mut prices: Vec<f64> = points
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| p.price)
            .collect();
        prices.sort_by(f64::total_cmp);
        prices.dedup();
        prices
    };

    SwingLevels {
        highs: collect(SwingKind::High),
        lows: collect(SwingKind::Low),
    }
}

// ============================================================================
// Support / resistance selection
// ============================================================================

/// How support and resistance are chosen from detected swings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelPolicy {
    /// Lowest swing low / highest swing high over the whole window
    #[default]
    GlobalExtreme,
    /// Latest swing low / latest swing high by candle index
    MostRecent,
}

/// Support = min swing low, resistance = max swing high
pub fn pick_support_resistance(levels: &SwingLevels) -> (Option<f64>, Option<f64>) {
    // Both vectors are sorted ascending
    (levels.lows.first().copied(), levels.highs.last().copied())
}

/// Apply a selection policy to index-retaining swing points
pub fn select_support_resistance(
    points: &[SwingPoint],
    policy: LevelPolicy,
) -> (Option<f64>, Option<f64>) {
    match policy {
        LevelPolicy::GlobalExtreme => pick_support_resistance(&swing_levels(points)),
        LevelPolicy::MostRecent => {
            let latest = |kind: SwingKind| {
                points
                    .iter()
                    .filter(|p| p.kind == kind)
                    .max_by_key(|p| p.index)
                    .map(|p| p.price)
            };
            (latest(SwingKind::Low), latest(SwingKind::High))
        }
    }
}

// ============================================================================
// Pivot points
// ============================================================================

/// Classic floor-trader pivot levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PivotLevels {
    pub pivot: f64,
    pub r1: f64,
    pub s1: f64,
    pub r2: f64,
    pub s2: f64,
}

impl PivotLevels {
    pub fn from_hlc(high: f64, low: f64, close: f64) -> Self {
        let pivot = (high + low + close) / 3.0;
        let range = high - low;
        Self {
            pivot,
            r1: 2.0 * pivot - low,
            s1: 2.0 * pivot - high,
            r2: pivot + range,
            s2: pivot - range,
        }
    }

    /// Pivots from the second-to-last candle; the last one may still be forming.
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        let prev = candles.len().checked_sub(2).map(|i| &candles[i])?;
        Some(Self::from_hlc(prev.high, prev.low, prev.close))
    }
}

// ============================================================================
// Fibonacci
// ============================================================================

const RETRACEMENT_RATIOS: [(&str, f64); 6] = [
    ("0.0", 0.0),
    ("0.236", 0.236),
    ("0.382", 0.382),
    ("0.5", 0.5),
    ("0.618", 0.618),
    ("1.0", 1.0),
];

/// Extension label and its offset above resistance, in multiples of the range
const EXTENSION_RATIOS: [(&str, f64); 2] = [("1.272", 0.272), ("1.618", 0.618)];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FibLevel {
    pub label: &'static str,
    pub price: f64,
}

/// Retracements run from resistance (0.0) down to support (1.0); extensions
/// project above resistance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FibonacciLevels {
    pub retracements: Vec<FibLevel>,
    pub extensions: Vec<FibLevel>,
}

impl FibonacciLevels {
    pub fn get(&self, label: &str) -> Option<f64> {
        self.retracements
            .iter()
            .chain(self.extensions.iter())
            .find(|level| level.label == label)
            .map(|level| level.price)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FibLevel> {
        self.retracements.iter().chain(self.extensions.iter())
    }
}

/// Fibonacci levels between support and resistance; `None` unless support < resistance.
pub fn fibonacci_levels(support: f64, resistance: f64) -> Option<FibonacciLevels> {
    if !(support < resistance) {
        return None;
    }

    let (low, high) = (support, resistance);
    let diff = high - low;

    let retracements = RETRACEMENT_RATIOS
        .iter()
        .map(|&(label, ratio)| FibLevel {
            label,
            price: if ratio == 1.0 { low } else { high - diff * ratio },
        })
        .collect();

    let extensions = EXTENSION_RATIOS
        .iter()
        .map(|&(label, offset)| FibLevel {
            label,
            price: high + diff * offset,
        })
        .collect();

    Some(FibonacciLevels {
        retracements,
        extensions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::make_candles;

    #[test]
    fn test_single_peak_and_trough() {
        let highs = [1.0, 2.0, 3.0, 9.0, 3.0, 2.0, 1.0, 0.5, 1.0, 2.0];
        let lows = [0.5, 1.5, 2.5, 8.0, 2.5, 1.5, 0.5, 0.1, 0.5, 1.5];
        let levels = find_swings(&highs, &lows, 2);
        assert_eq!(levels.highs, vec![9.0]);
        assert_eq!(levels.lows, vec![0.1]);
    }

    #[test]
    fn test_edges_are_never_swings() {
        // Extremes at the very ends fall outside [window, n - window)
        let highs = [10.0, 1.0, 1.5, 1.0, 0.0];
        let lows = [9.0, 0.5, 1.0, 0.5, -1.0];
        let points = find_swing_points(&highs, &lows, 2);
        assert!(points.iter().all(|p| p.index == 2));
    }

    #[test]
    fn test_short_series_has_no_swings() {
        let points = find_swing_points(&[1.0, 2.0, 3.0], &[0.0, 1.0, 2.0], 5);
        assert!(points.is_empty());
        assert_eq!(find_swings(&[], &[], 5), SwingLevels::default());
        assert!(find_swing_points(&[1.0, 2.0, 1.0], &[0.0, 1.0, 0.0], usize::MAX).is_empty());
    }

    #[test]
    fn test_equal_prices_dedup_by_value() {
        let highs = [1.0, 5.0, 1.0, 1.0, 5.0, 1.0, 1.0];
        let lows = [0.0; 7];
        let points = find_swing_points(&highs, &lows, 1);
        let high_points: Vec<_> = points.iter().filter(|p| p.kind == SwingKind::High).collect();
        assert_eq!(high_points.len(), 2);

        let levels = swing_levels(&points);
        assert_eq!(levels.highs, vec![5.0]);
    }

    #[test]
    fn test_swing_detection_idempotent() {
        let highs: Vec<f64> = (0..120).map(|i| 50.0 + ((i as f64) * 0.3).sin() * 10.0).collect();
        let lows: Vec<f64> = highs.iter().map(|h| h - 2.0).collect();
        let first = find_swings(&highs, &lows, DEFAULT_SWING_WINDOW);
        let second = find_swings(&highs, &lows, DEFAULT_SWING_WINDOW);
        assert_eq!(first, second);
        assert!(!first.highs.is_empty());
        assert!(first.highs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_global_support_resistance() {
        let levels = SwingLevels {
            highs: vec![10.0, 12.0, 15.0],
            lows: vec![3.0, 4.0],
        };
        assert_eq!(pick_support_resistance(&levels), (Some(3.0), Some(15.0)));
        assert_eq!(
            pick_support_resistance(&SwingLevels::default()),
            (None, None)
        );
    }

    #[test]
    fn test_most_recent_policy_uses_latest_index() {
        let points = vec![
            SwingPoint { index: 10, price: 15.0, kind: SwingKind::High },
            SwingPoint { index: 20, price: 3.0, kind: SwingKind::Low },
            SwingPoint { index: 30, price: 12.0, kind: SwingKind::High },
            SwingPoint { index: 40, price: 6.0, kind: SwingKind::Low },
        ];
        assert_eq!(
            select_support_resistance(&points, LevelPolicy::GlobalExtreme),
            (Some(3.0), Some(15.0))
        );
        assert_eq!(
            select_support_resistance(&points, LevelPolicy::MostRecent),
            (Some(6.0), Some(12.0))
        );
    }

    #[test]
    fn test_pivot_formula() {
        let p = PivotLevels::from_hlc(110.0, 90.0, 100.0);
        assert_eq!(p.pivot, 100.0);
        assert_eq!(p.r1, 110.0);
        assert_eq!(p.s1, 90.0);
        assert_eq!(p.r2, 120.0);
        assert_eq!(p.s2, 80.0);
    }

    #[test]
    fn test_pivot_uses_second_to_last_candle() {
        let candles = make_candles(&[100.0, 200.0, 300.0]);
        let p = PivotLevels::from_candles(&candles).unwrap();
        // prior candle: high 201, low 199, close 200
        assert_eq!(p.pivot, 200.0);
        assert!(PivotLevels::from_candles(&candles[..1]).is_none());
    }

    #[test]
    fn test_fibonacci_levels() {
        let fib = fibonacci_levels(90.0, 110.0).unwrap();
        assert_eq!(fib.get("0.0"), Some(110.0));
        assert_eq!(fib.get("0.5"), Some(100.0));
        assert_eq!(fib.get("1.0"), Some(90.0));
        assert!((fib.get("0.618").unwrap() - 97.64).abs() < 1e-9);
        assert!((fib.get("1.618").unwrap() - 122.36).abs() < 1e-9);
        assert!((fib.get("1.272").unwrap() - 115.44).abs() < 1e-9);
        assert_eq!(fib.retracements.len(), 6);
        assert_eq!(fib.extensions.len(), 2);
    }

    #[test]
    fn test_fibonacci_requires_support_below_resistance() {
        assert!(fibonacci_levels(110.0, 90.0).is_none());
        assert!(fibonacci_levels(100.0, 100.0).is_none());
        assert!(fibonacci_levels(f64::NAN, 100.0).is_none());
    }

    #[test]
    fn test_retracements_lie_between_levels() {
        let fib = fibonacci_levels(90.0, 110.0).unwrap();
        assert!(fib.retracements.iter().all(|l| (90.0..=110.0).contains(&l.price)));
        assert!(fib.extensions.iter().all(|l| l.price > 110.0));
    }
}
