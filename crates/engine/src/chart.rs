//! Candlestick chart rendering
//!
//! Price panel (candles, SMA fast/slow, support/resistance, Fibonacci levels),
//! RSI panel and MACD panel, stacked 6:2:2 into one PNG.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use plotters::prelude::*;

use crate::analysis::MarketSnapshot;
use crate::error::{SignalError, SignalResult};
use crate::types::CandleSeries;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 900;
const FONT: &str = "sans-serif";

/// Turns a series and its snapshot into image bytes
pub trait ChartRenderer: Send + Sync {
    fn render(
        &self,
        title: &str,
        series: &CandleSeries,
        snapshot: &MarketSnapshot,
    ) -> SignalResult<Vec<u8>>;
}

/// Render on the blocking pool so a slow chart never stalls the runtime.
pub async fn render_chart(
    renderer: Arc<dyn ChartRenderer>,
    title: String,
    series: CandleSeries,
    snapshot: MarketSnapshot,
) -> SignalResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || renderer.render(&title, &series, &snapshot))
        .await
        .map_err(|e| SignalError::RenderFailure(format!("render task failed: {}", e)))?
}

fn render_err<E: std::fmt::Display>(e: E) -> SignalError {
    SignalError::RenderFailure(e.to_string())
}

/// PNG renderer backed by plotters' bitmap backend
#[derive(Debug, Clone, Copy, Default)]
pub struct PlottersRenderer;

impl ChartRenderer for PlottersRenderer {
    fn render(
        &self,
        title: &str,
        series: &CandleSeries,
        snapshot: &MarketSnapshot,
    ) -> SignalResult<Vec<u8>> {
        if series.is_empty() {
            return Err(SignalError::RenderFailure("no candles to draw".into()));
        }

        let file = tempfile::Builder::new()
            .prefix("chart-")
            .suffix(".png")
            .tempfile()
            .map_err(render_err)?;

        draw(file.path(), title, series, snapshot)?;
        std::fs::read(file.path()).map_err(render_err)
    }
}

fn draw(
    path: &std::path::Path,
    title: &str,
    series: &CandleSeries,
    snap: &MarketSnapshot,
) -> SignalResult<()> {
    let candles = series.candles();
    let n = candles.len();

    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let (price_area, lower) = root.split_vertically((HEIGHT * 6 / 10) as i32);
    let (rsi_area, macd_area) = lower.split_vertically((HEIGHT * 2 / 10) as i32);

    let x_label = |idx: &usize| {
        candles
            .get(*idx)
            .and_then(|c| Utc.timestamp_millis_opt(c.open_time).single())
            .map(|t| t.format("%m-%d %H:%M").to_string())
            .unwrap_or_default()
    };

    // ---- price panel -------------------------------------------------------
    let (y_min, y_max) = price_range(series, snap);
    let mut price = ChartBuilder::on(&price_area)
        .caption(title, (FONT, 20))
        .margin(8)
        .x_label_area_size(24)
        .y_label_area_size(70)
        .build_cartesian_2d(0..n, y_min..y_max)
        .map_err(render_err)?;
    price
        .configure_mesh()
        .x_labels(8)
        .x_label_formatter(&x_label)
        .light_line_style(WHITE)
        .draw()
        .map_err(render_err)?;

    price
        .draw_series(candles.iter().enumerate().map(|(i, c)| {
            CandleStick::new(i, c.open, c.high, c.low, c.close, GREEN.filled(), RED.filled(), 4)
        }))
        .map_err(render_err)?;

    for (values, color, label) in [
        (&snap.sma_fast, BLUE, "SMA fast"),
        (&snap.sma_slow, RED, "SMA slow"),
    ] {
        let points: Vec<(usize, f64)> = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .collect();
        if points.is_empty() {
            continue;
        }
        price
            .draw_series(LineSeries::new(points, color.stroke_width(1)))
            .map_err(render_err)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 12, y)], color));
    }

    let last = n.saturating_sub(1);
    let mut level = |value: f64, style: ShapeStyle, text: String, color: RGBColor| {
        price
            .draw_series(LineSeries::new(vec![(0, value), (last, value)], style))
            .map_err(render_err)?;
        price
            .draw_series(std::iter::once(Text::new(
                text,
                (last.saturating_sub(n / 8), value),
                (FONT, 12).into_font().color(&color),
            )))
            .map_err(render_err)?;
        Ok::<(), SignalError>(())
    };

    let support_color = RGBColor(0, 128, 0);
    let resistance_color = RGBColor(200, 0, 0);
    if let Some(s) = snap.support {
        level(s, support_color.stroke_width(2), format!("S {:.4}", s), support_color)?;
    }
    if let Some(r) = snap.resistance {
        level(r, resistance_color.stroke_width(2), format!("R {:.4}", r), resistance_color)?;
    }
    if let Some(fib) = &snap.fibonacci {
        for l in &fib.retracements {
            let color = fib_color(l.label);
            level(l.price, color.stroke_width(1), format!("{} {:.4}", l.label, l.price), color)?;
        }
        if let Some(ext) = fib.get("1.618") {
            let purple = RGBColor(128, 0, 128);
            level(ext, purple.stroke_width(2), format!("EXT 1.618 {:.4}", ext), purple)?;
        }
    }

    price
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(render_err)?;

    // ---- RSI panel ---------------------------------------------------------
    let mut rsi = ChartBuilder::on(&rsi_area)
        .margin(8)
        .x_label_area_size(10)
        .y_label_area_size(70)
        .build_cartesian_2d(0..n, 0.0..100.0)
        .map_err(render_err)?;
    rsi.configure_mesh()
        .disable_x_mesh()
        .y_desc("RSI")
        .y_labels(5)
        .x_label_formatter(&|_| String::new())
        .draw()
        .map_err(render_err)?;
    rsi.draw_series(LineSeries::new(
        snap.rsi.iter().copied().enumerate(),
        RGBColor(90, 60, 200).stroke_width(1),
    ))
    .map_err(render_err)?;
    for bound in [30.0, 70.0] {
        rsi.draw_series(LineSeries::new(vec![(0, bound), (last, bound)], BLACK.mix(0.3)))
            .map_err(render_err)?;
    }

    // ---- MACD panel --------------------------------------------------------
    let macd = &snap.macd;
    let (m_min, m_max) = macd
        .line
        .iter()
        .chain(&macd.signal)
        .chain(&macd.histogram)
        .fold((0.0f64, 0.0f64), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let pad = ((m_max - m_min) * 0.1).max(1e-9);
    let mut macd_chart = ChartBuilder::on(&macd_area)
        .margin(8)
        .x_label_area_size(24)
        .y_label_area_size(70)
        .build_cartesian_2d(0..n, (m_min - pad)..(m_max + pad))
        .map_err(render_err)?;
    macd_chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc("MACD")
        .x_labels(8)
        .x_label_formatter(&x_label)
        .draw()
        .map_err(render_err)?;
    macd_chart
        .draw_series(macd.histogram.iter().enumerate().map(|(i, &h)| {
            Rectangle::new([(i, 0.0), (i + 1, h)], RGBColor(105, 105, 105).filled())
        }))
        .map_err(render_err)?;
    macd_chart
        .draw_series(LineSeries::new(
            macd.line.iter().copied().enumerate(),
            RGBColor(255, 0, 255).stroke_width(1),
        ))
        .map_err(render_err)?;
    macd_chart
        .draw_series(LineSeries::new(
            macd.signal.iter().copied().enumerate(),
            GREEN.stroke_width(1),
        ))
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    Ok(())
}

/// Price axis range covering candles, levels and the 1.618 extension
fn price_range(series: &CandleSeries, snap: &MarketSnapshot) -> (f64, f64) {
    let mut lo = series.lows().into_iter().fold(f64::INFINITY, f64::min);
    let mut hi = series.highs().into_iter().fold(f64::NEG_INFINITY, f64::max);
    for extra in [snap.support, snap.resistance]
        .into_iter()
        .flatten()
        .chain(snap.fibonacci.as_ref().and_then(|f| f.get("1.618")))
    {
        lo = lo.min(extra);
        hi = hi.max(extra);
    }
    let pad = ((hi - lo) * 0.03).max(hi.abs() * 1e-4).max(1e-9);
    (lo - pad, hi + pad)
}

fn fib_color(label: &str) -> RGBColor {
    match label {
        "0.236" => RGBColor(0xcc, 0x99, 0x00),
        "0.382" => RGBColor(0xcc, 0x66, 0x00),
        "0.5" => RGBColor(0x88, 0x88, 0x88),
        "0.618" => RGBColor(0x00, 0x99, 0x00),
        _ => RGBColor(0x99, 0x99, 0x99),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Renderer that returns a fixed payload and records titles
    #[derive(Default)]
    pub struct StubRenderer {
        pub calls: AtomicUsize,
        pub titles: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl ChartRenderer for StubRenderer {
        fn render(
            &self,
            title: &str,
            _series: &CandleSeries,
            _snapshot: &MarketSnapshot,
        ) -> SignalResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.titles.lock().unwrap().push(title.to_string());
            if self.fail {
                return Err(SignalError::RenderFailure("stub".into()));
            }
            Ok(b"\x89PNG stub".to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{analyze, AnalysisParams};
    use crate::types::{make_candles, Timeframe};

    fn snapshot_for(prices: &[f64]) -> (CandleSeries, MarketSnapshot) {
        let series = CandleSeries::new("LTCUSDT", Timeframe::H4, make_candles(prices)).unwrap();
        let params = AnalysisParams {
            sma_fast: 5,
            sma_slow: 20,
            ..AnalysisParams::default()
        };
        let snap = analyze(&series, &params).unwrap();
        (series, snap)
    }

    #[test]
    fn test_price_range_includes_extension() {
        let prices: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).sin() * 10.0).collect();
        let (series, snap) = snapshot_for(&prices);
        let (lo, hi) = price_range(&series, &snap);
        assert!(lo < series.lows().into_iter().fold(f64::INFINITY, f64::min));
        let ext = snap.fibonacci.as_ref().and_then(|f| f.get("1.618")).unwrap();
        assert!(hi > ext);
    }

    #[test]
    fn test_price_range_flat_series_is_not_degenerate() {
        let (series, snap) = snapshot_for(&[50.0; 10]);
        let (lo, hi) = price_range(&series, &snap);
        assert!(hi > lo);
    }

    #[test]
    fn test_plotters_renders_png() {
        let prices: Vec<f64> = (0..120)
            .map(|i| 100.0 + (i as f64 * 0.25).sin() * 8.0 + i as f64 * 0.1)
            .collect();
        let (series, snap) = snapshot_for(&prices);
        let png = PlottersRenderer
            .render("LTCUSDT 4H", &series, &snap)
            .unwrap();
        assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));
        assert!(png.len() > 1000);
    }

    #[test]
    fn test_empty_series_is_render_failure() {
        let (_, snap) = snapshot_for(&[1.0, 2.0]);
        let empty = CandleSeries::new("LTCUSDT", Timeframe::H4, Vec::new()).unwrap();
        let err = PlottersRenderer.render("empty", &empty, &snap).unwrap_err();
        assert!(matches!(err, SignalError::RenderFailure(_)));
    }

    #[tokio::test]
    async fn test_render_chart_runs_renderer_off_runtime() {
        let (series, snap) = snapshot_for(&[1.0, 2.0, 3.0]);
        let stub = Arc::new(testing::StubRenderer::default());
        let png = render_chart(stub.clone(), "t".into(), series, snap).await.unwrap();
        assert!(png.starts_with(b"\x89PNG"));
        assert_eq!(stub.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
