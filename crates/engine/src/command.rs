//! Chat commands: `/price <coin>` and `/chart <coin> <timeframe>`

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::alerts::AlertStateStore;
use crate::analysis::{analyze, AnalysisParams, MarketSnapshot};
use crate::api::MarketData;
use crate::chart::{render_chart, ChartRenderer};
use crate::error::SignalResult;
use crate::notify::{photo_best_effort, text_best_effort, Notifier};
use crate::types::Timeframe;

/// Candles fetched for `/chart`
pub const CHART_FETCH_LIMIT: u32 = 400;
/// Candles actually drawn
pub const CHART_WINDOW: usize = 300;

const QUOTE: &str = "USDT";

pub const HELP_TEXT: &str =
    "Commands:\n/price <coin>\n/chart <coin> <timeframe>\nExample: /chart bnb 4h";
pub const PRICE_USAGE: &str = "⚠️ Format: /price <coin>. Example: /price eth";
pub const CHART_USAGE: &str = "⚠️ Format: /chart <coin> <timeframe>. Example: /chart bnb 4h";
pub const TIMEFRAME_USAGE: &str = "⚠️ Invalid timeframe. Examples: 15m, 1h, 4h, 1d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Price { symbol: String },
    Chart { symbol: String, timeframe: Timeframe },
    Help,
}

/// Parse failure, carrying the usage reply for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usage(pub &'static str);

/// `eth` -> `ETHUSDT`, `ethusdt` -> `ETHUSDT`
pub fn coin_symbol(coin: &str) -> String {
    let coin = coin.trim().to_uppercase();
    if coin.ends_with(QUOTE) {
        coin
    } else {
        format!("{}{}", coin, QUOTE)
    }
}

pub fn parse_command(text: &str) -> Result<Command, Usage> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let Some(&head) = parts.first() else {
        return Err(Usage(HELP_TEXT));
    };

    // "/price@MyBot" in group chats
    let verb = head.split('@').next().unwrap_or(head).to_lowercase();
    match verb.as_str() {
        "/price" => match parts.as_slice() {
            [_, coin] => Ok(Command::Price {
                symbol: coin_symbol(coin),
            }),
            _ => Err(Usage(PRICE_USAGE)),
        },
        "/chart" => match parts.as_slice() {
            [_, coin, tf] => {
                let timeframe = Timeframe::parse_lenient(tf).map_err(|_| Usage(TIMEFRAME_USAGE))?;
                Ok(Command::Chart {
                    symbol: coin_symbol(coin),
                    timeframe,
                })
            }
            _ => Err(Usage(CHART_USAGE)),
        },
        "/start" | "/help" => Ok(Command::Help),
        _ => Err(Usage(HELP_TEXT)),
    }
}

pub fn format_price(symbol: &str, price: Decimal) -> String {
    format!("💰 {}: {} USDT", symbol, price.round_dp(6).normalize())
}

pub fn chart_caption(symbol: &str, timeframe: Timeframe, params: &AnalysisParams) -> String {
    format!(
        "📈 {} {} (MA{}/{} + RSI + MACD + S/R + Fib)",
        symbol,
        timeframe.as_str().to_uppercase(),
        params.sma_fast,
        params.sma_slow
    )
}

/// Last recorded alert states, e.g. `Signals: ma-cross=bull, rsi=overbought`
pub fn signal_line(store: &AlertStateStore, symbol: &str) -> Option<String> {
    let states = store.states_for(symbol);
    if states.is_empty() {
        return None;
    }
    let parts: Vec<String> = states
        .iter()
        .map(|(kind, state)| format!("{}={}", kind.as_str(), state.as_str()))
        .collect();
    Some(format!("Signals: {}", parts.join(", ")))
}

/// Handles one inbound command end to end. Every outcome becomes a reply;
/// nothing propagates to the webhook.
#[derive(Clone)]
pub struct CommandDispatcher {
    market: Arc<dyn MarketData>,
    notifier: Arc<dyn Notifier>,
    renderer: Arc<dyn ChartRenderer>,
    store: Arc<AlertStateStore>,
    analysis: AnalysisParams,
}

impl CommandDispatcher {
    /// `store` is the monitor's alert state; `/chart` reports it.
    pub fn new(
        market: Arc<dyn MarketData>,
        notifier: Arc<dyn Notifier>,
        renderer: Arc<dyn ChartRenderer>,
        store: Arc<AlertStateStore>,
        analysis: AnalysisParams,
    ) -> Self {
        Self {
            market,
            notifier,
            renderer,
            store,
            analysis,
        }
    }

    pub async fn dispatch(&self, chat_id: &str, text: &str) {
        info!(chat_id, text, "Incoming command");

        let command = match parse_command(text) {
            Ok(c) => c,
            Err(Usage(reply)) => {
                text_best_effort(self.notifier.as_ref(), chat_id, reply).await;
                return;
            }
        };

        match command {
            Command::Help => {
                text_best_effort(self.notifier.as_ref(), chat_id, HELP_TEXT).await;
            }
            Command::Price { symbol } => {
                let reply = match self.market.price(&symbol).await {
                    Ok(price) => format_price(&symbol, price),
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "/price failed");
                        format!("❌ Failed to fetch price: {}", e)
                    }
                };
                text_best_effort(self.notifier.as_ref(), chat_id, &reply).await;
            }
            Command::Chart { symbol, timeframe } => {
                match self.chart(&symbol, timeframe).await {
                    Ok(png) => {
                        let mut caption = chart_caption(&symbol, timeframe, &self.analysis);
                        if let Some(line) = signal_line(&self.store, &symbol) {
                            caption.push('\n');
                            caption.push_str(&line);
                        }
                        photo_best_effort(self.notifier.as_ref(), chat_id, png, Some(&caption))
                            .await;
                    }
                    Err(e) => {
                        warn!(symbol = %symbol, timeframe = %timeframe, error = %e, "/chart failed");
                        let reply = format!("❌ Failed to build chart: {}", e);
                        text_best_effort(self.notifier.as_ref(), chat_id, &reply).await;
                    }
                }
            }
        }
    }

    async fn chart(&self, symbol: &str, timeframe: Timeframe) -> SignalResult<Vec<u8>> {
        let (png, _) = build_chart(
            self.market.as_ref(),
            self.renderer.clone(),
            &self.analysis,
            symbol,
            timeframe,
        )
        .await?;
        Ok(png)
    }
}

/// Fetch `CHART_FETCH_LIMIT` candles, analyze the last `CHART_WINDOW` and render them.
pub async fn build_chart(
    market: &dyn MarketData,
    renderer: Arc<dyn ChartRenderer>,
    params: &AnalysisParams,
    symbol: &str,
    timeframe: Timeframe,
) -> SignalResult<(Vec<u8>, MarketSnapshot)> {
    let series = market
        .candles(symbol, timeframe, CHART_FETCH_LIMIT)
        .await?
        .tail(CHART_WINDOW);
    let snapshot = analyze(&series, params)?;
    let title = format!("{} {}", series.symbol, timeframe.as_str().to_uppercase());
    let png = render_chart(renderer, title, series, snapshot.clone()).await?;
    Ok((png, snapshot))
}
