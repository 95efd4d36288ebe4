//! Chart Signal Bot: Telegram trading alerts from Binance candles
//!
//! Usage:
//!   chart-signal-bot serve --port 5000     # Webhook server + background monitor
//!   chart-signal-bot watch                 # Monitor only, no webhook
//!   chart-signal-bot chart bnb 4h          # Render a chart to a PNG file

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use engine::command::{build_chart, coin_symbol, format_price};
use engine::{
    AlertStateStore, BinanceClient, BotConfig, ChartRenderer, CommandDispatcher, MarketData,
    Monitor, MonitorProgress, MonitorSettings, Notifier, PlottersRenderer, TelegramClient,
    Timeframe, Update,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "chart-signal-bot")]
#[command(about = "Telegram trading alerts: SMA/RSI/MACD, support/resistance and Fibonacci charts", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server and the background monitor
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on (defaults to PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run only the monitor loop until Ctrl+C
    Watch,
    /// Print the current price of a coin
    Price {
        /// Coin, e.g. eth (USDT quote is appended)
        coin: String,
    },
    /// Render a chart to a PNG file and print the level summary
    Chart {
        coin: String,
        /// Binance interval, e.g. 15m, 1h, 4h, 1d
        timeframe: String,
        /// Output path
        #[arg(long, default_value = "chart.png")]
        out: String,
    },
    /// Register WEBHOOK_URL/<token> with Telegram
    SetWebhook,
}

#[derive(Clone)]
struct AppState {
    token: Arc<str>,
    dispatcher: CommandDispatcher,
    progress: Arc<MonitorProgress>,
    symbols: Arc<[String]>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,chart_signal_bot=debug,tower_http=debug")
    } else {
        EnvFilter::new("info,engine=info,chart_signal_bot=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let config = BotConfig::from_env()?;

    match cli.command {
        Commands::Serve { host, port } => {
            let port = port.unwrap_or(config.port);
            cmd_serve(&config, &host, port).await?;
        }
        Commands::Watch => {
            cmd_watch(&config).await?;
        }
        Commands::Price { coin } => {
            cmd_price(&config, &coin).await?;
        }
        Commands::Chart {
            coin,
            timeframe,
            out,
        } => {
            cmd_chart(&config, &coin, &timeframe, &out).await?;
        }
        Commands::SetWebhook => {
            cmd_set_webhook(&config).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Shared wiring
// ============================================================================

struct Services {
    market: Arc<dyn MarketData>,
    telegram: Arc<TelegramClient>,
    renderer: Arc<dyn ChartRenderer>,
}

fn build_services(config: &BotConfig, token: &str) -> anyhow::Result<Services> {
    let market = BinanceClient::new(&config.binance_base_url, config.http_timeout)?;
    let telegram =
        TelegramClient::with_base_url(&config.telegram_base_url, token, config.http_timeout)?;
    Ok(Services {
        market: Arc::new(market),
        telegram: Arc::new(telegram),
        renderer: Arc::new(PlottersRenderer),
    })
}

fn build_monitor(
    config: &BotConfig,
    services: &Services,
    store: Arc<AlertStateStore>,
    chat_id: &str,
) -> Monitor {
    let notifier: Arc<dyn Notifier> = services.telegram.clone();
    Monitor::new(
        services.market.clone(),
        notifier,
        services.renderer.clone(),
        store,
        MonitorSettings::from_config(config, chat_id),
    )
}

/// Cancel the monitor on Ctrl+C
async fn shutdown_signal(progress: Arc<MonitorProgress>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Ctrl+C received, stopping...");
    progress.cancel();
}

// ============================================================================
// Serve command - webhook server + monitor
// ============================================================================

async fn cmd_serve(config: &BotConfig, host: &str, port: u16) -> anyhow::Result<()> {
    info!("Chart Signal Bot v{} starting...", APP_VERSION);

    let (token, chat_id) = config.telegram_credentials()?;
    let services = build_services(config, token)?;

    match &config.webhook_url {
        Some(url) => {
            if let Err(e) = services.telegram.set_webhook(url).await {
                warn!(error = %e, "setWebhook failed, continuing without it");
            }
        }
        None => warn!("WEBHOOK_URL not set, commands will not reach this server"),
    }

    // One alert state shared by the monitor and /chart captions
    let store = Arc::new(AlertStateStore::new());
    let progress = Arc::new(MonitorProgress::new());
    let monitor = build_monitor(config, &services, store.clone(), chat_id);
    let monitor_handle = {
        let progress = progress.clone();
        tokio::spawn(async move { monitor.run(&progress).await })
    };

    let notifier: Arc<dyn Notifier> = services.telegram.clone();
    let state = AppState {
        token: Arc::from(token),
        dispatcher: CommandDispatcher::new(
            services.market.clone(),
            notifier,
            services.renderer.clone(),
            store,
            config.analysis,
        ),
        progress: progress.clone(),
        symbols: config.symbols.clone().into(),
    };

    let app = Router::new()
        .route("/health", get(api_health))
        .route("/:token", post(telegram_webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Chart Signal Bot v{} ===", APP_VERSION);
    println!("Monitoring {} {}", config.symbols.join(", "), config.timeframe);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /health                  - Health + monitor status");
    println!("  POST /<bot token>             - Telegram webhook");
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(progress))
        .await?;

    if let Err(e) = monitor_handle.await {
        error!(error = %e, "Monitor task panicked");
    }
    info!("Server stopped");
    Ok(())
}

/// GET /health
async fn api_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let progress = &state.progress;
    Json(serde_json::json!({
        "status": "ok",
        "service": "chart-signal-bot",
        "version": APP_VERSION,
        "monitor": {
            "status": progress.status(),
            "symbols": &*state.symbols,
            "cycles": progress.cycles(),
            "last_error": progress.last_error(),
        },
    }))
}

/// POST /:token - Telegram update. Always acknowledged; work runs on its own task.
async fn telegram_webhook(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: String,
) -> Result<&'static str, StatusCode> {
    if token != *state.token {
        return Err(StatusCode::NOT_FOUND);
    }

    let update: Update = match serde_json::from_str(&body) {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed update");
            return Ok("ok");
        }
    };

    if let Some((chat_id, text)) = update.command() {
        let dispatcher = state.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(&chat_id, &text).await;
        });
    }

    Ok("ok")
}

// ============================================================================
// Watch command - monitor only
// ============================================================================

async fn cmd_watch(config: &BotConfig) -> anyhow::Result<()> {
    let (token, chat_id) = config.telegram_credentials()?;
    let services = build_services(config, token)?;
    let monitor = build_monitor(config, &services, Arc::new(AlertStateStore::new()), chat_id);

    println!("\n=== Chart Signal Bot v{} ===", APP_VERSION);
    println!(
        "Watching {} {} every {}s",
        config.symbols.join(", "),
        config.timeframe,
        config.poll_interval.as_secs()
    );
    println!("\nPress Ctrl+C to stop\n");

    let progress = Arc::new(MonitorProgress::new());
    tokio::spawn(shutdown_signal(progress.clone()));
    monitor.run(&progress).await;

    println!("Stopped after {} cycles", progress.cycles());
    Ok(())
}

// ============================================================================
// One-shot commands
// ============================================================================

async fn cmd_price(config: &BotConfig, coin: &str) -> anyhow::Result<()> {
    let client = BinanceClient::new(&config.binance_base_url, config.http_timeout)?;
    let symbol = coin_symbol(coin);
    let price = client.get_price(&symbol).await?;
    println!("{}", format_price(&symbol, price));
    Ok(())
}

async fn cmd_chart(
    config: &BotConfig,
    coin: &str,
    timeframe: &str,
    out: &str,
) -> anyhow::Result<()> {
    let timeframe = Timeframe::parse_lenient(timeframe)?;
    let symbol = coin_symbol(coin);
    let client = BinanceClient::new(&config.binance_base_url, config.http_timeout)?;

    let (png, snapshot) = build_chart(
        &client,
        Arc::new(PlottersRenderer),
        &config.analysis,
        &symbol,
        timeframe,
    )
    .await?;

    tokio::fs::write(out, &png).await?;
    println!("{}", snapshot.summary(&symbol, timeframe.as_str()));
    println!("\nChart written to {} ({} bytes)", out, png.len());
    Ok(())
}

async fn cmd_set_webhook(config: &BotConfig) -> anyhow::Result<()> {
    let token = config
        .telegram_token
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("TELEGRAM_TOKEN must be set"))?;
    let url = config
        .webhook_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("WEBHOOK_URL must be set"))?;

    let telegram =
        TelegramClient::with_base_url(&config.telegram_base_url, token, config.http_timeout)?;
    telegram.set_webhook(url).await?;
    println!("Webhook registered: {}/<token>", url.trim_end_matches('/'));
    Ok(())
}
