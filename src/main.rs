use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crossbot::api::{BitgetClient, DryRunGateway, OrderGateway};
use crossbot::execution::{warm_up, SharedMarketState};
use crossbot::stream::{ConnectionManager, MarketFeed, PositionFeed};
use crossbot::strategy::StrategyLoop;
use crossbot::Settings;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "crossbot=info";

#[derive(Parser, Debug)]
#[command(name = "crossbot")]
#[command(about = "Moving-average crossover engine for USDT-margined perpetuals")]
struct Cli {
    /// Log orders instead of sending them; the position is tracked locally
    /// and the private position stream is not opened
    #[arg(long)]
    dry_run: bool,

    /// tracing filter directive, overrides RUST_LOG
    #[arg(long, value_name = "FILTER")]
    log_filter: Option<String>,

    /// Skip the historical candle fetch at startup
    #[arg(long)]
    no_warmup: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.log_filter.as_deref());

    tracing::info!("🚀 crossbot starting");

    let mut settings = Settings::load().context("failed to load settings")?;
    if cli.dry_run {
        settings.dry_run = true;
    }
    settings.validate().context("invalid settings")?;

    tracing::info!("📊 Configuration:");
    tracing::info!("  Symbol: {} ({})", settings.symbol, settings.rest_symbol());
    tracing::info!("  Timeframe: {}", settings.timeframe);
    tracing::info!("  MA periods: {} / {}", settings.short_period, settings.long_period);
    tracing::info!("  Leverage: {}x", settings.leverage);
    tracing::info!("  Quantity: {}", settings.order_quantity);
    tracing::info!(
        "  TP / SL: {:.2}% / {:.2}%",
        settings.tp_pct * 100.0,
        settings.sl_pct * 100.0
    );
    tracing::info!("  Min change: {:.3}%", settings.min_change_pct * 100.0);
    tracing::info!("  Dry run: {}", settings.dry_run);

    let state = SharedMarketState::new(settings.long_period);
    let client = BitgetClient::new(settings.bitget_config()).context("failed to build REST client")?;

    if cli.no_warmup {
        tracing::info!("Warm-up disabled, waiting for live candles");
    } else if let Err(e) = warm_up(
        &client,
        &state,
        &settings.symbol,
        &settings.timeframe,
        settings.long_period,
    )
    .await
    {
        tracing::warn!(error = %e, "Warm-up failed, waiting for live candles");
    }

    if settings.dry_run {
        run_engine(settings, state, Arc::new(DryRunGateway::new())).await
    } else {
        run_engine(settings, state, Arc::new(client)).await
    }
}

fn setup_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Spawn the streams and the strategy loop, then wait for Ctrl+C
async fn run_engine<G: OrderGateway + 'static>(
    settings: Settings,
    state: SharedMarketState,
    gateway: Arc<G>,
) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let policy = settings.connection_policy();
    let mut tasks = JoinSet::new();

    // Public market data
    {
        let manager = ConnectionManager::new("public", &settings.ws_public_url, policy.clone());
        let mut feed = MarketFeed::new(&settings.symbol, &settings.timeframe, state.clone());
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            manager.run(&mut feed, shutdown).await;
            "market stream"
        });
    }

    // Private positions
    if settings.position_stream_enabled() {
        let manager = ConnectionManager::new("private", &settings.ws_private_url, policy);
        let mut feed =
            PositionFeed::new(settings.credentials(), &settings.rest_symbol(), state.clone());
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            manager.run(&mut feed, shutdown).await;
            "position stream"
        });
    } else if settings.dry_run {
        tracing::info!("Dry run: paper position tracked locally, position stream disabled");
    } else {
        tracing::warn!("No API credentials, position stream disabled");
    }

    // Strategy
    {
        let strategy = StrategyLoop::new(settings.strategy_config(), state, gateway);
        let shutdown = shutdown_rx.clone();
        tasks.spawn(async move {
            strategy.run(shutdown).await;
            "strategy loop"
        });
    }

    tracing::info!("✅ {} tasks running, press Ctrl+C to stop", tasks.len());

    let mut failed = false;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        Some(result) = tasks.join_next() => {
            failed = true;
            match result {
                Ok(name) => tracing::error!(task = name, "Task exited unexpectedly"),
                Err(e) => tracing::error!(error = %e, "Task failed"),
            }
        }
    }

    // Receivers may already be gone if every task exited
    let _ = shutdown_tx.send(true);

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(name) => tracing::info!(task = name, "Stopped"),
            Err(e) => {
                failed = true;
                tracing::error!(error = %e, "Task failed during shutdown");
            }
        }
    }

    tracing::info!("👋 crossbot stopped");

    if failed {
        anyhow::bail!("engine stopped after a task failure");
    }
    Ok(())
}
