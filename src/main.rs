use anyhow::{bail, Context};
use market_stream::binance::BinanceConnector;
use market_stream::config::StreamConfig;
use market_stream::indicators::{IndicatorEngine, IndicatorParams, IndicatorUpdate};
use market_stream::stream::{
    ChannelKey, ChannelKind, MarketEvent, StreamConnectionManager, SubscriptionHandle,
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;

    // Logs go to stderr so event output can be piped separately
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = StreamConfig::from_env().context("Invalid stream configuration")?;
    let key = ChannelKey::parse(
        &options.symbol,
        &options.channel,
        options.interval_or_depth.as_deref(),
    )
    .context("Invalid subscription")?;

    tracing::info!(
        key = %key,
        base_url = %config.base_url,
        max_attempts = config.reconnect.max_attempts(),
        "Starting market stream"
    );

    let manager = StreamConnectionManager::new(
        BinanceConnector::with_base_url(config.base_url.as_str()),
        config.reconnect,
    );

    let (failed_tx, mut failed_rx) = mpsc::unbounded_channel();
    manager.on_connection_state_change(&key, |connected| {
        tracing::info!(connected, "Connection state changed");
    });
    manager.on_terminal_error(&key, move |err| {
        let _ = failed_tx.send(err.clone());
    });

    let handle = subscribe(&manager, &key, config.candle_history_limit)?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutdown requested");
        }
        Some(err) = failed_rx.recv() => {
            tracing::error!(error = %err, error_type = err.error_type(), "Stream failed");
        }
    }

    handle.unsubscribe();
    let stats = manager.decode_stats();
    tracing::info!(
        decoded = stats.decoded,
        dropped = stats.dropped,
        "Market stream stopped"
    );
    Ok(())
}

fn subscribe(
    manager: &StreamConnectionManager<BinanceConnector>,
    key: &ChannelKey,
    history_limit: usize,
) -> anyhow::Result<SubscriptionHandle> {
    if let ChannelKind::Kline(interval) = key.kind() {
        let engine = IndicatorEngine::new(IndicatorParams::default());
        let handle = manager.subscribe_indicators(
            key.symbol(),
            interval,
            engine,
            history_limit,
            log_indicators,
        )?;
        return Ok(handle);
    }
    Ok(manager.subscribe(key.clone(), log_event))
}

fn log_event(event: &MarketEvent) {
    match event {
        MarketEvent::Ticker(t) => tracing::info!(
            symbol = %t.symbol,
            price = t.price,
            change_percent = t.change_percent,
            volume = t.volume,
            "ticker"
        ),
        MarketEvent::Trade(t) => tracing::info!(
            symbol = %t.symbol,
            trade_id = t.trade_id,
            price = t.price,
            quantity = t.quantity,
            is_maker_sell = t.is_maker_sell,
            "trade"
        ),
        MarketEvent::Kline(k) => tracing::info!(
            symbol = %k.symbol,
            interval = %k.interval,
            close = k.close,
            is_closed = k.is_closed,
            "kline"
        ),
        MarketEvent::Depth(d) => tracing::info!(
            symbol = %d.symbol,
            best_bid = ?d.bids.first(),
            best_ask = ?d.asks.first(),
            last_update_id = d.last_update_id,
            "depth"
        ),
    }
}

fn log_indicators(update: IndicatorUpdate) {
    let snapshot = &update.snapshot;
    tracing::info!(
        symbol = %update.symbol,
        interval = %update.interval,
        close = update.candle.close,
        rsi = ?snapshot.rsi.map(|r| r.value),
        macd_histogram = ?snapshot.macd.map(|m| m.histogram),
        macd_crossover = ?snapshot.macd_crossover,
        bollinger_percent_b = ?snapshot.bollinger.and_then(|b| b.percent_b),
        sma = ?snapshot.sma.map(|s| s.value),
        ema = ?snapshot.ema.map(|s| s.value),
        "Candle closed"
    );
}

struct Options {
    symbol: String,
    channel: String,
    interval_or_depth: Option<String>,
}

/// Parse command-line arguments
fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut symbol = "BTCUSDT".to_string();
    let mut channel = "ticker".to_string();
    let mut interval_or_depth = None;

    let mut i = 1;
    while i < args.len() {
        let value = || {
            args.get(i + 1)
                .cloned()
                .with_context(|| format!("{} requires a value", args[i]))
        };
        match args[i].as_str() {
            "--symbol" => {
                symbol = value()?;
                i += 1;
            }
            "--channel" => {
                channel = value()?;
                i += 1;
            }
            "--interval" | "--depth" => {
                interval_or_depth = Some(value()?);
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                print_usage();
                bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    Ok(Options {
        symbol,
        channel,
        interval_or_depth,
    })
}

/// Print usage information
fn print_usage() {
    println!("market-stream - Binance market data stream with live indicators");
    println!();
    println!("USAGE:");
    println!("    market-stream [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --symbol <SYMBOL>     Trading pair (default: BTCUSDT)");
    println!("    --channel <CHANNEL>   ticker, trade, kline or depth (default: ticker)");
    println!("    --interval <INTERVAL> Kline interval, e.g. 1m, 15m, 1h (kline only)");
    println!("    --depth <LEVELS>      Partial book levels: 5, 10 or 20 (depth only)");
    println!("    --help, -h            Print this help message");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    STREAM_BASE_URL          WebSocket base URL (default: wss://stream.binance.com:9443/ws)");
    println!("    RECONNECT_BASE_DELAY_MS  First reconnect delay (default: 1000)");
    println!("    RECONNECT_MULTIPLIER     Backoff multiplier (default: 2.0)");
    println!("    RECONNECT_MAX_DELAY_MS   Reconnect delay cap (default: 30000)");
    println!("    RECONNECT_MAX_ATTEMPTS   Reconnects before giving up (default: 5)");
    println!("    CANDLE_HISTORY_LIMIT     Closed candles kept per series (default: 1000)");
    println!("    RUST_LOG                 Logging level (default: info)");
    println!();
    println!("EXAMPLES:");
    println!("    # Stream 1m klines with RSI, MACD, Bollinger Bands and moving averages");
    println!("    market-stream --symbol BTCUSDT --channel kline --interval 1m");
    println!();
    println!("    # Stream the top 10 levels of the ETHUSDT book");
    println!("    market-stream --symbol ETHUSDT --channel depth --depth 10");
}
