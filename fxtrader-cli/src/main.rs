//! fxtrader CLI: run backtests and live sessions, inspect the candle cache.
//!
//! Commands:
//! - `run --mode backtest`: replay cached or downloaded candles through the strategies
//! - `run --mode live`: trade against the configured OANDA account
//! - `cache status`: list cached candle artifacts

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fxtrader_core::api::{BrokerageApi, OandaClient};
use fxtrader_core::broker::{BacktestBroker, Broker, LiveBroker};
use fxtrader_core::clock::{Clock, RealTimeClock, SimulatedClock};
use fxtrader_core::config::Settings;
use fxtrader_core::controller::{Controller, RunSummary, StopReason, ThreadedController};
use fxtrader_core::data::{BacktestFeed, CandleCache, HistoryLoader, LoadRequest, RetryPolicy};
use fxtrader_core::domain::InstrumentRegistry;
use fxtrader_core::portfolio::{Ledger, LogNotifier, Notifier, Portfolio, TelegramNotifier};
use fxtrader_core::shutdown::{install_interrupt_handler, StopHandle};
use fxtrader_core::strategy::{LastCandleSignal, Strategy, StrategyMode, TimeframeStrategy};

#[derive(Parser)]
#[command(name = "fxtrader", about = "fxtrader: tick-driven FX trading engine")]
struct Cli {
    /// Log filter, e.g. `info` or `fxtrader_core=debug`. `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run strategies against a replayed feed or the live broker.
    Run {
        #[arg(long, value_enum, default_value_t = Mode::Backtest)]
        mode: Mode,

        /// Instruments to trade (e.g., EUR_USD). One strategy per instrument.
        #[arg(long = "instrument", required = true)]
        instruments: Vec<String>,

        /// Backtest start (YYYY-MM-DD or RFC 3339). Overrides the config file.
        #[arg(long)]
        start: Option<String>,

        /// Backtest end (YYYY-MM-DD or RFC 3339). Overrides the config file.
        #[arg(long)]
        end: Option<String>,

        /// Path to a TOML settings file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run the tick loop on a worker thread.
        #[arg(long, default_value_t = false)]
        threaded: bool,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached candle artifacts.
    Status {
        /// Cache directory. Defaults to ./data/cache.
        #[arg(long, default_value = "data/cache")]
        cache_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Backtest,
    Live,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log)?;

    match cli.command {
        Commands::Run {
            mode,
            instruments,
            start,
            end,
            config,
            threaded,
        } => run_session(mode, &instruments, start, end, config.as_deref(), threaded),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
        },
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("invalid log filter '{level}'"))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    Ok(())
}

fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let mut settings = match config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    settings.apply_env()?;
    Ok(settings)
}

fn run_session(
    mode: Mode,
    instruments: &[String],
    start: Option<String>,
    end: Option<String>,
    config: Option<&Path>,
    threaded: bool,
) -> Result<()> {
    let mut settings = load_settings(config)?;
    if let Some(start) = start {
        settings.backtest.start = start;
    }
    if let Some(end) = end {
        settings.backtest.end = end;
    }

    let stop = StopHandle::new();
    install_interrupt_handler(&stop).context("failed to install SIGINT handler")?;
    let read_retry = settings.retry.read_policy().cancel_on(stop.clone());

    let (token, account) = settings.credentials()?;
    let api: Arc<dyn BrokerageApi> = Arc::new(OandaClient::new(settings.account.environment, token, account)?);

    let mut registry = InstrumentRegistry::new();
    for symbol in instruments {
        let instrument = read_retry
            .run("instrument", || api.instrument(symbol))
            .with_context(|| format!("instrument lookup for {symbol}"))?;
        let instrument = registry.register(instrument)?;
        info!(instrument = %instrument, pip = %instrument.pip, max_units = instrument.max_order_units, "instrument loaded");
    }

    let strategy_mode = match mode {
        Mode::Backtest => StrategyMode::Backtest,
        Mode::Live => StrategyMode::Live,
    };
    let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
    for instrument in registry.iter() {
        let strategy = TimeframeStrategy::new(
            settings.strategy.timeframe_config(strategy_mode),
            instrument.clone(),
            LastCandleSignal::new(settings.strategy.order_type),
        )?;
        strategies.push(Box::new(strategy));
    }

    let ledger = Ledger::new(Ledger::default_path(&settings.portfolio.ledger_dir));
    info!(path = %ledger.path().display(), "ledger");

    let (clock, broker, notifier): (Box<dyn Clock>, Box<dyn Broker>, Box<dyn Notifier>) = match mode {
        Mode::Backtest => {
            let start = settings.backtest.start()?;
            let end = settings.backtest.end()?;
            let feed = load_backtest_feed(&settings, api, read_retry, &strategies, start, end)?;
            let interval = chrono::Duration::seconds(i64::try_from(settings.clock_interval()?.as_secs())?);
            let clock = SimulatedClock::new(start, end, interval)?;
            info!(%start, %end, ticks = clock.len(), "backtest clock");
            let broker = BacktestBroker::new(feed, settings.backtest.initial_balance)
                .with_pip_cash_multiplier(settings.backtest.pip_cash_multiplier);
            (Box::new(clock), Box::new(broker), Box::new(LogNotifier))
        }
        Mode::Live => {
            let clock = RealTimeClock::new(settings.clock_interval()?).cancel_on(stop.clone());
            let write_retry = settings.retry.write_policy().cancel_on(stop.clone());
            let broker = LiveBroker::new(api).with_retry(read_retry, write_retry);
            let notifier: Box<dyn Notifier> = match settings.notify.telegram() {
                Some((bot_token, chat_id)) => Box::new(TelegramNotifier::new(bot_token, chat_id)?),
                None => {
                    warn!("telegram not configured, notifications go to the log");
                    Box::new(LogNotifier)
                }
            };
            (Box::new(clock), Box::new(broker), notifier)
        }
    };

    let portfolio = Portfolio::new(settings.portfolio.risk.clone())
        .with_ledger(ledger)
        .with_notifier(notifier);
    let mut controller = Controller::new(clock, broker, portfolio, strategies).with_stop_handle(stop);

    let (controller, summary) = if threaded {
        let worker = ThreadedController::spawn(controller).context("failed to spawn tick loop")?;
        match worker.wait_for_stop(Duration::from_millis(500)) {
            Ok(done) => done,
            Err(_) => bail!("tick loop panicked"),
        }
    } else {
        let summary = controller.run_until_stopped();
        (controller, summary)
    };

    print_summary(&controller, &summary);
    Ok(())
}

fn load_backtest_feed(
    settings: &Settings,
    api: Arc<dyn BrokerageApi>,
    retry: RetryPolicy,
    strategies: &[Box<dyn Strategy>],
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
) -> Result<BacktestFeed> {
    let cache = CandleCache::new(&settings.backtest.cache_dir);
    let loader = HistoryLoader::new(api, retry);
    let mut feed = BacktestFeed::new();

    for strategy in strategies {
        let symbol = strategy.instrument().symbol();
        let request = LoadRequest {
            strategy: strategy.name(),
            instrument: &symbol,
            timeframes: strategy.timeframes(),
            start,
            end,
            warmup_candles: settings
                .backtest
                .warmup_candles
                .unwrap_or_else(|| strategy.warmup_candles()),
        };
        let instrument_feed = loader
            .load(Some(&cache), &request)
            .with_context(|| format!("loading backtest data for {symbol}"))?;
        feed.insert(symbol, instrument_feed);
    }
    Ok(feed)
}

fn print_summary(controller: &Controller, summary: &RunSummary) {
    let portfolio = controller.portfolio();
    println!();
    println!("=== Session Summary ===");
    println!("Ticks:          {}", summary.ticks);
    if let Some(last) = summary.last_tick {
        println!("Last tick:      {last}");
    }
    match summary.reason {
        StopReason::ClockExhausted => println!("Ended:          clock exhausted"),
        StopReason::StopRequested => println!("Ended:          stop requested"),
    }
    println!("Closed trades:  {}", portfolio.realized().len());
    println!("Open trades:    {}", portfolio.confirmed().len());
    println!("Pending orders: {}", portfolio.pending().len());
    println!("Total profit:   {}", portfolio.overall_profit());
    if let Some(balance) = controller.broker().get_account_balance() {
        println!("Balance:        {balance}");
    }
    println!();
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    let cache = CandleCache::new(cache_dir);
    let artifacts = cache.status()?;

    if artifacts.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    println!("Cache: {} ({} artifact(s))", cache_dir.display(), artifacts.len());
    println!();
    println!(
        "{:<16} {:<10} {:<22} {:<22} {:>8}  TIMEFRAMES",
        "STRATEGY", "INSTR", "START", "END", "CANDLES"
    );
    for artifact in &artifacts {
        let meta = &artifact.meta;
        let candles: usize = meta.timeframes.values().map(|tf| tf.candles).sum();
        let timeframes: Vec<&str> = meta.timeframes.keys().map(String::as_str).collect();
        println!(
            "{:<16} {:<10} {:<22} {:<22} {:>8}  {}",
            meta.strategy,
            meta.instrument,
            meta.start.format("%Y-%m-%d %H:%M:%S"),
            meta.end.format("%Y-%m-%d %H:%M:%S"),
            candles,
            timeframes.join(",")
        );
    }
    Ok(())
}
