//! CLI definition and dispatch.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::alpaca_broker::AlpacaBroker;
use crate::adapters::broker_quotes::BrokerQuoteProvider;
use crate::adapters::chart_svg::render_equity_svg;
use crate::adapters::csv_adapter::{
    load_equity_csv, load_quotes_csv, write_equity_csv, write_fills_csv,
};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::finnhub_quotes::{FinnhubConfig, FinnhubQuoteProvider};
use crate::adapters::openai_advisor::{OpenAiAdvisor, OpenAiConfig};
use crate::adapters::paper_broker::PaperBroker;
use crate::adapters::polygon_universe::PolygonUniverseSource;
use crate::domain::backtest::{BacktestConfig, BacktestEngine, BacktestResult};
use crate::domain::config_validation::{validate_backtest_config, validate_run_config};
use crate::domain::engine::{Engine, EngineConfig};
use crate::domain::error::HftaError;
use crate::domain::execution_tracker::ExecutionTracker;
use crate::domain::metrics::EquityStats;
use crate::domain::order_manager::OrderManager;
use crate::domain::quote::{parse_timestamp, Quote};
use crate::domain::risk::{RiskConfig, RiskManager};
use crate::domain::strategy::build_strategies;
use crate::domain::symbol_selector::{SelectorConfig, SymbolSelector};
use crate::domain::tuner::{ParameterTuner, TunerConfig};
use crate::domain::universe::{MarketUniverse, MarketUniverseConfig};
use crate::logging::{init_logging, parse_log_level};
use crate::ports::advisor_port::AdvisorPort;
use crate::ports::broker_port::BrokerPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_port::QuoteProvider;
use crate::ports::quote_store_port::QuoteStorePort;

#[derive(Parser, Debug)]
#[command(name = "hfta", about = "Intraday trading engine and quote backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay synthetic or historical quotes through the configured strategies
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Synthetic steps; ignored when quotes come from CSV or the store
        #[arg(long)]
        steps: Option<i64>,
        #[arg(long)]
        seed: Option<u64>,
        /// CSV of historical quotes (timestamp,bid,ask,last[,bid_size,ask_size])
        #[arg(long, conflicts_with = "quotes_db")]
        quotes_csv: Option<PathBuf>,
        /// Load quotes from the configured quote store
        #[arg(long)]
        quotes_db: bool,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        equity_csv: Option<PathBuf>,
        #[arg(long)]
        fills_csv: Option<PathBuf>,
    },
    /// Run the polling engine (dry-run unless live is enabled)
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Empty disables the file sink
        #[arg(long, default_value = "logs/engine.log")]
        log_file: String,
        #[arg(long, default_value = "DEBUG")]
        log_level: String,
        #[arg(long)]
        max_loops: Option<u64>,
        /// Route approved orders to the broker
        #[arg(long)]
        live: bool,
    },
    /// Validate an engine configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Summarize an equity curve CSV
    EquityStats {
        #[arg(long)]
        equity_csv: PathBuf,
        /// Also render the curve as SVG
        #[arg(long)]
        svg: Option<PathBuf>,
    },
    /// Show stored symbols and their quote ranges
    QuotesInfo {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Build the liquid-symbol universe from yesterday's market data
    Universe {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            steps,
            seed,
            quotes_csv,
            quotes_db,
            symbol,
            start,
            end,
            equity_csv,
            fills_csv,
        } => {
            let args = BacktestArgs {
                steps,
                seed,
                quotes_csv,
                quotes_db,
                symbol,
                start,
                end,
                equity_csv,
                fills_csv,
            };
            run_backtest(&config, &args)
        }
        Command::Run {
            config,
            log_file,
            log_level,
            max_loops,
            live,
        } => run_engine(&config, &log_file, &log_level, max_loops, live),
        Command::Validate { config } => run_validate(&config),
        Command::EquityStats { equity_csv, svg } => run_equity_stats(&equity_csv, svg.as_ref()),
        Command::QuotesInfo { config, symbol } => run_quotes_info(&config, symbol.as_deref()),
        Command::Universe { config } => run_universe(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = HftaError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Optional overrides for a backtest run.
#[derive(Debug, Default)]
pub struct BacktestArgs {
    pub steps: Option<i64>,
    pub seed: Option<u64>,
    pub quotes_csv: Option<PathBuf>,
    pub quotes_db: bool,
    pub symbol: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub equity_csv: Option<PathBuf>,
    pub fills_csv: Option<PathBuf>,
}

fn run_backtest(config_path: &PathBuf, args: &BacktestArgs) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let strategies = match build_strategies(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    for s in &strategies {
        eprintln!("Loaded strategy {} ({}) on {}", s.name(), s.kind(), s.symbol());
    }

    let default_symbol = strategies.first().map(|s| s.symbol().to_string());
    let mut bt_config = match BacktestConfig::from_config(&adapter, default_symbol.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    apply_backtest_overrides(&mut bt_config, args);
    if let Err(e) = bt_config.validate() {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let quotes = match load_backtest_quotes(&adapter, &bt_config.symbol, args) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    match &quotes {
        Some(q) => eprintln!("Replaying {} quotes for {}", q.len(), bt_config.symbol),
        None => eprintln!(
            "Simulating {} synthetic steps for {}",
            bt_config.steps, bt_config.symbol
        ),
    }

    let mut engine = BacktestEngine::new(strategies, bt_config, quotes);
    let result = match engine.run() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    print_backtest_summary(&result);

    if let Some(path) = &args.equity_csv {
        if let Err(e) = write_equity_csv(path, &result) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        println!("\nEquity curve written to {}", path.display());
    }
    if let Some(path) = &args.fills_csv {
        if let Err(e) = write_fills_csv(path, &result.fills) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        println!("Fills blotter written to {}", path.display());
    }

    ExitCode::SUCCESS
}

pub fn apply_backtest_overrides(config: &mut BacktestConfig, args: &BacktestArgs) {
    if let Some(steps) = args.steps {
        config.steps = steps;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(symbol) = args.symbol.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        config.symbol = symbol.to_uppercase();
    }
}

/// `None` means the backtest generates a synthetic walk.
fn load_backtest_quotes(
    config: &dyn ConfigPort,
    symbol: &str,
    args: &BacktestArgs,
) -> Result<Option<Vec<Quote>>, HftaError> {
    if let Some(path) = &args.quotes_csv {
        return load_quotes_csv(path, symbol).map(Some);
    }
    if !args.quotes_db {
        return Ok(None);
    }

    let store = open_quote_store(config)?.ok_or_else(|| HftaError::ConfigMissing {
        section: "sqlite".into(),
        key: "path".into(),
    })?;
    let range = store.get_data_range(symbol)?;
    let start = match args.start.as_deref() {
        Some(raw) => parse_range_bound(raw, false)
            .ok_or_else(|| HftaError::config_invalid("cli", "start", format!("bad timestamp {raw:?}")))?,
        None => range.map(|(first, _, _)| first).ok_or_else(|| no_stored_quotes(symbol))?,
    };
    let end = match args.end.as_deref() {
        Some(raw) => parse_range_bound(raw, true)
            .ok_or_else(|| HftaError::config_invalid("cli", "end", format!("bad timestamp {raw:?}")))?,
        None => range.map(|(_, last, _)| last).ok_or_else(|| no_stored_quotes(symbol))?,
    };

    let quotes = store.load_quotes(symbol, start, end)?;
    if quotes.is_empty() {
        return Err(no_stored_quotes(symbol));
    }
    Ok(Some(quotes))
}

fn no_stored_quotes(symbol: &str) -> HftaError {
    HftaError::MarketData {
        symbol: symbol.to_string(),
        reason: "no stored quotes in range".into(),
    }
}

/// A timestamp, or a bare `YYYY-MM-DD` date covering the whole day.
pub fn parse_range_bound(raw: &str, end_of_day: bool) -> Option<NaiveDateTime> {
    parse_timestamp(raw).or_else(|| {
        let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
        if end_of_day {
            date.and_hms_micro_opt(23, 59, 59, 999_999)
        } else {
            date.and_hms_opt(0, 0, 0)
        }
    })
}

fn print_backtest_summary(result: &BacktestResult) {
    println!("=== BACKTEST SUMMARY ===");
    println!("Symbol: {}", result.symbol);
    println!("Starting cash: {:.2}", result.starting_cash);
    println!("Final cash: {:.2}", result.final_cash);
    println!("Final equity: {:.2}", result.final_equity);
    println!("Total return: {:.2}%", result.total_return_pct());
    println!("Realized PnL: {:.2}", result.realized_pnl);
    println!("Max drawdown: {:.2}%", result.max_drawdown * 100.0);
    println!("Steps simulated: {}", result.equity_curve.len());

    println!();
    println!("Trade stats:");
    println!("  Trades: {}", result.num_trades);
    println!("  Wins:   {}", result.num_winning_trades);
    println!("  Losses: {}", result.num_losing_trades);
    println!("  Best trade PnL:  {:.2}", result.best_trade_pnl);
    println!("  Worst trade PnL: {:.2}", result.worst_trade_pnl);
    println!("  Avg trade PnL:   {:.2}", result.avg_trade_pnl);
    println!("  Sharpe-like (per-step): {:.3}", result.sharpe_like);

    println!();
    println!("Open positions at end:");
    for (symbol, pos) in &result.positions {
        println!(
            "  {symbol}: qty={:.2}, avg_price={:.2}, realized_pnl={:.2}",
            pos.quantity, pos.avg_price, pos.realized_pnl
        );
    }
}

/// The configured quote store, if any. Postgres wins when both are set.
pub fn open_quote_store(
    config: &dyn ConfigPort,
) -> Result<Option<Box<dyn QuoteStorePort + Send>>, HftaError> {
    #[cfg(feature = "postgres")]
    {
        use crate::adapters::postgres_quote_store::PostgresQuoteStore;
        if config.get_string("postgres", "connection_string").is_some() {
            return Ok(Some(Box::new(PostgresQuoteStore::from_config(config)?)));
        }
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_quote_store::SqliteQuoteStore;
        if config.get_string("sqlite", "path").is_some() {
            return Ok(Some(Box::new(SqliteQuoteStore::from_config(config)?)));
        }
    }

    let _ = config;
    Ok(None)
}

fn run_engine(
    config_path: &PathBuf,
    log_file: &str,
    log_level: &str,
    max_loops: Option<u64>,
    live: bool,
) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let log_file = (!log_file.trim().is_empty()).then(|| Path::new(log_file));
    if let Err(e) = init_logging(parse_log_level(log_level), log_file) {
        eprintln!("warning: logging not initialized: {e}");
    }
    tracing::info!("Starting engine with config={}", config_path.display());

    if let Err(e) = validate_run_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let e = HftaError::Io(e);
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let result = runtime.block_on(async {
        let mut engine = build_engine(&adapter, live).await?;
        engine.run(max_loops).await;
        Ok::<_, HftaError>(engine)
    });

    match result {
        Ok(engine) => {
            let fills = engine.order_manager().tracker.fills().len();
            eprintln!("Engine stopped after {} loops, {fills} fills", engine.loops());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Engine failed: {e}");
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Wire broker, quotes, strategies and the optional AI pieces from config.
pub async fn build_engine(config: &dyn ConfigPort, live: bool) -> Result<Engine, HftaError> {
    let strategies = build_strategies(config)?;
    for s in &strategies {
        tracing::info!("Loaded strategy {} ({}) on {}", s.name(), s.kind(), s.symbol());
    }

    let mut engine_config = EngineConfig::from_config(config)?;
    engine_config.live |= live;

    let (broker, is_paper) = build_broker(config).await?;
    let quotes = build_quote_provider(config, broker.clone(), is_paper)?;

    let order_manager = OrderManager::new(
        RiskManager::new(RiskConfig::from_config(config)),
        ExecutionTracker::new(),
        engine_config.live,
    );
    tracing::info!(
        "Engine mode: {} on account {}",
        if engine_config.live { "LIVE" } else { "DRY-RUN" },
        broker.account_id()
    );
    let mut engine = Engine::new(broker, quotes, strategies, order_manager, engine_config);

    if let Some(store) = open_quote_store(config)? {
        tracing::info!("Recording quotes to the configured store");
        engine = engine.with_recorder(store);
    }

    let tuner_config = TunerConfig::from_config(config);
    if tuner_config.enabled {
        if let Some(advisor) = build_advisor(config, "ai") {
            engine = engine.with_tuner(ParameterTuner::new(tuner_config, advisor));
        }
    }

    let selector_config = SelectorConfig::from_config(config);
    if selector_config.enabled {
        let advisor = if selector_config.mode.uses_advisor() {
            build_advisor(config, "selector")
        } else {
            None
        };
        engine = engine.with_selector(SymbolSelector::new(selector_config, advisor));
    }

    if config.get_bool("universe", "enabled", false) {
        match refresh_universe(config).await {
            Ok(universe) => {
                tracing::info!("Universe loaded with {} symbols", universe.symbols().len());
                engine = engine.with_universe(universe);
            }
            Err(e) => tracing::warn!("Universe disabled, trading configured symbols only: {e}"),
        }
    }

    Ok(engine)
}

/// Returns the broker and whether it is the in-memory paper broker.
async fn build_broker(config: &dyn ConfigPort) -> Result<(Arc<dyn BrokerPort>, bool), HftaError> {
    let provider = config
        .get_string("broker", "provider")
        .unwrap_or_else(|| "paper".to_string())
        .to_lowercase();
    match provider.as_str() {
        "alpaca" => {
            let broker = AlpacaBroker::from_config(config)?.resolve_account().await?;
            Ok((Arc::new(broker), false))
        }
        "paper" => Ok((Arc::new(PaperBroker::from_config(config)), true)),
        other => Err(HftaError::config_invalid(
            "broker",
            "provider",
            format!("unknown broker provider {other:?}"),
        )),
    }
}

fn build_quote_provider(
    config: &dyn ConfigPort,
    broker: Arc<dyn BrokerPort>,
    broker_is_paper: bool,
) -> Result<Arc<dyn QuoteProvider>, HftaError> {
    let provider = config
        .get_string("quotes", "provider")
        .unwrap_or_else(|| "broker".to_string())
        .to_lowercase();
    match provider.as_str() {
        "finnhub" => Ok(Arc::new(FinnhubQuoteProvider::new(FinnhubConfig::from_config(config))?)),
        "broker" if broker_is_paper => Err(HftaError::config_invalid(
            "quotes",
            "provider",
            "the paper broker has no market data; use provider = finnhub",
        )),
        "broker" => {
            let workers = config.get_int("quotes", "max_workers", 4).max(1) as usize;
            Ok(Arc::new(BrokerQuoteProvider::new(broker, workers)))
        }
        other => Err(HftaError::config_invalid(
            "quotes",
            "provider",
            format!("unknown quote provider {other:?}"),
        )),
    }
}

/// A missing key or client failure disables the feature instead of the run.
fn build_advisor(config: &dyn ConfigPort, section: &str) -> Option<Arc<dyn AdvisorPort>> {
    match OpenAiAdvisor::new(OpenAiConfig::from_config(config, section)) {
        Ok(advisor) => Some(Arc::new(advisor)),
        Err(e) => {
            tracing::warn!("[{section}] advisor unavailable: {e}");
            None
        }
    }
}

async fn refresh_universe(config: &dyn ConfigPort) -> Result<MarketUniverse, HftaError> {
    let source = PolygonUniverseSource::from_config(config)?;
    let mut universe = MarketUniverse::new(MarketUniverseConfig::from_config(config)?);
    universe.refresh(&source, Utc::now().date_naive()).await;
    Ok(universe)
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_run_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    if let Err(e) = validate_backtest_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let strategies = match build_strategies(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let engine_config = match EngineConfig::from_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nSymbols: {}", engine_config.symbols.join(", "));
    eprintln!("Poll interval: {:.1}s", engine_config.poll_interval.as_secs_f64());
    eprintln!("Mode: {}", if engine_config.live { "LIVE" } else { "DRY-RUN" });
    eprintln!("\nStrategies:");
    for s in &strategies {
        eprintln!("  {} ({}) on {}", s.name(), s.kind(), s.symbol());
        for (key, value) in s.params() {
            eprintln!("    {key} = {value}");
        }
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_equity_stats(equity_csv: &Path, svg: Option<&PathBuf>) -> ExitCode {
    let points = match load_equity_csv(equity_csv) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let Some(stats) = EquityStats::compute(&points) else {
        println!("No equity data found in {}", equity_csv.display());
        return ExitCode::SUCCESS;
    };

    println!("=== EQUITY ANALYSIS ===");
    println!("Start equity: {:.2}", stats.start_equity);
    println!("End equity: {:.2}", stats.end_equity);
    println!("Total return: {:.4}%", stats.total_return_pct);
    println!("Max drawdown: {:.2}%", stats.max_drawdown_pct);
    println!("Peak equity at DD: {:.2}", stats.peak_equity);
    println!("Trough equity at DD: {:.2}", stats.trough_equity);
    println!("Number of points: {}", stats.num_points);

    if let Some(path) = svg {
        let title = format!("Equity curve: {}", equity_csv.display());
        if let Some(content) = render_equity_svg(&points, &title) {
            let written = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|()| fs::write(path, content));
            if let Err(e) = written {
                let e = HftaError::Io(e);
                eprintln!("error: {e}");
                return (&e).into();
            }
            println!("\nChart written to {}", path.display());
        }
    }

    ExitCode::SUCCESS
}

fn run_quotes_info(config_path: &PathBuf, symbol: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let store = match open_quote_store(&config) {
        Ok(Some(s)) => s,
        Ok(None) => {
            let e = HftaError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            };
            eprintln!("error: {e}");
            return (&e).into();
        }
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let symbols = match symbol {
        Some(s) => vec![s.trim().to_uppercase()],
        None => match store.list_symbols() {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        },
    };

    if symbols.is_empty() {
        eprintln!("No quotes stored");
        return ExitCode::SUCCESS;
    }

    for sym in &symbols {
        match store.get_data_range(sym) {
            Ok(Some((first, last, count))) => {
                println!("{sym}: {count} quotes, {first} to {last}");
            }
            Ok(None) => eprintln!("{sym}: no data found"),
            Err(e) => eprintln!("error querying {sym}: {e}"),
        }
    }
    ExitCode::SUCCESS
}

fn run_universe(config_path: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let e = HftaError::Io(e);
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let universe = match runtime.block_on(refresh_universe(&config)) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if universe.is_empty() {
        eprintln!("No symbols passed the universe filters");
        return ExitCode::SUCCESS;
    }

    let metrics = universe.metrics_by_symbol();
    for sym in universe.symbols() {
        match metrics.get(sym) {
            Some(m) => println!(
                "{sym}: close={:.2} avg_dollar_volume={:.0} day_change={}",
                m.last_close,
                m.avg_dollar_volume,
                m.day_change_pct
                    .map_or_else(|| "n/a".to_string(), |p| format!("{p:.2}%")),
            ),
            None => println!("{sym}"),
        }
    }
    eprintln!("{} symbols", universe.symbols().len());
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_accept_dates_and_timestamps() {
        let start = parse_range_bound("2024-01-02", false).unwrap();
        assert_eq!(start.to_string(), "2024-01-02 00:00:00");
        let end = parse_range_bound("2024-01-02", true).unwrap();
        assert_eq!(end.format("%H:%M:%S").to_string(), "23:59:59");
        let ts = parse_range_bound("2024-01-02T09:30:00", false).unwrap();
        assert_eq!(ts.format("%H:%M").to_string(), "09:30");
        assert!(parse_range_bound("yesterday", false).is_none());
    }

    #[tokio::test]
    async fn universe_failure_leaves_configured_symbols() {
        let cfg = FileConfigAdapter::from_string(
            "[engine]\nsymbols = AAPL\npaper_cash = 1000\n\
             [strategy.mm_AAPL]\ntype = micro_market_maker\nsymbol = AAPL\n\
             [broker]\nprovider = paper\n\
             [quotes]\nprovider = finnhub\napi_key = test\n\
             [universe]\nenabled = true\napi_key =\n",
        )
        .unwrap();
        let engine = build_engine(&cfg, false).await.unwrap();
        assert!(engine.universe().is_none());
        assert_eq!(engine.active_symbols(), vec!["AAPL".to_string()]);
    }

    #[test]
    fn steps_override_is_validated() {
        let mut config = BacktestConfig::default();
        let args = BacktestArgs {
            steps: Some(i64::MAX),
            ..Default::default()
        };
        apply_backtest_overrides(&mut config, &args);
        assert!(matches!(
            config.validate(),
            Err(HftaError::ConfigInvalid { ref key, .. }) if key == "steps"
        ));
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = BacktestConfig::default();
        let args = BacktestArgs {
            steps: Some(10),
            seed: Some(7),
            symbol: Some(" msft ".into()),
            ..Default::default()
        };
        apply_backtest_overrides(&mut config, &args);
        assert_eq!(config.steps, 10);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.symbol, "MSFT");
    }

    #[test]
    fn blank_symbol_override_is_ignored() {
        let mut config = BacktestConfig::default();
        let args = BacktestArgs {
            symbol: Some("  ".into()),
            ..Default::default()
        };
        apply_backtest_overrides(&mut config, &args);
        assert_eq!(config.symbol, "AAPL");
    }

    #[test]
    fn paper_broker_needs_external_quotes() {
        let cfg = FileConfigAdapter::from_string("[broker]\nprovider = paper\n").unwrap();
        let broker: Arc<dyn BrokerPort> = Arc::new(PaperBroker::from_config(&cfg));
        let err = build_quote_provider(&cfg, broker, true).err().unwrap();
        assert!(matches!(err, HftaError::ConfigInvalid { ref key, .. } if key == "provider"));
    }

    #[test]
    fn no_store_configured() {
        let cfg = FileConfigAdapter::from_string("[engine]\nsymbols = AAPL\n").unwrap();
        assert!(open_quote_store(&cfg).unwrap().is_none());
    }

    #[test]
    fn cli_parses_backtest_flags() {
        let cli = Cli::try_parse_from([
            "hfta", "backtest", "--config", "c.ini", "--steps", "50", "--quotes-db", "--symbol",
            "AAPL", "--start", "2024-01-02",
        ])
        .unwrap();
        match cli.command {
            Command::Backtest {
                steps, quotes_db, start, ..
            } => {
                assert_eq!(steps, Some(50));
                assert!(quotes_db);
                assert_eq!(start.as_deref(), Some("2024-01-02"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn csv_and_db_sources_conflict() {
        let parsed = Cli::try_parse_from([
            "hfta", "backtest", "--config", "c.ini", "--quotes-csv", "q.csv", "--quotes-db",
        ]);
        assert!(parsed.is_err());
    }
}
