//! Polling trading engine.
//!
//! Each loop reads the account from the broker, fetches quotes, runs every
//! strategy, passes intents through the order manager and, in live mode,
//! routes approved orders to the broker. The tuner and symbol selector run
//! at the end of the loop when configured.

use super::config_validation::MAX_SECONDS;
use super::error::HftaError;
use super::intraday_stats::IntradayStatsTracker;
use super::order_manager::OrderManager;
use super::quote::{PortfolioSnapshot, Quote};
use super::strategy::Strategy;
use super::symbol_selector::SymbolSelector;
use super::tuner::ParameterTuner;
use super::universe::MarketUniverse;
use crate::ports::broker_port::BrokerPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_port::QuoteProvider;
use crate::ports::quote_store_port::QuoteStorePort;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Loops between tracker PnL summaries.
const SUMMARY_EVERY_LOOPS: i64 = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub symbols: Vec<String>,
    pub poll_interval: Duration,
    /// Simulated starting cash. When set, risk checks use tracker-derived
    /// cash and holdings instead of the broker account.
    pub paper_cash: Option<f64>,
    pub live: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["AAPL".to_string()],
            poll_interval: Duration::from_secs(5),
            paper_cash: None,
            live: false,
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, HftaError> {
        let d = Self::default();
        let symbols = match config.get_string("engine", "symbols") {
            Some(raw) => parse_symbols(&raw),
            None => d.symbols,
        };

        let poll = config.get_double("engine", "poll_interval", d.poll_interval.as_secs_f64());
        let poll_interval = Duration::try_from_secs_f64(poll)
            .ok()
            .filter(|d| !d.is_zero() && d.as_secs_f64() <= MAX_SECONDS)
            .ok_or_else(|| {
                HftaError::config_invalid(
                    "engine",
                    "poll_interval",
                    format!("poll_interval must be in (0, {MAX_SECONDS}] seconds"),
                )
            })?;

        let paper_cash = config.get_double("engine", "paper_cash", 0.0);
        if paper_cash < 0.0 {
            return Err(HftaError::config_invalid(
                "engine",
                "paper_cash",
                "paper_cash must be >= 0",
            ));
        }

        Ok(Self {
            symbols,
            poll_interval,
            paper_cash: (paper_cash > 0.0).then_some(paper_cash),
            live: config.get_bool("engine", "live", d.live),
        })
    }
}

/// Split a comma-separated list into uppercase, de-duplicated symbols.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Counters for one engine loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub quotes: usize,
    pub intents: usize,
    pub approved: usize,
    pub routed: usize,
    pub broker_errors: usize,
}

pub struct Engine {
    broker: Arc<dyn BrokerPort>,
    quotes: Arc<dyn QuoteProvider>,
    strategies: Vec<Box<dyn Strategy>>,
    order_manager: OrderManager,
    intraday: IntradayStatsTracker,
    recorder: Option<Box<dyn QuoteStorePort + Send>>,
    tuner: Option<ParameterTuner>,
    selector: Option<SymbolSelector>,
    universe: Option<MarketUniverse>,
    config: EngineConfig,
    loops: u64,
}

impl Engine {
    pub fn new(
        broker: Arc<dyn BrokerPort>,
        quotes: Arc<dyn QuoteProvider>,
        strategies: Vec<Box<dyn Strategy>>,
        order_manager: OrderManager,
        mut config: EngineConfig,
    ) -> Self {
        config.symbols = parse_symbols(&config.symbols.join(","));
        Self {
            broker,
            quotes,
            strategies,
            order_manager,
            intraday: IntradayStatsTracker::new(),
            recorder: None,
            tuner: None,
            selector: None,
            universe: None,
            config,
            loops: 0,
        }
    }

    pub fn with_recorder(mut self, recorder: Box<dyn QuoteStorePort + Send>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_tuner(mut self, tuner: ParameterTuner) -> Self {
        self.tuner = Some(tuner);
        self
    }

    pub fn with_selector(mut self, selector: SymbolSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_universe(mut self, universe: MarketUniverse) -> Self {
        self.universe = Some(universe);
        self
    }

    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    pub fn order_manager(&self) -> &OrderManager {
        &self.order_manager
    }

    pub fn universe(&self) -> Option<&MarketUniverse> {
        self.universe.as_ref()
    }

    pub fn intraday(&self) -> &IntradayStatsTracker {
        &self.intraday
    }

    pub fn loops(&self) -> u64 {
        self.loops
    }

    /// Configured symbols plus every strategy's current symbol, de-duplicated
    /// in first-seen order.
    pub fn active_symbols(&self) -> Vec<String> {
        let joined = self
            .config
            .symbols
            .iter()
            .map(String::as_str)
            .chain(self.strategies.iter().map(|s| s.symbol()))
            .collect::<Vec<_>>()
            .join(",");
        parse_symbols(&joined)
    }

    fn paper_snapshot(&self, cash_start: f64, quotes: &HashMap<String, Quote>) -> PortfolioSnapshot {
        let tracker = &self.order_manager.tracker;
        let cash = cash_start + tracker.cash_delta();
        let marked: f64 = tracker
            .positions()
            .iter()
            .map(|(symbol, pos)| {
                let mark = quotes
                    .get(symbol)
                    .and_then(Quote::mark_price)
                    .unwrap_or(pos.avg_price);
                pos.quantity * mark
            })
            .sum();
        PortfolioSnapshot {
            account_id: self.broker.account_id().to_string(),
            currency: self.broker.currency().to_string(),
            net_worth: cash + marked,
            cash_available: cash,
        }
    }

    /// One polling iteration. Broker account errors abort the loop.
    pub async fn run_once(&mut self) -> Result<LoopReport, HftaError> {
        self.loops += 1;
        let broker_snapshot = self.broker.portfolio_snapshot().await?;
        let broker_holdings = self.broker.equity_positions().await?;

        self.order_manager.tracker.seed_from_positions(&broker_holdings);

        let symbols = self.active_symbols();
        let quotes = self.quotes.get_quotes(&symbols).await;
        tracing::debug!("Loop {}: {} quotes for {:?}", self.loops, quotes.len(), symbols);

        // Risk checks see the account as it stood at the start of the loop.
        // Fills made during this pass do not count towards holdings until
        // the next loop.
        let (snapshot, holdings) = match self.config.paper_cash {
            Some(cash) => (
                self.paper_snapshot(cash, &quotes),
                self.order_manager.tracker.holdings(),
            ),
            None => (broker_snapshot, broker_holdings),
        };

        if let Some(recorder) = &self.recorder {
            let batch: Vec<Quote> = symbols.iter().filter_map(|s| quotes.get(s).cloned()).collect();
            if let Err(e) = recorder.record_quotes(&batch) {
                tracing::warn!("Failed to record quotes: {e}");
            }
        }

        let mut report = LoopReport::default();
        for symbol in &symbols {
            let Some(quote) = quotes.get(symbol) else {
                continue;
            };
            report.quotes += 1;
            tracing::debug!("Quote: {quote:?}");
            if let Some(mark) = quote.mark_price() {
                self.intraday.on_quote(&quote.symbol, mark);
            }

            for strategy in self.strategies.iter_mut() {
                for intent in strategy.on_quote(quote) {
                    report.intents += 1;
                    let outcome =
                        self.order_manager
                            .process_order(&intent, quote, &snapshot, &holdings);
                    if outcome.is_approved() {
                        report.approved += 1;
                    }
                    if outcome.route_to_broker() {
                        match self.broker.place_equity_order(&intent).await {
                            Ok(ack) => {
                                report.routed += 1;
                                tracing::info!(
                                    "Broker accepted {intent}: id={} status={}",
                                    ack.order_id,
                                    ack.status
                                );
                            }
                            Err(e) => {
                                report.broker_errors += 1;
                                tracing::error!("Broker rejected {intent}: {e}");
                            }
                        }
                    }
                }
                strategy.sync_position(self.order_manager.tracker.position_quantity(strategy.symbol()));
            }
        }

        self.order_manager.tracker.log_summary(SUMMARY_EVERY_LOOPS);

        if let Some(tuner) = self.tuner.as_mut() {
            tuner
                .maybe_run(
                    self.order_manager.risk.config_mut(),
                    &mut self.strategies,
                    &self.order_manager.tracker,
                )
                .await;
        }

        if let Some(selector) = self.selector.as_mut() {
            selector
                .on_loop(
                    &mut self.strategies,
                    &self.order_manager.tracker,
                    &self.intraday,
                    self.universe.as_ref(),
                )
                .await;
        }

        Ok(report)
    }

    /// Poll until Ctrl+C or until `max_loops` iterations have run.
    pub async fn run(&mut self, max_loops: Option<u64>) {
        tracing::info!(
            "Engine loop starting (live={}, paper_cash={:?}, poll_interval={:.2}s)",
            self.order_manager.is_live(),
            self.config.paper_cash,
            self.config.poll_interval.as_secs_f64()
        );

        let mut completed = 0_u64;
        loop {
            match self.run_once().await {
                Ok(report) => tracing::debug!("Loop report: {report:?}"),
                Err(e) => tracing::error!("Engine loop failed: {e}"),
            }
            completed += 1;
            if max_loops.is_some_and(|max| completed >= max) {
                tracing::info!("Engine stopped after {completed} loops");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Engine stopped by user (Ctrl+C)");
                    break;
                }
            }
        }
    }
}
