//! Quote-driven backtest loop.
//!
//! Replays a quote stream (historical or synthetic) through the same
//! strategy, risk and tracker pipeline the live engine uses. Every approved
//! intent fills at its reference price.

use super::error::HftaError;
use super::execution_tracker::ExecutionTracker;
use super::metrics::{compute_trade_pnls, max_drawdown, sharpe_like, TradeStats};
use super::order_manager::OrderManager;
use super::position::{Fill, PositionState};
use super::quote::{PortfolioSnapshot, Quote};
use super::risk::{RiskConfig, RiskManager};
use super::strategy::Strategy;
use super::synthetic::{generate_random_walk_quotes, SyntheticMarket, MAX_STEPS, MAX_STEP_SECONDS};
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbol: String,
    pub starting_price: f64,
    pub starting_cash: f64,
    pub steps: i64,
    pub step_seconds: i64,
    pub volatility_annual: f64,
    pub spread_cents: f64,
    pub risk: RiskConfig,
    /// Seed for the synthetic walk. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: "AAPL".to_string(),
            starting_price: 40.0,
            starting_cash: 100_000.0,
            steps: 2000,
            step_seconds: 5,
            volatility_annual: 0.4,
            spread_cents: 0.10,
            risk: RiskConfig::default(),
            seed: None,
        }
    }
}

impl BacktestConfig {
    /// Build from the `[backtest]` and `[risk]` sections.
    ///
    /// `symbol` defaults to the first configured strategy's symbol when the
    /// section omits it.
    pub fn from_config(
        config: &dyn ConfigPort,
        default_symbol: Option<&str>,
    ) -> Result<Self, HftaError> {
        let d = Self::default();
        let symbol = config
            .get_string("backtest", "symbol")
            .or_else(|| default_symbol.map(str::to_string))
            .unwrap_or(d.symbol)
            .trim()
            .to_uppercase();

        let seed = match config.get_string("backtest", "seed") {
            Some(raw) if !raw.trim().is_empty() => Some(raw.trim().parse::<u64>().map_err(
                |_| HftaError::config_invalid("backtest", "seed", "seed must be a non-negative integer"),
            )?),
            _ => None,
        };

        Ok(Self {
            symbol,
            starting_price: config.get_double("backtest", "starting_price", d.starting_price),
            starting_cash: config.get_double("backtest", "starting_cash", d.starting_cash),
            steps: config.get_int("backtest", "steps", d.steps),
            step_seconds: config.get_int("backtest", "step_seconds", d.step_seconds),
            volatility_annual: config.get_double(
                "backtest",
                "volatility_annual",
                d.volatility_annual,
            ),
            spread_cents: config.get_double("backtest", "spread_cents", d.spread_cents),
            risk: RiskConfig::from_config(config),
            seed,
        })
    }

    /// Range checks on the final values, after CLI overrides.
    pub fn validate(&self) -> Result<(), HftaError> {
        let finite_positive = |key: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(HftaError::config_invalid(
                    "backtest",
                    key,
                    format!("{key} must be a finite positive number"),
                ))
            }
        };
        finite_positive("starting_price", self.starting_price)?;
        finite_positive("starting_cash", self.starting_cash)?;
        finite_positive("spread_cents", self.spread_cents)?;
        if !(self.volatility_annual.is_finite() && self.volatility_annual >= 0.0) {
            return Err(HftaError::config_invalid(
                "backtest",
                "volatility_annual",
                "volatility_annual must be a finite non-negative number",
            ));
        }
        if !(1..=MAX_STEPS).contains(&self.steps) {
            return Err(HftaError::config_invalid(
                "backtest",
                "steps",
                format!("steps must be between 1 and {MAX_STEPS}"),
            ));
        }
        if !(1..=MAX_STEP_SECONDS).contains(&self.step_seconds) {
            return Err(HftaError::config_invalid(
                "backtest",
                "step_seconds",
                format!("step_seconds must be between 1 and {MAX_STEP_SECONDS}"),
            ));
        }
        Ok(())
    }

    pub fn synthetic_market(&self) -> SyntheticMarket {
        SyntheticMarket {
            starting_price: self.starting_price,
            steps: self.steps,
            step_seconds: self.step_seconds,
            volatility_annual: self.volatility_annual,
            spread_cents: self.spread_cents,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub symbol: String,
    pub starting_cash: f64,
    pub final_cash: f64,
    pub final_equity: f64,
    pub realized_pnl: f64,
    /// Largest relative decline from the running peak, as a fraction.
    pub max_drawdown: f64,
    pub equity_curve: Vec<f64>,
    pub timestamps: Vec<NaiveDateTime>,
    pub positions: BTreeMap<String, PositionState>,
    pub fills: Vec<Fill>,
    pub num_trades: usize,
    pub num_winning_trades: usize,
    pub num_losing_trades: usize,
    pub best_trade_pnl: f64,
    pub worst_trade_pnl: f64,
    pub avg_trade_pnl: f64,
    pub sharpe_like: f64,
}

impl BacktestResult {
    pub fn total_return_pct(&self) -> f64 {
        if self.starting_cash > 0.0 {
            (self.final_equity / self.starting_cash - 1.0) * 100.0
        } else {
            0.0
        }
    }
}

pub struct BacktestEngine {
    strategies: Vec<Box<dyn Strategy>>,
    config: BacktestConfig,
    quotes: Option<Vec<Quote>>,
}

impl BacktestEngine {
    /// With `quotes` set the engine replays them; otherwise a synthetic walk
    /// is generated from `config`.
    pub fn new(
        strategies: Vec<Box<dyn Strategy>>,
        config: BacktestConfig,
        quotes: Option<Vec<Quote>>,
    ) -> Self {
        Self {
            strategies,
            config,
            quotes,
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    fn load_quotes(&mut self) -> Result<Vec<Quote>, HftaError> {
        if let Some(quotes) = self.quotes.take() {
            tracing::info!(
                "Using {} provided quotes for backtest (symbol={})",
                quotes.len(),
                self.config.symbol
            );
            return Ok(quotes);
        }

        let market = self.config.synthetic_market();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let quotes = generate_random_walk_quotes(
            &self.config.symbol,
            &market,
            &mut rng,
            Utc::now().naive_utc(),
        )?;
        tracing::info!(
            "Generated {} synthetic quotes for {}",
            quotes.len(),
            self.config.symbol
        );
        Ok(quotes)
    }

    /// Replay the quote stream. Risk checks read holdings from the tracker
    /// for every intent, so a sell may close a buy filled earlier on the
    /// same quote.
    pub fn run(&mut self) -> Result<BacktestResult, HftaError> {
        let quotes = self.load_quotes()?;
        let starting_cash = self.config.starting_cash;
        let mut om = OrderManager::new(
            RiskManager::new(self.config.risk.clone()),
            ExecutionTracker::new(),
            false,
        );

        let mut marks: HashMap<String, f64> = HashMap::new();
        let mut equity_curve = Vec::with_capacity(quotes.len());
        let mut timestamps = Vec::with_capacity(quotes.len());

        for quote in &quotes {
            let Some(mark) = quote.mark_price() else {
                continue;
            };
            marks.insert(quote.symbol.to_uppercase(), mark);

            let cash = starting_cash + om.tracker.cash_delta();
            let snapshot = PortfolioSnapshot {
                account_id: "backtest".to_string(),
                currency: "USD".to_string(),
                net_worth: cash + marked_value(&om.tracker, &marks),
                cash_available: cash,
            };

            for strategy in self.strategies.iter_mut() {
                for intent in strategy.on_quote(quote) {
                    let holdings = om.tracker.holdings();
                    om.process_order(&intent, quote, &snapshot, &holdings);
                }
                strategy.sync_position(om.tracker.position_quantity(strategy.symbol()));
            }

            let equity = starting_cash + om.tracker.cash_delta() + marked_value(&om.tracker, &marks);
            equity_curve.push(equity);
            timestamps.push(quote.timestamp.unwrap_or_else(|| Utc::now().naive_utc()));
        }

        let fills = om.tracker.fills().to_vec();
        let trade_stats = TradeStats::from_pnls(&compute_trade_pnls(&fills));
        let final_cash = starting_cash + om.tracker.cash_delta();
        let final_equity = equity_curve.last().copied().unwrap_or(starting_cash);

        let result = BacktestResult {
            symbol: self.config.symbol.clone(),
            starting_cash,
            final_cash,
            final_equity,
            realized_pnl: om.tracker.total_realized_pnl(),
            max_drawdown: max_drawdown(&equity_curve, starting_cash),
            sharpe_like: sharpe_like(&equity_curve),
            equity_curve,
            timestamps,
            positions: om.tracker.positions().clone(),
            fills,
            num_trades: trade_stats.num_trades,
            num_winning_trades: trade_stats.num_winning,
            num_losing_trades: trade_stats.num_losing,
            best_trade_pnl: trade_stats.best,
            worst_trade_pnl: trade_stats.worst,
            avg_trade_pnl: trade_stats.average,
        };

        tracing::info!(
            "Backtest finished: final_equity={:.2} realized={:.2} max_dd={:.2}% trades={}",
            result.final_equity,
            result.realized_pnl,
            result.max_drawdown * 100.0,
            result.num_trades
        );
        Ok(result)
    }
}

/// Sum of `quantity * mark` over open positions. A symbol that has not been
/// quoted yet is carried at its average price.
fn marked_value(tracker: &ExecutionTracker, marks: &HashMap<String, f64>) -> f64 {
    tracker
        .positions()
        .iter()
        .map(|(symbol, pos)| pos.quantity * marks.get(symbol).copied().unwrap_or(pos.avg_price))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::order::OrderIntent;
    use crate::domain::quote::Side;
    use crate::domain::strategy::market_maker::MicroMarketMaker;
    use chrono::NaiveDate;

    /// Buys once on the first quote, sells on the third.
    struct BuyThenSell {
        seen: usize,
        position: f64,
    }

    impl Strategy for BuyThenSell {
        fn name(&self) -> &str {
            "buy_then_sell"
        }
        fn kind(&self) -> &'static str {
            "test"
        }
        fn symbol(&self) -> &str {
            "AAPL"
        }
        fn set_symbol(&mut self, _symbol: &str) {}
        fn on_quote(&mut self, quote: &Quote) -> Vec<OrderIntent> {
            self.seen += 1;
            let mid = quote.mid().unwrap();
            match self.seen {
                1 => vec![OrderIntent::limit("AAPL", Side::Buy, 2.0, mid).with_strategy("buy_then_sell")],
                3 if self.position > 0.0 => {
                    vec![OrderIntent::limit("AAPL", Side::Sell, 2.0, mid).with_strategy("buy_then_sell")]
                }
                _ => Vec::new(),
            }
        }
        fn sync_position(&mut self, quantity: f64) {
            self.position = quantity;
        }
        fn params(&self) -> BTreeMap<String, f64> {
            BTreeMap::new()
        }
        fn set_param(&mut self, _key: &str, _value: f64) -> bool {
            false
        }
    }

    fn sample_quotes(mids: &[f64]) -> Vec<Quote> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        mids.iter()
            .enumerate()
            .map(|(i, m)| {
                let mut q = Quote::with_bid_ask("AAPL", m - 0.05, m + 0.05);
                q.timestamp = Some(start + chrono::Duration::seconds(5 * i as i64));
                q
            })
            .collect()
    }

    fn sample_config() -> BacktestConfig {
        BacktestConfig {
            starting_cash: 1_000.0,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn default_config_values() {
        let c = BacktestConfig::default();
        assert_eq!(c.symbol, "AAPL");
        assert_eq!(c.steps, 2000);
        assert_eq!(c.step_seconds, 5);
        assert!((c.starting_cash - 100_000.0).abs() < f64::EPSILON);
        assert!(c.seed.is_none());
    }

    #[test]
    fn from_config_reads_backtest_section() {
        let cfg = FileConfigAdapter::from_string(
            "[backtest]\nsteps = 50\nseed = 7\nstarting_cash = 5000\n[risk]\nmax_notional_per_order = 250\n",
        )
        .unwrap();
        let c = BacktestConfig::from_config(&cfg, Some("msft")).unwrap();
        assert_eq!(c.symbol, "MSFT");
        assert_eq!(c.steps, 50);
        assert_eq!(c.seed, Some(7));
        assert!((c.starting_cash - 5000.0).abs() < f64::EPSILON);
        assert!((c.risk.max_notional_per_order - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn from_config_rejects_bad_seed() {
        let cfg = FileConfigAdapter::from_string("[backtest]\nseed = -3\n").unwrap();
        assert!(matches!(
            BacktestConfig::from_config(&cfg, None),
            Err(HftaError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn validate_checks_overridden_values() {
        assert!(BacktestConfig::default().validate().is_ok());
        let too_many = BacktestConfig {
            steps: MAX_STEPS + 1,
            ..BacktestConfig::default()
        };
        assert!(matches!(
            too_many.validate(),
            Err(HftaError::ConfigInvalid { ref key, .. }) if key == "steps"
        ));
        let endless = BacktestConfig {
            starting_cash: f64::INFINITY,
            ..BacktestConfig::default()
        };
        assert!(endless.validate().is_err());
        let slow = BacktestConfig {
            step_seconds: MAX_STEP_SECONDS + 1,
            ..BacktestConfig::default()
        };
        assert!(slow.validate().is_err());
    }

    #[test]
    fn oversized_synthetic_walk_fails_the_run() {
        let config = BacktestConfig {
            step_seconds: 1_000_000_000_000,
            steps: 10,
            seed: Some(1),
            ..BacktestConfig::default()
        };
        let mut engine = BacktestEngine::new(Vec::new(), config, None);
        assert!(matches!(engine.run(), Err(HftaError::ConfigInvalid { .. })));
    }

    #[test]
    fn drawdown_matches_the_curve_statistic() {
        let strategy = BuyThenSell {
            seen: 0,
            position: 0.0,
        };
        let mut engine = BacktestEngine::new(
            vec![Box::new(strategy)],
            sample_config(),
            Some(sample_quotes(&[10.0, 8.0, 9.0, 9.0])),
        );
        let result = engine.run().unwrap();
        assert!(result.max_drawdown > 0.0);
        assert_eq!(
            result.max_drawdown,
            max_drawdown(&result.equity_curve, result.starting_cash)
        );
    }

    #[test]
    fn round_trip_realizes_pnl() {
        let strategy = BuyThenSell {
            seen: 0,
            position: 0.0,
        };
        let mut engine = BacktestEngine::new(
            vec![Box::new(strategy)],
            sample_config(),
            Some(sample_quotes(&[10.0, 11.0, 12.0, 12.0])),
        );
        let result = engine.run().unwrap();

        assert_eq!(result.fills.len(), 2);
        assert!((result.realized_pnl - 4.0).abs() < 1e-9);
        assert!((result.final_cash - 1_004.0).abs() < 1e-9);
        assert!((result.final_equity - 1_004.0).abs() < 1e-9);
        assert_eq!(result.equity_curve.len(), 4);
        assert_eq!(result.timestamps.len(), 4);
        // equity after buying at 10 and marking at 11
        assert!((result.equity_curve[1] - 1_002.0).abs() < 1e-9);
        assert_eq!(result.num_trades, 1);
        assert_eq!(result.num_winning_trades, 1);
        assert!((result.best_trade_pnl - 4.0).abs() < 1e-9);
        assert!((result.max_drawdown).abs() < f64::EPSILON);
    }

    #[test]
    fn quotes_without_price_are_skipped() {
        let mut quotes = sample_quotes(&[10.0, 11.0]);
        quotes[0].bid = None;
        quotes[0].ask = None;
        let mut engine = BacktestEngine::new(Vec::new(), sample_config(), Some(quotes));
        let result = engine.run().unwrap();
        assert_eq!(result.equity_curve, vec![1_000.0]);
        assert!((result.final_equity - 1_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_stream_keeps_starting_cash() {
        let mut engine = BacktestEngine::new(Vec::new(), sample_config(), Some(Vec::new()));
        let result = engine.run().unwrap();
        assert!(result.equity_curve.is_empty());
        assert!((result.final_equity - 1_000.0).abs() < f64::EPSILON);
        assert_eq!(result.num_trades, 0);
        assert_eq!(result.sharpe_like, 0.0);
    }

    #[test]
    fn seeded_synthetic_run_is_reproducible() {
        let config = BacktestConfig {
            steps: 300,
            seed: Some(11),
            ..BacktestConfig::default()
        };
        let run = || {
            let mm = MicroMarketMaker::new("mm_AAPL", "AAPL", 0.05);
            BacktestEngine::new(vec![Box::new(mm)], config.clone(), None)
                .run()
                .unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.equity_curve, b.equity_curve);
        assert_eq!(a.fills.len(), b.fills.len());
        assert_eq!(a.equity_curve.len(), 300);
    }

    #[test]
    fn market_maker_inventory_stays_within_limit() {
        let config = BacktestConfig {
            steps: 500,
            seed: Some(5),
            ..BacktestConfig::default()
        };
        let mut mm = MicroMarketMaker::new("mm_AAPL", "AAPL", 0.05);
        mm.max_inventory = 3.0;
        let mut engine = BacktestEngine::new(vec![Box::new(mm)], config, None);
        let result = engine.run().unwrap();
        let qty = result.positions.get("AAPL").map(|p| p.quantity).unwrap_or(0.0);
        assert!((0.0..=3.0).contains(&qty));
    }
}
