//! Periodic reassignment of strategies to symbols.
//!
//! Candidates come from the market universe when one is loaded, otherwise
//! from the symbols already traded plus the strategies' current symbols.
//! A heuristic score blends realized PnL with liquidity and intraday
//! activity; in advisor and hybrid modes a language model is asked first.

use super::error::HftaError;
use super::execution_tracker::{ExecutionTracker, StrategySummary};
use super::intraday_stats::{IntradayMetrics, IntradayStatsTracker};
use super::strategy::Strategy;
use super::universe::{MarketUniverse, SymbolMetrics};
use crate::ports::advisor_port::AdvisorPort;
use crate::ports::config_port::ConfigPort;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

pub const SELECTOR_SYSTEM_PROMPT: &str = "You are an expert intraday symbol allocator for a small \
trading system. Pick the single best equity symbol for each strategy from its trading record and \
the live market conditions.";

pub const SELECTOR_USER_PROMPT: &str = "The JSON that follows describes:\n\
- symbol_universe: the allowed tickers\n\
- strategies: list of {name, current_symbol, params}\n\
- per_strategy_symbol_stats: realized PnL and trade counts per strategy and symbol\n\
- market_metrics: last_close, avg_dollar_volume, day_change_pct per symbol\n\
- intraday_metrics: intraday_return, range_pct, volatility per symbol\n\n\
Goals:\n\
1) Pick one symbol per strategy that maximizes expected risk-adjusted profit.\n\
2) Prefer strong realized PnL, deep liquidity and healthy intraday movement.\n\
3) Keep the current symbol unless the alternative is clearly better.\n\
4) Use only symbols from symbol_universe.\n\n\
Reply with only a JSON object shaped like:\n\
{\"decisions\": [{\"strategy_name\": \"mm_AAPL\", \"target_symbol\": \"AAPL\"}]}\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    Heuristic,
    Advisor,
    Hybrid,
}

impl SelectorMode {
    /// `gpt` is accepted for `advisor`. Anything unrecognized is hybrid.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "heuristic" => SelectorMode::Heuristic,
            "advisor" | "gpt" => SelectorMode::Advisor,
            "hybrid" => SelectorMode::Hybrid,
            other => {
                tracing::warn!("Unknown selector mode {other:?}; using hybrid");
                SelectorMode::Hybrid
            }
        }
    }

    pub fn uses_advisor(self) -> bool {
        matches!(self, SelectorMode::Advisor | SelectorMode::Hybrid)
    }
}

impl fmt::Display for SelectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectorMode::Heuristic => "heuristic",
            SelectorMode::Advisor => "advisor",
            SelectorMode::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorConfig {
    pub enabled: bool,
    pub mode: SelectorMode,
    pub interval_loops: u64,
    pub min_trades: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: SelectorMode::Hybrid,
            interval_loops: 60,
            min_trades: 3,
        }
    }
}

impl SelectorConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        Self {
            enabled: config.get_bool("selector", "enabled", d.enabled),
            mode: config
                .get_string("selector", "mode")
                .map(|m| SelectorMode::parse(&m))
                .unwrap_or(d.mode),
            interval_loops: config
                .get_int("selector", "interval_loops", d.interval_loops as i64)
                .max(1) as u64,
            min_trades: config
                .get_int("selector", "min_trades", d.min_trades as i64)
                .max(1) as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolScore {
    pub symbol: String,
    pub trade_count: u64,
    pub realized_pnl: f64,
    pub avg_pnl_per_trade: f64,
    pub liquidity_score: f64,
    pub day_change_pct: f64,
    pub intraday_return: f64,
    pub intraday_volatility: f64,
    pub intraday_range_pct: f64,
}

impl SymbolScore {
    pub fn total(&self) -> f64 {
        3.0 * self.realized_pnl
            + 2.0 * self.avg_pnl_per_trade
            + self.liquidity_score
            + 0.5 * self.day_change_pct
            + 1.5 * self.intraday_range_pct
            + self.intraday_volatility
            + self.intraday_return
    }
}

/// Inputs shared by the heuristic and the advisor.
struct Snapshot<'a> {
    stats: StrategySummary,
    universe: BTreeSet<String>,
    market: Option<&'a BTreeMap<String, SymbolMetrics>>,
    intraday: BTreeMap<String, IntradayMetrics>,
}

pub struct SymbolSelector {
    config: SelectorConfig,
    advisor: Option<Arc<dyn AdvisorPort>>,
    loop_counter: u64,
}

impl SymbolSelector {
    pub fn new(mut config: SelectorConfig, advisor: Option<Arc<dyn AdvisorPort>>) -> Self {
        config.interval_loops = config.interval_loops.max(1);
        config.min_trades = config.min_trades.max(1);
        if config.mode.uses_advisor() && advisor.is_none() {
            tracing::warn!("Symbol selector: no advisor available; using heuristic only");
        }
        tracing::info!(
            "Symbol selector initialized (enabled={}, interval_loops={}, min_trades={}, mode={}, advisor={})",
            config.enabled,
            config.interval_loops,
            config.min_trades,
            config.mode,
            advisor.is_some()
        );
        Self {
            config,
            advisor,
            loop_counter: 0,
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Called once per engine loop; acts every `interval_loops` calls.
    pub async fn on_loop(
        &mut self,
        strategies: &mut [Box<dyn Strategy>],
        tracker: &ExecutionTracker,
        intraday: &IntradayStatsTracker,
        universe: Option<&MarketUniverse>,
    ) {
        if !self.config.enabled {
            return;
        }
        self.loop_counter += 1;
        if self.loop_counter % self.config.interval_loops != 0 {
            return;
        }

        let stats = tracker.per_strategy_symbol_summary();
        if stats.is_empty() {
            tracing::debug!("Symbol selector: no per-strategy stats yet; skipping");
            return;
        }

        let (symbol_universe, market): (BTreeSet<String>, _) = match universe.filter(|u| !u.is_empty()) {
            Some(u) => (
                u.symbols().iter().map(|s| s.to_uppercase()).collect(),
                Some(u.metrics_by_symbol()),
            ),
            None => (fallback_universe(&stats, strategies), None),
        };
        if symbol_universe.is_empty() {
            tracing::debug!("Symbol selector: empty symbol universe; skipping");
            return;
        }

        let snapshot = Snapshot {
            stats,
            universe: symbol_universe,
            market,
            intraday: intraday.summary(),
        };

        let decisions = self.decide(&snapshot, strategies).await;
        if decisions.is_empty() {
            tracing::debug!("Symbol selector: no decisions made");
            return;
        }
        apply_decisions(&decisions, strategies);
    }

    async fn decide(
        &self,
        snapshot: &Snapshot<'_>,
        strategies: &[Box<dyn Strategy>],
    ) -> HashMap<String, String> {
        let mut decisions = HashMap::new();

        if let (true, Some(advisor)) = (self.config.mode.uses_advisor(), &self.advisor) {
            match pick_via_advisor(advisor.as_ref(), snapshot, strategies).await {
                Ok(d) => decisions = d,
                Err(e) => tracing::warn!("Symbol selector: advisor selection failed: {e}"),
            }
        }

        if decisions.is_empty() || self.config.mode != SelectorMode::Advisor {
            for (name, symbol) in self.pick_heuristic(snapshot, strategies) {
                decisions.entry(name).or_insert(symbol);
            }
        }
        decisions
    }

    pub fn compute_scores(
        &self,
        stats: &StrategySummary,
        universe: &BTreeSet<String>,
        market: Option<&BTreeMap<String, SymbolMetrics>>,
        intraday: &BTreeMap<String, IntradayMetrics>,
    ) -> Vec<SymbolScore> {
        let mut trades: HashMap<String, u64> = HashMap::new();
        let mut pnl: HashMap<String, f64> = HashMap::new();
        for by_symbol in stats.values() {
            for (symbol, s) in by_symbol {
                let symbol = symbol.to_uppercase();
                if s.trade_count == 0 || !universe.contains(&symbol) {
                    continue;
                }
                *trades.entry(symbol.clone()).or_default() += s.trade_count;
                *pnl.entry(symbol).or_default() += s.realized_pnl;
            }
        }

        universe
            .iter()
            .map(|symbol| {
                let trade_count = trades.get(symbol).copied().unwrap_or(0);
                let mut realized_pnl = pnl.get(symbol).copied().unwrap_or(0.0);
                if trade_count < self.config.min_trades {
                    realized_pnl = 0.0;
                }
                let avg_pnl_per_trade = if trade_count > 0 {
                    realized_pnl / trade_count as f64
                } else {
                    0.0
                };

                let m = market.and_then(|m| m.get(symbol));
                let dollar_volume = m.map(|m| m.avg_dollar_volume).unwrap_or(0.0);
                let liquidity_score = if dollar_volume > 0.0 {
                    (dollar_volume + 1.0).log10()
                } else {
                    0.0
                };

                let i = intraday.get(symbol);
                SymbolScore {
                    symbol: symbol.clone(),
                    trade_count,
                    realized_pnl,
                    avg_pnl_per_trade,
                    liquidity_score,
                    day_change_pct: m.and_then(|m| m.day_change_pct).unwrap_or(0.0),
                    intraday_return: i.map(|i| i.intraday_return).unwrap_or(0.0),
                    intraday_volatility: i.map(|i| i.volatility).unwrap_or(0.0),
                    intraday_range_pct: i.map(|i| i.range_pct).unwrap_or(0.0),
                }
            })
            .collect()
    }

    /// Every strategy gets the single best-scoring symbol. Ties go to the
    /// alphabetically first symbol.
    fn pick_heuristic(
        &self,
        snapshot: &Snapshot<'_>,
        strategies: &[Box<dyn Strategy>],
    ) -> HashMap<String, String> {
        let scores = self.compute_scores(
            &snapshot.stats,
            &snapshot.universe,
            snapshot.market,
            &snapshot.intraday,
        );
        let mut best: Option<(&SymbolScore, f64)> = None;
        for score in &scores {
            let total = score.total();
            if best.is_none_or(|(_, b)| total > b) {
                best = Some((score, total));
            }
        }
        let Some((best, _)) = best else {
            return HashMap::new();
        };
        strategies
            .iter()
            .map(|s| (s.name().to_string(), best.symbol.clone()))
            .collect()
    }
}

fn fallback_universe(stats: &StrategySummary, strategies: &[Box<dyn Strategy>]) -> BTreeSet<String> {
    stats
        .values()
        .flat_map(|by_symbol| by_symbol.keys().map(|s| s.to_uppercase()))
        .chain(
            strategies
                .iter()
                .map(|s| s.symbol().to_uppercase())
                .filter(|s| !s.is_empty()),
        )
        .collect()
}

fn build_state_json(
    snapshot: &Snapshot<'_>,
    strategies: &[Box<dyn Strategy>],
) -> Result<String, HftaError> {
    let strategies: Vec<Value> = strategies
        .iter()
        .map(|s| {
            json!({
                "name": s.name(),
                "current_symbol": s.symbol(),
                "params": s.params(),
            })
        })
        .collect();
    let state = json!({
        "symbol_universe": snapshot.universe,
        "strategies": strategies,
        "per_strategy_symbol_stats": snapshot.stats,
        "market_metrics": snapshot.market.cloned().unwrap_or_default(),
        "intraday_metrics": snapshot.intraday,
    });
    serde_json::to_string(&state).map_err(|e| HftaError::Advisor {
        reason: format!("failed to serialize selector state: {e}"),
    })
}

async fn pick_via_advisor(
    advisor: &dyn AdvisorPort,
    snapshot: &Snapshot<'_>,
    strategies: &[Box<dyn Strategy>],
) -> Result<HashMap<String, String>, HftaError> {
    let state_json = build_state_json(snapshot, strategies)?;
    tracing::debug!("Symbol selector state: {state_json}");

    let reply = advisor
        .complete(SELECTOR_SYSTEM_PROMPT, SELECTOR_USER_PROMPT, &state_json)
        .await?;
    let Some(parsed) = extract_json_object(&reply) else {
        tracing::warn!("Symbol selector: advisor reply is not a JSON object: {reply:?}");
        return Ok(HashMap::new());
    };
    Ok(parse_decisions(&parsed, &snapshot.universe))
}

/// Parse `text` as a JSON object, falling back to its outermost `{...}` span.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let text = text.trim();
    let parsed = serde_json::from_str::<Value>(text).ok().or_else(|| {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<Value>(&text[start..=end]).ok()
    })?;
    parsed.is_object().then_some(parsed)
}

/// Strategy name to target symbol, keeping only symbols in `universe`.
pub fn parse_decisions(reply: &Value, universe: &BTreeSet<String>) -> HashMap<String, String> {
    let Some(items) = reply.get("decisions").and_then(Value::as_array) else {
        tracing::warn!("Symbol selector: 'decisions' missing or not a list");
        return HashMap::new();
    };

    let mut decisions = HashMap::new();
    for item in items {
        let name = non_empty_str(item, "strategy_name").or_else(|| non_empty_str(item, "strategy"));
        let symbol = non_empty_str(item, "target_symbol").or_else(|| non_empty_str(item, "symbol"));
        let (Some(name), Some(symbol)) = (name, symbol) else {
            continue;
        };
        let symbol = symbol.to_uppercase();
        if !universe.contains(&symbol) {
            tracing::debug!("Symbol selector: ignoring {name} -> {symbol} (not in universe)");
            continue;
        }
        decisions.insert(name.to_string(), symbol);
    }
    decisions
}

fn non_empty_str<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn apply_decisions(decisions: &HashMap<String, String>, strategies: &mut [Box<dyn Strategy>]) {
    for strategy in strategies.iter_mut() {
        let Some(target) = decisions.get(strategy.name()) else {
            continue;
        };
        let target = target.to_uppercase();
        if strategy.symbol().eq_ignore_ascii_case(&target) {
            continue;
        }
        tracing::info!(
            "Symbol selector: reassigning strategy '{}' from {} to {}",
            strategy.name(),
            strategy.symbol(),
            target
        );
        strategy.set_symbol(&target);
    }
}
