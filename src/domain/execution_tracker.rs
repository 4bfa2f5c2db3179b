//! Fill bookkeeping: positions, realized PnL and per-strategy attribution.
//!
//! Used both for paper fills (DRY-RUN and backtests) and for approximate fills
//! in live mode.

use super::order::OrderIntent;
use super::position::{Fill, PositionState};
use super::quote::Holding;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct StrategySymbolStats {
    pub strategy_name: String,
    pub symbol: String,
    pub trade_count: u64,
    pub realized_pnl: f64,
}

impl StrategySymbolStats {
    pub fn avg_pnl_per_trade(&self) -> f64 {
        if self.trade_count == 0 {
            0.0
        } else {
            self.realized_pnl / self.trade_count as f64
        }
    }
}

/// Serializable view of [`StrategySymbolStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolStatsSummary {
    pub trade_count: u64,
    pub realized_pnl: f64,
    pub avg_pnl_per_trade: f64,
}

/// strategy name -> symbol -> stats
pub type StrategySummary = BTreeMap<String, BTreeMap<String, SymbolStatsSummary>>;

#[derive(Debug, Default)]
pub struct ExecutionTracker {
    positions: BTreeMap<String, PositionState>,
    fills: Vec<Fill>,
    strategy_stats: BTreeMap<String, BTreeMap<String, StrategySymbolStats>>,
    loop_counter: u64,
    seeded: bool,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize positions from broker holdings. Only the first call has an effect.
    pub fn seed_from_positions(&mut self, holdings: &HashMap<String, Holding>) {
        if self.seeded {
            return;
        }
        for (symbol, holding) in holdings {
            if holding.quantity == 0.0 {
                continue;
            }
            self.positions.insert(
                symbol.to_uppercase(),
                PositionState {
                    quantity: holding.quantity,
                    avg_price: holding.avg_price,
                    realized_pnl: 0.0,
                },
            );
        }
        self.seeded = true;
        tracing::debug!(positions = self.positions.len(), "seeded tracker from holdings");
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn record_fill(
        &mut self,
        intent: &OrderIntent,
        price: f64,
        timestamp: Option<NaiveDateTime>,
    ) -> &Fill {
        let symbol = intent.symbol.to_uppercase();

        let realized = self
            .positions
            .entry(symbol.clone())
            .or_default()
            .apply(intent.side, intent.quantity, price);

        if let Some(name) = &intent.strategy_name {
            let stats = self
                .strategy_stats
                .entry(name.clone())
                .or_default()
                .entry(symbol.clone())
                .or_insert_with(|| StrategySymbolStats {
                    strategy_name: name.clone(),
                    symbol: symbol.clone(),
                    trade_count: 0,
                    realized_pnl: 0.0,
                });
            stats.trade_count += 1;
            stats.realized_pnl += realized;
        }

        self.fills.push(Fill {
            symbol,
            side: intent.side,
            quantity: intent.quantity,
            price,
            timestamp,
            strategy_name: intent.strategy_name.clone(),
        });
        &self.fills[self.fills.len() - 1]
    }

    pub fn positions(&self) -> &BTreeMap<String, PositionState> {
        &self.positions
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn position_quantity(&self, symbol: &str) -> f64 {
        self.positions
            .get(&symbol.to_uppercase())
            .map(|p| p.quantity)
            .unwrap_or(0.0)
    }

    /// Current positions in the shape the risk manager consumes.
    pub fn holdings(&self) -> HashMap<String, Holding> {
        self.positions
            .iter()
            .map(|(symbol, pos)| {
                (
                    symbol.clone(),
                    Holding {
                        symbol: symbol.clone(),
                        quantity: pos.quantity,
                        avg_price: pos.avg_price,
                    },
                )
            })
            .collect()
    }

    pub fn strategy_stats(&self) -> &BTreeMap<String, BTreeMap<String, StrategySymbolStats>> {
        &self.strategy_stats
    }

    pub fn per_strategy_symbol_summary(&self) -> StrategySummary {
        self.strategy_stats
            .iter()
            .map(|(name, by_symbol)| {
                let inner = by_symbol
                    .iter()
                    .map(|(symbol, s)| {
                        (
                            symbol.clone(),
                            SymbolStatsSummary {
                                trade_count: s.trade_count,
                                realized_pnl: s.realized_pnl,
                                avg_pnl_per_trade: s.avg_pnl_per_trade(),
                            },
                        )
                    })
                    .collect();
                (name.clone(), inner)
            })
            .collect()
    }

    pub fn total_realized_pnl(&self) -> f64 {
        self.positions.values().map(|p| p.realized_pnl).sum()
    }

    /// Net cash moved by all fills so far (sell proceeds minus buy cost).
    pub fn cash_delta(&self) -> f64 {
        self.fills.iter().map(Fill::cash_flow).sum()
    }

    /// Log a compact position summary every `every_n_loops` calls.
    pub fn log_summary(&mut self, every_n_loops: i64) {
        self.loop_counter += 1;
        if every_n_loops <= 0 || self.loop_counter % every_n_loops as u64 != 0 {
            return;
        }
        if self.positions.is_empty() {
            tracing::info!("PnL summary: no positions yet");
            return;
        }
        let parts: Vec<String> = self
            .positions
            .iter()
            .map(|(sym, pos)| {
                format!(
                    "{sym}: pos={:.2}, avg={:.2}, realized={:.2}",
                    pos.quantity, pos.avg_price, pos.realized_pnl
                )
            })
            .collect();
        tracing::info!(
            "PnL summary: {} | total_realized={:.2}",
            parts.join(" | "),
            self.total_realized_pnl()
        );
    }
}
