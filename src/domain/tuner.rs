//! Periodic parameter tuning through an [`AdvisorPort`].
//!
//! Every `interval_loops` engine loops the tuner serializes realized PnL,
//! positions, risk limits and strategy parameters, asks the advisor for
//! adjustments and applies the numeric ones within fixed step limits.
//! Short selling is never left enabled.

use super::error::HftaError;
use super::execution_tracker::ExecutionTracker;
use super::risk::RiskConfig;
use super::strategy::Strategy;
use crate::ports::advisor_port::AdvisorPort;
use crate::ports::config_port::ConfigPort;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Largest factor a single strategy parameter may move by per update.
const STRATEGY_STEP_LIMIT: f64 = 3.0;
/// Largest factor a single risk limit may move by per update.
const RISK_STEP_LIMIT: f64 = 2.0;

pub const TUNER_SYSTEM_PROMPT: &str = "You are a cautious trading-parameter assistant.";

pub const TUNER_USER_PROMPT: &str = "You tune the parameters of a small intraday trading system \
running against a paper or live account.\n\
The current state (realized PnL, positions, risk limits, strategy parameters) follows as JSON.\n\n\
Goals:\n\
1) Improve expected risk-adjusted returns while keeping risk modest.\n\
2) Propose only small, incremental changes to numeric parameters.\n\
3) Never enable short selling; allow_short_selling must stay false.\n\
4) Describe any idea that needs code or logic changes in plain text instead of applying it.\n\n\
Reply with one JSON object with the keys:\n\
- strategy_updates: list of {name, params} where params maps parameter names to numbers.\n\
- risk_updates: object with optional numeric fields.\n\
- code_change_ideas: short markdown text.\n";

#[derive(Debug, Clone, PartialEq)]
pub struct TunerConfig {
    pub enabled: bool,
    pub interval_loops: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_loops: 12,
        }
    }
}

impl TunerConfig {
    /// Read `enabled` and `interval_loops` from `[ai]`.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        Self {
            enabled: config.get_bool("ai", "enabled", d.enabled),
            interval_loops: config.get_int("ai", "interval_loops", d.interval_loops as i64).max(1)
                as u64,
        }
    }
}

pub struct ParameterTuner {
    advisor: Arc<dyn AdvisorPort>,
    enabled: bool,
    interval_loops: u64,
    loop_counter: u64,
}

impl ParameterTuner {
    pub fn new(config: TunerConfig, advisor: Arc<dyn AdvisorPort>) -> Self {
        let interval_loops = config.interval_loops.max(1);
        if config.enabled {
            tracing::info!("Parameter tuner enabled (interval_loops={interval_loops})");
        } else {
            tracing::info!("Parameter tuner disabled via config");
        }
        Self {
            advisor,
            enabled: config.enabled,
            interval_loops,
            loop_counter: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Called once per engine loop. Failures are logged, never returned.
    pub async fn maybe_run(
        &mut self,
        risk: &mut RiskConfig,
        strategies: &mut [Box<dyn Strategy>],
        tracker: &ExecutionTracker,
    ) {
        if !self.enabled {
            return;
        }
        self.loop_counter += 1;
        if self.loop_counter % self.interval_loops != 0 {
            return;
        }

        if let Err(e) = self.run(risk, strategies, tracker).await {
            tracing::warn!("Parameter tuner error: {e}");
        }
    }

    async fn run(
        &self,
        risk: &mut RiskConfig,
        strategies: &mut [Box<dyn Strategy>],
        tracker: &ExecutionTracker,
    ) -> Result<(), HftaError> {
        let state_json = build_state_json(risk, strategies, tracker)?;
        tracing::debug!("Tuner state JSON: {state_json}");

        let reply = self
            .advisor
            .complete(TUNER_SYSTEM_PROMPT, TUNER_USER_PROMPT, &state_json)
            .await?;
        tracing::debug!("Tuner raw reply: {reply}");

        let response: Value = serde_json::from_str(reply.trim()).map_err(|e| HftaError::Advisor {
            reason: format!("reply is not JSON ({e}): {reply:?}"),
        })?;
        apply_response(&response, risk, strategies)
    }
}

/// Compact JSON snapshot with sorted keys.
pub fn build_state_json(
    risk: &RiskConfig,
    strategies: &[Box<dyn Strategy>],
    tracker: &ExecutionTracker,
) -> Result<String, HftaError> {
    let positions: Map<String, Value> = tracker
        .positions()
        .iter()
        .map(|(symbol, pos)| {
            (
                symbol.clone(),
                json!({
                    "quantity": pos.quantity,
                    "avg_price": pos.avg_price,
                    "realized_pnl": pos.realized_pnl,
                }),
            )
        })
        .collect();

    let strategies: Vec<Value> = strategies
        .iter()
        .map(|s| {
            let mut entry = Map::new();
            entry.insert("name".into(), json!(s.name()));
            entry.insert("type".into(), json!(s.kind()));
            for (key, value) in s.params() {
                entry.insert(key, json!(value));
            }
            Value::Object(entry)
        })
        .collect();

    let state = json!({
        "realized_pnl_total": tracker.total_realized_pnl(),
        "positions": positions,
        "risk": risk,
        "strategies": strategies,
    });
    serde_json::to_string(&state).map_err(|e| HftaError::Advisor {
        reason: format!("failed to serialize tuner state: {e}"),
    })
}

/// Apply an advisor reply to the strategies and risk limits.
pub fn apply_response(
    response: &Value,
    risk: &mut RiskConfig,
    strategies: &mut [Box<dyn Strategy>],
) -> Result<(), HftaError> {
    let Some(obj) = response.as_object() else {
        return Err(HftaError::Advisor {
            reason: format!("reply JSON must be an object, got {response}"),
        });
    };

    if let Some(ideas) = obj.get("code_change_ideas").filter(|v| is_truthy(v)) {
        match ideas.as_str() {
            Some(text) => tracing::info!("Advisor code/logic ideas:\n{text}"),
            None => tracing::info!("Advisor code/logic ideas:\n{ideas}"),
        }
    }

    if let Some(updates) = obj.get("strategy_updates").and_then(Value::as_array) {
        if !updates.is_empty() {
            let rendered = Value::Array(updates.clone()).to_string();
            tracing::info!("Advisor strategy_updates: {rendered}");
            apply_strategy_updates(updates, strategies);
        }
    }

    if let Some(updates) = obj.get("risk_updates").and_then(Value::as_object) {
        if !updates.is_empty() {
            let rendered = Value::Object(updates.clone()).to_string();
            tracing::info!("Advisor risk_updates: {rendered}");
            apply_risk_updates(updates, risk);
        }
    }

    if risk.allow_short_selling {
        risk.allow_short_selling = false;
        tracing::info!("Tuner enforced allow_short_selling=false");
    }
    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

/// Move `old` towards `new` by at most a factor of `limit`, keeping the sign of `new`.
fn clamp_step(old: f64, new: f64, limit: f64) -> f64 {
    if old != 0.0 && (new / old).abs() > limit {
        if new > 0.0 {
            old * limit
        } else {
            old * -limit
        }
    } else {
        new
    }
}

fn apply_strategy_updates(updates: &[Value], strategies: &mut [Box<dyn Strategy>]) {
    for update in updates {
        let Some(name) = update.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(strategy) = strategies.iter_mut().find(|s| s.name() == name) else {
            tracing::debug!("Tuner: no strategy named {name:?}; skipping");
            continue;
        };
        let Some(params) = update.get("params").and_then(Value::as_object) else {
            continue;
        };

        let current = strategy.params();
        for (key, value) in params {
            let Some(&old) = current.get(key) else {
                tracing::debug!("Tuner: strategy {name} has no parameter {key:?}; skipping");
                continue;
            };
            let Some(new) = value.as_f64() else {
                tracing::debug!("Tuner: value for {name}.{key} is not numeric; skipping");
                continue;
            };
            let new = clamp_step(old, new, STRATEGY_STEP_LIMIT);
            if strategy.set_param(key, new) {
                tracing::info!("Tuner updated strategy {name}: {key} {old:.4} -> {new:.4}");
            } else {
                tracing::debug!("Tuner: strategy {name} rejected {key}={new}");
            }
        }
    }
}

fn apply_risk_updates(updates: &Map<String, Value>, risk: &mut RiskConfig) {
    for (key, value) in updates {
        match key.as_str() {
            "max_notional_per_order" | "max_cash_utilization" => {
                let Some(new) = value.as_f64() else {
                    tracing::debug!("Tuner: risk value for {key} is not numeric; skipping");
                    continue;
                };
                let slot = if key == "max_notional_per_order" {
                    &mut risk.max_notional_per_order
                } else {
                    &mut risk.max_cash_utilization
                };
                let old = *slot;
                *slot = clamp_step(old, new, RISK_STEP_LIMIT);
                tracing::info!("Tuner updated risk: {key} {old:.4} -> {:.4}", *slot);
            }
            "allow_short_selling" => {
                let new = match value {
                    Value::Bool(b) => *b,
                    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                    _ => {
                        tracing::debug!("Tuner: allow_short_selling must be a bool; skipping");
                        continue;
                    }
                };
                tracing::info!(
                    "Tuner updated risk bool: allow_short_selling {} -> {new}",
                    risk.allow_short_selling
                );
                risk.allow_short_selling = new;
            }
            other => tracing::debug!("Tuner: unknown risk field {other:?}; skipping"),
        }
    }
}
