//! Configuration validation.
//!
//! Range-checks every section before a run so bad values fail fast with the
//! offending section and key.

use crate::domain::error::HftaError;
use crate::domain::strategy::build_strategies;
use crate::domain::synthetic::{MAX_STEPS, MAX_STEP_SECONDS};
use crate::ports::config_port::ConfigPort;

/// Longest poll interval or cooldown, in seconds.
pub const MAX_SECONDS: f64 = 86_400.0;
pub const MAX_TIMEOUT_SECONDS: f64 = 600.0;
pub const MAX_CASH: f64 = 1e12;
pub const MAX_PRICE: f64 = 1e6;
pub const MAX_INTERVAL_LOOPS: i64 = 1_000_000;
pub const MAX_LOOKBACK_DAYS: i64 = 365;

/// Validate every section a live run reads.
pub fn validate_run_config(config: &dyn ConfigPort) -> Result<(), HftaError> {
    validate_engine_config(config)?;
    validate_risk_config(config)?;
    validate_strategy_config(config)?;
    validate_broker_config(config)?;
    validate_quotes_config(config)?;
    validate_ai_config(config)?;
    validate_selector_config(config)?;
    validate_universe_config(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), HftaError> {
    positive(config, "backtest", "starting_price", 40.0, MAX_PRICE)?;
    positive(config, "backtest", "starting_cash", 100_000.0, MAX_CASH)?;
    non_negative(config, "backtest", "volatility_annual", 0.4, 10.0)?;
    positive(config, "backtest", "spread_cents", 0.10, MAX_PRICE)?;
    int_between(config, "backtest", "steps", 2000, 1, MAX_STEPS)?;
    int_between(config, "backtest", "step_seconds", 5, 1, MAX_STEP_SECONDS)?;
    if let Some(seed) = config.get_string("backtest", "seed") {
        if !seed.trim().is_empty() && seed.trim().parse::<u64>().is_err() {
            return Err(HftaError::config_invalid(
                "backtest",
                "seed",
                "seed must be a non-negative integer",
            ));
        }
    }
    validate_risk_config(config)?;
    validate_strategy_config(config)
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), HftaError> {
    if let Some(symbols) = config.get_string("engine", "symbols") {
        if symbols.split(',').all(|s| s.trim().is_empty()) {
            return Err(HftaError::config_invalid(
                "engine",
                "symbols",
                "symbols must list at least one ticker",
            ));
        }
    }
    positive(config, "engine", "poll_interval", 5.0, MAX_SECONDS)?;
    non_negative(config, "engine", "paper_cash", 0.0, MAX_CASH)
}

pub fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), HftaError> {
    positive(config, "risk", "max_notional_per_order", 100.0, MAX_CASH)?;
    positive(config, "risk", "max_cash_utilization", 0.1, 1.0)
}

/// Every `[strategy.<name>]` section must build. At least one is required.
pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), HftaError> {
    let strategies = build_strategies(config)?;
    if strategies.is_empty() {
        return Err(HftaError::ConfigMissing {
            section: "strategy.<name>".to_string(),
            key: "type".to_string(),
        });
    }
    Ok(())
}

pub fn validate_broker_config(config: &dyn ConfigPort) -> Result<(), HftaError> {
    one_of(config, "broker", "provider", "paper", &["paper", "alpaca"])
}

pub fn validate_quotes_config(config: &dyn ConfigPort) -> Result<(), HftaError> {
    one_of(config, "quotes", "provider", "broker", &["broker", "finnhub"])?;
    int_between(config, "quotes", "max_workers", 4, 1, 256)?;
    int_between(config, "quotes", "max_calls_per_minute", 60, 1, 100_000)?;
    positive(config, "quotes", "timeout", 1.5, MAX_TIMEOUT_SECONDS)?;
    non_negative(config, "quotes", "rate_limit_cooldown", 60.0, MAX_SECONDS)
}

pub fn validate_ai_config(config: &dyn ConfigPort) -> Result<(), HftaError> {
    int_between(config, "ai", "interval_loops", 12, 1, MAX_INTERVAL_LOOPS)?;
    int_between(config, "ai", "max_output_tokens", 512, 1, 128_000)?;
    non_negative(config, "ai", "temperature", 0.2, 2.0)
}

pub fn validate_selector_config(config: &dyn ConfigPort) -> Result<(), HftaError> {
    one_of(
        config,
        "selector",
        "mode",
        "hybrid",
        &["heuristic", "advisor", "gpt", "hybrid"],
    )?;
    int_between(config, "selector", "interval_loops", 60, 1, MAX_INTERVAL_LOOPS)?;
    int_between(config, "selector", "min_trades", 3, 1, MAX_INTERVAL_LOOPS)
}

pub fn validate_universe_config(config: &dyn ConfigPort) -> Result<(), HftaError> {
    int_between(config, "universe", "max_symbols", 50, 0, 10_000)?;
    int_between(config, "universe", "lookback_days", 3, 1, MAX_LOOKBACK_DAYS)?;
    non_negative(config, "universe", "min_price", 5.0, MAX_PRICE)?;
    non_negative(config, "universe", "max_price", 500.0, MAX_PRICE)?;
    non_negative(config, "universe", "min_dollar_volume", 20_000_000.0, MAX_CASH * 1_000.0)?;
    let min = config.get_double("universe", "min_price", 5.0);
    let max = config.get_double("universe", "max_price", 500.0);
    if max < min {
        return Err(HftaError::config_invalid(
            "universe",
            "max_price",
            "max_price must be >= min_price",
        ));
    }
    Ok(())
}

/// `0 < value <= max`. NaN and infinities fail.
fn positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
    max: f64,
) -> Result<(), HftaError> {
    let value = config.get_double(section, key, default);
    if !(value > 0.0 && value <= max) {
        return Err(HftaError::config_invalid(
            section,
            key,
            format!("{key} must be in (0, {max}]"),
        ));
    }
    Ok(())
}

/// `0 <= value <= max`. NaN and infinities fail.
fn non_negative(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
    max: f64,
) -> Result<(), HftaError> {
    let value = config.get_double(section, key, default);
    if !(value >= 0.0 && value <= max) {
        return Err(HftaError::config_invalid(
            section,
            key,
            format!("{key} must be in [0, {max}]"),
        ));
    }
    Ok(())
}

fn int_between(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    min: i64,
    max: i64,
) -> Result<(), HftaError> {
    if !(min..=max).contains(&config.get_int(section, key, default)) {
        return Err(HftaError::config_invalid(
            section,
            key,
            format!("{key} must be between {min} and {max}"),
        ));
    }
    Ok(())
}

fn one_of(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: &str,
    allowed: &[&str],
) -> Result<(), HftaError> {
    let value = config
        .get_string(section, key)
        .unwrap_or_else(|| default.to_string());
    if !allowed.contains(&value.trim().to_lowercase().as_str()) {
        return Err(HftaError::config_invalid(
            section,
            key,
            format!("expected one of {}, got {value:?}", allowed.join("|")),
        ));
    }
    Ok(())
}
