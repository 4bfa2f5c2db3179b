//! Synthetic quote generation for offline runs.

use super::error::HftaError;
use super::quote::Quote;
use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use rand_distr::StandardNormal;

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;
const MIN_PRICE: f64 = 0.01;

/// Upper bound on `steps` for one synthetic run.
pub const MAX_STEPS: i64 = 1_000_000;
/// Upper bound on `step_seconds`: one quote a day.
pub const MAX_STEP_SECONDS: i64 = 86_400;

/// Parameters of the simulated market.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticMarket {
    pub starting_price: f64,
    pub steps: i64,
    pub step_seconds: i64,
    pub volatility_annual: f64,
    pub spread_cents: f64,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Zero-drift geometric Brownian motion quotes, `dS/S = sigma * sqrt(dt) * Z`.
///
/// Bid and ask sit `spread_cents / 2` either side of the mid; the bid is
/// floored at one cent and the ask is kept strictly above the bid.
///
/// Fails when `steps` or `step_seconds` exceed their bounds, or when a
/// timestamp would fall outside the representable date range.
pub fn generate_random_walk_quotes<R: Rng + ?Sized>(
    symbol: &str,
    market: &SyntheticMarket,
    rng: &mut R,
    start: NaiveDateTime,
) -> Result<Vec<Quote>, HftaError> {
    if market.steps <= 0 {
        return Ok(Vec::new());
    }
    if market.steps > MAX_STEPS {
        return Err(HftaError::config_invalid(
            "backtest",
            "steps",
            format!("steps must be at most {MAX_STEPS}"),
        ));
    }
    if !(1..=MAX_STEP_SECONDS).contains(&market.step_seconds) {
        return Err(HftaError::config_invalid(
            "backtest",
            "step_seconds",
            format!("step_seconds must be between 1 and {MAX_STEP_SECONDS}"),
        ));
    }

    let symbol = symbol.to_uppercase();
    let dt_years = market.step_seconds as f64 / SECONDS_PER_YEAR;
    let step_scale = market.volatility_annual * dt_years.sqrt();
    let half_spread = market.spread_cents / 2.0;

    let mut price = market.starting_price;
    let mut quotes = Vec::with_capacity(market.steps as usize);

    for i in 0..market.steps {
        let timestamp = i
            .checked_mul(market.step_seconds)
            .and_then(Duration::try_seconds)
            .and_then(|offset| start.checked_add_signed(offset))
            .ok_or_else(|| {
                HftaError::config_invalid(
                    "backtest",
                    "step_seconds",
                    format!("quote {i} falls outside the supported date range"),
                )
            })?;
        let z: f64 = rng.sample(StandardNormal);
        price *= (step_scale * z).exp();

        let mid = price.max(MIN_PRICE);
        let mut bid = mid - half_spread;
        let mut ask = mid + half_spread;
        if bid < MIN_PRICE {
            bid = MIN_PRICE;
        }
        if ask <= bid {
            ask = bid + market.spread_cents;
        }

        quotes.push(Quote {
            symbol: symbol.clone(),
            security_id: format!("SIM-{symbol}"),
            bid: Some(round4(bid)),
            ask: Some(round4(ask)),
            last: Some(round4(mid)),
            bid_size: None,
            ask_size: None,
            timestamp: Some(timestamp),
        });
    }

    Ok(quotes)
}
