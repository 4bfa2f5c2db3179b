//! Running per-symbol intraday statistics fed from live quotes.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct SymbolIntradayStats {
    first_price: Option<f64>,
    last_price: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    count: u64,
    sum_ret: f64,
    sum_ret_sq: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntradayMetrics {
    pub intraday_return: f64,
    pub volatility: f64,
    pub range_pct: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub count: u64,
    pub last_price: Option<f64>,
}

impl SymbolIntradayStats {
    pub fn update(&mut self, price: f64) {
        if price.is_nan() || price <= 0.0 {
            return;
        }
        let Some(last) = self.last_price else {
            self.first_price = Some(price);
            self.last_price = Some(price);
            self.high = Some(price);
            self.low = Some(price);
            self.count = 1;
            return;
        };

        self.high = self.high.map(|h| h.max(price));
        self.low = self.low.map(|l| l.min(price));
        if last > 0.0 {
            let r = (price / last).ln();
            self.sum_ret += r;
            self.sum_ret_sq += r * r;
        }
        self.last_price = Some(price);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn as_metrics(&self) -> IntradayMetrics {
        let intraday_return = match (self.first_price, self.last_price) {
            (Some(first), Some(last)) if self.count > 1 && first > 0.0 => (last - first) / first,
            _ => 0.0,
        };

        let volatility = if self.count > 2 {
            let n_ret = (self.count - 1) as f64;
            let mean = self.sum_ret / n_ret;
            let var = (self.sum_ret_sq / n_ret - mean * mean).max(0.0);
            var.sqrt() * n_ret.sqrt()
        } else {
            0.0
        };

        let range_pct = match (self.high, self.low) {
            (Some(h), Some(l)) if l > 0.0 => (h - l) / l,
            _ => 0.0,
        };

        IntradayMetrics {
            intraday_return,
            volatility,
            range_pct,
            high: self.high,
            low: self.low,
            count: self.count,
            last_price: self.last_price,
        }
    }
}

/// Intraday stats keyed by uppercase symbol.
#[derive(Debug, Default)]
pub struct IntradayStatsTracker {
    stats: BTreeMap<String, SymbolIntradayStats>,
}

impl IntradayStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_quote(&mut self, symbol: &str, price: f64) {
        self.stats
            .entry(symbol.to_uppercase())
            .or_default()
            .update(price);
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolIntradayStats> {
        self.stats.get(&symbol.to_uppercase())
    }

    pub fn summary(&self) -> BTreeMap<String, IntradayMetrics> {
        self.stats
            .iter()
            .map(|(symbol, s)| (symbol.clone(), s.as_metrics()))
            .collect()
    }
}
