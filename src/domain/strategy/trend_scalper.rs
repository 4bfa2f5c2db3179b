//! Short-horizon trend follower on the mid price.
//!
//! Buys when the short moving average rises above the long one by more than
//! `trend_threshold` (relative), sells when it falls below. Orders are only
//! emitted when the signal changes.

use super::{required_symbol, Strategy};
use crate::domain::error::HftaError;
use crate::domain::order::OrderIntent;
use crate::domain::quote::{Quote, Side};
use crate::ports::config_port::ConfigPort;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendSignal {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct MicroTrendScalper {
    name: String,
    symbol: String,
    pub order_quantity: f64,
    short_window: usize,
    long_window: usize,
    pub trend_threshold: f64,
    pub max_position: f64,
    prices: VecDeque<f64>,
    last_signal: Option<TrendSignal>,
}

impl MicroTrendScalper {
    pub const KIND: &'static str = "micro_trend_scalper";

    pub fn new(
        name: &str,
        symbol: &str,
        short_window: usize,
        long_window: usize,
    ) -> Result<Self, HftaError> {
        validate_windows(name, short_window as i64, long_window as i64)?;
        Ok(Self {
            name: name.to_string(),
            symbol: symbol.to_uppercase(),
            order_quantity: 1.0,
            short_window,
            long_window,
            trend_threshold: 0.0005,
            max_position: 5.0,
            prices: VecDeque::with_capacity(long_window + 1),
            last_signal: None,
        })
    }

    pub fn from_config(
        name: &str,
        config: &dyn ConfigPort,
        section: &str,
    ) -> Result<Self, HftaError> {
        let symbol = required_symbol(config, section)?;
        let short_window = config.get_int(section, "short_window", 5);
        let long_window = config.get_int(section, "long_window", 20);
        validate_windows(name, short_window, long_window)?;

        let mut scalper = Self::new(name, &symbol, short_window as usize, long_window as usize)?;
        scalper.order_quantity = config.get_double(section, "order_quantity", 1.0);
        scalper.trend_threshold = config.get_double(section, "trend_threshold", 0.0005);
        scalper.max_position = config.get_double(section, "max_position", 5.0);
        Ok(scalper)
    }

    pub fn short_window(&self) -> usize {
        self.short_window
    }

    pub fn long_window(&self) -> usize {
        self.long_window
    }

    pub fn last_signal(&self) -> Option<TrendSignal> {
        self.last_signal
    }

    fn signal_intent(&self, signal: TrendSignal, mid: f64) -> OrderIntent {
        let (side, quantity, tag) = match signal {
            TrendSignal::Up => (
                Side::Buy,
                self.order_quantity.min(self.max_position),
                "trend_up",
            ),
            TrendSignal::Down => (Side::Sell, self.order_quantity, "trend_down"),
        };
        OrderIntent::limit(&self.symbol, side, quantity, mid)
            .with_strategy(&self.name)
            .with_meta("strategy", &self.name)
            .with_meta("signal", tag)
    }
}

fn validate_windows(name: &str, short: i64, long: i64) -> Result<(), HftaError> {
    if short <= 0 || long <= 0 {
        return Err(HftaError::InvalidStrategy {
            name: name.to_string(),
            reason: "short_window and long_window must be > 0".into(),
        });
    }
    if short >= long {
        return Err(HftaError::InvalidStrategy {
            name: name.to_string(),
            reason: "short_window must be < long_window".into(),
        });
    }
    Ok(())
}

/// Mean of whichever sides of the book are present.
fn mid_price(quote: &Quote) -> Option<f64> {
    match (quote.bid, quote.ask) {
        (Some(b), Some(a)) => Some((b + a) / 2.0),
        (Some(p), None) | (None, Some(p)) => Some(p),
        (None, None) => None,
    }
}

impl Strategy for MicroTrendScalper {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn set_symbol(&mut self, symbol: &str) {
        let symbol = symbol.to_uppercase();
        if symbol != self.symbol {
            self.symbol = symbol;
            self.prices.clear();
            self.last_signal = None;
        }
    }

    fn on_quote(&mut self, quote: &Quote) -> Vec<OrderIntent> {
        if !quote.symbol.eq_ignore_ascii_case(&self.symbol) {
            return Vec::new();
        }
        let Some(mid) = mid_price(quote) else {
            return Vec::new();
        };

        self.prices.push_back(mid);
        while self.prices.len() > self.long_window {
            self.prices.pop_front();
        }
        if self.prices.len() < self.long_window {
            return Vec::new();
        }

        let short = self.prices.iter().rev().take(self.short_window).sum::<f64>()
            / self.short_window as f64;
        let long = self.prices.iter().sum::<f64>() / self.prices.len() as f64;
        if long == 0.0 {
            return Vec::new();
        }

        let rel = (short - long) / long;
        let signal = if rel > self.trend_threshold {
            Some(TrendSignal::Up)
        } else if rel < -self.trend_threshold {
            Some(TrendSignal::Down)
        } else {
            None
        };

        let previous = std::mem::replace(&mut self.last_signal, signal);
        match signal {
            Some(s) if previous != Some(s) => vec![self.signal_intent(s, mid)],
            _ => Vec::new(),
        }
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("order_quantity".to_string(), self.order_quantity),
            ("short_window".to_string(), self.short_window as f64),
            ("long_window".to_string(), self.long_window as f64),
            ("trend_threshold".to_string(), self.trend_threshold),
            ("max_position".to_string(), self.max_position),
        ])
    }

    fn set_param(&mut self, key: &str, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match key {
            "order_quantity" => self.order_quantity = value,
            "trend_threshold" => self.trend_threshold = value,
            "max_position" => self.max_position = value,
            "short_window" | "long_window" => {
                let window = value.round() as i64;
                let (short, long) = if key == "short_window" {
                    (window, self.long_window as i64)
                } else {
                    (self.short_window as i64, window)
                };
                if validate_windows(&self.name, short, long).is_err() {
                    return false;
                }
                self.short_window = short as usize;
                self.long_window = long as usize;
                while self.prices.len() > self.long_window {
                    self.prices.pop_front();
                }
            }
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn sample_scalper() -> MicroTrendScalper {
        let mut s = MicroTrendScalper::new("trend_AAPL", "AAPL", 2, 4).unwrap();
        s.trend_threshold = 0.001;
        s
    }

    fn feed(s: &mut MicroTrendScalper, mids: &[f64]) -> Vec<Vec<OrderIntent>> {
        mids.iter()
            .map(|m| s.on_quote(&Quote::with_bid_ask("AAPL", m - 0.01, m + 0.01)))
            .collect()
    }

    #[test]
    fn window_validation() {
        assert!(MicroTrendScalper::new("t", "AAPL", 0, 5).is_err());
        assert!(MicroTrendScalper::new("t", "AAPL", 5, 5).is_err());
        assert!(MicroTrendScalper::new("t", "AAPL", 6, 5).is_err());
        assert!(MicroTrendScalper::new("t", "AAPL", 3, 5).is_ok());
    }

    #[test]
    fn from_config_rejects_negative_window() {
        let cfg = FileConfigAdapter::from_string("[s]\nsymbol = AAPL\nshort_window = -1\n").unwrap();
        assert!(matches!(
            MicroTrendScalper::from_config("t", &cfg, "s"),
            Err(HftaError::InvalidStrategy { .. })
        ));
    }

    #[test]
    fn from_config_defaults() {
        let cfg = FileConfigAdapter::from_string("[s]\nsymbol = msft\n").unwrap();
        let s = MicroTrendScalper::from_config("t", &cfg, "s").unwrap();
        assert_eq!(s.symbol(), "MSFT");
        assert_eq!(s.short_window(), 5);
        assert_eq!(s.long_window(), 20);
        assert!((s.trend_threshold - 0.0005).abs() < f64::EPSILON);
    }

    #[test]
    fn waits_for_full_window() {
        let mut s = sample_scalper();
        let out = feed(&mut s, &[100.0, 101.0, 102.0]);
        assert!(out.iter().all(|v| v.is_empty()));
    }

    #[test]
    fn uptrend_emits_single_buy() {
        let mut s = sample_scalper();
        let out = feed(&mut s, &[100.0, 100.0, 101.0, 102.0, 103.0]);
        let buys: Vec<_> = out.iter().flatten().collect();
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].side, Side::Buy);
        assert_eq!(buys[0].meta.get("signal").map(String::as_str), Some("trend_up"));
        assert_eq!(s.last_signal(), Some(TrendSignal::Up));
    }

    #[test]
    fn downtrend_emits_sell_at_mid() {
        let mut s = sample_scalper();
        let out = feed(&mut s, &[103.0, 103.0, 102.0, 101.0]);
        let last = &out[3];
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].side, Side::Sell);
        assert!((last[0].limit_price.unwrap() - 101.0).abs() < 1e-9);
    }

    #[test]
    fn flat_resets_signal_so_trend_can_repeat() {
        let mut s = sample_scalper();
        feed(&mut s, &[100.0, 100.0, 101.0, 102.0]);
        assert_eq!(s.last_signal(), Some(TrendSignal::Up));
        feed(&mut s, &[102.0, 102.0, 102.0, 102.0]);
        assert_eq!(s.last_signal(), None);
        let out = feed(&mut s, &[103.0, 104.0]);
        assert_eq!(out.iter().flatten().count(), 1);
    }

    #[test]
    fn buy_quantity_capped_by_max_position() {
        let mut s = sample_scalper();
        s.order_quantity = 10.0;
        s.max_position = 3.0;
        let out = feed(&mut s, &[100.0, 100.0, 101.0, 102.0]);
        let buy = out.iter().flatten().next().unwrap();
        assert!((buy.quantity - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn uses_single_side_when_other_missing() {
        let mut q = Quote::with_bid_ask("AAPL", 10.0, 12.0);
        assert_eq!(mid_price(&q), Some(11.0));
        q.ask = None;
        assert_eq!(mid_price(&q), Some(10.0));
        q.bid = None;
        assert_eq!(mid_price(&q), None);
    }

    #[test]
    fn window_params_keep_ordering() {
        let mut s = sample_scalper();
        assert!(!s.set_param("short_window", 4.0));
        assert!(s.set_param("short_window", 2.6));
        assert_eq!(s.short_window(), 3);
        assert!(!s.set_param("long_window", 3.0));
        assert!(s.set_param("long_window", 8.0));
        assert_eq!(s.params()["long_window"], 8.0);
        assert!(!s.set_param("spread", 1.0));
    }
}
