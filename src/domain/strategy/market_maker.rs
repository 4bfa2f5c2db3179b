//! Single-symbol market maker with a volatility-scaled spread.
//!
//! Quotes a bid and an ask around the mid. The half-spread starts at
//! `base_spread` and widens with the relative volatility of recent mids,
//! clamped to `[min_spread, max_spread]`. Inventory is kept within
//! `±max_inventory` as reported through [`Strategy::sync_position`].

use super::{required_symbol, Strategy};
use crate::domain::error::HftaError;
use crate::domain::order::OrderIntent;
use crate::domain::quote::{Quote, Side};
use crate::ports::config_port::ConfigPort;
use std::collections::{BTreeMap, VecDeque};

const MIN_PRICE: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct MicroMarketMaker {
    name: String,
    symbol: String,
    pub max_inventory: f64,
    pub base_spread: f64,
    pub order_quantity: f64,
    pub min_spread: f64,
    pub max_spread: f64,
    pub vol_window: usize,
    pub vol_to_spread: f64,
    position: f64,
    spread: f64,
    mids: VecDeque<f64>,
}

impl MicroMarketMaker {
    pub const KIND: &'static str = "micro_market_maker";

    pub fn new(name: &str, symbol: &str, base_spread: f64) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_uppercase(),
            max_inventory: 5.0,
            base_spread,
            order_quantity: 1.0,
            min_spread: base_spread / 2.0,
            max_spread: base_spread * 2.0,
            vol_window: 50,
            vol_to_spread: 1.0,
            position: 0.0,
            spread: base_spread,
            mids: VecDeque::new(),
        }
    }

    pub fn from_config(
        name: &str,
        config: &dyn ConfigPort,
        section: &str,
    ) -> Result<Self, HftaError> {
        let symbol = required_symbol(config, section)?;
        let base_spread = config.get_double(section, "spread", 0.05);
        if base_spread < 0.0 {
            return Err(HftaError::InvalidStrategy {
                name: name.to_string(),
                reason: "spread must be non-negative".into(),
            });
        }
        let vol_window = config.get_int(section, "vol_window", 50);
        if vol_window < 0 {
            return Err(HftaError::InvalidStrategy {
                name: name.to_string(),
                reason: "vol_window must be non-negative".into(),
            });
        }

        let mut mm = Self::new(name, &symbol, base_spread);
        mm.max_inventory = config.get_double(section, "max_inventory", 5.0);
        mm.order_quantity = config.get_double(section, "order_quantity", 1.0);
        mm.min_spread = config.get_double(section, "min_spread", base_spread / 2.0);
        mm.max_spread = config.get_double(section, "max_spread", base_spread * 2.0);
        mm.vol_window = vol_window as usize;
        mm.vol_to_spread = config.get_double(section, "vol_to_spread", 1.0);

        if mm.min_spread > mm.max_spread {
            return Err(HftaError::InvalidStrategy {
                name: name.to_string(),
                reason: format!(
                    "min_spread {} exceeds max_spread {}",
                    mm.min_spread, mm.max_spread
                ),
            });
        }
        Ok(mm)
    }

    /// Spread applied to the most recent quote.
    pub fn current_spread(&self) -> f64 {
        self.spread
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    fn update_spread(&mut self, mid: f64) -> f64 {
        if mid <= 0.0 {
            self.spread = self.base_spread;
            return self.spread;
        }

        self.mids.push_back(mid);
        let keep = self.vol_window.max(2);
        while self.mids.len() > keep {
            self.mids.pop_front();
        }

        let effective = if self.mids.len() < 2 || self.vol_window <= 1 {
            self.base_spread
        } else {
            let n = self.mids.len() as f64;
            let mean = self.mids.iter().sum::<f64>() / n;
            if mean <= 0.0 {
                self.base_spread
            } else {
                let var = self.mids.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
                let rel_vol = var.sqrt() / mean;
                self.base_spread * (1.0 + self.vol_to_spread * rel_vol)
            }
        };

        self.spread = effective.min(self.max_spread).max(self.min_spread);
        self.spread
    }

    fn quote_intent(&self, side: Side, price: f64) -> OrderIntent {
        OrderIntent::limit(&self.symbol, side, self.order_quantity, price)
            .with_strategy(&self.name)
            .with_meta("strategy", &self.name)
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Strategy for MicroMarketMaker {
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
            self.mids.clear();
            self.position = 0.0;
        }
    }

    fn on_quote(&mut self, quote: &Quote) -> Vec<OrderIntent> {
        if !quote.symbol.eq_ignore_ascii_case(&self.symbol) {
            return Vec::new();
        }
        let (Some(bid), Some(ask)) = (quote.bid, quote.ask) else {
            return Vec::new();
        };

        let mid = (bid + ask) / 2.0;
        let spread = self.update_spread(mid);
        let bid_px = round_cents(mid - spread).max(MIN_PRICE);
        let ask_px = round_cents(mid + spread).max(MIN_PRICE);

        let mut intents = Vec::with_capacity(2);
        if self.position < self.max_inventory {
            intents.push(self.quote_intent(Side::Buy, bid_px));
        }
        if self.position > -self.max_inventory {
            intents.push(self.quote_intent(Side::Sell, ask_px));
        }
        intents
    }

    fn sync_position(&mut self, quantity: f64) {
        self.position = quantity;
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("spread".to_string(), self.base_spread),
            ("max_inventory".to_string(), self.max_inventory),
            ("order_quantity".to_string(), self.order_quantity),
            ("min_spread".to_string(), self.min_spread),
            ("max_spread".to_string(), self.max_spread),
            ("vol_to_spread".to_string(), self.vol_to_spread),
        ])
    }

    fn set_param(&mut self, key: &str, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match key {
            "spread" | "base_spread" => self.base_spread = value,
            "max_inventory" => self.max_inventory = value,
            "order_quantity" => self.order_quantity = value,
            "min_spread" => self.min_spread = value,
            "max_spread" => self.max_spread = value,
            "vol_to_spread" => self.vol_to_spread = value,
            _ => return false,
        }
        true
    }
}
