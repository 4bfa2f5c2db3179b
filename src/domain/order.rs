//! Order intents emitted by strategies.

use super::quote::{OrderType, Quote, Side};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub order_type: OrderType,
    pub strategy_name: Option<String>,
    pub limit_price: Option<f64>,
    pub meta: BTreeMap<String, String>,
}

impl OrderIntent {
    pub fn limit(symbol: &str, side: Side, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            side,
            quantity,
            order_type: OrderType::Limit,
            strategy_name: None,
            limit_price: Some(price),
            meta: BTreeMap::new(),
        }
    }

    pub fn market(symbol: &str, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            side,
            quantity,
            order_type: OrderType::Market,
            strategy_name: None,
            limit_price: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_strategy(mut self, name: &str) -> Self {
        self.strategy_name = Some(name.to_string());
        self
    }

    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        self.meta.insert(key.to_string(), value.to_string());
        self
    }

    /// Price used for risk sizing and fill tracking: the limit price, then the
    /// last trade, then the side of the book the order would cross.
    pub fn reference_price(&self, quote: &Quote) -> Option<f64> {
        self.limit_price.or(quote.last).or(match self.side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        })
    }

    pub fn notional(&self, price: f64) -> f64 {
        price * self.quantity
    }
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.quantity, self.symbol)?;
        match self.limit_price {
            Some(px) => write!(f, " @ {px:.2} {}", self.order_type)?,
            None => write!(f, " {}", self.order_type)?,
        }
        if let Some(name) = &self.strategy_name {
            write!(f, " [{name}]")?;
        }
        Ok(())
    }
}
