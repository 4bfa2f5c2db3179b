//! Per-symbol position state and fills.

use super::quote::Side;
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub timestamp: Option<NaiveDateTime>,
    pub strategy_name: Option<String>,
}

impl Fill {
    /// Signed cash flow of the fill: negative for buys, positive for sells.
    pub fn cash_flow(&self) -> f64 {
        match self.side {
            Side::Buy => -self.price * self.quantity,
            Side::Sell => self.price * self.quantity,
        }
    }
}

/// Net position in one symbol. Positive quantity is long, negative is short.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionState {
    pub quantity: f64,
    pub avg_price: f64,
    pub realized_pnl: f64,
}

impl PositionState {
    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.avg_price)
    }

    /// Apply a fill, returning the PnL it realized.
    pub fn apply(&mut self, side: Side, qty: f64, price: f64) -> f64 {
        let before = self.realized_pnl;
        match side {
            Side::Buy if self.quantity >= 0.0 => {
                let new_qty = self.quantity + qty;
                if new_qty > 0.0 {
                    self.avg_price = (self.avg_price * self.quantity + price * qty) / new_qty;
                }
                self.quantity = new_qty;
            }
            Side::Buy => {
                let closing = qty.min(-self.quantity);
                self.realized_pnl += (self.avg_price - price) * closing;
                self.quantity += closing;
                let remaining = qty - closing;
                if remaining > 0.0 {
                    self.quantity = remaining;
                    self.avg_price = price;
                }
            }
            Side::Sell if self.quantity <= 0.0 => {
                let abs_old = -self.quantity;
                let abs_new = abs_old + qty;
                if abs_new > 0.0 {
                    self.avg_price = (self.avg_price * abs_old + price * qty) / abs_new;
                }
                self.quantity -= qty;
            }
            Side::Sell => {
                let closing = qty.min(self.quantity);
                self.realized_pnl += (price - self.avg_price) * closing;
                self.quantity -= closing;
                let remaining = qty - closing;
                if remaining > 0.0 {
                    self.quantity = -remaining;
                    self.avg_price = price;
                }
            }
        }
        if self.is_flat() {
            self.avg_price = 0.0;
        }
        self.realized_pnl - before
    }
}
