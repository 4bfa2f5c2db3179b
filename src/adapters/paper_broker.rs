//! In-memory broker for dry runs.
//!
//! Reports a fixed cash account with no holdings and acknowledges every valid
//! order with a synthetic id. It has no market data, so the engine must be
//! paired with a separate quote provider.

use crate::domain::error::HftaError;
use crate::domain::order::OrderIntent;
use crate::domain::quote::{Holding, PortfolioSnapshot, Quote};
use crate::ports::broker_port::{BrokerPort, OrderAck, validate_order};
use crate::ports::config_port::ConfigPort;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct PaperBroker {
    account_id: String,
    currency: String,
    cash: f64,
    next_order: AtomicU64,
}

impl PaperBroker {
    pub fn new(account_id: &str, currency: &str, cash: f64) -> Self {
        Self {
            account_id: account_id.to_string(),
            currency: currency.to_string(),
            cash,
            next_order: AtomicU64::new(1),
        }
    }

    /// `[broker] account_id` / `currency`; cash comes from `[engine] paper_cash`.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        Self::new(
            &config
                .get_string("broker", "account_id")
                .unwrap_or_else(|| "PAPER".to_string()),
            &config
                .get_string("broker", "currency")
                .unwrap_or_else(|| "USD".to_string()),
            config.get_double("engine", "paper_cash", 0.0).max(0.0),
        )
    }
}

#[async_trait]
impl BrokerPort for PaperBroker {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, HftaError> {
        Err(HftaError::MarketData {
            symbol: symbol.to_uppercase(),
            reason: "paper broker has no market data".into(),
        })
    }

    async fn portfolio_snapshot(&self) -> Result<PortfolioSnapshot, HftaError> {
        Ok(PortfolioSnapshot {
            account_id: self.account_id.clone(),
            currency: self.currency.clone(),
            net_worth: self.cash,
            cash_available: self.cash,
        })
    }

    async fn equity_positions(&self) -> Result<HashMap<String, Holding>, HftaError> {
        Ok(HashMap::new())
    }

    async fn place_equity_order(&self, intent: &OrderIntent) -> Result<OrderAck, HftaError> {
        validate_order(intent)?;
        let n = self.next_order.fetch_add(1, Ordering::Relaxed);
        tracing::info!("[PAPER] accepted {intent}");
        Ok(OrderAck {
            order_id: format!("PAPER-{n:06}"),
            status: "accepted".into(),
        })
    }
}
