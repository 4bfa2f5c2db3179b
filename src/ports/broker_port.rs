//! Brokerage account and order routing port.

use crate::domain::error::HftaError;
use crate::domain::order::OrderIntent;
use crate::domain::quote::{Holding, OrderType, PortfolioSnapshot, Quote};
use async_trait::async_trait;
use std::collections::HashMap;

/// Broker acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub status: String,
}

#[async_trait]
pub trait BrokerPort: Send + Sync {
    fn account_id(&self) -> &str;

    fn currency(&self) -> &str;

    async fn get_quote(&self, symbol: &str) -> Result<Quote, HftaError>;

    async fn portfolio_snapshot(&self) -> Result<PortfolioSnapshot, HftaError>;

    /// Open equity positions keyed by uppercase symbol.
    async fn equity_positions(&self) -> Result<HashMap<String, Holding>, HftaError>;

    async fn place_equity_order(&self, intent: &OrderIntent) -> Result<OrderAck, HftaError>;
}

/// Checks every broker applies before sending an order.
pub fn validate_order(intent: &OrderIntent) -> Result<(), HftaError> {
    if intent.quantity.is_nan() || intent.quantity <= 0.0 {
        return Err(HftaError::InvalidOrder {
            symbol: intent.symbol.clone(),
            reason: format!("quantity must be positive, got {}", intent.quantity),
        });
    }
    if intent.order_type == OrderType::Limit && intent.limit_price.is_none() {
        return Err(HftaError::InvalidOrder {
            symbol: intent.symbol.clone(),
            reason: "limit order requires a limit price".into(),
        });
    }
    Ok(())
}
