//! Risk-gated order pipeline.
//!
//! The order manager never talks to a broker itself. In live mode it reports
//! `route_to_broker` and the engine forwards the intent.

use super::execution_tracker::ExecutionTracker;
use super::order::OrderIntent;
use super::quote::{Holding, PortfolioSnapshot, Quote};
use super::risk::{RiskManager, RiskRejection};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Rejected(RiskRejection),
    Approved {
        /// Price recorded in the tracker, if one could be inferred.
        fill_price: Option<f64>,
        route_to_broker: bool,
    },
}

impl OrderOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, OrderOutcome::Approved { .. })
    }

    pub fn route_to_broker(&self) -> bool {
        matches!(
            self,
            OrderOutcome::Approved {
                route_to_broker: true,
                ..
            }
        )
    }
}

#[derive(Debug, Default)]
pub struct OrderManager {
    pub risk: RiskManager,
    pub tracker: ExecutionTracker,
    live: bool,
}

impl OrderManager {
    pub fn new(risk: RiskManager, tracker: ExecutionTracker, live: bool) -> Self {
        Self {
            risk,
            tracker,
            live,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn process_order(
        &mut self,
        intent: &OrderIntent,
        quote: &Quote,
        snapshot: &PortfolioSnapshot,
        holdings: &HashMap<String, Holding>,
    ) -> OrderOutcome {
        if let Err(reason) = self.risk.approve(intent, quote, snapshot, holdings) {
            tracing::info!("Order blocked by risk: {intent}");
            return OrderOutcome::Rejected(reason);
        }

        tracing::info!("Order approved: {intent} (live={})", self.live);

        let fill_price = intent.reference_price(quote);
        match fill_price {
            Some(price) => {
                self.tracker.record_fill(intent, price, quote.timestamp);
            }
            None => tracing::info!("Skipping PnL tracking for {intent} (no usable price)"),
        }

        OrderOutcome::Approved {
            fill_price,
            route_to_broker: self.live,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::Side;
    use crate::domain::risk::RiskConfig;

    fn sample_snapshot() -> PortfolioSnapshot {
        PortfolioSnapshot {
            account_id: "paper".into(),
            currency: "USD".into(),
            net_worth: 10_000.0,
            cash_available: 10_000.0,
        }
    }

    fn sample_quote() -> Quote {
        let mut q = Quote::with_bid_ask("AAPL", 9.9, 10.1);
        q.last = Some(10.0);
        q
    }

    #[test]
    fn approved_order_records_fill() {
        let mut om = OrderManager::default();
        let oi = OrderIntent::limit("AAPL", Side::Buy, 2.0, 9.95).with_strategy("mm");
        let outcome = om.process_order(&oi, &sample_quote(), &sample_snapshot(), &HashMap::new());
        assert_eq!(
            outcome,
            OrderOutcome::Approved {
                fill_price: Some(9.95),
                route_to_broker: false
            }
        );
        assert_eq!(om.tracker.fills().len(), 1);
        assert!((om.tracker.position_quantity("AAPL") - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejected_order_records_nothing() {
        let mut om = OrderManager::default();
        let oi = OrderIntent::limit("AAPL", Side::Sell, 1.0, 10.0);
        let outcome = om.process_order(&oi, &sample_quote(), &sample_snapshot(), &HashMap::new());
        assert!(!outcome.is_approved());
        assert!(om.tracker.fills().is_empty());
    }

    #[test]
    fn live_mode_routes_to_broker() {
        let mut om = OrderManager::new(RiskManager::default(), ExecutionTracker::new(), true);
        assert!(om.is_live());
        let oi = OrderIntent::market("AAPL", Side::Buy, 1.0);
        let outcome = om.process_order(&oi, &sample_quote(), &sample_snapshot(), &HashMap::new());
        assert!(outcome.route_to_broker());
        assert_eq!(om.tracker.fills()[0].price, 10.0);
    }

    #[test]
    fn order_without_price_never_reaches_tracker() {
        let risk = RiskManager::new(RiskConfig {
            allow_short_selling: true,
            ..RiskConfig::default()
        });
        let mut om = OrderManager::new(risk, ExecutionTracker::new(), false);
        let mut quote = sample_quote();
        quote.last = None;
        quote.bid = None;
        let oi = OrderIntent::market("AAPL", Side::Sell, 1.0);
        let outcome = om.process_order(&oi, &quote, &sample_snapshot(), &HashMap::new());
        assert_eq!(outcome, OrderOutcome::Rejected(RiskRejection::NoPrice));
        assert!(om.tracker.fills().is_empty());
    }
}
