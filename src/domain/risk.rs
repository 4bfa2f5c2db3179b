//! Stateless per-order risk checks.

use super::order::OrderIntent;
use super::quote::{Holding, PortfolioSnapshot, Quote, Side};
use crate::ports::config_port::ConfigPort;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskConfig {
    /// Absolute cap on a single order's notional.
    pub max_notional_per_order: f64,
    /// Fraction of available cash a single buy may use.
    pub max_cash_utilization: f64,
    /// When false, a sell may not exceed the current long position.
    pub allow_short_selling: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_notional_per_order: 100.0,
            max_cash_utilization: 0.1,
            allow_short_selling: false,
        }
    }
}

impl RiskConfig {
    /// Read the `[risk]` section, falling back to the defaults per key.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let defaults = Self::default();
        Self {
            max_notional_per_order: config.get_double(
                "risk",
                "max_notional_per_order",
                defaults.max_notional_per_order,
            ),
            max_cash_utilization: config.get_double(
                "risk",
                "max_cash_utilization",
                defaults.max_cash_utilization,
            ),
            allow_short_selling: config.get_bool(
                "risk",
                "allow_short_selling",
                defaults.allow_short_selling,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskRejection {
    #[error("no usable price")]
    NoPrice,

    #[error("notional {notional:.2} > max_notional_per_order {max:.2}")]
    NotionalCap { notional: f64, max: f64 },

    #[error("notional {notional:.2} > cash_allowed {allowed:.2}")]
    CashLimit { notional: f64, allowed: f64 },

    #[error("sell qty {quantity:.2} > holdings {held:.2}")]
    ShortSale { quantity: f64, held: f64 },
}

#[derive(Debug, Clone, Default)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RiskConfig {
        &mut self.config
    }

    pub fn approve(
        &self,
        intent: &OrderIntent,
        quote: &Quote,
        snapshot: &PortfolioSnapshot,
        holdings: &HashMap<String, Holding>,
    ) -> Result<(), RiskRejection> {
        let result = self.check(intent, quote, snapshot, holdings);
        if let Err(reason) = &result {
            tracing::info!("Risk: rejecting {intent} ({reason})");
        }
        result
    }

    fn check(
        &self,
        intent: &OrderIntent,
        quote: &Quote,
        snapshot: &PortfolioSnapshot,
        holdings: &HashMap<String, Holding>,
    ) -> Result<(), RiskRejection> {
        let price = intent.reference_price(quote).ok_or(RiskRejection::NoPrice)?;
        let notional = intent.notional(price);

        if notional > self.config.max_notional_per_order {
            return Err(RiskRejection::NotionalCap {
                notional,
                max: self.config.max_notional_per_order,
            });
        }

        match intent.side {
            Side::Buy => {
                let allowed = snapshot.cash_available * self.config.max_cash_utilization;
                if notional > allowed {
                    return Err(RiskRejection::CashLimit { notional, allowed });
                }
            }
            Side::Sell if !self.config.allow_short_selling => {
                let held = holdings
                    .get(&intent.symbol.to_uppercase())
                    .map(|h| h.quantity)
                    .unwrap_or(0.0);
                if held <= 0.0 || intent.quantity > held {
                    return Err(RiskRejection::ShortSale {
                        quantity: intent.quantity,
                        held,
                    });
                }
            }
            Side::Sell => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot(cash: f64) -> PortfolioSnapshot {
        PortfolioSnapshot {
            account_id: "paper".into(),
            currency: "USD".into(),
            net_worth: cash,
            cash_available: cash,
        }
    }

    fn sample_quote() -> Quote {
        Quote::with_bid_ask("AAPL", 9.9, 10.1)
    }

    fn holdings_with(qty: f64) -> HashMap<String, Holding> {
        let mut map = HashMap::new();
        map.insert(
            "AAPL".to_string(),
            Holding {
                symbol: "AAPL".into(),
                quantity: qty,
                avg_price: 10.0,
            },
        );
        map
    }

    #[test]
    fn default_config_values() {
        let cfg = RiskConfig::default();
        assert!((cfg.max_notional_per_order - 100.0).abs() < f64::EPSILON);
        assert!((cfg.max_cash_utilization - 0.1).abs() < f64::EPSILON);
        assert!(!cfg.allow_short_selling);
    }

    #[test]
    fn from_config_overrides_per_key() {
        let cfg = crate::adapters::file_config_adapter::FileConfigAdapter::from_string(
            "[risk]\nmax_notional_per_order = 500\nallow_short_selling = yes\n",
        )
        .unwrap();
        let risk = RiskConfig::from_config(&cfg);
        assert!((risk.max_notional_per_order - 500.0).abs() < f64::EPSILON);
        assert!((risk.max_cash_utilization - 0.1).abs() < f64::EPSILON);
        assert!(risk.allow_short_selling);
    }

    #[test]
    fn approves_small_buy() {
        let rm = RiskManager::default();
        let oi = OrderIntent::limit("AAPL", Side::Buy, 1.0, 10.0);
        assert!(rm
            .approve(&oi, &sample_quote(), &sample_snapshot(10_000.0), &HashMap::new())
            .is_ok());
    }

    #[test]
    fn rejects_without_price() {
        let rm = RiskManager::default();
        let mut quote = sample_quote();
        quote.ask = None;
        let oi = OrderIntent::market("AAPL", Side::Buy, 1.0);
        assert_eq!(
            rm.approve(&oi, &quote, &sample_snapshot(10_000.0), &HashMap::new()),
            Err(RiskRejection::NoPrice)
        );
    }

    #[test]
    fn rejects_over_notional_cap() {
        let rm = RiskManager::default();
        let oi = OrderIntent::limit("AAPL", Side::Buy, 11.0, 10.0);
        match rm.approve(&oi, &sample_quote(), &sample_snapshot(1e6), &HashMap::new()) {
            Err(RiskRejection::NotionalCap { notional, max }) => {
                assert!((notional - 110.0).abs() < 1e-9);
                assert!((max - 100.0).abs() < f64::EPSILON);
            }
            other => panic!("expected NotionalCap, got {other:?}"),
        }
    }

    #[test]
    fn rejects_buy_over_cash_utilization() {
        let rm = RiskManager::default();
        let oi = OrderIntent::limit("AAPL", Side::Buy, 5.0, 10.0);
        match rm.approve(&oi, &sample_quote(), &sample_snapshot(400.0), &HashMap::new()) {
            Err(RiskRejection::CashLimit { allowed, .. }) => {
                assert!((allowed - 40.0).abs() < 1e-9);
            }
            other => panic!("expected CashLimit, got {other:?}"),
        }
    }

    #[test]
    fn rejects_naked_sell() {
        let rm = RiskManager::default();
        let oi = OrderIntent::limit("AAPL", Side::Sell, 1.0, 10.0);
        assert_eq!(
            rm.approve(&oi, &sample_quote(), &sample_snapshot(1e4), &HashMap::new()),
            Err(RiskRejection::ShortSale {
                quantity: 1.0,
                held: 0.0
            })
        );
    }

    #[test]
    fn rejects_sell_larger_than_holding() {
        let rm = RiskManager::default();
        let oi = OrderIntent::limit("aapl", Side::Sell, 3.0, 10.0);
        assert!(rm
            .approve(&oi, &sample_quote(), &sample_snapshot(1e4), &holdings_with(2.0))
            .is_err());
        let ok = OrderIntent::limit("aapl", Side::Sell, 2.0, 10.0);
        assert!(rm
            .approve(&ok, &sample_quote(), &sample_snapshot(1e4), &holdings_with(2.0))
            .is_ok());
    }

    #[test]
    fn short_sale_allowed_when_configured() {
        let rm = RiskManager::new(RiskConfig {
            allow_short_selling: true,
            ..RiskConfig::default()
        });
        let oi = OrderIntent::limit("AAPL", Side::Sell, 1.0, 10.0);
        assert!(rm
            .approve(&oi, &sample_quote(), &sample_snapshot(0.0), &HashMap::new())
            .is_ok());
    }

    #[test]
    fn config_mut_changes_limits() {
        let mut rm = RiskManager::default();
        rm.config_mut().max_notional_per_order = 500.0;
        let oi = OrderIntent::limit("AAPL", Side::Buy, 20.0, 10.0);
        assert!(rm
            .approve(&oi, &sample_quote(), &sample_snapshot(1e5), &HashMap::new())
            .is_ok());
    }
}
