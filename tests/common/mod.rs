#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use hfta::domain::error::HftaError;
use hfta::domain::order::OrderIntent;
use hfta::domain::quote::{Holding, PortfolioSnapshot, Quote};
use hfta::ports::advisor_port::AdvisorPort;
use hfta::ports::broker_port::{validate_order, BrokerPort, OrderAck};
use hfta::ports::quote_port::QuoteProvider;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct MockBroker {
    pub snapshot: PortfolioSnapshot,
    pub holdings: HashMap<String, Holding>,
    pub quotes: HashMap<String, Quote>,
    pub order_error: Option<String>,
    pub account_error: Option<String>,
    pub placed: Mutex<Vec<OrderIntent>>,
}

impl MockBroker {
    pub fn new(cash: f64) -> Self {
        Self {
            snapshot: PortfolioSnapshot {
                account_id: "MOCK-1".into(),
                currency: "USD".into(),
                net_worth: cash,
                cash_available: cash,
            },
            holdings: HashMap::new(),
            quotes: HashMap::new(),
            order_error: None,
            account_error: None,
            placed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_holding(mut self, symbol: &str, quantity: f64, avg_price: f64) -> Self {
        self.holdings.insert(
            symbol.to_uppercase(),
            Holding {
                symbol: symbol.to_uppercase(),
                quantity,
                avg_price,
            },
        );
        self
    }

    pub fn with_quote(mut self, quote: Quote) -> Self {
        self.quotes.insert(quote.symbol.clone(), quote);
        self
    }

    pub fn with_order_error(mut self, reason: &str) -> Self {
        self.order_error = Some(reason.to_string());
        self
    }

    pub fn with_account_error(mut self, reason: &str) -> Self {
        self.account_error = Some(reason.to_string());
        self
    }

    pub fn placed_orders(&self) -> Vec<OrderIntent> {
        self.placed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerPort for MockBroker {
    fn account_id(&self) -> &str {
        &self.snapshot.account_id
    }

    fn currency(&self) -> &str {
        &self.snapshot.currency
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, HftaError> {
        self.quotes
            .get(&symbol.to_uppercase())
            .cloned()
            .ok_or_else(|| HftaError::MarketData {
                symbol: symbol.to_string(),
                reason: "no quote".into(),
            })
    }

    async fn portfolio_snapshot(&self) -> Result<PortfolioSnapshot, HftaError> {
        match &self.account_error {
            Some(reason) => Err(HftaError::Broker {
                reason: reason.clone(),
            }),
            None => Ok(self.snapshot.clone()),
        }
    }

    async fn equity_positions(&self) -> Result<HashMap<String, Holding>, HftaError> {
        Ok(self.holdings.clone())
    }

    async fn place_equity_order(&self, intent: &OrderIntent) -> Result<OrderAck, HftaError> {
        validate_order(intent)?;
        if let Some(reason) = &self.order_error {
            return Err(HftaError::Broker {
                reason: reason.clone(),
            });
        }
        let mut placed = self.placed.lock().unwrap();
        placed.push(intent.clone());
        Ok(OrderAck {
            order_id: format!("MOCK-{}", placed.len()),
            status: "accepted".into(),
        })
    }
}

/// Serves a fixed set of quotes; unknown symbols are omitted.
pub struct MockQuoteProvider {
    pub quotes: HashMap<String, Quote>,
    pub requests: Mutex<Vec<Vec<String>>>,
}

impl MockQuoteProvider {
    pub fn new(quotes: Vec<Quote>) -> Self {
        Self {
            quotes: quotes.into_iter().map(|q| (q.symbol.clone(), q)).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteProvider for MockQuoteProvider {
    async fn get_quotes(&self, symbols: &[String]) -> HashMap<String, Quote> {
        self.requests.lock().unwrap().push(symbols.to_vec());
        symbols
            .iter()
            .filter_map(|s| self.quotes.get(s).map(|q| (s.clone(), q.clone())))
            .collect()
    }
}

/// Replies with a canned string and remembers the state it was shown.
pub struct MockAdvisor {
    pub reply: Result<String, String>,
    pub states: Mutex<Vec<String>>,
}

impl MockAdvisor {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            states: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            states: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

#[async_trait]
impl AdvisorPort for MockAdvisor {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        state_json: &str,
    ) -> Result<String, HftaError> {
        self.states.lock().unwrap().push(state_json.to_string());
        self.reply.clone().map_err(|reason| HftaError::Advisor { reason })
    }
}

pub fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

pub fn make_quote(symbol: &str, bid: f64, ask: f64) -> Quote {
    let mut quote = Quote::with_bid_ask(symbol, bid, ask);
    quote.last = Some((bid + ask) / 2.0);
    quote.timestamp = Some(ts(9, 30, 0));
    quote
}

/// One quote per mid, spaced a second apart, with a two-cent spread.
pub fn quote_series(symbol: &str, mids: &[f64]) -> Vec<Quote> {
    mids.iter()
        .enumerate()
        .map(|(i, &mid)| {
            let mut q = make_quote(symbol, mid - 0.01, mid + 0.01);
            q.timestamp = Some(ts(9, 30, 0) + chrono::Duration::seconds(i as i64));
            q
        })
        .collect()
}
