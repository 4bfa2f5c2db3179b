//! Alpaca REST broker.
//!
//! Trading calls go to the paper or live trading host; quotes come from the
//! market data host. Numeric fields arrive as JSON numbers, strings, or
//! `{"amount": ...}` objects depending on the endpoint.

use crate::domain::config_validation::MAX_TIMEOUT_SECONDS;
use crate::domain::error::HftaError;
use crate::domain::order::OrderIntent;
use crate::domain::quote::{Holding, OrderType, PortfolioSnapshot, Quote, parse_timestamp};
use crate::ports::broker_port::{BrokerPort, OrderAck, validate_order};
use crate::ports::config_port::ConfigPort;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

const PAPER_URL: &str = "https://paper-api.alpaca.markets";
const LIVE_URL: &str = "https://api.alpaca.markets";
const DATA_URL: &str = "https://data.alpaca.markets";

pub struct AlpacaBroker {
    client: reqwest::Client,
    api_key: String,
    api_secret: String,
    trading_url: String,
    data_url: String,
    account_id: String,
    currency: String,
}

fn broker_error(reason: impl std::fmt::Display) -> HftaError {
    HftaError::Broker {
        reason: reason.to_string(),
    }
}

/// Read a number that may be encoded as a number, a string, or `{amount}`.
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("amount").and_then(parse_amount),
        _ => None,
    }
}

fn amount_field(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(parse_amount)
}

fn credential(config: &dyn ConfigPort, key: &str, env_var: &str) -> Result<String, HftaError> {
    config
        .get_string("broker", key)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| HftaError::ConfigMissing {
            section: "broker".into(),
            key: key.into(),
        })
}

/// JSON body for `POST /v2/orders`.
pub fn order_body(intent: &OrderIntent) -> Value {
    let mut body = json!({
        "symbol": intent.symbol.to_uppercase(),
        "qty": intent.quantity.to_string(),
        "side": intent.side.as_str(),
        "type": intent.order_type.as_str(),
        "time_in_force": "day",
    });
    if intent.order_type == OrderType::Limit {
        if let Some(price) = intent.limit_price {
            body["limit_price"] = json!(format!("{price:.2}"));
        }
    }
    body
}

/// Convert a `GET /v2/positions` payload into holdings keyed by symbol.
pub fn parse_positions(payload: &Value) -> HashMap<String, Holding> {
    let Some(rows) = payload.as_array() else {
        return HashMap::new();
    };
    rows.iter()
        .filter_map(|row| {
            let symbol = row.get("symbol")?.as_str()?.trim().to_uppercase();
            let quantity = amount_field(row, "qty")?;
            if symbol.is_empty() || quantity == 0.0 {
                return None;
            }
            let avg_price = amount_field(row, "avg_entry_price").unwrap_or(0.0);
            Some((
                symbol.clone(),
                Holding {
                    symbol,
                    quantity,
                    avg_price,
                },
            ))
        })
        .collect()
}

/// Build a quote from the latest-quote and optional latest-trade payloads.
pub fn parse_quote(symbol: &str, quote: &Value, trade: Option<&Value>) -> Quote {
    let symbol = symbol.to_uppercase();
    let book = quote.get("quote").unwrap_or(quote);
    let positive = |v: Option<f64>| v.filter(|p| *p > 0.0);
    let last = trade
        .map(|t| t.get("trade").unwrap_or(t))
        .and_then(|t| positive(amount_field(t, "p")));
    Quote {
        security_id: symbol.clone(),
        symbol,
        bid: positive(amount_field(book, "bp")),
        ask: positive(amount_field(book, "ap")),
        last,
        bid_size: amount_field(book, "bs"),
        ask_size: amount_field(book, "as"),
        timestamp: book.get("t").and_then(Value::as_str).and_then(parse_timestamp),
    }
}

impl AlpacaBroker {
    /// Build from `[broker]`. Keys fall back to `APCA_API_KEY_ID` and
    /// `APCA_API_SECRET_KEY`. `paper` (default true) selects the trading host.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, HftaError> {
        let api_key = credential(config, "api_key", "APCA_API_KEY_ID")?;
        let api_secret = credential(config, "api_secret", "APCA_API_SECRET_KEY")?;
        let paper = config.get_bool("broker", "paper", true);
        let trading_url = config
            .get_string("broker", "base_url")
            .unwrap_or_else(|| (if paper { PAPER_URL } else { LIVE_URL }).to_string());
        let data_url = config
            .get_string("broker", "data_url")
            .unwrap_or_else(|| DATA_URL.to_string());
        let timeout = Duration::try_from_secs_f64(
            config
                .get_double("broker", "timeout", 10.0)
                .clamp(0.1, MAX_TIMEOUT_SECONDS),
        )
        .unwrap_or(Duration::from_secs(10));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(broker_error)?;

        Ok(Self {
            client,
            api_key,
            api_secret,
            trading_url: trading_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            account_id: config.get_string("broker", "account_id").unwrap_or_default(),
            currency: config
                .get_string("broker", "currency")
                .unwrap_or_else(|| "USD".to_string()),
        })
    }

    /// Fill in the account number from the API when none was configured.
    pub async fn resolve_account(mut self) -> Result<Self, HftaError> {
        if self.account_id.is_empty() {
            let account = self.get_json(&format!("{}/v2/account", self.trading_url)).await?;
            self.account_id = account
                .get("account_number")
                .or_else(|| account.get("id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if let Some(currency) = account.get("currency").and_then(Value::as_str) {
                self.currency = currency.to_string();
            }
            tracing::info!("Using Alpaca account {}", self.account_id);
        }
        Ok(self)
    }

    async fn get_json(&self, url: &str) -> Result<Value, HftaError> {
        let resp = self
            .client
            .get(url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .send()
            .await
            .map_err(broker_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(broker_error(format!("GET {url} returned {status}: {body}")));
        }
        resp.json::<Value>().await.map_err(broker_error)
    }
}

#[async_trait]
impl BrokerPort for AlpacaBroker {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    fn currency(&self) -> &str {
        &self.currency
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, HftaError> {
        let symbol = symbol.trim().to_uppercase();
        let market_error = |e: HftaError| HftaError::MarketData {
            symbol: symbol.clone(),
            reason: e.to_string(),
        };
        let quote = self
            .get_json(&format!("{}/v2/stocks/{symbol}/quotes/latest", self.data_url))
            .await
            .map_err(market_error)?;
        let trade = match self
            .get_json(&format!("{}/v2/stocks/{symbol}/trades/latest", self.data_url))
            .await
        {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::debug!("No latest trade for {symbol}: {e}");
                None
            }
        };
        Ok(parse_quote(&symbol, &quote, trade.as_ref()))
    }

    async fn portfolio_snapshot(&self) -> Result<PortfolioSnapshot, HftaError> {
        let account = self.get_json(&format!("{}/v2/account", self.trading_url)).await?;
        Ok(PortfolioSnapshot {
            account_id: self.account_id.clone(),
            currency: account
                .get("currency")
                .and_then(Value::as_str)
                .unwrap_or(self.currency.as_str())
                .to_string(),
            net_worth: amount_field(&account, "equity")
                .or_else(|| amount_field(&account, "portfolio_value"))
                .unwrap_or(0.0),
            cash_available: amount_field(&account, "cash").unwrap_or(0.0),
        })
    }

    async fn equity_positions(&self) -> Result<HashMap<String, Holding>, HftaError> {
        let payload = self.get_json(&format!("{}/v2/positions", self.trading_url)).await?;
        Ok(parse_positions(&payload))
    }

    async fn place_equity_order(&self, intent: &OrderIntent) -> Result<OrderAck, HftaError> {
        validate_order(intent)?;
        let url = format!("{}/v2/orders", self.trading_url);
        let resp = self
            .client
            .post(&url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .json(&order_body(intent))
            .send()
            .await
            .map_err(broker_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(broker_error(format!("order {intent} rejected ({status}): {body}")));
        }
        let payload: Value = resp.json().await.map_err(broker_error)?;
        Ok(OrderAck {
            order_id: payload
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: payload
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::quote::Side;

    #[test]
    fn amounts_accept_all_encodings() {
        assert_eq!(parse_amount(&json!(12.5)), Some(12.5));
        assert_eq!(parse_amount(&json!(" 7.25 ")), Some(7.25));
        assert_eq!(parse_amount(&json!({"amount": "3", "currency": "USD"})), Some(3.0));
        assert_eq!(parse_amount(&json!({"amount": {"amount": 4}})), Some(4.0));
        assert_eq!(parse_amount(&json!("n/a")), None);
        assert_eq!(parse_amount(&Value::Null), None);
    }

    #[test]
    fn limit_order_body() {
        let intent = OrderIntent::limit("aapl", Side::Buy, 2.0, 101.234);
        let body = order_body(&intent);
        assert_eq!(body["symbol"], "AAPL");
        assert_eq!(body["qty"], "2");
        assert_eq!(body["side"], "buy");
        assert_eq!(body["type"], "limit");
        assert_eq!(body["limit_price"], "101.23");
    }

    #[test]
    fn market_order_body_has_no_limit() {
        let body = order_body(&OrderIntent::market("MSFT", Side::Sell, 1.0));
        assert_eq!(body["type"], "market");
        assert!(body.get("limit_price").is_none());
    }

    #[test]
    fn positions_skip_flat_and_malformed_rows() {
        let payload = json!([
            {"symbol": "aapl", "qty": "3", "avg_entry_price": "150.5"},
            {"symbol": "MSFT", "qty": 0, "avg_entry_price": "300"},
            {"qty": "1"},
            {"symbol": "TSLA", "qty": "-2", "avg_entry_price": {"amount": 200}}
        ]);
        let holdings = parse_positions(&payload);
        assert_eq!(holdings.len(), 2);
        assert!((holdings["AAPL"].avg_price - 150.5).abs() < f64::EPSILON);
        assert!((holdings["TSLA"].quantity + 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn quote_from_payloads() {
        let quote = json!({"symbol": "AAPL", "quote": {"bp": 99.5, "ap": 100.5, "bs": 3, "as": 4, "t": "2024-03-01T14:30:00Z"}});
        let trade = json!({"trade": {"p": "100.1"}});
        let q = parse_quote("aapl", &quote, Some(&trade));
        assert_eq!(q.symbol, "AAPL");
        assert_eq!(q.bid, Some(99.5));
        assert_eq!(q.ask, Some(100.5));
        assert_eq!(q.last, Some(100.1));
        assert_eq!(q.ask_size, Some(4.0));
        assert!(q.timestamp.is_some());
    }

    #[test]
    fn zero_prices_are_missing() {
        let quote = json!({"quote": {"bp": 0, "ap": 0}});
        let q = parse_quote("AAPL", &quote, None);
        assert_eq!(q.bid, None);
        assert_eq!(q.ask, None);
        assert_eq!(q.mark_price(), None);
    }

    #[test]
    fn from_config_uses_configured_account() {
        let config = FileConfigAdapter::from_string(
            "[broker]\nprovider = alpaca\napi_key = k\napi_secret = s\naccount_id = PA123\npaper = false\n",
        )
        .unwrap();
        let broker = AlpacaBroker::from_config(&config).unwrap();
        assert_eq!(broker.account_id(), "PA123");
        assert_eq!(broker.currency(), "USD");
        assert_eq!(broker.trading_url, LIVE_URL);
    }
}
