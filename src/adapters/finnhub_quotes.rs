//! Finnhub `/quote` provider with a per-minute call budget.
//!
//! The budget is split across engine loops: with `poll_interval` seconds per
//! loop there are `round(60 / poll_interval)` loops a minute, so each loop may
//! query at most `max_calls_per_minute / loops_per_minute` symbols. A 429
//! response pauses all calls for `rate_limit_cooldown` seconds.

use crate::domain::config_validation::MAX_SECONDS;
use crate::domain::error::HftaError;
use crate::domain::quote::Quote;
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_port::QuoteProvider;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const BASE_URL: &str = "https://finnhub.io/api/v1";
const RATE_LIMIT_LOG_EVERY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct FinnhubConfig {
    pub api_key: Option<String>,
    pub max_workers: usize,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub max_calls_per_minute: usize,
    pub rate_limit_cooldown: Duration,
    pub base_url: String,
}

impl Default for FinnhubConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            max_workers: 4,
            timeout: Duration::from_secs_f64(1.5),
            poll_interval: Duration::from_secs(1),
            max_calls_per_minute: 60,
            rate_limit_cooldown: Duration::from_secs(60),
            base_url: BASE_URL.to_string(),
        }
    }
}

impl FinnhubConfig {
    /// `[quotes]` keys plus `[engine] poll_interval`.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        // Out-of-range values are clamped; NaN falls back to the default.
        let secs = |section: &str, key: &str, default: Duration, min: f64| {
            let value = config.get_double(section, key, default.as_secs_f64());
            Duration::try_from_secs_f64(value.clamp(min, MAX_SECONDS)).unwrap_or(default)
        };
        Self {
            api_key: config
                .get_string("quotes", "api_key")
                .filter(|k| !k.trim().is_empty()),
            max_workers: config.get_int("quotes", "max_workers", d.max_workers as i64).max(1) as usize,
            timeout: secs("quotes", "timeout", d.timeout, 0.05),
            poll_interval: secs("engine", "poll_interval", Duration::from_secs(5), 0.001),
            max_calls_per_minute: config
                .get_int("quotes", "max_calls_per_minute", d.max_calls_per_minute as i64)
                .max(1) as usize,
            rate_limit_cooldown: secs("quotes", "rate_limit_cooldown", d.rate_limit_cooldown, 1.0),
            base_url: config
                .get_string("quotes", "base_url")
                .unwrap_or(d.base_url),
        }
    }
}

/// `(loops_per_minute, max_symbols_per_loop)` for a poll interval and budget.
pub fn rate_budget(poll_interval: Duration, max_calls_per_minute: usize) -> (usize, usize) {
    let poll = poll_interval.as_secs_f64().max(0.001);
    let loops_per_minute = ((60.0 / poll).round() as usize).max(1);
    let per_loop = (max_calls_per_minute / loops_per_minute).max(1);
    (loops_per_minute, per_loop)
}

/// Explicit key, then `HFTA_FINNHUB_API_KEY`, then `FINNHUB_API_KEY`.
pub fn resolve_api_key(
    explicit: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String, HftaError> {
    explicit
        .map(str::to_string)
        .or_else(|| env("HFTA_FINNHUB_API_KEY"))
        .or_else(|| env("FINNHUB_API_KEY"))
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| HftaError::ConfigMissing {
            section: "quotes".into(),
            key: "api_key (or HFTA_FINNHUB_API_KEY / FINNHUB_API_KEY)".into(),
        })
}

#[derive(Debug, Default)]
struct RateState {
    limited_until: Option<Instant>,
    last_warning: Option<Instant>,
}

struct Inner {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    cooldown: Duration,
    rate: Mutex<RateState>,
}

impl Inner {
    fn is_rate_limited(&self, now: Instant) -> bool {
        self.rate
            .lock()
            .map(|s| s.limited_until.is_some_and(|until| now < until))
            .unwrap_or(false)
    }

    fn note_rate_limited(&self, now: Instant) {
        let Ok(mut state) = self.rate.lock() else {
            return;
        };
        state.limited_until = Some(now + self.cooldown);
        if state
            .last_warning
            .is_none_or(|last| now.duration_since(last) > RATE_LIMIT_LOG_EVERY)
        {
            state.last_warning = Some(now);
            tracing::warn!(
                "Finnhub returned 429 Too Many Requests; pausing calls for {:.1}s",
                self.cooldown.as_secs_f64()
            );
        }
    }

    async fn fetch_one(&self, symbol: &str) -> Option<Quote> {
        let resp = match self
            .client
            .get(format!("{}/quote", self.base_url))
            .query(&[("symbol", symbol), ("token", self.api_key.as_str())])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("Finnhub request for {symbol} failed: {e}");
                return None;
            }
        };

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::error!("Finnhub rate limited while fetching {symbol}");
            self.note_rate_limited(Instant::now());
            return None;
        }
        if !status.is_success() {
            tracing::error!("Finnhub returned {status} for {symbol}");
            return None;
        }

        match resp.json::<Value>().await {
            Ok(data) => parse_quote(symbol, &data, chrono::Utc::now().naive_utc()),
            Err(e) => {
                tracing::error!("Finnhub returned malformed JSON for {symbol}: {e}");
                None
            }
        }
    }
}

/// Finnhub reports only the current price `c`; bid, ask and last all take it.
/// A missing or zero price means no usable quote.
pub fn parse_quote(symbol: &str, data: &Value, now: chrono::NaiveDateTime) -> Option<Quote> {
    let last = data.get("c").and_then(Value::as_f64).filter(|c| *c != 0.0);
    let Some(last) = last else {
        tracing::debug!("Finnhub: no usable last price for {symbol}: {data}");
        return None;
    };
    let symbol = symbol.to_uppercase();
    Some(Quote {
        security_id: symbol.clone(),
        symbol,
        bid: Some(last),
        ask: Some(last),
        last: Some(last),
        bid_size: None,
        ask_size: None,
        timestamp: Some(now),
    })
}

pub struct FinnhubQuoteProvider {
    inner: Arc<Inner>,
    max_workers: usize,
    max_symbols_per_loop: usize,
}

impl FinnhubQuoteProvider {
    pub fn new(config: FinnhubConfig) -> Result<Self, HftaError> {
        let api_key = resolve_api_key(config.api_key.as_deref(), |k| std::env::var(k).ok())?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HftaError::MarketData {
                symbol: "*".into(),
                reason: e.to_string(),
            })?;

        let (loops_per_minute, max_symbols_per_loop) =
            rate_budget(config.poll_interval, config.max_calls_per_minute);
        let max_workers = config.max_workers.min(max_symbols_per_loop).max(1);

        tracing::info!(
            "Finnhub quotes: max_calls_per_minute={}, poll_interval={:.3}s, loops_per_minute={}, max_symbols_per_loop={}, max_workers={}",
            config.max_calls_per_minute,
            config.poll_interval.as_secs_f64(),
            loops_per_minute,
            max_symbols_per_loop,
            max_workers
        );

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                api_key,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                cooldown: config.rate_limit_cooldown.max(Duration::from_secs(1)),
                rate: Mutex::new(RateState::default()),
            }),
            max_workers,
            max_symbols_per_loop,
        })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn max_symbols_per_loop(&self) -> usize {
        self.max_symbols_per_loop
    }

    /// Start a cooldown as if a 429 had just been received.
    pub fn pause_for_rate_limit(&self) {
        self.inner.note_rate_limited(Instant::now());
    }
}

#[async_trait]
impl QuoteProvider for FinnhubQuoteProvider {
    async fn get_quotes(&self, symbols: &[String]) -> HashMap<String, Quote> {
        let mut out = HashMap::new();
        if self.inner.is_rate_limited(Instant::now()) {
            tracing::debug!("Finnhub: rate limited, skipping quote fetch this loop");
            return out;
        }

        let mut symbols: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        if symbols.len() > self.max_symbols_per_loop {
            symbols.truncate(self.max_symbols_per_loop);
            tracing::debug!(
                "Finnhub: limiting this loop to {} symbols",
                self.max_symbols_per_loop
            );
        }

        if symbols.len() <= 1 || self.max_workers <= 1 {
            for symbol in symbols {
                if let Some(q) = self.inner.fetch_one(&symbol).await {
                    out.insert(symbol, q);
                }
            }
            return out;
        }

        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();
        for symbol in symbols {
            let inner = Arc::clone(&self.inner);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let quote = inner.fetch_one(&symbol).await;
                (symbol, quote)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, Some(q))) => {
                    out.insert(symbol, q);
                }
                Ok((_, None)) => {}
                Err(e) => tracing::error!("Finnhub quote task failed: {e}"),
            }
        }
        out
    }
}
