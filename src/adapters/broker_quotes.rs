//! Quote provider backed by the broker's own quote endpoint.

use crate::ports::broker_port::BrokerPort;
use crate::ports::quote_port::QuoteProvider;
use crate::domain::quote::Quote;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct BrokerQuoteProvider {
    broker: Arc<dyn BrokerPort>,
    max_workers: usize,
}

impl BrokerQuoteProvider {
    pub fn new(broker: Arc<dyn BrokerPort>, max_workers: usize) -> Self {
        Self {
            broker,
            max_workers: max_workers.max(1),
        }
    }

    async fn fetch_sequential(&self, symbols: &[String]) -> HashMap<String, Quote> {
        let mut out = HashMap::new();
        for symbol in symbols {
            match self.broker.get_quote(symbol).await {
                Ok(q) => {
                    out.insert(symbol.clone(), q);
                }
                Err(e) => tracing::warn!("Failed to fetch quote for {symbol}: {e}"),
            }
        }
        out
    }
}

#[async_trait]
impl QuoteProvider for BrokerQuoteProvider {
    async fn get_quotes(&self, symbols: &[String]) -> HashMap<String, Quote> {
        if self.max_workers <= 1 || symbols.len() <= 1 {
            return self.fetch_sequential(symbols).await;
        }

        let permits = Arc::new(Semaphore::new(self.max_workers.min(symbols.len())));
        let mut tasks = JoinSet::new();
        for symbol in symbols {
            let broker = Arc::clone(&self.broker);
            let permits = Arc::clone(&permits);
            let symbol = symbol.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = broker.get_quote(&symbol).await;
                (symbol, result)
            });
        }

        let mut out = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, Ok(q))) => {
                    out.insert(symbol, q);
                }
                Ok((symbol, Err(e))) => tracing::warn!("Failed to fetch quote for {symbol}: {e}"),
                Err(e) => tracing::error!("Quote task failed: {e}"),
            }
        }
        out
    }
}
