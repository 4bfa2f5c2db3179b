//! Live market data port.

use crate::domain::quote::Quote;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Latest quotes keyed by uppercase symbol. Symbols that fail are logged
    /// and left out.
    async fn get_quotes(&self, symbols: &[String]) -> HashMap<String, Quote>;
}
