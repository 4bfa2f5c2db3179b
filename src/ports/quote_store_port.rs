//! Quote history storage port.

use crate::domain::error::HftaError;
use crate::domain::quote::Quote;
use chrono::NaiveDateTime;

pub trait QuoteStorePort {
    /// Insert or replace quotes keyed by `(symbol, timestamp)`. Quotes without
    /// a timestamp are skipped. Returns the number written.
    fn record_quotes(&self, quotes: &[Quote]) -> Result<usize, HftaError>;

    fn load_quotes(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Quote>, HftaError>;

    fn list_symbols(&self) -> Result<Vec<String>, HftaError>;

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, HftaError>;
}
