//! SQLite quote history store.

use crate::domain::error::HftaError;
use crate::domain::quote::Quote;
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_store_port::QuoteStorePort;
use chrono::NaiveDateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

/// Fixed-width so lexical order matches time order.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub struct SqliteQuoteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> HftaError {
    HftaError::Store {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> HftaError {
    HftaError::StoreQuery {
        reason: e.to_string(),
    }
}

fn parse_ts(value: &str) -> Result<NaiveDateTime, HftaError> {
    NaiveDateTime::parse_from_str(value, TS_FORMAT).map_err(|e| HftaError::Store {
        reason: format!("bad timestamp {value:?}: {e}"),
    })
}

impl SqliteQuoteStore {
    /// Open the database at `[sqlite] path` and create the schema if needed.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, HftaError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| HftaError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;
        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        let store = Self { pool };
        store.initialize_schema()?;
        tracing::debug!("Opened quote store at {db_path}");
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, HftaError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;
        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, HftaError> {
        self.pool.get().map_err(pool_error)
    }

    pub fn initialize_schema(&self) -> Result<(), HftaError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS quotes (
                    symbol TEXT NOT NULL,
                    ts TEXT NOT NULL,
                    security_id TEXT NOT NULL,
                    bid REAL,
                    ask REAL,
                    last REAL,
                    bid_size REAL,
                    ask_size REAL,
                    PRIMARY KEY (symbol, ts)
                );
                CREATE INDEX IF NOT EXISTS idx_quotes_ts ON quotes(ts);",
            )
            .map_err(query_error)
    }
}

impl QuoteStorePort for SqliteQuoteStore {
    fn record_quotes(&self, quotes: &[Quote]) -> Result<usize, HftaError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        let mut written = 0;
        for quote in quotes {
            let Some(ts) = quote.timestamp else {
                continue;
            };
            tx.execute(
                "INSERT OR REPLACE INTO quotes
                    (symbol, ts, security_id, bid, ask, last, bid_size, ask_size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    quote.symbol.to_uppercase(),
                    ts.format(TS_FORMAT).to_string(),
                    quote.security_id,
                    quote.bid,
                    quote.ask,
                    quote.last,
                    quote.bid_size,
                    quote.ask_size
                ],
            )
            .map_err(query_error)?;
            written += 1;
        }
        tx.commit().map_err(query_error)?;
        Ok(written)
    }

    fn load_quotes(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Quote>, HftaError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, ts, security_id, bid, ask, last, bid_size, ask_size
                 FROM quotes
                 WHERE symbol = ?1 AND ts >= ?2 AND ts <= ?3
                 ORDER BY ts ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(
                params![
                    symbol.to_uppercase(),
                    start.format(TS_FORMAT).to_string(),
                    end.format(TS_FORMAT).to_string()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        Quote {
                            symbol: String::new(),
                            security_id: row.get(2)?,
                            bid: row.get(3)?,
                            ask: row.get(4)?,
                            last: row.get(5)?,
                            bid_size: row.get(6)?,
                            ask_size: row.get(7)?,
                            timestamp: None,
                        },
                    ))
                },
            )
            .map_err(query_error)?;

        let mut quotes = Vec::new();
        for row in rows {
            let (symbol, ts, mut quote) = row.map_err(query_error)?;
            quote.symbol = symbol;
            quote.timestamp = Some(parse_ts(&ts)?);
            quotes.push(quote);
        }
        Ok(quotes)
    }

    fn list_symbols(&self) -> Result<Vec<String>, HftaError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM quotes ORDER BY symbol")
            .map_err(query_error)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_error)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(query_error)?);
        }
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, HftaError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(ts), MAX(ts), COUNT(*) FROM quotes WHERE symbol = ?1",
                params![symbol.to_uppercase()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_error)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                Ok(Some((parse_ts(&min)?, parse_ts(&max)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn sample_quote(symbol: &str, bid: f64, at: Option<NaiveDateTime>) -> Quote {
        Quote {
            timestamp: at,
            last: Some(bid + 0.01),
            ..Quote::with_bid_ask(symbol, bid, bid + 0.02)
        }
    }

    #[test]
    fn from_config_missing_path() {
        let config = FileConfigAdapter::from_string("[engine]\nsymbols = AAPL\n").unwrap();
        match SqliteQuoteStore::from_config(&config) {
            Err(HftaError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn from_config_opens_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.db");
        let config =
            FileConfigAdapter::from_string(&format!("[sqlite]\npath = {}\n", path.display()))
                .unwrap();
        let store = SqliteQuoteStore::from_config(&config).unwrap();
        assert_eq!(
            store
                .record_quotes(&[sample_quote("AAPL", 100.0, Some(ts(9, 30, 0)))])
                .unwrap(),
            1
        );
        assert!(path.exists());
    }

    #[test]
    fn record_skips_quotes_without_timestamp() {
        let store = SqliteQuoteStore::in_memory().unwrap();
        let written = store
            .record_quotes(&[
                sample_quote("AAPL", 100.0, Some(ts(9, 30, 0))),
                sample_quote("AAPL", 100.5, None),
            ])
            .unwrap();
        assert_eq!(written, 1);
    }

    #[test]
    fn load_quotes_in_range_ordered() {
        let store = SqliteQuoteStore::in_memory().unwrap();
        store
            .record_quotes(&[
                sample_quote("AAPL", 101.0, Some(ts(9, 31, 0))),
                sample_quote("AAPL", 100.0, Some(ts(9, 30, 0))),
                sample_quote("AAPL", 102.0, Some(ts(10, 0, 0))),
                sample_quote("MSFT", 300.0, Some(ts(9, 30, 0))),
            ])
            .unwrap();

        let quotes = store
            .load_quotes("aapl", ts(9, 0, 0), ts(9, 59, 59))
            .unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].timestamp, Some(ts(9, 30, 0)));
        assert_eq!(quotes[1].bid, Some(101.0));
        assert_eq!(quotes[0].symbol, "AAPL");
    }

    #[test]
    fn same_key_is_replaced() {
        let store = SqliteQuoteStore::in_memory().unwrap();
        store
            .record_quotes(&[sample_quote("AAPL", 100.0, Some(ts(9, 30, 0)))])
            .unwrap();
        store
            .record_quotes(&[sample_quote("AAPL", 105.0, Some(ts(9, 30, 0)))])
            .unwrap();
        let (_, _, count) = store.get_data_range("AAPL").unwrap().unwrap();
        assert_eq!(count, 1);
        let quotes = store.load_quotes("AAPL", ts(0, 0, 0), ts(23, 0, 0)).unwrap();
        assert_eq!(quotes[0].bid, Some(105.0));
    }

    #[test]
    fn list_symbols_and_range() {
        let store = SqliteQuoteStore::in_memory().unwrap();
        store
            .record_quotes(&[
                sample_quote("MSFT", 300.0, Some(ts(9, 30, 0))),
                sample_quote("AAPL", 100.0, Some(ts(9, 30, 0))),
                sample_quote("AAPL", 100.0, Some(ts(15, 59, 0))),
            ])
            .unwrap();

        assert_eq!(store.list_symbols().unwrap(), vec!["AAPL", "MSFT"]);
        let (min, max, count) = store.get_data_range("AAPL").unwrap().unwrap();
        assert_eq!(min, ts(9, 30, 0));
        assert_eq!(max, ts(15, 59, 0));
        assert_eq!(count, 2);
    }

    #[test]
    fn range_for_unknown_symbol_is_none() {
        let store = SqliteQuoteStore::in_memory().unwrap();
        assert!(store.get_data_range("AAPL").unwrap().is_none());
    }
}
