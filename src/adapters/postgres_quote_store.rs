//! PostgreSQL quote history store.

use crate::domain::error::HftaError;
use crate::domain::quote::Quote;
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_store_port::QuoteStorePort;
use chrono::NaiveDateTime;
use postgres::NoTls;
use postgres::types::ToSql;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;

type Manager = PostgresConnectionManager<NoTls>;

pub struct PostgresQuoteStore {
    pool: Pool<Manager>,
}

fn store_error(e: impl std::fmt::Display) -> HftaError {
    HftaError::Store {
        reason: e.to_string(),
    }
}

fn query_error(e: postgres::Error) -> HftaError {
    HftaError::StoreQuery {
        reason: e.to_string(),
    }
}

impl PostgresQuoteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, HftaError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| HftaError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;
        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;

        let pg_config: postgres::Config = connection_string.parse().map_err(store_error)?;
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(PostgresConnectionManager::new(pg_config, NoTls))
            .map_err(store_error)?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, HftaError> {
        self.pool.get().map_err(store_error)
    }

    pub fn initialize_schema(&self) -> Result<(), HftaError> {
        self.conn()?
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS quotes (
                    symbol TEXT NOT NULL,
                    ts TIMESTAMP NOT NULL,
                    security_id TEXT NOT NULL,
                    bid DOUBLE PRECISION,
                    ask DOUBLE PRECISION,
                    last DOUBLE PRECISION,
                    bid_size DOUBLE PRECISION,
                    ask_size DOUBLE PRECISION,
                    PRIMARY KEY (symbol, ts)
                )",
            )
            .map_err(query_error)
    }
}

impl QuoteStorePort for PostgresQuoteStore {
    fn record_quotes(&self, quotes: &[Quote]) -> Result<usize, HftaError> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_error)?;
        let mut written = 0;
        for quote in quotes {
            let Some(ts) = quote.timestamp else {
                continue;
            };
            let symbol = quote.symbol.to_uppercase();
            let params: &[&(dyn ToSql + Sync)] = &[
                &symbol,
                &ts,
                &quote.security_id,
                &quote.bid,
                &quote.ask,
                &quote.last,
                &quote.bid_size,
                &quote.ask_size,
            ];
            tx.execute(
                "INSERT INTO quotes (symbol, ts, security_id, bid, ask, last, bid_size, ask_size)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (symbol, ts) DO UPDATE SET
                    security_id = EXCLUDED.security_id,
                    bid = EXCLUDED.bid,
                    ask = EXCLUDED.ask,
                    last = EXCLUDED.last,
                    bid_size = EXCLUDED.bid_size,
                    ask_size = EXCLUDED.ask_size",
                params,
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
        let symbol = symbol.to_uppercase();
        let params: &[&(dyn ToSql + Sync)] = &[&symbol, &start, &end];
        let rows = self
            .conn()?
            .query(
                "SELECT symbol, ts, security_id, bid, ask, last, bid_size, ask_size
                 FROM quotes
                 WHERE symbol = $1 AND ts >= $2 AND ts <= $3
                 ORDER BY ts ASC",
                params,
            )
            .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|row| Quote {
                symbol: row.get(0),
                timestamp: Some(row.get(1)),
                security_id: row.get(2),
                bid: row.get(3),
                ask: row.get(4),
                last: row.get(5),
                bid_size: row.get(6),
                ask_size: row.get(7),
            })
            .collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, HftaError> {
        let rows = self
            .conn()?
            .query("SELECT DISTINCT symbol FROM quotes ORDER BY symbol", &[])
            .map_err(query_error)?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, HftaError> {
        let symbol = symbol.to_uppercase();
        let rows = self
            .conn()?
            .query(
                "SELECT MIN(ts), MAX(ts), COUNT(*) FROM quotes WHERE symbol = $1",
                &[&symbol],
            )
            .map_err(query_error)?;

        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let min: Option<NaiveDateTime> = row.get(0);
        let max: Option<NaiveDateTime> = row.get(1);
        let count: i64 = row.get(2);

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }
}
