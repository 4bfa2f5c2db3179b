//! Concrete adapter implementations for ports.

pub mod alpaca_broker;
pub mod broker_quotes;
pub mod chart_svg;
pub mod csv_adapter;
pub mod file_config_adapter;
pub mod finnhub_quotes;
pub mod openai_advisor;
pub mod paper_broker;
pub mod polygon_universe;
#[cfg(feature = "postgres")]
pub mod postgres_quote_store;
#[cfg(feature = "sqlite")]
pub mod sqlite_quote_store;
