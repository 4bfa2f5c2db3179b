//! Port traits the domain depends on. Adapters implement them.

pub mod advisor_port;
pub mod broker_port;
pub mod config_port;
pub mod quote_port;
pub mod quote_store_port;
pub mod universe_port;
