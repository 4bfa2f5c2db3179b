//! Core domain types and logic.

pub mod backtest;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod execution_tracker;
pub mod intraday_stats;
pub mod metrics;
pub mod order;
pub mod order_manager;
pub mod position;
pub mod quote;
pub mod risk;
pub mod strategy;
pub mod symbol_selector;
pub mod synthetic;
pub mod tuner;
pub mod universe;
