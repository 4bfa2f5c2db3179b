//! Daily market-wide aggregates used to build the trading universe.

use crate::domain::error::HftaError;
use crate::domain::universe::DailyAggregate;
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait UniverseSource: Send + Sync {
    async fn grouped_daily(&self, date: NaiveDate) -> Result<Vec<DailyAggregate>, HftaError>;
}
