//! Polygon grouped-daily aggregates as a universe source.

use crate::domain::error::HftaError;
use crate::domain::universe::DailyAggregate;
use crate::ports::config_port::ConfigPort;
use crate::ports::universe_port::UniverseSource;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://api.polygon.io/v2/aggs/grouped/locale/us/market/stocks";

#[derive(Debug, Deserialize)]
struct GroupedResponse {
    #[serde(default)]
    results: Option<Vec<DailyAggregate>>,
}

/// Rows from a grouped-daily payload. A missing or null `results` is empty.
pub fn parse_grouped(body: &str) -> Result<Vec<DailyAggregate>, HftaError> {
    let parsed: GroupedResponse = serde_json::from_str(body).map_err(|e| HftaError::MarketData {
        symbol: "*".into(),
        reason: format!("malformed grouped daily payload: {e}"),
    })?;
    Ok(parsed.results.unwrap_or_default())
}

pub struct PolygonUniverseSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PolygonUniverseSource {
    /// `[universe] api_key`, falling back to `POLYGON_API_KEY`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, HftaError> {
        let api_key = config
            .get_string("universe", "api_key")
            .or_else(|| std::env::var("POLYGON_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| HftaError::ConfigMissing {
                section: "universe".into(),
                key: "api_key".into(),
            })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HftaError::MarketData {
                symbol: "*".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            api_key,
            base_url: config
                .get_string("universe", "base_url")
                .unwrap_or_else(|| BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl UniverseSource for PolygonUniverseSource {
    async fn grouped_daily(&self, date: NaiveDate) -> Result<Vec<DailyAggregate>, HftaError> {
        let day = date.format("%Y-%m-%d").to_string();
        let fail = |reason: String| HftaError::MarketData {
            symbol: "*".into(),
            reason: format!("grouped daily {day}: {reason}"),
        };

        tracing::info!("Universe: requesting grouped daily data for {day}");
        let resp = self
            .client
            .get(format!("{}/{day}", self.base_url.trim_end_matches('/')))
            .query(&[("adjusted", "true"), ("apiKey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {status}")));
        }
        let body = resp.text().await.map_err(|e| fail(e.to_string()))?;
        parse_grouped(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn parses_results_with_missing_fields() {
        let body = r#"{"status":"OK","resultsCount":2,"results":[
            {"T":"AAPL","c":190.5,"v":5.0e7,"o":188.0},
            {"T":"XYZ"}
        ]}"#;
        let rows = parse_grouped(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol, "AAPL");
        assert!((rows[0].volume - 5.0e7).abs() < f64::EPSILON);
        assert_eq!(rows[1].close, 0.0);
    }

    #[test]
    fn null_results_are_empty() {
        assert!(parse_grouped(r#"{"status":"OK","results":null}"#).unwrap().is_empty());
        assert!(parse_grouped(r#"{"status":"OK"}"#).unwrap().is_empty());
        assert!(parse_grouped("not json").is_err());
    }

    #[test]
    fn from_config_reads_key() {
        let cfg = FileConfigAdapter::from_string("[universe]\napi_key = abc\n").unwrap();
        assert!(PolygonUniverseSource::from_config(&cfg).is_ok());
    }
}
