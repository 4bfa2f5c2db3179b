//! Liquid-symbol universe built from daily market-wide aggregates.
//!
//! The window ends yesterday and reaches back `lookback_days` calendar days.
//! Dollar volume (`close * volume`) is summed per symbol, symbols are filtered
//! by price and liquidity, and the top `max_symbols` by total dollar volume
//! are kept.

use crate::domain::error::HftaError;
use crate::ports::config_port::ConfigPort;
use crate::ports::universe_port::UniverseSource;
use crate::domain::config_validation::MAX_LOOKBACK_DAYS;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One symbol's daily bar as reported by the aggregates feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyAggregate {
    #[serde(rename = "T", default)]
    pub symbol: String,
    #[serde(rename = "c", default)]
    pub close: f64,
    #[serde(rename = "v", default)]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketUniverseConfig {
    pub max_symbols: usize,
    pub min_price: f64,
    pub max_price: f64,
    pub min_dollar_volume: f64,
    pub lookback_days: u32,
}

impl Default for MarketUniverseConfig {
    fn default() -> Self {
        Self {
            max_symbols: 50,
            min_price: 5.0,
            max_price: 500.0,
            min_dollar_volume: 20_000_000.0,
            lookback_days: 3,
        }
    }
}

impl MarketUniverseConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, HftaError> {
        let d = Self::default();
        let max_symbols = config.get_int("universe", "max_symbols", d.max_symbols as i64);
        if max_symbols < 0 {
            return Err(HftaError::config_invalid(
                "universe",
                "max_symbols",
                "max_symbols must be >= 0",
            ));
        }
        let lookback_days = config.get_int("universe", "lookback_days", d.lookback_days as i64);
        if !(1..=MAX_LOOKBACK_DAYS).contains(&lookback_days) {
            return Err(HftaError::config_invalid(
                "universe",
                "lookback_days",
                format!("lookback_days must be between 1 and {MAX_LOOKBACK_DAYS}"),
            ));
        }
        Ok(Self {
            max_symbols: max_symbols as usize,
            min_price: config.get_double("universe", "min_price", d.min_price),
            max_price: config.get_double("universe", "max_price", d.max_price),
            min_dollar_volume: config.get_double(
                "universe",
                "min_dollar_volume",
                d.min_dollar_volume,
            ),
            lookback_days: lookback_days as u32,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolMetrics {
    pub avg_dollar_volume: f64,
    pub total_dollar_volume: f64,
    pub total_volume: f64,
    pub last_close: f64,
    /// Percent change between the two most recent closes in the window.
    pub day_change_pct: Option<f64>,
}

#[derive(Debug, Default)]
struct Accumulator {
    dollar_volume_sum: f64,
    volume_sum: f64,
    /// Closes from the most recent day backwards.
    closes: Vec<f64>,
}

#[derive(Debug, Default)]
pub struct MarketUniverse {
    config: MarketUniverseConfig,
    symbols: Vec<String>,
    metrics: BTreeMap<String, SymbolMetrics>,
}

impl MarketUniverse {
    pub fn new(config: MarketUniverseConfig) -> Self {
        Self {
            config,
            symbols: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &MarketUniverseConfig {
        &self.config
    }

    /// Symbols ordered by total dollar volume, highest first.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn metrics_by_symbol(&self) -> &BTreeMap<String, SymbolMetrics> {
        &self.metrics
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Rebuild the universe from the days before `today`.
    pub async fn refresh(&mut self, source: &dyn UniverseSource, today: NaiveDate) {
        tracing::info!("Refreshing market universe with config={:?}", self.config);

        let mut agg: HashMap<String, Accumulator> = HashMap::new();

        for i in 1..=self.config.lookback_days {
            let Some(day) = today.checked_sub_days(Days::new(u64::from(i))) else {
                tracing::warn!("Universe: lookback runs past the earliest date; stopping at day {i}");
                break;
            };
            match source.grouped_daily(day).await {
                Ok(rows) => accumulate(&mut agg, &rows),
                Err(e) => tracing::warn!("Universe: fetch failed for {day}: {e}"),
            }
        }

        if agg.is_empty() {
            tracing::warn!("Universe refresh: no data accumulated");
            self.symbols.clear();
            self.metrics.clear();
            return;
        }

        let lookback = f64::from(self.config.lookback_days.max(1));
        let candidates = agg.len();
        let mut filtered: Vec<(String, SymbolMetrics)> = agg
            .into_iter()
            .filter_map(|(symbol, acc)| {
                let last_close = *acc.closes.first()?;
                let day_change_pct = acc
                    .closes
                    .get(1)
                    .filter(|&&prev| prev > 0.0)
                    .map(|prev| (last_close / prev - 1.0) * 100.0);
                Some((
                    symbol,
                    SymbolMetrics {
                        avg_dollar_volume: acc.dollar_volume_sum / lookback,
                        total_dollar_volume: acc.dollar_volume_sum,
                        total_volume: acc.volume_sum,
                        last_close,
                        day_change_pct,
                    },
                ))
            })
            .filter(|(_, m)| {
                m.last_close >= self.config.min_price
                    && m.last_close <= self.config.max_price
                    && m.avg_dollar_volume >= self.config.min_dollar_volume
            })
            .collect();

        filtered.sort_by(|a, b| {
            b.1.total_dollar_volume
                .total_cmp(&a.1.total_dollar_volume)
                .then_with(|| a.0.cmp(&b.0))
        });
        if self.config.max_symbols > 0 {
            filtered.truncate(self.config.max_symbols);
        }

        self.symbols = filtered.iter().map(|(s, _)| s.clone()).collect();
        self.metrics = filtered.into_iter().collect();

        tracing::info!(
            "Universe refresh: built universe of {} symbols (from {} candidates)",
            self.symbols.len(),
            candidates
        );
        tracing::debug!("Universe symbols: {:?}", self.symbols);
    }
}

fn accumulate(agg: &mut HashMap<String, Accumulator>, rows: &[DailyAggregate]) {
    for row in rows {
        let symbol = row.symbol.trim().to_uppercase();
        if symbol.is_empty() || row.close <= 0.0 || row.volume <= 0.0 {
            continue;
        }
        let acc = agg.entry(symbol).or_default();
        acc.dollar_volume_sum += row.close * row.volume;
        acc.volume_sum += row.volume;
        acc.closes.push(row.close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeSource {
        days: HashMap<NaiveDate, Vec<DailyAggregate>>,
        requested: Mutex<Vec<NaiveDate>>,
    }

    #[async_trait]
    impl UniverseSource for FakeSource {
        async fn grouped_daily(&self, date: NaiveDate) -> Result<Vec<DailyAggregate>, HftaError> {
            self.requested.lock().unwrap().push(date);
            self.days.get(&date).cloned().ok_or_else(|| HftaError::MarketData {
                symbol: "*".into(),
                reason: format!("no data for {date}"),
            })
        }
    }

    fn row(symbol: &str, close: f64, volume: f64) -> DailyAggregate {
        DailyAggregate {
            symbol: symbol.to_string(),
            close,
            volume,
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn sample_config() -> MarketUniverseConfig {
        MarketUniverseConfig {
            max_symbols: 2,
            min_price: 5.0,
            max_price: 500.0,
            min_dollar_volume: 1_000.0,
            lookback_days: 2,
        }
    }

    #[tokio::test]
    async fn refresh_filters_and_ranks() {
        let source = FakeSource {
            days: HashMap::from([
                (
                    date(9),
                    vec![
                        row("aapl", 110.0, 100.0),
                        row("MSFT", 300.0, 100.0),
                        row("PENNY", 1.0, 1_000_000.0),
                        row("BIG", 900.0, 100.0),
                        row("THIN", 10.0, 10.0),
                        row("", 50.0, 100.0),
                        row("ZERO", 50.0, 0.0),
                    ],
                ),
                (date(8), vec![row("AAPL", 100.0, 100.0), row("MSFT", 300.0, 50.0), row("KO", 60.0, 100.0)]),
            ]),
            requested: Mutex::new(Vec::new()),
        };

        let mut universe = MarketUniverse::new(sample_config());
        universe.refresh(&source, date(10)).await;

        assert_eq!(*source.requested.lock().unwrap(), vec![date(9), date(8)]);
        assert_eq!(universe.symbols(), ["MSFT", "AAPL"]);

        let aapl = &universe.metrics_by_symbol()["AAPL"];
        assert!((aapl.total_dollar_volume - 21_000.0).abs() < 1e-9);
        assert!((aapl.avg_dollar_volume - 10_500.0).abs() < 1e-9);
        assert!((aapl.last_close - 110.0).abs() < f64::EPSILON);
        assert!((aapl.day_change_pct.unwrap() - 10.0).abs() < 1e-9);
        assert!(!universe.metrics_by_symbol().contains_key("KO"));
    }

    #[tokio::test]
    async fn failed_days_are_skipped() {
        let source = FakeSource {
            days: HashMap::from([(date(8), vec![row("AAPL", 100.0, 100.0)])]),
            requested: Mutex::new(Vec::new()),
        };
        let mut universe = MarketUniverse::new(sample_config());
        universe.refresh(&source, date(10)).await;
        assert_eq!(universe.symbols(), ["AAPL"]);
        assert_eq!(universe.metrics_by_symbol()["AAPL"].day_change_pct, None);
    }

    #[tokio::test]
    async fn no_data_empties_universe() {
        let source = FakeSource {
            days: HashMap::new(),
            requested: Mutex::new(Vec::new()),
        };
        let mut universe = MarketUniverse::new(sample_config());
        universe.refresh(&source, date(10)).await;
        assert!(universe.is_empty());
        assert!(universe.metrics_by_symbol().is_empty());
    }

    #[tokio::test]
    async fn zero_max_symbols_means_unlimited() {
        let rows: Vec<DailyAggregate> = (0..5).map(|i| row(&format!("S{i}"), 10.0, 1_000.0)).collect();
        let source = FakeSource {
            days: HashMap::from([(date(9), rows)]),
            requested: Mutex::new(Vec::new()),
        };
        let config = MarketUniverseConfig {
            max_symbols: 0,
            lookback_days: 1,
            ..sample_config()
        };
        let mut universe = MarketUniverse::new(config);
        universe.refresh(&source, date(10)).await;
        assert_eq!(universe.symbols().len(), 5);
        // equal volume ties break by name
        assert_eq!(universe.symbols()[0], "S0");
    }

    #[test]
    fn config_from_ini() {
        let cfg = FileConfigAdapter::from_string("[universe]\nmax_symbols = 10\nmin_price = 2.5\n").unwrap();
        let c = MarketUniverseConfig::from_config(&cfg).unwrap();
        assert_eq!(c.max_symbols, 10);
        assert!((c.min_price - 2.5).abs() < f64::EPSILON);
        assert_eq!(c.lookback_days, 3);

        let bad = FileConfigAdapter::from_string("[universe]\nlookback_days = 0\n").unwrap();
        assert!(MarketUniverseConfig::from_config(&bad).is_err());
        let huge =
            FileConfigAdapter::from_string("[universe]\nlookback_days = 9000000000\n").unwrap();
        assert!(MarketUniverseConfig::from_config(&huge).is_err());
    }

    #[tokio::test]
    async fn lookback_stops_at_the_earliest_date() {
        let source = FakeSource {
            days: HashMap::new(),
            requested: Mutex::new(Vec::new()),
        };
        let config = MarketUniverseConfig {
            lookback_days: 5,
            ..sample_config()
        };
        let mut universe = MarketUniverse::new(config);
        let today = NaiveDate::MIN.succ_opt().unwrap();
        universe.refresh(&source, today).await;
        assert_eq!(*source.requested.lock().unwrap(), vec![NaiveDate::MIN]);
        assert!(universe.is_empty());
    }
}
