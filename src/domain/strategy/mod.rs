//! Strategy trait and registry.
//!
//! Strategies are configured from `[strategy.<name>]` INI sections whose
//! `type` key selects the implementation.

pub mod market_maker;
pub mod trend_scalper;

use super::error::HftaError;
use super::order::OrderIntent;
use super::quote::Quote;
use crate::ports::config_port::ConfigPort;
use std::collections::BTreeMap;

pub use market_maker::MicroMarketMaker;
pub use trend_scalper::MicroTrendScalper;

pub const STRATEGY_SECTION_PREFIX: &str = "strategy.";

pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Registry key of the implementation, e.g. `micro_market_maker`.
    fn kind(&self) -> &'static str;

    fn symbol(&self) -> &str;

    fn set_symbol(&mut self, symbol: &str);

    fn on_quote(&mut self, quote: &Quote) -> Vec<OrderIntent>;

    /// Sync the strategy's view of its net position. Default is a no-op.
    fn sync_position(&mut self, _quantity: f64) {}

    /// Numeric tunables exposed to the parameter tuner.
    fn params(&self) -> BTreeMap<String, f64>;

    /// Set a tunable. Returns false for unknown keys or rejected values.
    fn set_param(&mut self, key: &str, value: f64) -> bool;
}

pub const STRATEGY_KINDS: &[&str] = &[MicroMarketMaker::KIND, MicroTrendScalper::KIND];

pub fn build_strategy(
    kind: &str,
    name: &str,
    config: &dyn ConfigPort,
    section: &str,
) -> Result<Box<dyn Strategy>, HftaError> {
    match kind.trim() {
        MicroMarketMaker::KIND => Ok(Box::new(MicroMarketMaker::from_config(
            name, config, section,
        )?)),
        MicroTrendScalper::KIND => Ok(Box::new(MicroTrendScalper::from_config(
            name, config, section,
        )?)),
        other => Err(HftaError::UnknownStrategy {
            name: name.to_string(),
            kind: other.to_string(),
        }),
    }
}

/// Build every strategy declared in a `[strategy.<name>]` section.
pub fn build_strategies(config: &dyn ConfigPort) -> Result<Vec<Box<dyn Strategy>>, HftaError> {
    let mut strategies = Vec::new();
    for section in config.sections() {
        let Some(name) = section.strip_prefix(STRATEGY_SECTION_PREFIX) else {
            continue;
        };
        let kind = config
            .get_string(&section, "type")
            .ok_or_else(|| HftaError::ConfigMissing {
                section: section.clone(),
                key: "type".into(),
            })?;
        tracing::debug!("Building strategy '{name}' of type '{kind}'");
        strategies.push(build_strategy(&kind, name, config, &section)?);
    }
    Ok(strategies)
}

pub(crate) fn required_symbol(
    config: &dyn ConfigPort,
    section: &str,
) -> Result<String, HftaError> {
    config
        .get_string(section, "symbol")
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HftaError::ConfigMissing {
            section: section.to_string(),
            key: "symbol".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn builds_all_declared_strategies() {
        let config = FileConfigAdapter::from_string(
            r#"
[engine]
symbols = AAPL

[strategy.mm_AAPL]
type = micro_market_maker
symbol = aapl

[strategy.trend_MSFT]
type = micro_trend_scalper
symbol = MSFT
short_window = 3
long_window = 6
"#,
        )
        .unwrap();
        let strategies = build_strategies(&config).unwrap();
        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[0].name(), "mm_AAPL");
        assert_eq!(strategies[0].kind(), "micro_market_maker");
        assert_eq!(strategies[0].symbol(), "AAPL");
        assert_eq!(strategies[1].name(), "trend_MSFT");
        assert_eq!(strategies[1].params()["long_window"], 6.0);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let config =
            FileConfigAdapter::from_string("[strategy.x]\ntype = grid\nsymbol = AAPL\n").unwrap();
        match build_strategies(&config) {
            Err(HftaError::UnknownStrategy { name, kind }) => {
                assert_eq!(name, "x");
                assert_eq!(kind, "grid");
            }
            Err(other) => panic!("expected UnknownStrategy, got: {other}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn missing_type_is_config_error() {
        let config = FileConfigAdapter::from_string("[strategy.x]\nsymbol = AAPL\n").unwrap();
        assert!(matches!(
            build_strategies(&config),
            Err(HftaError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn missing_symbol_is_config_error() {
        let config =
            FileConfigAdapter::from_string("[strategy.x]\ntype = micro_market_maker\n").unwrap();
        match build_strategies(&config) {
            Err(HftaError::ConfigMissing { section, key }) => {
                assert_eq!(section, "strategy.x");
                assert_eq!(key, "symbol");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error"),
        }
    }
}
