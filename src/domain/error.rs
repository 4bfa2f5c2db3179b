//! Domain error types.

/// Top-level error type for hfta.
#[derive(Debug, thiserror::Error)]
pub enum HftaError {
    #[error("quote store error: {reason}")]
    Store { reason: String },

    #[error("quote store query error: {reason}")]
    StoreQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown strategy type {kind:?} for strategy {name}")]
    UnknownStrategy { name: String, kind: String },

    #[error("invalid strategy {name}: {reason}")]
    InvalidStrategy { name: String, reason: String },

    #[error("invalid order for {symbol}: {reason}")]
    InvalidOrder { symbol: String, reason: String },

    #[error("broker error: {reason}")]
    Broker { reason: String },

    #[error("market data error for {symbol}: {reason}")]
    MarketData { symbol: String, reason: String },

    #[error("advisor error: {reason}")]
    Advisor { reason: String },

    #[error("csv error in {file}: {reason}")]
    Csv { file: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HftaError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        HftaError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&HftaError> for std::process::ExitCode {
    fn from(err: &HftaError) -> Self {
        let code: u8 = match err {
            HftaError::Io(_) | HftaError::Csv { .. } => 1,
            HftaError::ConfigParse { .. }
            | HftaError::ConfigMissing { .. }
            | HftaError::ConfigInvalid { .. } => 2,
            HftaError::Store { .. } | HftaError::StoreQuery { .. } => 3,
            HftaError::UnknownStrategy { .. } | HftaError::InvalidStrategy { .. } => 4,
            HftaError::Broker { .. }
            | HftaError::MarketData { .. }
            | HftaError::InvalidOrder { .. } => 5,
            HftaError::Advisor { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::ExitCode;

    // ExitCode has no PartialEq; compare the debug rendering instead.
    fn assert_same_code(actual: ExitCode, expected: u8) {
        assert_eq!(
            format!("{actual:?}"),
            format!("{:?}", ExitCode::from(expected))
        );
    }

    #[test]
    fn config_errors_display_section_and_key() {
        let err = HftaError::ConfigMissing {
            section: "strategy.mm".into(),
            key: "symbol".into(),
        };
        assert_eq!(err.to_string(), "missing config key [strategy.mm] symbol");

        let err = HftaError::config_invalid("risk", "max_cash_utilization", "must be in (0, 1]");
        assert_eq!(
            err.to_string(),
            "invalid config value [risk] max_cash_utilization: must be in (0, 1]"
        );
    }

    #[test]
    fn exit_codes_group_by_concern() {
        let io = HftaError::Io(std::io::Error::other("boom"));
        assert_same_code(ExitCode::from(&io), 1);

        let cfg = HftaError::config_invalid("engine", "poll_interval", "must be positive");
        assert_same_code(ExitCode::from(&cfg), 2);

        let store = HftaError::StoreQuery {
            reason: "locked".into(),
        };
        assert_same_code(ExitCode::from(&store), 3);

        let strat = HftaError::UnknownStrategy {
            name: "x".into(),
            kind: "grid".into(),
        };
        assert_same_code(ExitCode::from(&strat), 4);

        let broker = HftaError::Broker {
            reason: "timeout".into(),
        };
        assert_same_code(ExitCode::from(&broker), 5);

        let advisor = HftaError::Advisor {
            reason: "empty".into(),
        };
        assert_same_code(ExitCode::from(&advisor), 6);
    }
}
