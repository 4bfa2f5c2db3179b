//! INI file configuration adapter.
//!
//! Section and key names are case-sensitive so `[strategy.mm_AAPL]` keeps the
//! strategy name exactly as written.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new_cs();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new_cs();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn sections(&self) -> Vec<String> {
        let mut sections = self.config.sections();
        sections.sort();
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[engine]
symbols = AAPL, MSFT
poll_interval = 5

[risk]
max_notional_per_order = 250.0
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("engine", "symbols"),
            Some("AAPL, MSFT".to_string())
        );
        assert_eq!(adapter.get_int("engine", "poll_interval", 0), 5);
        assert_eq!(
            adapter.get_double("risk", "max_notional_per_order", 0.0),
            250.0
        );
    }

    #[test]
    fn section_names_keep_case() {
        let content = "[strategy.mm_AAPL]\ntype = micro_market_maker\nsymbol = AAPL\n";
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("strategy.mm_AAPL", "type"),
            Some("micro_market_maker".to_string())
        );
        assert_eq!(adapter.get_string("strategy.mm_aapl", "type"), None);
    }

    #[test]
    fn sections_are_sorted() {
        let content = "[risk]\na = 1\n[engine]\nb = 2\n[strategy.x]\nc = 3\n";
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(adapter.sections(), vec!["engine", "risk", "strategy.x"]);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[engine]\npoll_interval = 2\n").unwrap();
        assert_eq!(adapter.get_string("engine", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn numeric_getters_fall_back_to_default() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nsteps = abc\nstarting_cash = nope\n")
                .unwrap();
        assert_eq!(adapter.get_int("backtest", "steps", 42), 42);
        assert_eq!(adapter.get_int("backtest", "missing", 7), 7);
        assert_eq!(adapter.get_double("backtest", "starting_cash", 99.9), 99.9);
        assert_eq!(adapter.get_double("backtest", "missing", 1.5), 1.5);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[ai]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\ng = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("ai", "a", false));
        assert!(adapter.get_bool("ai", "b", false));
        assert!(adapter.get_bool("ai", "c", false));
        assert!(!adapter.get_bool("ai", "d", true));
        assert!(!adapter.get_bool("ai", "e", true));
        assert!(!adapter.get_bool("ai", "f", true));
        assert!(adapter.get_bool("ai", "g", true));
        assert!(!adapter.get_bool("ai", "missing", false));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[sqlite]\npath = /tmp/quotes.db\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("sqlite", "path"),
            Some("/tmp/quotes.db".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(result.is_err());
    }
}
