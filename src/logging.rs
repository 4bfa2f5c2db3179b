//! Tracing subscriber setup shared by the CLI commands.
//!
//! Console output always; an optional log file gets the same events without
//! ANSI colours. `RUST_LOG` replaces the level chosen on the command line.

use crate::domain::error::HftaError;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Dependencies that log every request at debug.
const NOISY_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

/// Map a level name to a tracing level. Unknown or empty names mean debug.
pub fn parse_log_level(value: &str) -> Level {
    match value.trim().to_uppercase().as_str() {
        "CRITICAL" | "ERROR" => Level::ERROR,
        "WARNING" | "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "TRACE" => Level::TRACE,
        _ => Level::DEBUG,
    }
}

/// Filter directive for `level` with the noisy dependencies capped at warn.
pub fn default_directive(level: Level) -> String {
    let mut directive = level.to_string().to_lowercase();
    for target in NOISY_TARGETS {
        directive.push_str(&format!(",{target}=warn"));
    }
    directive
}

pub fn init_logging(level: Level, log_file: Option<&Path>) -> Result<(), HftaError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| HftaError::Io(std::io::Error::other(e)))
}
