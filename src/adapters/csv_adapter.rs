//! CSV import of historical quotes and export of backtest results.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::HftaError;
use crate::domain::metrics::EquityPoint;
use crate::domain::position::Fill;
use crate::domain::quote::{Quote, parse_timestamp};
use std::fs;
use std::path::Path;

/// Half spread synthesized around `last` when the book is incomplete.
const SYNTHETIC_HALF_SPREAD: f64 = 0.01;

fn csv_error(path: &Path, reason: impl std::fmt::Display) -> HftaError {
    HftaError::Csv {
        file: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Column lookup by header name, case-insensitive.
struct Columns {
    headers: Vec<String>,
}

impl Columns {
    fn new(headers: &csv::StringRecord) -> Self {
        Self {
            headers: headers.iter().map(|h| h.trim().to_lowercase()).collect(),
        }
    }

    fn index(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|alias| self.headers.iter().position(|h| h == alias))
    }

    /// Every present column among `aliases`, in alias order.
    fn indices(&self, aliases: &[&str]) -> Vec<usize> {
        aliases
            .iter()
            .filter_map(|alias| self.headers.iter().position(|h| h == alias))
            .collect()
    }
}

fn cell<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn maybe_float(record: &csv::StringRecord, idx: Option<usize>) -> Option<f64> {
    cell(record, idx).and_then(|v| v.parse().ok())
}

/// First non-blank cell among `cols`, checked per row.
fn first_cell<'r>(record: &'r csv::StringRecord, cols: &[usize]) -> Option<&'r str> {
    cols.iter().find_map(|&i| cell(record, Some(i)))
}

/// First parseable number among `cols`, checked per row.
fn first_float(record: &csv::StringRecord, cols: &[usize]) -> Option<f64> {
    cols.iter().find_map(|&i| maybe_float(record, Some(i)))
}

/// Load quotes for `symbol` from a CSV with a header row.
///
/// Recognized columns: `timestamp|time|datetime`, `bid|bid_price`,
/// `ask|ask_price`, `last|close|price`, `bid_size`, `ask_size`. When several
/// aliases are present, a blank cell falls through to the next alias on the
/// same row. Rows with neither a last price nor a full bid/ask pair are
/// skipped. A missing last becomes the mid, and a missing side is filled one
/// cent either side of last.
pub fn load_quotes_csv(path: &Path, symbol: &str) -> Result<Vec<Quote>, HftaError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let cols = Columns::new(rdr.headers().map_err(|e| csv_error(path, e))?);

    let ts_cols = cols.indices(&["timestamp", "time", "datetime"]);
    let bid_cols = cols.indices(&["bid", "bid_price"]);
    let ask_cols = cols.indices(&["ask", "ask_price"]);
    let last_cols = cols.indices(&["last", "close", "price"]);
    let bid_size_col = cols.index(&["bid_size"]);
    let ask_size_col = cols.index(&["ask_size"]);

    let symbol = symbol.trim().to_uppercase();
    let mut quotes = Vec::new();
    let mut skipped = 0_usize;

    for result in rdr.records() {
        let record = result.map_err(|e| csv_error(path, e))?;

        let mut bid = first_float(&record, &bid_cols);
        let mut ask = first_float(&record, &ask_cols);
        let mut last = first_float(&record, &last_cols);

        let (b, a) = match (bid, ask, last) {
            (Some(b), Some(a), _) => (b, a),
            (_, _, Some(l)) => (l - SYNTHETIC_HALF_SPREAD, l + SYNTHETIC_HALF_SPREAD),
            _ => {
                skipped += 1;
                continue;
            }
        };
        bid = Some(b);
        ask = Some(a);
        if last.is_none() {
            last = Some((b + a) / 2.0);
        }

        quotes.push(Quote {
            symbol: symbol.clone(),
            security_id: format!("HIST-{symbol}"),
            bid,
            ask,
            last,
            bid_size: maybe_float(&record, bid_size_col),
            ask_size: maybe_float(&record, ask_size_col),
            timestamp: first_cell(&record, &ts_cols).and_then(parse_timestamp),
        });
    }

    tracing::info!(
        "Loaded {} quotes for {symbol} from {} ({skipped} rows skipped)",
        quotes.len(),
        path.display()
    );
    Ok(quotes)
}

fn create_parent(path: &Path) -> Result<(), HftaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write `timestamp,equity` rows, equity to 4 decimal places.
pub fn write_equity_csv(path: &Path, result: &BacktestResult) -> Result<(), HftaError> {
    create_parent(path)?;
    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    wtr.write_record(["timestamp", "equity"])
        .map_err(|e| csv_error(path, e))?;
    for (ts, equity) in result.timestamps.iter().zip(&result.equity_curve) {
        wtr.write_record([
            ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
            format!("{equity:.4}"),
        ])
        .map_err(|e| csv_error(path, e))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_fills_csv(path: &Path, fills: &[Fill]) -> Result<(), HftaError> {
    create_parent(path)?;
    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    wtr.write_record(["symbol", "side", "quantity", "price", "timestamp"])
        .map_err(|e| csv_error(path, e))?;
    for fill in fills {
        wtr.write_record([
            fill.symbol.clone(),
            fill.side.to_string(),
            format!("{:.4}", fill.quantity),
            format!("{:.4}", fill.price),
            fill.timestamp
                .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string())
                .unwrap_or_default(),
        ])
        .map_err(|e| csv_error(path, e))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read an equity curve written by [`write_equity_csv`]. Rows with a blank
/// timestamp or equity cell are skipped.
pub fn load_equity_csv(path: &Path) -> Result<Vec<EquityPoint>, HftaError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let cols = Columns::new(rdr.headers().map_err(|e| csv_error(path, e))?);
    let ts_col = cols
        .index(&["timestamp"])
        .ok_or_else(|| csv_error(path, "missing timestamp column"))?;
    let eq_col = cols
        .index(&["equity"])
        .ok_or_else(|| csv_error(path, "missing equity column"))?;

    let mut points = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| csv_error(path, e))?;
        let (Some(ts_raw), Some(eq_raw)) = (cell(&record, Some(ts_col)), cell(&record, Some(eq_col)))
        else {
            continue;
        };
        let timestamp = parse_timestamp(ts_raw)
            .ok_or_else(|| csv_error(path, format!("invalid timestamp {ts_raw:?}")))?;
        let equity: f64 = eq_raw
            .parse()
            .map_err(|e| csv_error(path, format!("invalid equity {eq_raw:?}: {e}")))?;
        points.push(EquityPoint { timestamp, equity });
    }
    Ok(points)
}
