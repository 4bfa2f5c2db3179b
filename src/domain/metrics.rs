//! Trade and equity-curve statistics.

use super::position::Fill;
use super::quote::Side;
use chrono::NaiveDateTime;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeStats {
    pub num_trades: usize,
    pub num_winning: usize,
    pub num_losing: usize,
    pub best: f64,
    pub worst: f64,
    pub average: f64,
}

impl TradeStats {
    pub fn from_pnls(pnls: &[f64]) -> Self {
        if pnls.is_empty() {
            return Self::default();
        }
        let n = pnls.len();
        Self {
            num_trades: n,
            num_winning: pnls.iter().filter(|&&p| p > 0.0).count(),
            num_losing: pnls.iter().filter(|&&p| p < 0.0).count(),
            best: pnls.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            worst: pnls.iter().copied().fold(f64::INFINITY, f64::min),
            average: pnls.iter().sum::<f64>() / n as f64,
        }
    }
}

#[derive(Debug, Default)]
struct NetPosition {
    quantity: f64,
    avg_price: f64,
}

/// Break the fill stream into closed-trade PnLs.
///
/// A net position is kept per symbol. Every fill that reduces it emits the
/// PnL of the closed quantity; any remainder opens a position the other way.
pub fn compute_trade_pnls(fills: &[Fill]) -> Vec<f64> {
    let mut book: HashMap<&str, NetPosition> = HashMap::new();
    let mut pnls = Vec::new();

    for fill in fills {
        if fill.quantity <= 0.0 {
            continue;
        }
        let direction = match fill.side {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        };
        let pos = book.entry(fill.symbol.as_str()).or_default();

        if pos.quantity == 0.0 {
            pos.quantity = direction * fill.quantity;
            pos.avg_price = fill.price;
            continue;
        }

        if pos.quantity.signum() == direction {
            let open = pos.quantity.abs();
            pos.avg_price = (pos.avg_price * open + fill.price * fill.quantity) / (open + fill.quantity);
            pos.quantity += direction * fill.quantity;
            continue;
        }

        let open = pos.quantity.abs();
        let closing = open.min(fill.quantity);
        let pnl = if pos.quantity > 0.0 {
            closing * (fill.price - pos.avg_price)
        } else {
            closing * (pos.avg_price - fill.price)
        };
        pnls.push(pnl);

        if closing == open {
            pos.quantity = 0.0;
            pos.avg_price = 0.0;
        } else {
            pos.quantity -= pos.quantity.signum() * closing;
        }

        let remaining = fill.quantity - closing;
        if remaining > 0.0 {
            pos.quantity = direction * remaining;
            pos.avg_price = fill.price;
        }
    }

    pnls
}

/// Per-step return Sharpe ratio scaled by `sqrt(N)`. Not annualized.
pub fn sharpe_like(equity: &[f64]) -> f64 {
    let returns: Vec<f64> = equity
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = if var > 0.0 { var.sqrt() } else { 0.0 };
    if std > 0.0 {
        mean / std * n.sqrt()
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn max_drawdown(equity: &[f64], initial_peak: f64) -> f64 {
    let mut peak = initial_peak;
    let mut max_dd = 0.0_f64;
    for &value in equity {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }
    max_dd
}

/// Summary of an exported equity curve.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityStats {
    pub start_equity: f64,
    pub end_equity: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub peak_equity: f64,
    pub trough_equity: f64,
    pub num_points: usize,
}

impl EquityStats {
    pub fn compute(points: &[EquityPoint]) -> Option<Self> {
        let first = points.first()?;
        let last = points.last()?;

        let start_equity = first.equity;
        let end_equity = last.equity;
        let total_return_pct = if start_equity > 0.0 {
            (end_equity / start_equity - 1.0) * 100.0
        } else {
            0.0
        };

        let mut running_peak = start_equity;
        let mut max_dd = 0.0_f64;
        let mut peak_equity = start_equity;
        let mut trough_equity = start_equity;
        for p in points {
            if p.equity > running_peak {
                running_peak = p.equity;
            }
            let dd = if running_peak > 0.0 {
                (running_peak - p.equity) / running_peak
            } else {
                0.0
            };
            if dd > max_dd {
                max_dd = dd;
                peak_equity = running_peak;
                trough_equity = p.equity;
            }
        }

        Some(Self {
            start_equity,
            end_equity,
            total_return_pct,
            max_drawdown_pct: max_dd * 100.0,
            peak_equity,
            trough_equity,
            num_points: points.len(),
        })
    }
}
