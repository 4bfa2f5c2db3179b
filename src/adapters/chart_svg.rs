//! SVG rendering of an equity curve.

use crate::domain::metrics::EquityPoint;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 300.0;
const PADDING: f64 = 40.0;

/// Render the curve as a standalone SVG document. Returns `None` when there
/// are no points to draw.
pub fn render_equity_svg(equity_curve: &[EquityPoint], title: &str) -> Option<String> {
    let first = equity_curve.first()?;
    let last = equity_curve.last()?;

    let min_equity = equity_curve
        .iter()
        .map(|p| p.equity)
        .fold(f64::INFINITY, f64::min);
    let max_equity = equity_curve
        .iter()
        .map(|p| p.equity)
        .fold(f64::NEG_INFINITY, f64::max);

    let plot_width = WIDTH - 2.0 * PADDING;
    let plot_height = HEIGHT - 2.0 * PADDING;

    let range = max_equity - min_equity;
    let scale_y = if range > 0.0 { plot_height / range } else { 0.0 };
    let scale_x = if equity_curve.len() > 1 {
        plot_width / (equity_curve.len() - 1) as f64
    } else {
        0.0
    };

    let points: Vec<String> = equity_curve
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let x = PADDING + i as f64 * scale_x;
            // flat curves sit on the vertical centre line
            let y = if range > 0.0 {
                HEIGHT - PADDING - (point.equity - min_equity) * scale_y
            } else {
                HEIGHT / 2.0
            };
            format!("{x:.1},{y:.1}")
        })
        .collect();

    let bottom = HEIGHT - PADDING;
    let right = WIDTH - PADDING;
    Some(format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH:.0}" height="{HEIGHT:.0}" viewBox="0 0 {WIDTH:.0} {HEIGHT:.0}">
  <rect width="100%" height="100%" fill="white"/>
  <text x="{PADDING:.0}" y="24" font-family="sans-serif" font-size="14">{title}</text>
  <line x1="{PADDING:.0}" y1="{PADDING:.0}" x2="{PADDING:.0}" y2="{bottom:.0}" stroke="black"/>
  <line x1="{PADDING:.0}" y1="{bottom:.0}" x2="{right:.0}" y2="{bottom:.0}" stroke="black"/>
  <text x="2" y="{PADDING:.0}" font-family="sans-serif" font-size="10">{max_equity:.2}</text>
  <text x="2" y="{bottom:.0}" font-family="sans-serif" font-size="10">{min_equity:.2}</text>
  <text x="{PADDING:.0}" y="{label_y:.0}" font-family="sans-serif" font-size="10">{start}</text>
  <text x="{right:.0}" y="{label_y:.0}" font-family="sans-serif" font-size="10" text-anchor="end">{end}</text>
  <polyline fill="none" stroke="#1f77b4" stroke-width="1.5" points="{polyline}"/>
</svg>
"##,
        title = escape(title),
        label_y = HEIGHT - 10.0,
        start = first.timestamp.format("%Y-%m-%d %H:%M"),
        end = last.timestamp.format("%Y-%m-%d %H:%M"),
        polyline = points.join(" "),
    ))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_equity_point(minute: u32, equity: f64) -> EquityPoint {
        EquityPoint {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, minute, 0)
                .unwrap(),
            equity,
        }
    }

    #[test]
    fn empty_curve_renders_nothing() {
        assert!(render_equity_svg(&[], "Equity").is_none());
    }

    #[test]
    fn polyline_spans_plot_area() {
        let curve = vec![
            sample_equity_point(30, 100_000.0),
            sample_equity_point(31, 105_000.0),
            sample_equity_point(32, 110_000.0),
        ];
        let svg = render_equity_svg(&curve, "Equity curve").unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("points=\"40.0,260.0 400.0,150.0 760.0,40.0\""));
        assert!(svg.contains("Equity curve"));
        assert!(svg.contains("2024-01-02 09:32"));
    }

    #[test]
    fn flat_curve_is_centred() {
        let curve = vec![sample_equity_point(30, 500.0), sample_equity_point(31, 500.0)];
        let svg = render_equity_svg(&curve, "flat").unwrap();
        assert!(svg.contains("points=\"40.0,150.0 760.0,150.0\""));
    }

    #[test]
    fn title_is_escaped() {
        let curve = vec![sample_equity_point(30, 1.0)];
        let svg = render_equity_svg(&curve, "a<b & c").unwrap();
        assert!(svg.contains("a&lt;b &amp; c"));
    }
}
