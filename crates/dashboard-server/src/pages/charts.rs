//! Inline SVG charts for the pages.

use std::fmt::Write;

use factorlab_core::format::{escape_html, fmt_percent};
use tearsheet::make_polyline;

pub struct LineSeries<'a> {
    pub label: &'a str,
    pub color: &'a str,
    pub values: Vec<f64>,
    pub dashed: bool,
}

/// Min and max over every finite value of every series.
fn bounds(series: &[LineSeries<'_>]) -> Option<(f64, f64)> {
    let mut values = series
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .filter(|v| v.is_finite())
        .peekable();
    values.peek()?;
    Some(values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    }))
}

/// Polyline points for `values` on a y range shared with other series.
fn scaled_points(values: &[f64], min: f64, max: f64, width: f64, height: f64, pad: f64) -> String {
    let y_span = if max - min == 0.0 { 1.0 } else { max - min };
    let x_span = values.len().saturating_sub(1).max(1) as f64;
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let x = pad + (i as f64 / x_span) * (width - pad * 2.0);
            let y = height - pad - ((v - min) / y_span) * (height - pad * 2.0);
            format!("{x:.2},{y:.2}")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Multi-series line chart with a shared y axis and min/max labels.
pub fn line_chart(
    series: &[LineSeries<'_>],
    width: u32,
    height: u32,
    y_label: impl Fn(f64) -> String,
) -> String {
    let Some((min, max)) = bounds(series) else {
        return String::new();
    };
    let (w, h, pad) = (width as f64, height as f64, 16.0);

    let mut svg = format!(
        r#"<svg class="chart" viewBox="0 0 {width} {height}" role="img" preserveAspectRatio="none">"#
    );
    for frac in [0.0, 0.5, 1.0] {
        let y = pad + frac * (h - pad * 2.0);
        let _ = write!(
            svg,
            r#"<line x1="{pad}" x2="{x2}" y1="{y:.2}" y2="{y:.2}" stroke="var(--border)" stroke-dasharray="3 3" />"#,
            x2 = w - pad,
        );
    }
    for s in series {
        let _ = write!(
            svg,
            r#"<polyline fill="none" stroke="{color}" stroke-width="1.8"{dash} points="{points}" />"#,
            color = s.color,
            dash = if s.dashed { r#" stroke-dasharray="4 4""# } else { "" },
            points = scaled_points(&s.values, min, max, w, h, pad),
        );
    }
    let _ = write!(
        svg,
        r#"<text x="{pad}" y="12" font-size="10" fill="var(--muted-foreground)">{top}</text><text x="{pad}" y="{bottom:.0}" font-size="10" fill="var(--muted-foreground)">{low}</text></svg>"#,
        top = escape_html(&y_label(max)),
        bottom = h - 4.0,
        low = escape_html(&y_label(min)),
    );
    svg
}

pub fn legend(series: &[LineSeries<'_>]) -> String {
    let mut out = String::from(r#"<div class="legend">"#);
    for s in series {
        let _ = write!(
            out,
            r#"<span><i class="dot" style="background: {color}"></i>{label}</span>"#,
            color = s.color,
            label = escape_html(s.label),
        );
    }
    out.push_str("</div>");
    out
}

/// Small trend line, green when the series ends at or above where it started.
pub fn sparkline(values: &[f64], width: u32, height: u32) -> String {
    if values.is_empty() {
        return String::new();
    }
    let rising = values.last() >= values.first();
    let color = if rising { "var(--success)" } else { "var(--destructive)" };
    format!(
        r#"<svg viewBox="0 0 {width} {height}" width="{width}" height="{height}" aria-hidden="true"><polyline fill="none" stroke="{color}" stroke-width="1.5" points="{points}" /></svg>"#,
        points = make_polyline(values, width as f64, height as f64, 2.0),
    )
}

/// Vertical bars for non-negative fractions. Labels are dates, shown as year-month.
pub fn bar_chart(values: &[(String, f64)], width: u32, height: u32, color: &str) -> String {
    if values.is_empty() {
        return String::new();
    }
    let max = values
        .iter()
        .map(|(_, v)| *v)
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    let max = if max <= 0.0 { 1.0 } else { max };
    let (w, h, pad, label_h) = (width as f64, height as f64, 16.0, 14.0);
    let slot = (w - pad * 2.0) / values.len() as f64;
    let bar_w = (slot * 0.7).max(1.0);
    let plot_h = h - pad - label_h;

    let mut svg = format!(
        r#"<svg class="chart" viewBox="0 0 {width} {height}" role="img" preserveAspectRatio="none">"#
    );
    let label_every = (values.len() / 12).max(1);
    for (i, (label, v)) in values.iter().enumerate() {
        let v = if v.is_finite() { v.max(0.0) } else { 0.0 };
        let bar_h = v / max * plot_h;
        let x = pad + i as f64 * slot + (slot - bar_w) / 2.0;
        let _ = write!(
            svg,
            r#"<rect x="{x:.2}" y="{y:.2}" width="{bar_w:.2}" height="{bar_h:.2}" rx="2" fill="{color}"><title>{title}</title></rect>"#,
            y = pad + plot_h - bar_h,
            title = escape_html(&format!("{label}: {}", fmt_percent(v, 1))),
        );
        if i % label_every == 0 {
            let _ = write!(
                svg,
                r#"<text x="{x:.2}" y="{ty:.2}" font-size="9" fill="var(--muted-foreground)">{label}</text>"#,
                ty = h - 2.0,
                label = escape_html(label.get(..7).unwrap_or(label)),
            );
        }
    }
    svg.push_str("</svg>");
    svg
}
