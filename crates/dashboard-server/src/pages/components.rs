//! HTML fragments shared across pages.

use std::fmt::Write;

use factorlab_core::format::{escape_html, fmt_money, fmt_percent, fmt_period, fmt_ratio, fmt_signed_percent};
use factorlab_core::series::{slice_timeframe, Timeframe};
use factorlab_core::{EquityPoint, RunStatus, RunWithMetrics};

use super::charts::{legend, line_chart, sparkline, LineSeries};

/// One dashboard KPI card.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCard {
    pub label: &'static str,
    pub value: String,
    /// Formatted change against the previous run, with its direction.
    pub delta: Option<(String, bool)>,
    pub sparkline: Vec<f64>,
}

pub fn card(title: &str, aside: &str, body: &str) -> String {
    format!(
        r#"<section class="card"><div class="card-header"><h3 class="card-title">{title}</h3>{aside}</div><div class="card-body">{body}</div></section>"#,
        title = escape_html(title),
    )
}

/// Card whose body is a full-width table.
pub fn table_card(title: &str, aside: &str, table: &str) -> String {
    format!(
        r#"<section class="card"><div class="card-header"><h3 class="card-title">{title}</h3>{aside}</div><div class="card-body flush">{table}</div></section>"#,
        title = escape_html(title),
    )
}

pub fn count_label(text: &str) -> String {
    format!(r#"<span class="small muted mono">{}</span>"#, escape_html(text))
}

pub fn empty_state(heading: &str, message: &str) -> String {
    format!(
        r#"<div class="empty-state"><h2>{}</h2><p>{}</p></div>"#,
        escape_html(heading),
        escape_html(message)
    )
}

pub fn status_badge(raw: &str) -> String {
    let status = RunStatus::parse_lossy(raw);
    format!(r#"<span class="badge badge-{s}">{s}</span>"#, s = status.as_str())
}

pub fn delta_pill(text: &str, positive: bool) -> String {
    let (cls, arrow) = if positive { ("pos", "\u{2197}") } else { ("neg", "\u{2198}") };
    format!(
        r#"<span class="pill {cls}">{arrow} {}</span>"#,
        escape_html(text)
    )
}

pub fn progress_bar(progress: i64, max_width: u32) -> String {
    let p = progress.clamp(0, 100);
    format!(
        r#"<div class="progress"><div class="track" style="max-width: {max_width}px"><div class="fill" style="width: {p}%"></div></div><span class="small mono warn">{p}%</span></div>"#
    )
}

pub fn metric_cards(cards: &[MetricCard]) -> String {
    let mut out = String::from(r#"<div class="grid-4">"#);
    if cards.is_empty() {
        for _ in 0..4 {
            out.push_str(r#"<div class="card metric placeholder"></div>"#);
        }
    }
    for c in cards {
        let delta = c
            .delta
            .as_ref()
            .map(|(text, positive)| delta_pill(text, *positive))
            .unwrap_or_default();
        let _ = write!(
            out,
            r#"<div class="card metric"><div><div class="label">{label}</div><div class="value">{value}</div>{delta}</div><div>{spark}</div></div>"#,
            label = c.label,
            value = escape_html(&c.value),
            spark = sparkline(&c.sparkline, 64, 32),
        );
    }
    out.push_str("</div>");
    out
}

/// All runs with their headline metrics. Metrics are shown only for runs
/// that finished.
pub fn runs_table(runs: &[RunWithMetrics]) -> String {
    let mut rows = String::new();
    for r in runs {
        let metrics = r.display_metrics();
        let (cagr_cls, cagr) = match metrics {
            Some(m) => (
                if m.cagr >= 0.0 { "pos" } else { "neg" },
                fmt_signed_percent(m.cagr, 1),
            ),
            None => ("muted", "--".to_string()),
        };
        let sharpe = metrics.map(|m| fmt_ratio(m.sharpe, 2)).unwrap_or_else(|| "--".into());
        let max_dd = metrics
            .map(|m| fmt_percent(m.max_drawdown, 1))
            .unwrap_or_else(|| "--".into());
        let _ = write!(
            rows,
            r#"<tr><td><a href="/runs/{id}">{name}</a></td><td class="muted">{strategy}</td><td>{badge}</td><td class="num {cagr_cls}">{cagr}</td><td class="num">{sharpe}</td><td class="num neg">{max_dd}</td><td class="num muted">{period}</td></tr>"#,
            id = escape_html(&r.run.id),
            name = escape_html(&r.run.name),
            strategy = escape_html(&r.run.strategy_label()),
            badge = status_badge(&r.run.status),
            period = escape_html(&fmt_period(&r.run.start_date, &r.run.end_date)),
        );
    }
    if runs.is_empty() {
        rows.push_str(r#"<tr><td colspan="7" class="empty-row">No runs found</td></tr>"#);
    }
    let table = format!(
        r#"<table><thead><tr><th>Name</th><th>Strategy</th><th>Status</th><th class="num">CAGR</th><th class="num">Sharpe</th><th class="num">Max DD</th><th class="num">Period</th></tr></thead><tbody>{rows}</tbody></table>"#
    );
    table_card("All Runs", "", &table)
}

pub fn recent_runs(runs: &[RunWithMetrics], total: i64) -> String {
    let mut body = String::new();
    for r in runs {
        let sharpe = match (r.run.status(), &r.metrics) {
            (RunStatus::Completed, Some(m)) => {
                format!(r#"<span class="mono pos">{}</span>"#, fmt_ratio(m.sharpe, 2))
            }
            _ => String::new(),
        };
        let _ = write!(
            body,
            r#"<a class="list-row" href="/runs/{id}"><div><div>{name}</div><div class="small muted">{strategy}</div></div><div>{sharpe} {badge}</div></a>"#,
            id = escape_html(&r.run.id),
            name = escape_html(&r.run.name),
            strategy = escape_html(&r.run.strategy_label()),
            badge = status_badge(&r.run.status),
        );
    }
    if runs.is_empty() {
        body.push_str(r#"<p class="muted">No runs yet</p>"#);
    }
    card("Recent Runs", &count_label(&format!("{total} total")), &body)
}

fn money_k(v: f64) -> String {
    format!("${:.1}k", v / 1000.0)
}

/// Portfolio vs benchmark chart. With `timeframe`, the series is trimmed to
/// the window and timeframe links pointing at `base_href?tf=..` are shown.
pub fn equity_chart(points: &[EquityPoint], timeframe: Option<(Timeframe, &str)>) -> String {
    let shown = match timeframe {
        Some((tf, _)) => slice_timeframe(points, tf),
        None => points,
    };
    let series = [
        LineSeries {
            label: "SPY",
            color: "var(--chart-5)",
            values: shown.iter().map(|p| p.benchmark).collect(),
            dashed: true,
        },
        LineSeries {
            label: "Portfolio",
            color: "var(--chart-1)",
            values: shown.iter().map(|p| p.portfolio).collect(),
            dashed: false,
        },
    ];

    let mut aside = legend(&series);
    if let Some((selected, base)) = timeframe {
        aside.push_str(r#"<div class="segmented">"#);
        for tf in Timeframe::ALL {
            let _ = write!(
                aside,
                r#"<a class="{cls}" href="{base}?tf={label}">{label}</a>"#,
                cls = if tf == selected { "active" } else { "" },
                label = tf.label(),
            );
        }
        aside.push_str("</div>");
    }

    let body = if shown.is_empty() {
        r#"<div class="chart-empty">No equity data available</div>"#.to_string()
    } else {
        let summary = match (shown.first(), shown.last()) {
            (Some(first), Some(last)) => format!(
                r#"<p class="small muted mono">{} &rarr; {} &middot; {} to {}</p>"#,
                fmt_money(first.portfolio),
                fmt_money(last.portfolio),
                escape_html(&first.date),
                escape_html(&last.date),
            ),
            _ => String::new(),
        };
        format!("{}{summary}", line_chart(&series, 960, 300, money_k))
    };
    card("Equity Curve", &aside, &body)
}
