use std::fmt::Write;

use axum::extract::State;
use axum_extra::extract::Query;
use factorlab_core::format::{escape_html, fmt_percent, fmt_period, fmt_ratio, fmt_signed_percent};
use factorlab_core::series::rebase;
use factorlab_core::{EquityPoint, RunMetrics, RunWithMetrics};
use serde::Deserialize;

use super::charts::{legend, line_chart, LineSeries};
use super::components::{card, empty_state, table_card};
use super::layout::shell;
use super::{or_empty, Page, PageError};
use crate::AppState;

/// Runs offered in the picker.
const PICKER_RUNS: i64 = 50;
/// One chart color per compared run.
const SERIES_COLORS: [&str; 5] = [
    "var(--chart-1)",
    "var(--chart-2)",
    "var(--chart-3)",
    "var(--chart-4)",
    "var(--chart-5)",
];

#[derive(Debug, Default, Deserialize)]
pub struct CompareQuery {
    #[serde(default)]
    runs: Vec<String>,
}

impl CompareQuery {
    /// Requested ids, de-duplicated and capped at one per chart color.
    fn selected(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in &self.runs {
            let id = id.trim();
            if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        ids.truncate(SERIES_COLORS.len());
        ids
    }
}

fn picker(candidates: &[RunWithMetrics], selected: &[String]) -> String {
    let mut options = String::new();
    for r in candidates {
        let checked = selected.iter().any(|id| id == &r.run.id);
        let _ = write!(
            options,
            r#"<label class="list-row"><span><input type="checkbox" name="runs" value="{id}"{checked} /> {name}</span><span class="small muted mono">{strategy} &middot; {period}</span></label>"#,
            id = escape_html(&r.run.id),
            checked = if checked { " checked" } else { "" },
            name = escape_html(&r.run.name),
            strategy = escape_html(&r.run.strategy_label()),
            period = escape_html(&fmt_period(&r.run.start_date, &r.run.end_date)),
        );
    }
    if candidates.is_empty() {
        options.push_str(r#"<p class="muted">No completed runs to compare yet.</p>"#);
    }
    card(
        "Select Runs",
        "",
        &format!(
            r#"<form class="form" method="get" action="/compare">{options}<button class="btn primary" type="submit">Compare</button></form>"#
        ),
    )
}

pub(crate) fn metrics_table(runs: &[RunWithMetrics]) -> String {
    type Row = (&'static str, fn(&RunMetrics) -> String);
    let rows: [Row; 8] = [
        ("CAGR", |m| fmt_signed_percent(m.cagr, 1)),
        ("Sharpe", |m| fmt_ratio(m.sharpe, 2)),
        ("Max DD", |m| fmt_percent(m.max_drawdown, 1)),
        ("Volatility", |m| fmt_percent(m.volatility, 1)),
        ("Win Rate", |m| fmt_percent(m.win_rate, 1)),
        ("Profit Factor", |m| fmt_ratio(m.profit_factor, 2)),
        ("Turnover", |m| fmt_percent(m.turnover, 1)),
        ("Calmar", |m| fmt_ratio(m.calmar, 2)),
    ];

    let mut head = String::from("<th>Metric</th>");
    for r in runs {
        let _ = write!(
            head,
            r#"<th class="num"><a href="/runs/{}">{}</a></th>"#,
            escape_html(&r.run.id),
            escape_html(&r.run.name)
        );
    }
    let mut body = String::new();
    for (label, value) in rows {
        let _ = write!(body, "<tr><td>{label}</td>");
        for r in runs {
            let cell = r.display_metrics().map(value).unwrap_or_else(|| "--".to_string());
            let _ = write!(body, r#"<td class="num mono">{cell}</td>"#);
        }
        body.push_str("</tr>");
    }
    table_card(
        "Metrics",
        "",
        &format!("<table><thead><tr>{head}</tr></thead><tbody>{body}</tbody></table>"),
    )
}

fn overlay_chart(curves: &[(&RunWithMetrics, Vec<EquityPoint>)]) -> String {
    let series: Vec<LineSeries<'_>> = curves
        .iter()
        .zip(SERIES_COLORS)
        .map(|((run, points), color)| LineSeries {
            label: &run.run.name,
            color,
            values: rebase(&points.iter().map(|p| p.portfolio).collect::<Vec<_>>()),
            dashed: false,
        })
        .collect();
    let chart = line_chart(&series, 960, 300, |v| format!("{v:.2}x"));
    let body = if chart.is_empty() {
        r#"<div class="chart-empty">No equity data available</div>"#.to_string()
    } else {
        chart
    };
    card("Growth of $1", &legend(&series), &body)
}

pub async fn compare_page(
    State(state): State<AppState>,
    Query(query): Query<CompareQuery>,
) -> Result<Page, PageError> {
    let selected = query.selected();
    let candidates = or_empty(state.store.completed_runs(PICKER_RUNS).await, "completed runs");

    let mut content = picker(&candidates, &selected);
    let runs = if selected.len() < 2 {
        Vec::new()
    } else {
        state.store.runs_by_ids(&selected).await?
    };
    // Unknown ids drop out, so the gate counts runs that exist.
    if runs.len() < 2 {
        content.push_str(&empty_state(
            "Compare backtest runs",
            "Select two or more runs to compare their performance, risk metrics, and factor exposures side by side.",
        ));
        return Ok(Page::ok(shell("Compare", "/compare", &content)));
    }

    let mut curves = Vec::with_capacity(runs.len());
    for run in &runs {
        let points = state.store.equity_curve(&run.run.id).await?;
        curves.push((run, points));
    }

    content.push_str(&overlay_chart(&curves));
    content.push_str(&metrics_table(&runs));
    Ok(Page::ok(shell("Compare", "/compare", &content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use factorlab_core::Run;

    fn run(id: &str, status: &str) -> RunWithMetrics {
        RunWithMetrics {
            run: Run {
                id: id.to_string(),
                name: id.to_uppercase(),
                strategy_id: "ml_lightgbm".to_string(),
                status: status.to_string(),
                start_date: "2018-01-01".to_string(),
                end_date: "2022-01-01".to_string(),
                created_at: "2025-01-01T00:00:00Z".to_string(),
            },
            metrics: Some(RunMetrics {
                run_id: id.to_string(),
                cagr: 0.1,
                sharpe: 1.0,
                max_drawdown: -0.2,
                turnover: 0.3,
                volatility: 0.15,
                win_rate: 0.55,
                profit_factor: 1.4,
                calmar: 0.5,
            }),
        }
    }

    #[test]
    fn test_selected_dedups_and_caps() {
        let query = CompareQuery {
            runs: ["a", "b", "a", " ", "c", "d", "e", "f", "g"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        assert_eq!(query.selected(), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_metrics_table_columns() {
        let html = metrics_table(&[run("a", "completed"), run("b", "running")]);
        assert!(html.contains(r#"<a href="/runs/a">A</a>"#));
        assert!(html.contains("+10.0%"));
        assert_eq!(html.matches("<td class=\"num mono\">--</td>").count(), 8);
    }

    #[test]
    fn test_picker_marks_selection() {
        let html = picker(&[run("a", "completed"), run("b", "completed")], &["b".to_string()]);
        assert!(html.contains(r#"value="b" checked"#));
        assert!(!html.contains(r#"value="a" checked"#));
    }

    #[test]
    fn test_overlay_chart_rebases() {
        let a = run("a", "completed");
        let points = vec![
            EquityPoint {
                date: "2020-01-01".to_string(),
                portfolio: 100.0,
                benchmark: 100.0,
            },
            EquityPoint {
                date: "2020-01-02".to_string(),
                portfolio: 150.0,
                benchmark: 100.0,
            },
        ];
        let html = overlay_chart(&[(&a, points)]);
        assert!(html.contains(">1.50x</text>"));
        assert!(html.contains(">1.00x</text>"));
    }
}
