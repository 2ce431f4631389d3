use axum::extract::{Query, State};
use factorlab_core::format::{fmt_percent, fmt_ratio, fmt_signed_percent};
use factorlab_core::series::Timeframe;
use factorlab_core::{RunMetrics, RunWithMetrics};
use serde::Deserialize;

use super::components::{equity_chart, metric_cards, recent_runs, runs_table, MetricCard};
use super::layout::shell;
use super::{or_empty, Page};
use crate::AppState;

const SPARKLINE_RUNS: i64 = 12;
const RECENT_RUNS: i64 = 5;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    tf: Option<String>,
}

fn signed_ratio(v: f64) -> String {
    if v >= 0.0 {
        format!("+{}", fmt_ratio(v, 2))
    } else {
        fmt_ratio(v, 2)
    }
}

/// KPI cards for the latest completed run. Deltas compare against the
/// completed run before it; sparklines run oldest to newest.
///
/// `completed` is newest first. No cards when the latest run has no metrics yet.
pub(crate) fn build_metric_cards(completed: &[RunWithMetrics]) -> Vec<MetricCard> {
    let Some(latest) = completed.first().and_then(|r| r.metrics.as_ref()) else {
        return Vec::new();
    };
    let previous = completed.get(1).and_then(|r| r.metrics.as_ref());
    let with_metrics: Vec<&RunMetrics> = completed.iter().filter_map(|r| r.metrics.as_ref()).collect();

    type Field = fn(&RunMetrics) -> f64;
    type Fmt = fn(f64) -> String;
    let specs: [(&'static str, Field, Fmt, Fmt); 4] = [
        ("CAGR", |m| m.cagr, |v| fmt_percent(v, 1), |d| fmt_signed_percent(d, 1)),
        ("Sharpe Ratio", |m| m.sharpe, |v| fmt_ratio(v, 2), signed_ratio),
        ("Max Drawdown", |m| m.max_drawdown, |v| fmt_percent(v, 1), |d| fmt_signed_percent(d, 1)),
        ("Turnover", |m| m.turnover, |v| fmt_percent(v, 1), |d| fmt_signed_percent(d, 1)),
    ];

    specs
        .into_iter()
        .map(|(label, field, fmt_value, fmt_delta)| {
            let delta = previous.map(|prev| {
                let d = field(latest) - field(prev);
                (fmt_delta(d), d >= 0.0)
            });
            MetricCard {
                label,
                value: fmt_value(field(latest)),
                delta,
                sparkline: with_metrics.iter().rev().map(|m| field(m)).collect(),
            }
        })
        .collect()
}

pub async fn dashboard_page(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Page {
    let timeframe = query
        .tf
        .as_deref()
        .and_then(|tf| tf.parse::<Timeframe>().ok())
        .unwrap_or_default();

    let (completed, recent, total, all_runs) = tokio::join!(
        state.store.completed_runs(SPARKLINE_RUNS),
        state.store.recent_runs(RECENT_RUNS),
        state.store.count_runs(),
        state.store.list_runs(),
    );
    let completed = or_empty(completed, "completed runs");

    let equity = match completed.first() {
        Some(latest) => or_empty(state.store.equity_curve(&latest.run.id).await, "equity curve"),
        None => Vec::new(),
    };

    let content = format!(
        r#"{cards}
<div class="grid-split">{recent}{chart}</div>
{table}"#,
        cards = metric_cards(&build_metric_cards(&completed)),
        recent = recent_runs(&or_empty(recent, "recent runs"), or_empty(total, "run count")),
        chart = equity_chart(&equity, Some((timeframe, "/dashboard"))),
        table = runs_table(&or_empty(all_runs, "runs")),
    );
    Page::ok(shell("Dashboard", "/dashboard", &content))
}
