use std::fmt::Write;

use axum::{
    extract::{Extension, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use factorlab_core::format::{
    escape_html, fmt_optional_pct, fmt_percent, fmt_ratio, fmt_signed_percent, fmt_thousands,
};
use factorlab_core::series::{
    drawdown_series, feature_importance_rows, holdings_from_predictions, latest_picks,
    trades_from_predictions, turnover_series,
};
use factorlab_core::{
    EquityPoint, Job, ModelMetadata, ModelPrediction, Report, RunMetrics, RunStatus, RunWithMetrics,
};
use serde::Deserialize;

use super::charts::{bar_chart, line_chart, LineSeries};
use super::components::{card, count_label, equity_chart, progress_bar, status_badge, table_card};
use super::layout::shell;
use super::{Page, PageError};
use crate::request_id::RequestId;
use crate::{report_error_status, AppState};

const LATEST_PICKS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tab {
    Overview,
    Holdings,
    Trades,
    Ml,
}

impl Tab {
    const ALL: [Tab; 4] = [Tab::Overview, Tab::Holdings, Tab::Trades, Tab::Ml];

    /// Unknown or missing values fall back to the overview.
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("holdings") => Tab::Holdings,
            Some("trades") => Tab::Trades,
            Some("ml") | Some("ml-insights") => Tab::Ml,
            _ => Tab::Overview,
        }
    }

    fn key(&self) -> &'static str {
        match self {
            Tab::Overview => "overview",
            Tab::Holdings => "holdings",
            Tab::Trades => "trades",
            Tab::Ml => "ml",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Holdings => "Holdings",
            Tab::Trades => "Trades",
            Tab::Ml => "ML Insights",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    tab: Option<String>,
}

fn header(run: &RunWithMetrics, report: Option<&Report>) -> String {
    let id = escape_html(&run.run.id);
    let mut actions = String::new();
    if let Some(report) = report {
        let _ = write!(
            actions,
            r#"<a class="btn" href="{}" target="_blank" rel="noopener">Download Report</a>"#,
            escape_html(&report.url)
        );
    }
    if run.run.status() == RunStatus::Completed {
        let _ = write!(
            actions,
            r#"<form class="inline-form" method="post" action="/runs/{id}/report"><button class="btn{primary}" type="submit">{label}</button></form>"#,
            primary = if report.is_none() { " primary" } else { "" },
            label = if report.is_none() { "Generate Report" } else { "Regenerate" },
        );
    }
    format!(
        r#"<div class="card-header">
  <div class="inline-form"><a class="btn" href="/runs" aria-label="Back to runs">&larr;</a><h2>{name}</h2><span class="badge">{strategy}</span>{badge}</div>
  <div class="inline-form">{actions}</div>
</div>"#,
        name = escape_html(&run.run.name),
        strategy = escape_html(&run.run.strategy_label()),
        badge = status_badge(&run.run.status),
    )
}

/// Progress panel shown while a run waits for or occupies a worker.
pub(crate) fn job_status_panel(status: RunStatus, job: Option<&Job>) -> String {
    match status {
        RunStatus::Queued => card(
            "Queued",
            "",
            r#"<p class="muted">Waiting for a worker to pick up this job.</p>"#,
        ),
        RunStatus::Running => {
            let progress = job.map(Job::progress_clamped).unwrap_or(0);
            card(
                "Running backtest\u{2026}",
                "",
                &format!(
                    r#"<p class="muted">Stage: data loading &amp; factor computation: {progress}% complete</p>{}"#,
                    progress_bar(progress, 480)
                ),
            )
        }
        _ => String::new(),
    }
}

fn tabs(run_id: &str, active: Tab) -> String {
    let mut out = String::from(r#"<nav class="tabs" aria-label="Run sections">"#);
    for tab in Tab::ALL {
        let _ = write!(
            out,
            r#"<a class="{cls}" href="/runs/{id}?tab={key}">{label}</a>"#,
            cls = if tab == active { "active" } else { "" },
            id = escape_html(run_id),
            key = tab.key(),
            label = tab.label(),
        );
    }
    out.push_str("</nav>");
    out
}

fn overview_tab(metrics: Option<&RunMetrics>, equity: &[EquityPoint]) -> String {
    type Cell = (&'static str, fn(&RunMetrics) -> String);
    let cells: [Cell; 8] = [
        ("CAGR", |m| fmt_signed_percent(m.cagr, 1)),
        ("Sharpe", |m| fmt_ratio(m.sharpe, 2)),
        ("Max DD", |m| fmt_percent(m.max_drawdown, 1)),
        ("Volatility", |m| fmt_percent(m.volatility, 1)),
        ("Win Rate", |m| fmt_percent(m.win_rate, 1)),
        ("Profit Factor", |m| fmt_ratio(m.profit_factor, 2)),
        ("Turnover", |m| fmt_percent(m.turnover, 1)),
        ("Calmar", |m| fmt_ratio(m.calmar, 2)),
    ];
    let mut out = String::from(r#"<div class="grid-4">"#);
    for (label, value) in cells {
        let _ = write!(
            out,
            r#"<div class="card metric compact"><div><div class="label">{label}</div><div class="value">{}</div></div></div>"#,
            metrics.map(value).unwrap_or_else(|| "--".to_string()),
        );
    }
    out.push_str("</div>");

    out.push_str(&equity_chart(equity, None));

    let drawdown = [LineSeries {
        label: "Drawdown",
        color: "var(--chart-4)",
        values: drawdown_series(equity),
        dashed: false,
    }];
    let body = if equity.is_empty() {
        r#"<div class="chart-empty">No equity data available</div>"#.to_string()
    } else {
        line_chart(&drawdown, 960, 200, |v| fmt_percent(v, 1))
    };
    out.push_str(&card("Drawdown", "", &body));
    out
}

fn pct_cell(value: Option<f64>) -> String {
    let cls = match value {
        Some(v) if v.is_finite() && v >= 0.0 => "pos",
        Some(v) if v.is_finite() => "neg",
        _ => "muted",
    };
    format!(r#"<td class="num {cls}">{}</td>"#, fmt_optional_pct(value))
}

fn holdings_tab(predictions: &[ModelPrediction]) -> String {
    let holdings = holdings_from_predictions(predictions);
    let mut rows = String::new();
    for h in &holdings {
        let _ = write!(
            rows,
            r#"<tr><td class="mono">{ticker}</td><td class="num">{weight}</td>{predicted}{realized}</tr>"#,
            ticker = escape_html(&h.ticker),
            weight = fmt_percent(h.weight, 1),
            predicted = pct_cell(Some(h.predicted_return)),
            realized = pct_cell(h.realized_return),
        );
    }
    if holdings.is_empty() {
        rows.push_str(r#"<tr><td colspan="4" class="empty-row">No holdings for this run</td></tr>"#);
    }
    table_card(
        "Current Holdings",
        &count_label(&format!("{} positions", holdings.len())),
        &format!(
            r#"<table><thead><tr><th>Ticker</th><th class="num">Weight</th><th class="num">Predicted</th><th class="num">Realized</th></tr></thead><tbody>{rows}</tbody></table>"#
        ),
    )
}

fn trades_tab(predictions: &[ModelPrediction]) -> String {
    let turnover: Vec<(String, f64)> = turnover_series(predictions)
        .into_iter()
        .map(|p| (p.date, p.turnover))
        .collect();
    let chart = if turnover.is_empty() {
        r#"<div class="chart-empty">No rebalances recorded</div>"#.to_string()
    } else {
        bar_chart(&turnover, 960, 200, "var(--chart-2)")
    };

    let trades = trades_from_predictions(predictions);
    let mut rows = String::new();
    for t in &trades {
        let _ = write!(
            rows,
            r#"<tr><td class="mono muted">{date}</td><td class="mono">{ticker}</td><td><span class="badge badge-{side}">{side}</span></td><td class="num {cls}">{change}</td></tr>"#,
            date = escape_html(&t.date),
            ticker = escape_html(&t.ticker),
            side = t.side.as_str(),
            cls = if t.weight_change >= 0.0 { "pos" } else { "neg" },
            change = fmt_signed_percent(t.weight_change, 1),
        );
    }
    if trades.is_empty() {
        rows.push_str(r#"<tr><td colspan="4" class="empty-row">No trades for this run</td></tr>"#);
    }

    format!(
        "{}{}",
        card("Rebalance Turnover", "", &chart),
        table_card(
            "Trades",
            &count_label(&format!("{} trades", trades.len())),
            &format!(
                r#"<table><thead><tr><th>Date</th><th>Ticker</th><th>Side</th><th class="num">Weight Change</th></tr></thead><tbody>{rows}</tbody></table>"#
            ),
        )
    )
}

fn metadata_rows(metadata: Option<&ModelMetadata>) -> Vec<(&'static str, String)> {
    let missing = || "--".to_string();
    let Some(m) = metadata else {
        return [
            "Model",
            "Train Window",
            "Training Rows",
            "Predictions",
            "Rebalances",
            "Top N",
            "Cost (bps)",
        ]
        .into_iter()
        .map(|label| (label, missing()))
        .collect();
    };
    let window = match (&m.train_start, &m.train_end) {
        (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => {
            format!("{start} to {end}")
        }
        _ => missing(),
    };
    vec![
        ("Model", m.model_name.clone()),
        ("Train Window", window),
        ("Training Rows", fmt_thousands(m.train_rows)),
        ("Predictions", fmt_thousands(m.prediction_rows)),
        ("Rebalances", fmt_thousands(m.rebalance_count)),
        ("Top N", m.top_n.to_string()),
        ("Cost (bps)", format!("{:.1}", m.cost_bps)),
    ]
}

/// `ml_strategy` is false only for strategies known to train no model.
fn ml_tab(
    ml_strategy: bool,
    metadata: Option<&ModelMetadata>,
    predictions: &[ModelPrediction],
) -> String {
    let importance = metadata
        .map(|m| feature_importance_rows(&m.feature_importance))
        .unwrap_or_default();
    let bars = if importance.is_empty() && !ml_strategy {
        r#"<div class="chart-empty">Model insights are recorded only for ML strategies.</div>"#
            .to_string()
    } else if importance.is_empty() {
        r#"<div class="chart-empty">No model metadata available for this run.</div>"#.to_string()
    } else {
        let max = importance
            .iter()
            .map(|f| f.importance)
            .fold(0.0_f64, f64::max);
        let mut out = String::new();
        for f in &importance {
            let width = if max > 0.0 { (f.importance.max(0.0) / max * 100.0).round() } else { 0.0 };
            let _ = write!(
                out,
                r#"<div class="bar-row"><span class="mono small">{name}</span><div class="bar-track"><div class="bar-fill" style="width: {width}%"></div></div><span class="mono small muted">{value:.4}</span></div>"#,
                name = escape_html(&f.feature),
                value = f.importance,
            );
        }
        out
    };

    let picks = latest_picks(predictions, LATEST_PICKS);
    let mut pick_rows = String::new();
    for p in &picks {
        let _ = write!(
            pick_rows,
            r#"<div class="list-row"><span class="mono">#{rank} {ticker}</span><span class="mono small">{weight} &middot; {predicted}</span></div>"#,
            rank = p.rank,
            ticker = escape_html(&p.ticker),
            weight = fmt_optional_pct(Some(p.weight)),
            predicted = fmt_optional_pct(Some(p.predicted_return)),
        );
    }
    if picks.is_empty() {
        pick_rows.push_str(r#"<p class="muted">No prediction rows available.</p>"#);
    }

    let mut meta = String::new();
    for (label, value) in metadata_rows(metadata) {
        let _ = write!(
            meta,
            r#"<div class="kv"><span class="muted">{label}</span><span class="mono">{}</span></div>"#,
            escape_html(&value)
        );
    }

    let as_of = picks
        .first()
        .map(|p| count_label(&p.as_of_date))
        .unwrap_or_default();
    format!(
        r#"<div class="grid-split-rev">{}<div>{}{}</div></div>"#,
        card("Feature Importance", "", &bars),
        card("Latest Rebalance Picks", &as_of, &pick_rows),
        card("Model Metadata", "", &meta),
    )
}

pub async fn run_detail_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DetailQuery>,
) -> Result<Page, PageError> {
    let run = state
        .store
        .get_run(&id)
        .await?
        .ok_or_else(PageError::run_not_found)?;
    let tab = Tab::parse(query.tab.as_deref());
    let status = run.run.status();

    let (job, report) = tokio::try_join!(
        async {
            if status.is_active() {
                state.store.latest_job_for_run(&id).await
            } else {
                Ok(None)
            }
        },
        state.store.report_for_run(&id),
    )?;

    let body = match tab {
        Tab::Overview => {
            let equity = state.store.equity_curve(&id).await?;
            overview_tab(run.display_metrics(), &equity)
        }
        Tab::Holdings => holdings_tab(&state.store.model_predictions(&id).await?),
        Tab::Trades => trades_tab(&state.store.model_predictions(&id).await?),
        Tab::Ml => {
            let (metadata, predictions) = tokio::try_join!(
                state.store.model_metadata(&id),
                state.store.model_predictions(&id)
            )?;
            let ml_strategy = run.run.strategy().map_or(true, |s| s.is_ml());
            ml_tab(ml_strategy, metadata.as_ref(), &predictions)
        }
    };

    let content = format!(
        "{}\n{}\n{}\n{}",
        header(&run, report.as_ref()),
        job_status_panel(status, job.as_ref()),
        tabs(&run.run.id, tab),
        body,
    );
    Ok(Page::ok(shell(&run.run.name, "/runs", &content)))
}

/// Regenerate the tearsheet, then return to the run.
/// Server failures show the request id so it can be matched to the logs.
pub async fn generate_report(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(id): Path<String>,
) -> Response {
    match state.publisher.generate(&id, Utc::now()).await {
        Ok(report) => {
            tracing::info!(run_id = %id, url = %report.url, "Report generated");
            Redirect::to(&format!("/runs/{id}")).into_response()
        }
        Err(e) => {
            let status = report_error_status(&e);
            if status.is_server_error() {
                tracing::error!(run_id = %id, %request_id, "Report generation failed: {}", e);
            } else {
                tracing::warn!(run_id = %id, %request_id, "Report generation rejected: {}", e);
            }
            let message = if status.is_server_error() {
                format!(
                    "The report could not be generated. Check storage configuration and try again. Reference: {request_id}"
                )
            } else {
                e.to_string()
            };
            PageError::new(status, "Report not generated", message)
                .with_link("/runs", "Back to Runs")
                .into_response()
        }
    }
}
