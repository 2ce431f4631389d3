use std::fmt::Write;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use factorlab_core::format::escape_html;
use factorlab_core::{validate_new_run, NewRunForm, StrategyId};

use super::components::{count_label, runs_table};
use super::layout::shell;
use super::{or_empty, Page};
use crate::AppState;

const CREATE_FAILED: &str = "Failed to create run. Check server env + database config.";

pub async fn runs_page(State(state): State<AppState>) -> Page {
    let runs = or_empty(state.store.list_runs().await, "runs");
    let count = match runs.len() {
        1 => "1 run".to_string(),
        n => format!("{n} runs"),
    };
    let content = format!(
        r#"<div class="card-header">{count}<a class="btn primary" href="/runs/new">New Run</a></div>
{table}"#,
        count = count_label(&count),
        table = runs_table(&runs),
    );
    Page::ok(shell("Runs", "/runs", &content))
}

/// The new-run form, prefilled with `form` and showing `error` if set.
pub(crate) fn new_run_form(form: &NewRunForm, error: Option<&str>) -> String {
    let mut options = String::from(r#"<option value="" disabled"#);
    if form.strategy_id.is_empty() {
        options.push_str(" selected");
    }
    options.push_str(">Select a strategy\u{2026}</option>");
    for strategy in StrategyId::ALL {
        let _ = write!(
            options,
            r#"<option value="{id}"{selected}>{label}</option>"#,
            id = strategy.as_str(),
            selected = if form.strategy_id == strategy.as_str() { " selected" } else { "" },
            label = strategy.label(),
        );
    }

    let error = error
        .map(|e| format!(r#"<p class="form-error" role="alert">{}</p>"#, escape_html(e)))
        .unwrap_or_default();

    format!(
        r#"<div class="inline-form"><a class="btn" href="/runs" aria-label="Back to runs">&larr;</a><h2>New Backtest Run</h2></div>
<section class="card" style="max-width: 32rem">
  <div class="card-header"><h3 class="card-title">Configure Run</h3></div>
  <div class="card-body">
    <form class="form" method="post" action="/runs">
      <div class="field">
        <label for="name">Run name</label>
        <input id="name" name="name" value="{name}" placeholder="e.g. Momentum 2015&ndash;2020" required />
      </div>
      <div class="field">
        <label for="strategy_id">Strategy</label>
        <select id="strategy_id" name="strategy_id" required>{options}</select>
      </div>
      <div class="row-2">
        <div class="field">
          <label for="start_date">Start date</label>
          <input id="start_date" name="start_date" type="date" value="{start}" required />
        </div>
        <div class="field">
          <label for="end_date">End date</label>
          <input id="end_date" name="end_date" type="date" value="{end}" required />
        </div>
      </div>
      {error}
      <button class="btn primary" type="submit">Queue Backtest</button>
    </form>
  </div>
</section>"#,
        name = escape_html(&form.name),
        start = escape_html(&form.start_date),
        end = escape_html(&form.end_date),
    )
}

pub async fn new_run_page() -> Page {
    Page::ok(shell(
        "New Run",
        "/runs/new",
        &new_run_form(&NewRunForm::default(), None),
    ))
}

/// Validate the posted form, queue the run and its job, then go to the run.
pub async fn create_run(State(state): State<AppState>, Form(form): Form<NewRunForm>) -> Response {
    let new_run = match validate_new_run(&form) {
        Ok(new_run) => new_run,
        Err(e) => {
            tracing::debug!(field = e.field, "Rejected new run: {}", e);
            return Page::with_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                shell("New Run", "/runs/new", &new_run_form(&form, Some(e.message))),
            )
            .into_response();
        }
    };

    match state.store.create_run(&new_run).await {
        Ok(run_id) => Redirect::to(&format!("/runs/{run_id}")).into_response(),
        Err(e) => {
            tracing::error!("Run insert failed: {}", e);
            Page::with_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                shell("New Run", "/runs/new", &new_run_form(&form, Some(CREATE_FAILED))),
            )
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_keeps_entered_values() {
        let form = NewRunForm {
            name: "Mom \"fast\"".to_string(),
            strategy_id: "ml_ridge".to_string(),
            start_date: "2015-01-01".to_string(),
            end_date: "2020-01-01".to_string(),
        };
        let html = new_run_form(&form, Some("End date must be after start date"));
        assert!(html.contains(r#"value="Mom &quot;fast&quot;""#));
        assert!(html.contains(r#"<option value="ml_ridge" selected>ML Ridge</option>"#));
        assert!(html.contains(r#"value="2015-01-01""#));
        assert!(html.contains("End date must be after start date"));
    }

    #[test]
    fn test_blank_form_selects_placeholder() {
        let html = new_run_form(&NewRunForm::default(), None);
        assert!(html.contains(r#"<option value="" disabled selected>"#));
        assert!(!html.contains("form-error"));
        assert_eq!(html.matches("<option").count(), 5);
    }
}
