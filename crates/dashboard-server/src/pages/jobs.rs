use std::fmt::Write;

use axum::extract::State;
use factorlab_core::format::{escape_html, fmt_duration, fmt_timestamp};
use factorlab_core::{Job, RunStatus};

use super::components::{count_label, progress_bar, status_badge, table_card};
use super::layout::shell;
use super::{or_empty, Page};
use crate::AppState;

pub(crate) fn job_list(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return table_card(
            "Job Queue",
            &count_label("0 jobs"),
            r#"<div class="empty-state"><p>No jobs yet</p><p class="small muted">Jobs will appear here once you queue or run backtests.</p></div>"#,
        );
    }

    let mut rows = String::new();
    for job in jobs {
        let name = match &job.run_id {
            Some(run_id) => format!(
                r#"<a href="/runs/{}">{}</a>"#,
                escape_html(run_id),
                escape_html(&job.name)
            ),
            None => escape_html(&job.name),
        };
        let duration = job
            .duration
            .map(|d| format!(r#"<span class="small muted mono">{}</span>"#, fmt_duration(Some(d))))
            .unwrap_or_default();
        let progress = if job.status() == RunStatus::Running {
            progress_bar(job.progress_clamped(), 200)
        } else {
            String::new()
        };
        let _ = write!(
            rows,
            r#"<div class="list-row"><div><div>{name}</div><div><span class="small muted mono">Started {started}</span> {duration}</div>{progress}</div>{badge}</div>"#,
            started = escape_html(&fmt_timestamp(job.started_at.as_deref())),
            badge = status_badge(&job.status),
        );
    }
    table_card("Job Queue", &count_label(&format!("{} jobs", jobs.len())), &rows)
}

pub async fn jobs_page(State(state): State<AppState>) -> Page {
    let jobs = or_empty(state.store.list_jobs().await, "jobs");
    Page::ok(shell("Jobs", "/jobs", &job_list(&jobs)))
}
