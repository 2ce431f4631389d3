//! Server-rendered HTML pages.

pub mod charts;
pub mod components;
pub mod layout;

mod compare;
mod dashboard;
mod data;
mod jobs;
mod run_detail;
mod runs;
mod settings;

use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use run_store::StoreError;

use crate::AppState;

pub fn page_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .route("/dashboard", get(dashboard::dashboard_page))
        .route("/runs", get(runs::runs_page).post(runs::create_run))
        .route("/runs/new", get(runs::new_run_page))
        .route("/runs/:id", get(run_detail::run_detail_page))
        .route("/runs/:id/report", post(run_detail::generate_report))
        .route("/jobs", get(jobs::jobs_page))
        .route("/compare", get(compare::compare_page))
        .route("/data", get(data::data_page))
        .route("/settings", get(settings::settings_page))
}

/// A rendered HTML page with an explicit status.
pub struct Page {
    status: StatusCode,
    html: String,
}

impl Page {
    pub fn ok(html: String) -> Self {
        Self {
            status: StatusCode::OK,
            html,
        }
    }

    pub fn with_status(status: StatusCode, html: String) -> Self {
        Self { status, html }
    }
}

impl IntoResponse for Page {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CACHE_CONTROL, "no-store")],
            Html(self.html),
        )
            .into_response()
    }
}

/// Error shown to the browser as a standalone message page.
#[derive(Debug)]
pub struct PageError {
    status: StatusCode,
    heading: String,
    message: String,
    link_href: &'static str,
    link_label: &'static str,
}

impl PageError {
    pub fn new(status: StatusCode, heading: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            heading: heading.into(),
            message: message.into(),
            link_href: "/dashboard",
            link_label: "Go to Dashboard",
        }
    }

    pub fn with_link(mut self, href: &'static str, label: &'static str) -> Self {
        self.link_href = href;
        self.link_label = label;
        self
    }

    pub fn not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "Page not found",
            "The page you're looking for doesn't exist or has been moved.",
        )
    }

    pub fn run_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "Run not found",
            "The backtest run you're looking for doesn't exist or has been deleted.",
        )
        .with_link("/runs", "Back to Runs")
    }
}

impl From<StoreError> for PageError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Store query failed: {}", err);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong",
            "The data store could not be reached. Try again shortly.",
        )
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        Page::with_status(
            self.status,
            layout::message_page(&self.heading, &self.message, self.link_href, self.link_label),
        )
        .into_response()
    }
}

pub async fn not_found_page() -> PageError {
    PageError::not_found()
}

/// Log a failed list query and fall back to an empty result.
pub(crate) fn or_empty<T: Default>(result: Result<T, StoreError>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        tracing::error!("Failed to load {}: {}", what, e);
        T::default()
    })
}
