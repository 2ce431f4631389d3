use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use factorlab_core::series::drawdown_points;
use factorlab_core::{
    validate_new_run, DrawdownPoint, EquityPoint, Job, NewRunForm, Report, RunWithMetrics,
};
use serde::Serialize;

use crate::{report_error_status, ApiResponse, AppError, AppState};

#[derive(Debug, Serialize)]
pub struct CreatedRun {
    pub id: String,
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/runs", get(list_runs).post(create_run))
        .route("/api/runs/:id", get(get_run))
        .route("/api/runs/:id/equity", get(get_equity))
        .route("/api/runs/:id/drawdown", get(get_drawdown))
        .route("/api/runs/:id/report", post(generate_report))
        .route("/api/jobs", get(list_jobs))
}

/// All runs, newest first
async fn list_runs(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<RunWithMetrics>>>, AppError> {
    let runs = state.store.list_runs().await?;
    Ok(Json(ApiResponse::success(runs)))
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RunWithMetrics>>, AppError> {
    let run = state
        .store
        .get_run(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Run {id} not found")))?;
    Ok(Json(ApiResponse::success(run)))
}

/// Queue a run and its job. Malformed or invalid input is rejected with 422.
async fn create_run(
    State(state): State<AppState>,
    body: Result<Json<NewRunForm>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedRun>>), AppError> {
    let Json(form) = body.map_err(|rejection| {
        AppError::with_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            anyhow::anyhow!(rejection.body_text()),
        )
    })?;
    let new_run = validate_new_run(&form)
        .map_err(|e| AppError::with_status(StatusCode::UNPROCESSABLE_ENTITY, e.into()))?;
    let id = state.store.create_run(&new_run).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(CreatedRun { id }))))
}

async fn get_equity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<EquityPoint>>>, AppError> {
    if state.store.get_run(&id).await?.is_none() {
        return Err(AppError::not_found(format!("Run {id} not found")));
    }
    let points = state.store.equity_curve(&id).await?;
    Ok(Json(ApiResponse::success(points)))
}

/// Drawdown from the running peak for each equity point.
async fn get_drawdown(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<DrawdownPoint>>>, AppError> {
    if state.store.get_run(&id).await?.is_none() {
        return Err(AppError::not_found(format!("Run {id} not found")));
    }
    let points = state.store.equity_curve(&id).await?;
    Ok(Json(ApiResponse::success(drawdown_points(&points))))
}

async fn generate_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Report>>, AppError> {
    let report = state
        .publisher
        .generate(&id, Utc::now())
        .await
        .map_err(|e| AppError::with_status(report_error_status(&e), e.into()))?;
    tracing::info!(run_id = %id, storage = state.publisher.storage_name(), "Report generated");
    Ok(Json(ApiResponse::success(report)))
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Job>>>, AppError> {
    let jobs = state.store.list_jobs().await?;
    Ok(Json(ApiResponse::success(jobs)))
}
