pub mod api_routes;
pub mod assets;
pub mod config;
pub mod pages;
pub mod request_id;
pub mod security_headers;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use run_store::RunStore;
use serde::Serialize;
use tearsheet::{ReportError, ReportPublisher};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::DashboardConfig;
use crate::security_headers::SecurityHeaders;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: RunStore,
    pub publisher: ReportPublisher,
    pub config: Arc<DashboardConfig>,
}

impl AppState {
    pub fn new(store: RunStore, publisher: ReportPublisher, config: DashboardConfig) -> Self {
        Self {
            store,
            publisher,
            config: Arc::new(config),
        }
    }
}

/// JSON envelope for every `/api` response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Error returned by JSON handlers. Defaults to 500.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, anyhow::anyhow!(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.status.is_server_error() {
            tracing::error!(status = %self.status, "Request failed: {:#}", self.error);
            "Internal server error".to_string()
        } else {
            self.error.to_string()
        };
        (self.status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

/// HTTP status for a failed report generation.
pub fn report_error_status(err: &ReportError) -> StatusCode {
    match err {
        ReportError::RunNotFound(_) => StatusCode::NOT_FOUND,
        ReportError::NotCompleted => StatusCode::CONFLICT,
        ReportError::MissingMetrics | ReportError::MissingEquity => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ReportError::Upload(_) | ReportError::Persist(_) => StatusCode::BAD_GATEWAY,
        ReportError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    database: &'static str,
    version: &'static str,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<HealthStatus>>) {
    let db_ok = state.store.count_runs().await.is_ok();
    let status = if db_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(ApiResponse::success(HealthStatus {
            status: if db_ok { "ok" } else { "degraded" },
            database: if db_ok { "connected" } else { "unreachable" },
            version: env!("CARGO_PKG_VERSION"),
        })),
    )
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]),
    )
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut api = api_routes::api_routes();
    if let Some(cors) = cors_layer(&config.cors_origins) {
        api = api.layer(cors);
    }

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/static/*path", get(assets::serve_static))
        .merge(api)
        .merge(pages::page_routes())
        .fallback(pages::not_found_page);

    if config.serves_local_reports() {
        app = app.nest_service(
            config.reports_public_base.trim_end_matches('/'),
            ServeDir::new(&config.reports_dir),
        );
    }

    app.layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                    tracing::info_span!(
                        "http",
                        method = %req.method(),
                        path = %req.uri().path(),
                        request_id = tracing::field::Empty
                    )
                }),
            )
            .layer(middleware::from_fn(request_id::request_id_middleware))
            .layer(middleware::from_fn_with_state(
                SecurityHeaders {
                    hsts: config.enable_hsts,
                },
                security_headers::security_headers_middleware,
            )),
    )
    .with_state(state)
}

pub fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = config::DashboardConfig::from_env()?;
    tracing::info!("Starting FactorLab dashboard");
    tracing::info!("  Report storage: {}", config.report_storage.as_str());

    let store = RunStore::connect(
        &config.database_url,
        config.db_max_connections,
        config.db_timeout(),
    )
    .await?;
    if config.init_schema {
        store.init_schema().await?;
        tracing::info!("Database schema ready");
    }

    let storage = config.report_storage()?;
    let publisher = ReportPublisher::new(store.clone(), storage);
    let bind_addr = config.bind_addr.clone();
    let app = router(AppState::new(store, publisher, config));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
