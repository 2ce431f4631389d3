use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use factorlab_core::{
    EquityPoint, Job, ModelMetadata, ModelPrediction, NewRun, PriceCoverage, Report, Run,
    RunMetrics, RunStatus, RunWithMetrics,
};
use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

use crate::error::StoreError;

const RUN_WITH_METRICS_SELECT: &str = "SELECT r.id, r.name, r.strategy_id, r.status, r.start_date, r.end_date, r.created_at,
        m.run_id AS metrics_run_id, m.cagr, m.sharpe, m.max_drawdown, m.turnover,
        m.volatility, m.win_rate, m.profit_factor, m.calmar
 FROM runs r LEFT JOIN run_metrics m ON m.run_id = r.id";

/// Split a schema script into statements, dropping `--` comment lines first.
fn schema_statements(schema: &str) -> Vec<String> {
    let code: String = schema
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    code.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

const JOB_SELECT: &str =
    "SELECT id, run_id, name, status, progress, started_at, duration, created_at FROM jobs";

/// Read/write access to the runs database shared with the backtest engine.
///
/// Works against any sqlx `Any` backend; queries stick to SQL that SQLite and
/// Postgres both accept, with `$n` placeholders.
#[derive(Clone)]
pub struct RunStore {
    pool: sqlx::AnyPool,
}

impl RunStore {
    pub fn new(pool: sqlx::AnyPool) -> Self {
        Self { pool }
    }

    /// Open a pool for `database_url` (`sqlite:...` or `postgres://...`).
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &sqlx::AnyPool {
        &self.pool
    }

    /// Create any missing tables and indexes.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        // sqlx runs one statement per query
        for stmt in schema_statements(include_str!("../schema.sql")) {
            sqlx::query(&stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    // --- Runs ---

    /// All runs, newest first, each with its metrics row if the engine wrote one.
    pub async fn list_runs(&self) -> Result<Vec<RunWithMetrics>, StoreError> {
        let sql = format!("{RUN_WITH_METRICS_SELECT} ORDER BY r.created_at DESC");
        let rows = sqlx::query_as::<_, RunRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RunRow::into_run).collect())
    }

    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<RunWithMetrics>, StoreError> {
        let sql = format!("{RUN_WITH_METRICS_SELECT} ORDER BY r.created_at DESC LIMIT $1");
        let rows = sqlx::query_as::<_, RunRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RunRow::into_run).collect())
    }

    pub async fn count_runs(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM runs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn get_run(&self, id: &str) -> Result<Option<RunWithMetrics>, StoreError> {
        let sql = format!("{RUN_WITH_METRICS_SELECT} WHERE r.id = $1");
        let row = sqlx::query_as::<_, RunRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(RunRow::into_run))
    }

    /// Completed runs, newest first.
    pub async fn completed_runs(&self, limit: i64) -> Result<Vec<RunWithMetrics>, StoreError> {
        let sql = format!(
            "{RUN_WITH_METRICS_SELECT} WHERE r.status = $1 ORDER BY r.created_at DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, RunRow>(&sql)
            .bind(RunStatus::Completed.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RunRow::into_run).collect())
    }

    pub async fn most_recent_completed_run(&self) -> Result<Option<RunWithMetrics>, StoreError> {
        Ok(self.completed_runs(1).await?.into_iter().next())
    }

    /// Runs for the given ids, in the order requested. Unknown ids are skipped.
    pub async fn runs_by_ids(&self, ids: &[String]) -> Result<Vec<RunWithMetrics>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "{RUN_WITH_METRICS_SELECT} WHERE r.id IN ({})",
            placeholders.join(", ")
        );
        let mut query = sqlx::query_as::<_, RunRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let mut found: Vec<RunWithMetrics> = query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(RunRow::into_run)
            .collect();

        let mut ordered = Vec::with_capacity(found.len());
        for id in ids {
            if let Some(pos) = found.iter().position(|r| &r.run.id == id) {
                ordered.push(found.swap_remove(pos));
            }
        }
        Ok(ordered)
    }

    /// Insert a queued run plus the job row the engine worker polls for.
    ///
    /// The run is the source of truth: if the job insert fails the run still
    /// exists, so the failure is only logged.
    pub async fn create_run(&self, new_run: &NewRun) -> Result<String, StoreError> {
        let run_id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query(
            "INSERT INTO runs (id, name, strategy_id, status, start_date, end_date, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&run_id)
        .bind(&new_run.name)
        .bind(new_run.strategy_id.as_str())
        .bind(RunStatus::Queued.as_str())
        .bind(new_run.start_date.format("%Y-%m-%d").to_string())
        .bind(new_run.end_date.format("%Y-%m-%d").to_string())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let job_result = sqlx::query(
            "INSERT INTO jobs (id, run_id, name, status, progress, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&run_id)
        .bind(&new_run.name)
        .bind(RunStatus::Queued.as_str())
        .bind(0_i64)
        .bind(&now)
        .execute(&self.pool)
        .await;

        if let Err(e) = job_result {
            tracing::error!(run_id = %run_id, "Failed to queue job for new run: {}", e);
        }

        tracing::info!(run_id = %run_id, strategy = %new_run.strategy_id, "Run queued");
        Ok(run_id)
    }

    // --- Metrics & series ---

    pub async fn get_metrics(&self, run_id: &str) -> Result<Option<RunMetrics>, StoreError> {
        let row = sqlx::query_as::<_, MetricsRow>(
            "SELECT run_id, cagr, sharpe, max_drawdown, turnover, volatility, win_rate,
                    profit_factor, calmar
             FROM run_metrics WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MetricsRow::into_metrics))
    }

    /// Equity curve for a run, oldest point first.
    pub async fn equity_curve(&self, run_id: &str) -> Result<Vec<EquityPoint>, StoreError> {
        let rows = sqlx::query_as::<_, EquityRow>(
            "SELECT date, portfolio, benchmark FROM equity_curve
             WHERE run_id = $1 ORDER BY date ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| EquityPoint {
                date: r.date,
                portfolio: r.portfolio,
                benchmark: r.benchmark,
            })
            .collect())
    }

    // --- Jobs ---

    pub async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let sql = format!("{JOB_SELECT} ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(JobRow::into_job).collect())
    }

    pub async fn latest_job_for_run(&self, run_id: &str) -> Result<Option<Job>, StoreError> {
        let sql = format!("{JOB_SELECT} WHERE run_id = $1 ORDER BY created_at DESC LIMIT 1");
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(JobRow::into_job))
    }

    // --- Model insights ---

    pub async fn model_metadata(&self, run_id: &str) -> Result<Option<ModelMetadata>, StoreError> {
        let row = sqlx::query_as::<_, ModelMetadataRow>(
            "SELECT run_id, model_name, train_start, train_end, train_rows, prediction_rows,
                    rebalance_count, top_n, cost_bps, feature_columns, feature_importance,
                    model_params
             FROM model_metadata WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ModelMetadataRow::into_metadata).transpose()
    }

    /// Predictions for a run, most recent rebalance first, best rank first within it.
    pub async fn model_predictions(&self, run_id: &str) -> Result<Vec<ModelPrediction>, StoreError> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            "SELECT run_id, model_name, as_of_date, target_date, ticker, predicted_return,
                    realized_return, rank, selected, weight
             FROM model_predictions WHERE run_id = $1
             ORDER BY as_of_date DESC, rank ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PredictionRow::into_prediction).collect())
    }

    // --- Reports ---

    pub async fn report_for_run(&self, run_id: &str) -> Result<Option<Report>, StoreError> {
        let row = sqlx::query_as::<_, ReportRow>(
            "SELECT run_id, storage_path, url, content_sha256, created_at
             FROM reports WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ReportRow::into_report))
    }

    /// Record where a run's tearsheet lives. One row per run; regenerating
    /// replaces it.
    pub async fn upsert_report(
        &self,
        run_id: &str,
        storage_path: &str,
        url: &str,
        content_sha256: &str,
    ) -> Result<Report, StoreError> {
        let now = now_timestamp();
        sqlx::query(
            "INSERT INTO reports (run_id, storage_path, url, content_sha256, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (run_id) DO UPDATE SET
                storage_path = excluded.storage_path,
                url = excluded.url,
                content_sha256 = excluded.content_sha256,
                created_at = excluded.created_at",
        )
        .bind(run_id)
        .bind(storage_path)
        .bind(url)
        .bind(content_sha256)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Report {
            run_id: run_id.to_string(),
            storage_path: storage_path.to_string(),
            url: url.to_string(),
            content_sha256: Some(content_sha256.to_string()),
            created_at: now,
        })
    }

    // --- Market data ---

    /// Stored price history per ticker.
    pub async fn price_coverage(&self) -> Result<Vec<PriceCoverage>, StoreError> {
        let rows: Vec<(String, i64, String, String)> = sqlx::query_as(
            "SELECT ticker, COUNT(*), MIN(date), MAX(date)
             FROM prices GROUP BY ticker ORDER BY ticker",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(ticker, rows, first_date, last_date)| PriceCoverage {
                ticker,
                rows,
                first_date,
                last_date,
            })
            .collect())
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_json_column(
    column: &'static str,
    raw: Option<String>,
) -> Result<serde_json::Value, StoreError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(serde_json::Value::Null),
        Some(text) => {
            serde_json::from_str(text).map_err(|source| StoreError::Json { column, source })
        }
    }
}

/// Internal row types for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    name: String,
    strategy_id: String,
    status: String,
    start_date: String,
    end_date: String,
    created_at: String,
    metrics_run_id: Option<String>,
    cagr: Option<f64>,
    sharpe: Option<f64>,
    max_drawdown: Option<f64>,
    turnover: Option<f64>,
    volatility: Option<f64>,
    win_rate: Option<f64>,
    profit_factor: Option<f64>,
    calmar: Option<f64>,
}

impl RunRow {
    fn into_run(self) -> RunWithMetrics {
        let metrics = self.metrics_run_id.map(|run_id| RunMetrics {
            run_id,
            cagr: self.cagr.unwrap_or(0.0),
            sharpe: self.sharpe.unwrap_or(0.0),
            max_drawdown: self.max_drawdown.unwrap_or(0.0),
            turnover: self.turnover.unwrap_or(0.0),
            volatility: self.volatility.unwrap_or(0.0),
            win_rate: self.win_rate.unwrap_or(0.0),
            profit_factor: self.profit_factor.unwrap_or(0.0),
            calmar: self.calmar.unwrap_or(0.0),
        });

        RunWithMetrics {
            run: Run {
                id: self.id,
                name: self.name,
                strategy_id: self.strategy_id,
                status: self.status,
                start_date: self.start_date,
                end_date: self.end_date,
                created_at: self.created_at,
            },
            metrics,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MetricsRow {
    run_id: String,
    cagr: f64,
    sharpe: f64,
    max_drawdown: f64,
    turnover: f64,
    volatility: f64,
    win_rate: f64,
    profit_factor: f64,
    calmar: f64,
}

impl MetricsRow {
    fn into_metrics(self) -> RunMetrics {
        RunMetrics {
            run_id: self.run_id,
            cagr: self.cagr,
            sharpe: self.sharpe,
            max_drawdown: self.max_drawdown,
            turnover: self.turnover,
            volatility: self.volatility,
            win_rate: self.win_rate,
            profit_factor: self.profit_factor,
            calmar: self.calmar,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EquityRow {
    date: String,
    portfolio: f64,
    benchmark: f64,
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    run_id: Option<String>,
    name: String,
    status: String,
    progress: i64,
    started_at: Option<String>,
    duration: Option<i64>,
    created_at: String,
}

impl JobRow {
    fn into_job(self) -> Job {
        Job {
            id: self.id,
            run_id: self.run_id,
            name: self.name,
            status: self.status,
            progress: self.progress,
            started_at: self.started_at,
            duration: self.duration,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ModelMetadataRow {
    run_id: String,
    model_name: String,
    train_start: Option<String>,
    train_end: Option<String>,
    train_rows: i64,
    prediction_rows: i64,
    rebalance_count: i64,
    top_n: i64,
    cost_bps: f64,
    feature_columns: Option<String>,
    feature_importance: Option<String>,
    model_params: Option<String>,
}

impl ModelMetadataRow {
    fn into_metadata(self) -> Result<ModelMetadata, StoreError> {
        let feature_columns = match parse_json_column("feature_columns", self.feature_columns)? {
            serde_json::Value::Null => Vec::new(),
            value => serde_json::from_value(value).map_err(|source| StoreError::Json {
                column: "feature_columns",
                source,
            })?,
        };

        Ok(ModelMetadata {
            run_id: self.run_id,
            model_name: self.model_name,
            train_start: self.train_start,
            train_end: self.train_end,
            train_rows: self.train_rows,
            prediction_rows: self.prediction_rows,
            rebalance_count: self.rebalance_count,
            top_n: self.top_n,
            cost_bps: self.cost_bps,
            feature_columns,
            feature_importance: parse_json_column("feature_importance", self.feature_importance)?,
            model_params: parse_json_column("model_params", self.model_params)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PredictionRow {
    run_id: String,
    model_name: String,
    as_of_date: String,
    target_date: String,
    ticker: String,
    predicted_return: f64,
    realized_return: Option<f64>,
    rank: i64,
    selected: i64,
    weight: f64,
}

impl PredictionRow {
    fn into_prediction(self) -> ModelPrediction {
        ModelPrediction {
            run_id: self.run_id,
            model_name: self.model_name,
            as_of_date: self.as_of_date,
            target_date: self.target_date,
            ticker: self.ticker,
            predicted_return: self.predicted_return,
            realized_return: self.realized_return,
            rank: self.rank,
            selected: self.selected != 0,
            weight: self.weight,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    run_id: String,
    storage_path: String,
    url: String,
    content_sha256: Option<String>,
    created_at: String,
}

impl ReportRow {
    fn into_report(self) -> Report {
        Report {
            run_id: self.run_id,
            storage_path: self.storage_path,
            url: self.url,
            content_sha256: self.content_sha256,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use factorlab_core::StrategyId;

    async fn setup_store() -> RunStore {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory SQLite");
        let store = RunStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    async fn insert_run(store: &RunStore, id: &str, status: &str, created_at: &str) {
        sqlx::query(
            "INSERT INTO runs (id, name, strategy_id, status, start_date, end_date, created_at)
             VALUES ($1, $2, 'equal_weight', $3, '2020-01-01', '2021-01-01', $4)",
        )
        .bind(id)
        .bind(format!("Run {id}"))
        .bind(status)
        .bind(created_at)
        .execute(store.pool())
        .await
        .unwrap();
    }

    async fn insert_metrics(store: &RunStore, run_id: &str, cagr: f64) {
        sqlx::query(
            "INSERT INTO run_metrics (run_id, cagr, sharpe, max_drawdown, turnover, volatility,
                                      win_rate, profit_factor, calmar)
             VALUES ($1, $2, 1.5, -0.1, 0.2, 0.15, 0.55, 1.3, 2.0)",
        )
        .bind(run_id)
        .bind(cagr)
        .execute(store.pool())
        .await
        .unwrap();
    }

    fn new_run(name: &str) -> NewRun {
        NewRun {
            name: name.to_string(),
            strategy_id: StrategyId::MlRidge,
            start_date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let store = setup_store().await;
        store.init_schema().await.unwrap();
        assert_eq!(store.count_runs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_init_schema_on_fresh_pool() {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = RunStore::new(pool);
        store.init_schema().await.unwrap();
        assert_eq!(store.count_runs().await.unwrap(), 0);
        assert!(store.list_jobs().await.unwrap().is_empty());
        assert!(store.price_coverage().await.unwrap().is_empty());
    }

    #[test]
    fn test_schema_statements_skip_comments() {
        let statements = schema_statements(
            "-- header; with a semicolon\nCREATE TABLE a (id TEXT);\n  -- trailing; note\nCREATE INDEX i ON a (id);\n",
        );
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id TEXT)", "CREATE INDEX i ON a (id)"]
        );
        assert!(schema_statements(include_str!("../schema.sql"))
            .iter()
            .all(|stmt| stmt.starts_with("CREATE")));
    }

    #[tokio::test]
    async fn test_create_run_survives_failed_job_insert() {
        let store = setup_store().await;
        sqlx::query("DROP TABLE jobs")
            .execute(store.pool())
            .await
            .unwrap();

        let id = store.create_run(&new_run("No queue")).await.unwrap();
        let run = store.get_run(&id).await.unwrap().expect("run exists");
        assert_eq!(run.run.name, "No queue");
        assert_eq!(run.run.status, "queued");
    }

    #[tokio::test]
    async fn test_create_run_queues_run_and_job() {
        let store = setup_store().await;
        let id = store.create_run(&new_run("ML sweep")).await.unwrap();

        let run = store.get_run(&id).await.unwrap().expect("run exists");
        assert_eq!(run.run.name, "ML sweep");
        assert_eq!(run.run.status, "queued");
        assert_eq!(run.run.strategy_id, "ml_ridge");
        assert_eq!(run.run.start_date, "2018-01-01");
        assert!(run.metrics.is_none());

        let job = store.latest_job_for_run(&id).await.unwrap().expect("job exists");
        assert_eq!(job.status, "queued");
        assert_eq!(job.progress, 0);
        assert_eq!(job.name, "ML sweep");
        assert_eq!(store.list_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_runs_newest_first_with_metrics() {
        let store = setup_store().await;
        insert_run(&store, "a", "completed", "2025-01-01T00:00:00.000Z").await;
        insert_run(&store, "b", "running", "2025-01-03T00:00:00.000Z").await;
        insert_run(&store, "c", "completed", "2025-01-02T00:00:00.000Z").await;
        insert_metrics(&store, "a", 0.12).await;

        let runs = store.list_runs().await.unwrap();
        let ids: Vec<&str> = runs.iter().map(|r| r.run.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(runs[2].metrics.as_ref().unwrap().cagr, 0.12);
        assert!(runs[0].metrics.is_none());

        let latest = store.most_recent_completed_run().await.unwrap().unwrap();
        assert_eq!(latest.run.id, "c");
        assert_eq!(store.recent_runs(2).await.unwrap().len(), 2);
        assert_eq!(store.completed_runs(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_run_missing() {
        let store = setup_store().await;
        assert!(store.get_run("nope").await.unwrap().is_none());
        assert!(store.get_metrics("nope").await.unwrap().is_none());
        assert!(store.equity_curve("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_runs_by_ids_keeps_requested_order() {
        let store = setup_store().await;
        insert_run(&store, "a", "completed", "2025-01-01T00:00:00.000Z").await;
        insert_run(&store, "b", "completed", "2025-01-02T00:00:00.000Z").await;

        let ids = vec!["b".to_string(), "missing".to_string(), "a".to_string()];
        let runs = store.runs_by_ids(&ids).await.unwrap();
        let got: Vec<&str> = runs.iter().map(|r| r.run.id.as_str()).collect();
        assert_eq!(got, vec!["b", "a"]);
        assert!(store.runs_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_equity_curve_sorted_by_date() {
        let store = setup_store().await;
        for (date, value) in [("2024-01-03", 103.0), ("2024-01-01", 100.0), ("2024-01-02", 99.0)] {
            sqlx::query(
                "INSERT INTO equity_curve (run_id, date, portfolio, benchmark) VALUES ('r', $1, $2, 100.0)",
            )
            .bind(date)
            .bind(value)
            .execute(store.pool())
            .await
            .unwrap();
        }
        let curve = store.equity_curve("r").await.unwrap();
        let dates: Vec<&str> = curve.iter().map(|p| p.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-02", "2024-01-03"]);
        assert_eq!(curve[1].portfolio, 99.0);
    }

    #[tokio::test]
    async fn test_model_metadata_and_predictions() {
        let store = setup_store().await;
        sqlx::query(
            "INSERT INTO model_metadata (run_id, model_name, train_start, train_end, train_rows,
                prediction_rows, rebalance_count, top_n, cost_bps, feature_columns,
                feature_importance, model_params)
             VALUES ('r', 'ml_ridge', '2015-01-31', '2019-12-31', 4800, 960, 48, 5, 10.0,
                '[\"momentum\",\"beta\"]', '{\"momentum\":0.7,\"beta\":0.3}', NULL)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        for (as_of, ticker, rank, selected) in [
            ("2024-01-31", "AAPL", 1_i64, 1_i64),
            ("2024-02-29", "MSFT", 2, 1),
            ("2024-02-29", "AAPL", 1, 0),
        ] {
            sqlx::query(
                "INSERT INTO model_predictions (run_id, model_name, as_of_date, target_date, ticker,
                    predicted_return, realized_return, rank, selected, weight)
                 VALUES ('r', 'ml_ridge', $1, $1, $2, 0.01, NULL, $3, $4, 0.2)",
            )
            .bind(as_of)
            .bind(ticker)
            .bind(rank)
            .bind(selected)
            .execute(store.pool())
            .await
            .unwrap();
        }

        let meta = store.model_metadata("r").await.unwrap().unwrap();
        assert_eq!(meta.feature_columns, vec!["momentum", "beta"]);
        assert_eq!(meta.feature_importance["momentum"], 0.7);
        assert!(meta.model_params.is_null());
        assert_eq!(meta.train_rows, 4800);

        let preds = store.model_predictions("r").await.unwrap();
        assert_eq!(preds.len(), 3);
        assert_eq!(preds[0].as_of_date, "2024-02-29");
        assert_eq!(preds[0].ticker, "AAPL");
        assert!(!preds[0].selected);
        assert!(preds[1].selected);
        assert!(preds[2].realized_return.is_none());
    }

    #[tokio::test]
    async fn test_bad_metadata_json_is_an_error() {
        let store = setup_store().await;
        sqlx::query(
            "INSERT INTO model_metadata (run_id, model_name, feature_importance)
             VALUES ('r', 'ml_ridge', '{not json')",
        )
        .execute(store.pool())
        .await
        .unwrap();
        let err = store.model_metadata("r").await.unwrap_err();
        assert!(matches!(err, StoreError::Json { column: "feature_importance", .. }));
    }

    #[tokio::test]
    async fn test_upsert_report_replaces_row() {
        let store = setup_store().await;
        store.upsert_report("r", "r/tearsheet.html", "http://one", "aa").await.unwrap();
        store.upsert_report("r", "r/tearsheet.html", "http://two", "bb").await.unwrap();

        let report = store.report_for_run("r").await.unwrap().unwrap();
        assert_eq!(report.url, "http://two");
        assert_eq!(report.content_sha256.as_deref(), Some("bb"));
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reports")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_price_coverage() {
        let store = setup_store().await;
        for (ticker, date) in [("SPY", "2024-01-02"), ("SPY", "2024-01-03"), ("QQQ", "2024-01-03")] {
            sqlx::query("INSERT INTO prices (ticker, date, adj_close) VALUES ($1, $2, 100.0)")
                .bind(ticker)
                .bind(date)
                .execute(store.pool())
                .await
                .unwrap();
        }
        let coverage = store.price_coverage().await.unwrap();
        assert_eq!(coverage.len(), 2);
        assert_eq!(coverage[0].ticker, "QQQ");
        assert_eq!(coverage[1].rows, 2);
        assert_eq!(coverage[1].first_date, "2024-01-02");
        assert_eq!(coverage[1].last_date, "2024-01-03");
    }
}
