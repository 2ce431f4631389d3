use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use factorlab_core::{Report, RunStatus};
use run_store::{RunStore, StoreError};
use sha2::{Digest, Sha256};

use crate::render::{build_report_html, ReportInput};
use crate::storage::{ReportStorage, StorageError};

pub const REPORT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Run {0} not found")]
    RunNotFound(String),
    #[error("Failed to load run metrics: not found")]
    MissingMetrics,
    #[error("Report generation is only available for completed runs")]
    NotCompleted,
    #[error("Missing equity curve data")]
    MissingEquity,
    #[error("Failed to load run: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to upload report: {0}")]
    Upload(#[source] StorageError),
    #[error("Failed to persist report row: {0}")]
    Persist(#[source] StoreError),
}

/// Renders tearsheets and records where they were published.
#[derive(Clone)]
pub struct ReportPublisher {
    store: RunStore,
    storage: Arc<dyn ReportStorage>,
}

impl ReportPublisher {
    pub fn new(store: RunStore, storage: Arc<dyn ReportStorage>) -> Self {
        Self { store, storage }
    }

    pub fn storage_name(&self) -> &str {
        self.storage.name()
    }

    pub fn storage_path(run_id: &str) -> String {
        format!("{run_id}/tearsheet.html")
    }

    /// Build the tearsheet for a completed run, upload it and upsert the
    /// run's `reports` row.
    pub async fn generate(&self, run_id: &str, now: DateTime<Utc>) -> Result<Report, ReportError> {
        let (run, metrics, equity) = tokio::try_join!(
            self.store.get_run(run_id),
            self.store.get_metrics(run_id),
            self.store.equity_curve(run_id),
        )?;

        let run = run.ok_or_else(|| ReportError::RunNotFound(run_id.to_string()))?;
        let metrics = metrics.ok_or(ReportError::MissingMetrics)?;
        if run.run.status() != RunStatus::Completed {
            return Err(ReportError::NotCompleted);
        }
        if equity.is_empty() {
            return Err(ReportError::MissingEquity);
        }

        let generated_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let html = build_report_html(&ReportInput {
            run_name: &run.run.name,
            strategy_id: &run.run.strategy_id,
            start_date: &run.run.start_date,
            end_date: &run.run.end_date,
            generated_at: &generated_at,
            metrics: &metrics,
            equity_curve: &equity,
        });
        let checksum = hex::encode(Sha256::digest(html.as_bytes()));
        let path = Self::storage_path(run_id);

        self.storage
            .upload(&path, html.into_bytes(), REPORT_CONTENT_TYPE)
            .await
            .map_err(ReportError::Upload)?;

        let url = self.storage.public_url(&path);
        let report = self
            .store
            .upsert_report(run_id, &path, &url, &checksum)
            .await
            .map_err(ReportError::Persist)?;

        tracing::info!(
            run_id,
            storage = self.storage.name(),
            url = %report.url,
            "Report published"
        );
        Ok(report)
    }
}
