use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Lifecycle state of a run (and of the job driving it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Parse stored status text, treating anything unrecognised as queued.
    pub fn parse_lossy(value: &str) -> Self {
        value.parse().unwrap_or(RunStatus::Queued)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::Running)
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of strategies the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    EqualWeight,
    #[serde(rename = "momentum_12_1")]
    Momentum12_1,
    MlRidge,
    MlLightgbm,
}

impl StrategyId {
    pub const ALL: [StrategyId; 4] = [
        StrategyId::EqualWeight,
        StrategyId::Momentum12_1,
        StrategyId::MlRidge,
        StrategyId::MlLightgbm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::EqualWeight => "equal_weight",
            StrategyId::Momentum12_1 => "momentum_12_1",
            StrategyId::MlRidge => "ml_ridge",
            StrategyId::MlLightgbm => "ml_lightgbm",
        }
    }

    /// Human-readable label for the strategy
    pub fn label(&self) -> &'static str {
        match self {
            StrategyId::EqualWeight => "Equal Weight",
            StrategyId::Momentum12_1 => "Momentum 12-1",
            StrategyId::MlRidge => "ML Ridge",
            StrategyId::MlLightgbm => "ML LightGBM",
        }
    }

    pub fn is_ml(&self) -> bool {
        matches!(self, StrategyId::MlRidge | StrategyId::MlLightgbm)
    }
}

impl FromStr for StrategyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| CoreError::UnknownStrategy(s.to_string()))
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label for a stored strategy id, falling back to the raw id.
pub fn strategy_label(raw: &str) -> String {
    raw.parse::<StrategyId>()
        .map(|s| s.label().to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// A backtest run row.
///
/// Status and strategy are kept as stored text: the engine writes these rows
/// too and the dashboard must still render values it does not recognise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub name: String,
    pub strategy_id: String,
    pub status: String,
    pub start_date: String,
    pub end_date: String,
    pub created_at: String,
}

impl Run {
    pub fn status(&self) -> RunStatus {
        RunStatus::parse_lossy(&self.status)
    }

    pub fn strategy(&self) -> Option<StrategyId> {
        self.strategy_id.parse().ok()
    }

    pub fn strategy_label(&self) -> String {
        strategy_label(&self.strategy_id)
    }
}

/// Summary metrics the engine writes once a run completes.
/// Return-like fields are fractions (0.247 = 24.7%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub turnover: f64,
    pub volatility: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub calmar: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWithMetrics {
    #[serde(flatten)]
    pub run: Run,
    pub metrics: Option<RunMetrics>,
}

impl RunWithMetrics {
    /// Metrics worth displaying: present and the run reached a terminal state.
    pub fn display_metrics(&self) -> Option<&RunMetrics> {
        match self.run.status() {
            RunStatus::Completed | RunStatus::Failed => self.metrics.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: String,
    pub portfolio: f64,
    pub benchmark: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownPoint {
    pub date: String,
    pub drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub run_id: Option<String>,
    pub name: String,
    pub status: String,
    /// 0-100
    pub progress: i64,
    pub started_at: Option<String>,
    /// Seconds
    pub duration: Option<i64>,
    pub created_at: String,
}

impl Job {
    pub fn status(&self) -> RunStatus {
        RunStatus::parse_lossy(&self.status)
    }

    pub fn progress_clamped(&self) -> i64 {
        self.progress.clamp(0, 100)
    }
}

/// Training summary written by the ML pipeline for ML strategy runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub run_id: String,
    pub model_name: String,
    pub train_start: Option<String>,
    pub train_end: Option<String>,
    pub train_rows: i64,
    pub prediction_rows: i64,
    pub rebalance_count: i64,
    pub top_n: i64,
    pub cost_bps: f64,
    pub feature_columns: Vec<String>,
    /// Feature name -> importance, as written by the pipeline.
    pub feature_importance: serde_json::Value,
    pub model_params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub run_id: String,
    pub model_name: String,
    pub as_of_date: String,
    pub target_date: String,
    pub ticker: String,
    pub predicted_return: f64,
    pub realized_return: Option<f64>,
    pub rank: i64,
    pub selected: bool,
    pub weight: f64,
}

/// Pointer to a generated tearsheet in blob storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub storage_path: String,
    pub url: String,
    pub content_sha256: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCoverage {
    pub ticker: String,
    pub rows: i64,
    pub first_date: String,
    pub last_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub weight: f64,
    pub predicted_return: f64,
    pub realized_return: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

/// A position change between two consecutive rebalances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub date: String,
    pub ticker: String,
    pub side: TradeSide,
    /// Signed change in portfolio weight.
    pub weight_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnoverPoint {
    pub date: String,
    pub turnover: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_lossy() {
        assert_eq!("running".parse::<RunStatus>().unwrap(), RunStatus::Running);
        assert!("paused".parse::<RunStatus>().is_err());
        assert_eq!(RunStatus::parse_lossy("paused"), RunStatus::Queued);
        assert!(RunStatus::Running.is_active());
        assert!(!RunStatus::Failed.is_active());
    }

    #[test]
    fn test_strategy_labels() {
        assert_eq!(strategy_label("momentum_12_1"), "Momentum 12-1");
        assert_eq!(strategy_label("ml_lightgbm"), "ML LightGBM");
        assert_eq!(strategy_label("custom_alpha"), "custom_alpha");
        assert!(StrategyId::MlRidge.is_ml());
        assert!(!StrategyId::EqualWeight.is_ml());
    }

    #[test]
    fn test_strategy_serde_uses_stored_ids() {
        let json = serde_json::to_string(&StrategyId::Momentum12_1).unwrap();
        assert_eq!(json, "\"momentum_12_1\"");
        let back: StrategyId = serde_json::from_str("\"ml_ridge\"").unwrap();
        assert_eq!(back, StrategyId::MlRidge);
    }

    #[test]
    fn test_display_metrics_requires_terminal_status() {
        let metrics = RunMetrics {
            run_id: "r1".into(),
            cagr: 0.1,
            sharpe: 1.0,
            max_drawdown: -0.05,
            turnover: 0.2,
            volatility: 0.12,
            win_rate: 0.55,
            profit_factor: 1.4,
            calmar: 2.0,
        };
        let mut row = RunWithMetrics {
            run: Run {
                id: "r1".into(),
                name: "test".into(),
                strategy_id: "equal_weight".into(),
                status: "running".into(),
                start_date: "2020-01-01".into(),
                end_date: "2021-01-01".into(),
                created_at: "2021-01-02T00:00:00Z".into(),
            },
            metrics: Some(metrics),
        };
        assert!(row.display_metrics().is_none());
        row.run.status = "failed".into();
        assert!(row.display_metrics().is_some());
    }
}
