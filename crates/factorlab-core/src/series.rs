//! Series derived from stored rows: drawdowns, rebalance picks, trades and
//! turnover. Everything here is a pure function of its input.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::{
    DrawdownPoint, EquityPoint, FeatureImportance, Holding, ModelPrediction, Trade, TradeSide,
    TurnoverPoint,
};

/// Drawdown from the running peak for each point, as a fraction (<= 0).
pub fn drawdown_series(points: &[EquityPoint]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    points
        .iter()
        .map(|pt| {
            if pt.portfolio > peak {
                peak = pt.portfolio;
            }
            if peak > 0.0 {
                (pt.portfolio - peak) / peak
            } else {
                0.0
            }
        })
        .collect()
}

pub fn drawdown_points(points: &[EquityPoint]) -> Vec<DrawdownPoint> {
    points
        .iter()
        .zip(drawdown_series(points))
        .map(|(pt, drawdown)| DrawdownPoint {
            date: pt.date.clone(),
            drawdown,
        })
        .collect()
}

/// Deepest drawdown, never above zero.
pub fn worst_drawdown(series: &[f64]) -> f64 {
    series.iter().copied().fold(0.0, f64::min)
}

/// Rebase a series so the first value is 1.0. Empty or zero-based series
/// come back unchanged.
pub fn rebase(values: &[f64]) -> Vec<f64> {
    match values.first() {
        Some(&first) if first != 0.0 => values.iter().map(|v| v / first).collect(),
        _ => values.to_vec(),
    }
}

/// Chart window selectable on the equity chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    OneWeek,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::OneWeek,
        Timeframe::OneMonth,
        Timeframe::ThreeMonths,
        Timeframe::SixMonths,
        Timeframe::OneYear,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::OneWeek => "1W",
            Timeframe::OneMonth => "1M",
            Timeframe::ThreeMonths => "3M",
            Timeframe::SixMonths => "6M",
            Timeframe::OneYear => "1Y",
        }
    }

    /// Number of trailing points kept.
    pub fn points(&self) -> usize {
        match self {
            Timeframe::OneWeek => 7,
            Timeframe::OneMonth => 30,
            Timeframe::ThreeMonths => 90,
            Timeframe::SixMonths => 180,
            Timeframe::OneYear => 365,
        }
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::OneYear
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownTimeframe(s.to_string()))
    }
}

pub fn slice_timeframe(points: &[EquityPoint], tf: Timeframe) -> &[EquityPoint] {
    let keep = tf.points().min(points.len());
    &points[points.len() - keep..]
}

/// Selected picks of the most recent rebalance, best rank first.
///
/// `predictions` must be ordered by `as_of_date` descending, which is how the
/// store returns them.
pub fn latest_picks(predictions: &[ModelPrediction], limit: usize) -> Vec<&ModelPrediction> {
    let Some(first) = predictions.first() else {
        return Vec::new();
    };
    let latest = &first.as_of_date;
    let mut picks: Vec<&ModelPrediction> = predictions
        .iter()
        .filter(|p| &p.as_of_date == latest && p.selected)
        .collect();
    picks.sort_by_key(|p| p.rank);
    picks.truncate(limit);
    picks
}

/// Current holdings: every selected pick of the latest rebalance.
pub fn holdings_from_predictions(predictions: &[ModelPrediction]) -> Vec<Holding> {
    latest_picks(predictions, usize::MAX)
        .into_iter()
        .map(|p| Holding {
            ticker: p.ticker.clone(),
            weight: p.weight,
            predicted_return: p.predicted_return,
            realized_return: p.realized_return,
        })
        .collect()
}

/// Selected weights per rebalance date, oldest first.
fn weights_by_rebalance(predictions: &[ModelPrediction]) -> BTreeMap<&str, HashMap<&str, f64>> {
    let mut by_date: BTreeMap<&str, HashMap<&str, f64>> = BTreeMap::new();
    for p in predictions {
        let slot = by_date.entry(p.as_of_date.as_str()).or_default();
        if p.selected {
            *slot.entry(p.ticker.as_str()).or_insert(0.0) += p.weight;
        }
    }
    by_date
}

/// Entries into and exits from the selected set between consecutive
/// rebalances, newest first. Weight changes on names held across both
/// rebalances are not reported as trades.
pub fn trades_from_predictions(predictions: &[ModelPrediction]) -> Vec<Trade> {
    let mut trades = Vec::new();
    let mut previous: HashMap<&str, f64> = HashMap::new();

    for (date, current) in weights_by_rebalance(predictions) {
        let mut entered: Vec<(&str, f64)> = current
            .iter()
            .filter(|(ticker, _)| !previous.contains_key(*ticker))
            .map(|(t, w)| (*t, *w))
            .collect();
        let mut exited: Vec<(&str, f64)> = previous
            .iter()
            .filter(|(ticker, _)| !current.contains_key(*ticker))
            .map(|(t, w)| (*t, *w))
            .collect();
        entered.sort_by(|a, b| a.0.cmp(b.0));
        exited.sort_by(|a, b| a.0.cmp(b.0));

        for (ticker, weight) in entered {
            trades.push(Trade {
                date: date.to_string(),
                ticker: ticker.to_string(),
                side: TradeSide::Buy,
                weight_change: weight,
            });
        }
        for (ticker, weight) in exited {
            trades.push(Trade {
                date: date.to_string(),
                ticker: ticker.to_string(),
                side: TradeSide::Sell,
                weight_change: -weight,
            });
        }
        previous = current;
    }

    trades.reverse();
    trades
}

/// One-way turnover per rebalance: half the summed absolute weight change
/// against the previous rebalance (the first rebalance trades in from cash).
pub fn turnover_series(predictions: &[ModelPrediction]) -> Vec<TurnoverPoint> {
    let mut out = Vec::new();
    let mut previous: HashMap<&str, f64> = HashMap::new();

    for (date, current) in weights_by_rebalance(predictions) {
        let mut total = 0.0;
        for (ticker, weight) in &current {
            total += (weight - previous.get(ticker).copied().unwrap_or(0.0)).abs();
        }
        for (ticker, weight) in &previous {
            if !current.contains_key(ticker) {
                total += weight.abs();
            }
        }
        out.push(TurnoverPoint {
            date: date.to_string(),
            turnover: total / 2.0,
        });
        previous = current;
    }
    out
}

/// Feature importances sorted from most to least important.
pub fn feature_importance_rows(value: &serde_json::Value) -> Vec<FeatureImportance> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    let mut rows: Vec<FeatureImportance> = map
        .iter()
        .map(|(feature, v)| FeatureImportance {
            feature: feature.clone(),
            importance: importance_value(v),
        })
        .collect();
    rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    rows
}

fn importance_value(v: &serde_json::Value) -> f64 {
    let n = match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    n.filter(|x| x.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pt(date: &str, portfolio: f64) -> EquityPoint {
        EquityPoint {
            date: date.to_string(),
            portfolio,
            benchmark: 100.0,
        }
    }

    fn pred(as_of: &str, ticker: &str, rank: i64, selected: bool, weight: f64) -> ModelPrediction {
        ModelPrediction {
            run_id: "r1".into(),
            model_name: "ml_ridge".into(),
            as_of_date: as_of.into(),
            target_date: as_of.into(),
            ticker: ticker.into(),
            predicted_return: 0.01 * rank as f64,
            realized_return: None,
            rank,
            selected,
            weight,
        }
    }

    #[test]
    fn test_drawdown_from_running_peak() {
        let pts = vec![pt("d1", 100.0), pt("d2", 120.0), pt("d3", 90.0), pt("d4", 130.0)];
        let dd = drawdown_series(&pts);
        assert_eq!(dd[0], 0.0);
        assert_eq!(dd[1], 0.0);
        assert!((dd[2] - (-0.25)).abs() < 1e-12);
        assert_eq!(dd[3], 0.0);
        assert!((worst_drawdown(&dd) + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_non_positive_peak_is_zero() {
        let pts = vec![pt("d1", 0.0), pt("d2", -5.0)];
        assert_eq!(drawdown_series(&pts), vec![0.0, 0.0]);
        assert_eq!(worst_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase(&[50.0, 75.0, 25.0]), vec![1.0, 1.5, 0.5]);
        assert_eq!(rebase(&[0.0, 1.0]), vec![0.0, 1.0]);
        assert!(rebase(&[]).is_empty());
    }

    #[test]
    fn test_timeframe_slicing() {
        let pts: Vec<EquityPoint> = (0..400).map(|i| pt(&format!("d{i}"), i as f64)).collect();
        assert_eq!(slice_timeframe(&pts, Timeframe::OneWeek).len(), 7);
        assert_eq!(slice_timeframe(&pts, Timeframe::OneWeek)[0].date, "d393");
        assert_eq!(slice_timeframe(&pts[..10], Timeframe::OneMonth).len(), 10);
        assert_eq!("6m".parse::<Timeframe>().unwrap(), Timeframe::SixMonths);
        assert!("2Y".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_latest_picks_filters_and_sorts() {
        let preds = vec![
            pred("2024-02-29", "MSFT", 2, true, 0.5),
            pred("2024-02-29", "AAPL", 1, true, 0.5),
            pred("2024-02-29", "XOM", 3, false, 0.0),
            pred("2024-01-31", "GE", 1, true, 1.0),
        ];
        let picks = latest_picks(&preds, 10);
        let tickers: Vec<&str> = picks.iter().map(|p| p.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(latest_picks(&preds, 1).len(), 1);
        assert!(latest_picks(&[], 10).is_empty());
    }

    #[test]
    fn test_trades_and_turnover() {
        let preds = vec![
            pred("2024-02-29", "AAPL", 1, true, 0.5),
            pred("2024-02-29", "MSFT", 2, true, 0.5),
            pred("2024-01-31", "AAPL", 1, true, 0.5),
            pred("2024-01-31", "GE", 2, true, 0.5),
        ];
        let trades = trades_from_predictions(&preds);
        assert_eq!(trades.len(), 4);
        // newest rebalance first: sell GE, buy MSFT on 2024-02-29
        assert_eq!(trades[0].date, "2024-02-29");
        assert_eq!(trades[0].ticker, "GE");
        assert_eq!(trades[0].side, TradeSide::Sell);
        assert_eq!(trades[1].ticker, "MSFT");
        assert_eq!(trades[1].side, TradeSide::Buy);
        assert!(trades[2..].iter().all(|t| t.date == "2024-01-31" && t.side == TradeSide::Buy));

        let turnover = turnover_series(&preds);
        assert_eq!(turnover.len(), 2);
        assert_eq!(turnover[0].date, "2024-01-31");
        assert!((turnover[0].turnover - 0.5).abs() < 1e-12);
        assert!((turnover[1].turnover - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_holdings_from_latest_rebalance() {
        let preds = vec![
            pred("2024-02-29", "AAPL", 1, true, 0.6),
            pred("2024-02-29", "MSFT", 2, false, 0.0),
        ];
        let holdings = holdings_from_predictions(&preds);
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].ticker, "AAPL");
        assert_eq!(holdings[0].weight, 0.6);
    }

    #[test]
    fn test_feature_importance_rows() {
        let rows = feature_importance_rows(&json!({
            "momentum": 0.4,
            "beta": "0.1",
            "reversal": null,
            "volatility": 0.5
        }));
        let names: Vec<&str> = rows.iter().map(|r| r.feature.as_str()).collect();
        assert_eq!(names, vec!["volatility", "momentum", "beta", "reversal"]);
        assert_eq!(rows[3].importance, 0.0);
        assert!(feature_importance_rows(&json!([1, 2])).is_empty());
        assert!(feature_importance_rows(&serde_json::Value::Null).is_empty());
    }
}
