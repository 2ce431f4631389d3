use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::StrategyId;

pub const MAX_RUN_NAME_LEN: usize = 120;

/// Raw new-run submission, exactly as posted by the form or the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRunForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub strategy_id: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

/// A validated request to queue a backtest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRun {
    pub name: String,
    pub strategy_id: StrategyId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Validate a new-run submission, reporting only the first problem found.
pub fn validate_new_run(form: &NewRunForm) -> Result<NewRun, ValidationError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(ValidationError::new("name", "Name is required"));
    }
    if name.chars().count() > MAX_RUN_NAME_LEN {
        return Err(ValidationError::new("name", "Name too long"));
    }

    let strategy_id: StrategyId = form
        .strategy_id
        .parse()
        .map_err(|_| ValidationError::new("strategy_id", "Select a valid strategy"))?;

    let start_date = parse_iso_date(&form.start_date)
        .ok_or_else(|| ValidationError::new("start_date", "Invalid start date"))?;
    let end_date = parse_iso_date(&form.end_date)
        .ok_or_else(|| ValidationError::new("end_date", "Invalid end date"))?;

    if end_date <= start_date {
        return Err(ValidationError::new(
            "end_date",
            "End date must be after start date",
        ));
    }

    Ok(NewRun {
        name: name.to_string(),
        strategy_id,
        start_date,
        end_date,
    })
}

/// Strict `YYYY-MM-DD`: ten characters, digits in place, and a real calendar day.
fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, strategy: &str, start: &str, end: &str) -> NewRunForm {
        NewRunForm {
            name: name.to_string(),
            strategy_id: strategy.to_string(),
            start_date: start.to_string(),
            end_date: end.to_string(),
        }
    }

    #[test]
    fn test_valid_submission() {
        let run = validate_new_run(&form(
            "  Momentum 2015-2020 ",
            "momentum_12_1",
            "2015-01-01",
            "2020-12-31",
        ))
        .unwrap();
        assert_eq!(run.name, "Momentum 2015-2020");
        assert_eq!(run.strategy_id, StrategyId::Momentum12_1);
        assert_eq!(run.start_date, NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
    }

    #[test]
    fn test_name_rules() {
        let err = validate_new_run(&form("   ", "ml_ridge", "2020-01-01", "2021-01-01")).unwrap_err();
        assert_eq!(err.message, "Name is required");

        let long = "x".repeat(121);
        let err = validate_new_run(&form(&long, "ml_ridge", "2020-01-01", "2021-01-01")).unwrap_err();
        assert_eq!(err.message, "Name too long");

        let exact = "x".repeat(120);
        assert!(validate_new_run(&form(&exact, "ml_ridge", "2020-01-01", "2021-01-01")).is_ok());
    }

    #[test]
    fn test_strategy_must_be_known() {
        let err = validate_new_run(&form("a", "", "2020-01-01", "2021-01-01")).unwrap_err();
        assert_eq!(err.message, "Select a valid strategy");
        assert_eq!(err.field, "strategy_id");
    }

    #[test]
    fn test_date_shape_and_calendar() {
        let err = validate_new_run(&form("a", "equal_weight", "2020-1-01", "2021-01-01")).unwrap_err();
        assert_eq!(err.message, "Invalid start date");

        let err = validate_new_run(&form("a", "equal_weight", "2020-01-01", "2021-02-30")).unwrap_err();
        assert_eq!(err.message, "Invalid end date");
    }

    #[test]
    fn test_end_must_follow_start() {
        let err = validate_new_run(&form("a", "equal_weight", "2021-01-01", "2021-01-01")).unwrap_err();
        assert_eq!(err.message, "End date must be after start date");
        assert_eq!(err.field, "end_date");
    }

    #[test]
    fn test_first_issue_wins() {
        let err = validate_new_run(&form("", "bogus", "nope", "nope")).unwrap_err();
        assert_eq!(err.message, "Name is required");
    }
}
