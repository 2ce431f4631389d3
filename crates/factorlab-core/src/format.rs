//! Number, date and text formatting shared by the pages and the tearsheet.
//!
//! Return-like inputs are fractions (0.247 renders as "24.7%").

use chrono::{DateTime, NaiveDateTime, Utc};

const MISSING: &str = "--";

/// Fixed-point rendering. Exact negative zero prints unsigned; non-finite
/// values print as "--".
pub fn fmt_fixed(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return MISSING.to_string();
    }
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{:.*}", digits, value)
}

pub fn fmt_percent(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return MISSING.to_string();
    }
    format!("{}%", fmt_fixed(value * 100.0, digits))
}

/// Percent with an explicit "+" for non-negative values.
pub fn fmt_signed_percent(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return MISSING.to_string();
    }
    let sign = if value >= 0.0 { "+" } else { "" };
    format!("{sign}{}", fmt_percent(value, digits))
}

pub fn fmt_ratio(value: f64, digits: usize) -> String {
    fmt_fixed(value, digits)
}

/// Two-decimal percent, or "--" when the value is absent.
pub fn fmt_optional_pct(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => fmt_percent(v, 2),
        _ => MISSING.to_string(),
    }
}

/// Whole dollars with thousands separators. Rounds half up, so -2.5 becomes -2.
pub fn fmt_money(value: f64) -> String {
    if !value.is_finite() {
        return MISSING.to_string();
    }
    let rounded = (value + 0.5).floor() as i64;
    format!("${}", fmt_thousands(rounded))
}

/// Signed dollars and cents, e.g. "+$1,234.50" or "-$12.00".
pub fn fmt_money_cents(value: f64) -> String {
    if !value.is_finite() {
        return MISSING.to_string();
    }
    let sign = if value >= 0.0 { "+" } else { "-" };
    let cents = (value.abs() * 100.0).round() as i64;
    format!("{sign}${}.{:02}", fmt_thousands(cents / 100), cents % 100)
}

/// en-US digit grouping.
pub fn fmt_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn fmt_duration(seconds: Option<i64>) -> String {
    match seconds {
        None => MISSING.to_string(),
        Some(s) if s < 60 => format!("{s}s"),
        Some(s) => format!("{}m {}s", s / 60, s % 60),
    }
}

/// "Jan 5, 3:04 PM" in UTC. Unparseable input is returned verbatim.
pub fn fmt_timestamp(value: Option<&str>) -> String {
    let Some(raw) = value.filter(|v| !v.is_empty()) else {
        return MISSING.to_string();
    };
    match parse_timestamp(raw) {
        Some(ts) => ts.format("%b %-d, %-I:%M %p").to_string(),
        None => raw.to_string(),
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// "2015-01 – 2020-12"
pub fn fmt_period(start: &str, end: &str) -> String {
    format!("{} \u{2013} {}", year_month(start), year_month(end))
}

fn year_month(date: &str) -> &str {
    date.get(..7).unwrap_or(date)
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_and_ratio() {
        assert_eq!(fmt_percent(0.247, 1), "24.7%");
        assert_eq!(fmt_percent(-0.083, 1), "-8.3%");
        assert_eq!(fmt_signed_percent(0.183, 1), "+18.3%");
        assert_eq!(fmt_signed_percent(-0.02, 1), "-2.0%");
        assert_eq!(fmt_ratio(1.8432, 2), "1.84");
        assert_eq!(fmt_percent(-0.0, 1), "0.0%");
        assert_eq!(fmt_ratio(f64::NAN, 2), "--");
    }

    #[test]
    fn test_optional_pct() {
        assert_eq!(fmt_optional_pct(Some(0.01234)), "1.23%");
        assert_eq!(fmt_optional_pct(None), "--");
        assert_eq!(fmt_optional_pct(Some(f64::NAN)), "--");
    }

    #[test]
    fn test_money() {
        assert_eq!(fmt_money(100_000.0), "$100,000");
        assert_eq!(fmt_money(1_234_567.49), "$1,234,567");
        assert_eq!(fmt_money(999.5), "$1,000");
        assert_eq!(fmt_money(0.0), "$0");
        assert_eq!(fmt_money(-1234.0), "$-1,234");
        assert_eq!(fmt_money(-2.5), "$-2");
    }

    #[test]
    fn test_money_cents() {
        assert_eq!(fmt_money_cents(1234.5), "+$1,234.50");
        assert_eq!(fmt_money_cents(-12.0), "-$12.00");
        assert_eq!(fmt_money_cents(0.0), "+$0.00");
    }

    #[test]
    fn test_thousands() {
        assert_eq!(fmt_thousands(0), "0");
        assert_eq!(fmt_thousands(999), "999");
        assert_eq!(fmt_thousands(1000), "1,000");
        assert_eq!(fmt_thousands(-1_000_000), "-1,000,000");
    }

    #[test]
    fn test_duration() {
        assert_eq!(fmt_duration(None), "--");
        assert_eq!(fmt_duration(Some(42)), "42s");
        assert_eq!(fmt_duration(Some(60)), "1m 0s");
        assert_eq!(fmt_duration(Some(185)), "3m 5s");
    }

    #[test]
    fn test_timestamp() {
        assert_eq!(fmt_timestamp(None), "--");
        assert_eq!(fmt_timestamp(Some("2025-01-05T15:04:00Z")), "Jan 5, 3:04 PM");
        assert_eq!(fmt_timestamp(Some("2025-03-10 09:30:00")), "Mar 10, 9:30 AM");
        assert_eq!(fmt_timestamp(Some("yesterday")), "yesterday");
    }

    #[test]
    fn test_period() {
        assert_eq!(fmt_period("2015-01-01", "2020-12-31"), "2015-01 \u{2013} 2020-12");
        assert_eq!(fmt_period("2015", "x"), "2015 \u{2013} x");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }
}
