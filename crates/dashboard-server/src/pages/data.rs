use std::fmt::Write;

use axum::extract::State;
use factorlab_core::format::{escape_html, fmt_thousands};
use factorlab_core::PriceCoverage;

use super::components::{count_label, empty_state, table_card};
use super::layout::shell;
use super::{or_empty, Page};
use crate::AppState;

pub(crate) fn coverage_table(coverage: &[PriceCoverage]) -> String {
    if coverage.is_empty() {
        return empty_state(
            "Data sources",
            "No price history has been ingested yet. Ticker coverage appears here once prices are loaded.",
        );
    }
    let mut rows = String::new();
    for c in coverage {
        let _ = write!(
            rows,
            r#"<tr><td class="mono">{ticker}</td><td class="num">{count}</td><td class="num mono muted">{first}</td><td class="num mono muted">{last}</td></tr>"#,
            ticker = escape_html(&c.ticker),
            count = fmt_thousands(c.rows),
            first = escape_html(&c.first_date),
            last = escape_html(&c.last_date),
        );
    }
    table_card(
        "Price Coverage",
        &count_label(&match coverage.len() {
            1 => "1 ticker".to_string(),
            n => format!("{n} tickers"),
        }),
        &format!(
            r#"<table><thead><tr><th>Ticker</th><th class="num">Rows</th><th class="num">First Date</th><th class="num">Last Date</th></tr></thead><tbody>{rows}</tbody></table>"#
        ),
    )
}

pub async fn data_page(State(state): State<AppState>) -> Page {
    let coverage = or_empty(state.store.price_coverage().await, "price coverage");
    Page::ok(shell("Data", "/data", &coverage_table(&coverage)))
}
