use std::fmt::Write;

use axum::extract::State;
use factorlab_core::format::escape_html;

use super::components::card;
use super::layout::shell;
use super::Page;
use crate::config::DashboardConfig;
use crate::AppState;

pub(crate) fn settings_card(config: &DashboardConfig) -> String {
    let mut rows = String::new();
    for (label, value) in config.public_settings() {
        let _ = write!(
            rows,
            r#"<div class="kv"><span class="muted">{label}</span><span class="mono">{}</span></div>"#,
            escape_html(&value)
        );
    }
    let _ = write!(
        rows,
        r#"<div class="kv"><span class="muted">Version</span><span class="mono">{}</span></div>"#,
        env!("CARGO_PKG_VERSION")
    );
    card("Configuration", "", &rows)
}

pub async fn settings_page(State(state): State<AppState>) -> Page {
    Page::ok(shell("Settings", "/settings", &settings_card(&state.config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_card_lists_backend() {
        let html = settings_card(&DashboardConfig::default());
        assert!(html.contains("Report storage"));
        assert!(html.contains(r#"<span class="mono">local</span>"#));
        assert!(html.contains("Version"));
    }
}
