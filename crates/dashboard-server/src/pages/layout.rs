use std::fmt::Write;

use factorlab_core::format::escape_html;
use factorlab_core::nav::{all_nav_items, is_nav_item_active, NavItem, BOTTOM_NAV, MAIN_NAV};

const LOGO_MARK: &str = r#"<svg width="22" height="22" viewBox="0 0 24 24" fill="none" aria-hidden="true"><path d="M12 2L4 5.5V11C4 16.25 7.4 21.08 12 22.5C16.6 21.08 20 16.25 20 11V5.5L12 2Z" stroke="currentColor" stroke-width="1.5" stroke-linecap="round" stroke-linejoin="round" opacity="0.6"/><path d="M7.5 15.5L10.5 12L13 14L16.5 8.5" stroke="var(--primary)" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"/><path d="M14 8.5H16.5V11" stroke="var(--primary)" stroke-width="2" stroke-linecap="round" stroke-linejoin="round"/></svg>"#;

/// Bare HTML document around `body`.
pub fn document(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{title} | FactorLab</title>
  <link rel="stylesheet" href="/static/app.css" />
</head>
<body>
{body}
</body>
</html>"#,
        title = escape_html(title),
    )
}

fn nav_links(items: &[NavItem], path: &str, all: &[NavItem]) -> String {
    let mut out = String::new();
    for item in items {
        let active = is_nav_item_active(item, path, all);
        let _ = write!(
            out,
            r#"<a class="nav-link{cls}" href="{href}"{current}>{name}</a>"#,
            cls = if active { " active" } else { "" },
            href = item.href,
            current = if active { r#" aria-current="page""# } else { "" },
            name = item.name,
        );
    }
    out
}

/// App shell: sidebar navigation, top bar with the page title, and content.
///
/// `path` is the request path, used to highlight the active nav item.
pub fn shell(title: &str, path: &str, content: &str) -> String {
    let all = all_nav_items();
    let body = format!(
        r#"<div class="app">
  <aside class="sidebar">
    <div class="logo">{logo}<span>FactorLab</span></div>
    <nav aria-label="Main navigation">{main}</nav>
    <div class="bottom">{bottom}</div>
  </aside>
  <div class="main">
    <header class="topbar"><h1>{title}</h1></header>
    <main><div class="content">
{content}
    </div></main>
  </div>
</div>"#,
        logo = LOGO_MARK,
        main = nav_links(&MAIN_NAV, path, &all),
        bottom = nav_links(&BOTTOM_NAV, path, &all),
        title = escape_html(title),
    );
    document(title, &body)
}

/// Centered message used by not-found and error pages.
pub fn message_page(heading: &str, message: &str, link_href: &str, link_label: &str) -> String {
    let body = format!(
        r#"<div class="empty-state" style="min-height: 100vh">
  {logo}
  <h2>{heading}</h2>
  <p>{message}</p>
  <a class="btn" href="{link_href}">{link_label}</a>
</div>"#,
        logo = LOGO_MARK,
        heading = escape_html(heading),
        message = escape_html(message),
        link_label = escape_html(link_label),
    );
    document(heading, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_marks_active_nav() {
        let html = shell("Runs", "/runs/abc", "<p>hi</p>");
        assert!(html.contains(r#"<a class="nav-link active" href="/runs" aria-current="page">Runs</a>"#));
        assert!(html.contains(r#"<a class="nav-link" href="/runs/new">New Run</a>"#));
        assert!(html.contains("<h1>Runs</h1>"));
        assert!(html.contains("<p>hi</p>"));
    }

    #[test]
    fn test_title_is_escaped() {
        let html = shell("<b>x</b>", "/", "");
        assert!(html.contains("<title>&lt;b&gt;x&lt;/b&gt; | FactorLab</title>"));
    }
}
