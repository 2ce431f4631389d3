#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub name: &'static str,
    pub href: &'static str,
    /// Also active on sub-paths, e.g. `/runs/abc123` for `/runs`.
    pub match_children: bool,
}

const fn item(name: &'static str, href: &'static str, match_children: bool) -> NavItem {
    NavItem {
        name,
        href,
        match_children,
    }
}

pub const MAIN_NAV: [NavItem; 6] = [
    item("Dashboard", "/dashboard", false),
    item("Runs", "/runs", true),
    item("New Run", "/runs/new", false),
    item("Compare", "/compare", false),
    item("Jobs", "/jobs", false),
    item("Data", "/data", false),
];

pub const BOTTOM_NAV: [NavItem; 1] = [item("Settings", "/settings", false)];

pub fn all_nav_items() -> Vec<NavItem> {
    MAIN_NAV.iter().chain(BOTTOM_NAV.iter()).copied().collect()
}

/// Whether `item` should be highlighted for `path`.
///
/// Exact matches always win. A children-matching item yields to a sibling
/// whose href is exactly the path, so `/runs/new` highlights "New Run" only.
pub fn is_nav_item_active(item: &NavItem, path: &str, all: &[NavItem]) -> bool {
    if path == item.href {
        return true;
    }
    let is_child = path
        .strip_prefix(item.href)
        .is_some_and(|rest| rest.starts_with('/'));
    if item.match_children && is_child {
        return !all.iter().any(|s| s != item && s.href == path);
    }
    false
}
