//! Contract to the host browser. The engine only ever needs to look tabs up
//! and to navigate one away to the blocked page; everything else arrives as
//! [BrowserEvent](crate::engine::router::BrowserEvent) notifications.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

pub type TabId = i64;
pub type WindowId = i64;

/// Identity and location of a browser tab, as much as the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserHost: Send + Sync + 'static {
    /// Looks up a tab by id. `None` when the tab is already gone.
    async fn tab(&self, tab_id: TabId) -> Result<Option<TabInfo>>;

    /// The active tab of the given window.
    async fn active_tab(&self, window_id: WindowId) -> Result<Option<TabInfo>>;

    /// The active tab of the currently focused window, used once on startup.
    async fn focused_tab(&self) -> Result<Option<TabInfo>>;

    /// Redirects a tab, used to send it to the blocked page.
    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<()>;
}

/// Host used when no real browser transport is attached (`serve` without an
/// embedder). Sees no tabs and logs navigation requests instead of acting.
pub struct DetachedBrowser;

#[async_trait]
impl BrowserHost for DetachedBrowser {
    async fn tab(&self, _tab_id: TabId) -> Result<Option<TabInfo>> {
        Ok(None)
    }

    async fn active_tab(&self, _window_id: WindowId) -> Result<Option<TabInfo>> {
        Ok(None)
    }

    async fn focused_tab(&self) -> Result<Option<TabInfo>> {
        Ok(None)
    }

    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<()> {
        debug!("No browser attached, dropping navigation of tab {tab_id} to {url}");
        Ok(())
    }
}

/// View shown instead of a page whose domain went over its daily limit.
pub const BLOCKED_PAGE: &str = "blocked.html";

/// Builds the blocked-page address with the context the view renders.
pub fn blocked_page_url(domain: &str, time_spent: u64, limit: u64) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("domain", domain)
        .append_pair("time", &time_spent.to_string())
        .append_pair("limit", &limit.to_string())
        .finish();
    format!("{BLOCKED_PAGE}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_url_carries_query_parameters() {
        assert_eq!(
            blocked_page_url("x.com", 65, 60),
            "blocked.html?domain=x.com&time=65&limit=60"
        );
    }

    #[test]
    fn blocked_url_escapes_domains() {
        let url = blocked_page_url("münchen.example", 10, 5);
        assert!(url.starts_with("blocked.html?domain="));
        assert!(!url.contains('ü'));
        assert!(url.ends_with("&time=10&limit=5"));
    }
}
