//! Which open tabs receive a takeover.

use tracing::debug;
use url::Url;

use crate::constants::BROWSER_INTERNAL_SURFACES;
use crate::models::{is_whitelisted, TabInfo};

/// A tab is a candidate when its URL parses, is plain http(s), is not
/// whitelisted and is not a browser-owned page. Anything unparseable is
/// skipped.
pub fn is_candidate(tab: &TabInfo, whitelist: &[String]) -> bool {
    let url = match Url::parse(&tab.url) {
        Ok(url) => url,
        Err(_) => {
            debug!("Skipping invalid URL: {}", tab.url);
            return false;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    let Some(host) = url.host_str() else {
        return false;
    };

    if is_whitelisted(host, whitelist) {
        debug!("Skipping whitelisted tab: {}", tab.url);
        return false;
    }

    if is_browser_surface(host, url.path()) {
        debug!("Skipping browser-internal page: {}", tab.url);
        return false;
    }

    true
}

fn is_browser_surface(host: &str, path: &str) -> bool {
    BROWSER_INTERNAL_SURFACES
        .iter()
        .any(|(surface_host, prefix)| host == *surface_host && path.starts_with(prefix))
}

pub fn select_candidates(tabs: Vec<TabInfo>, whitelist: &[String]) -> Vec<TabInfo> {
    tabs.into_iter()
        .filter(|tab| is_candidate(tab, whitelist))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelist() -> Vec<String> {
        vec!["zoom.us".to_string(), "meet.google.com".to_string()]
    }

    #[test]
    fn test_substring_whitelist_match() {
        assert!(!is_candidate(&TabInfo::new(1, "https://app.zoom.us/j/123"), &whitelist()));
        assert!(is_candidate(&TabInfo::new(2, "https://example.com/"), &whitelist()));
    }

    #[test]
    fn test_unparseable_and_non_web_urls_are_skipped() {
        let wl = whitelist();
        for url in [
            "not a url",
            "",
            "chrome://settings",
            "chrome-extension://abc/popup.html",
            "file:///tmp/x.html",
            "about:blank",
        ] {
            assert!(!is_candidate(&TabInfo::new(1, url), &wl), "{url}");
        }
    }

    #[test]
    fn test_browser_store_pages_are_skipped() {
        let wl = Vec::new();
        assert!(!is_candidate(
            &TabInfo::new(1, "https://chrome.google.com/webstore/detail/x"),
            &wl
        ));
        assert!(!is_candidate(&TabInfo::new(2, "https://addons.mozilla.org/en-US/"), &wl));
        assert!(is_candidate(&TabInfo::new(3, "https://chrome.google.com/intl/en/"), &wl));
    }

    #[test]
    fn test_select_candidates_keeps_order() {
        let tabs = vec![
            TabInfo::new(1, "https://a.com"),
            TabInfo::new(2, "https://meet.google.com/abc"),
            TabInfo::new(3, "http://b.org/page"),
        ];
        let ids: Vec<u32> = select_candidates(tabs, &whitelist())
            .into_iter()
            .map(|tab| tab.id.0)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
