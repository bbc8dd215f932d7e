use serde::Deserialize;
use url::Url;

use crate::timer::TabId;

/// Lifecycle events delivered by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BrowserEvent {
    #[serde(rename_all = "camelCase")]
    BeforeNavigate {
        tab_id: TabId,
        url: String,
        #[serde(default)]
        frame_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    NavigationCompleted {
        tab_id: TabId,
        url: String,
        #[serde(default)]
        frame_id: i64,
    },
    /// `url` may be omitted; it is then looked up from the browser.
    #[serde(rename_all = "camelCase")]
    TabActivated {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: TabId },
}

impl BrowserEvent {
    pub fn tab_id(&self) -> TabId {
        match self {
            BrowserEvent::BeforeNavigate { tab_id, .. }
            | BrowserEvent::NavigationCompleted { tab_id, .. }
            | BrowserEvent::TabActivated { tab_id, .. }
            | BrowserEvent::TabRemoved { tab_id } => *tab_id,
        }
    }

    /// URL carried by the event itself, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            BrowserEvent::BeforeNavigate { url, .. }
            | BrowserEvent::NavigationCompleted { url, .. } => Some(url),
            BrowserEvent::TabActivated { url, .. } => url.as_deref(),
            BrowserEvent::TabRemoved { .. } => None,
        }
    }
}

/// The three event kinds that run the block decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BeforeNavigate,
    NavigationCompleted,
    TabActivated,
}

impl EventKind {
    /// Pre-navigation only short-circuits hard blocks; timing starts once
    /// the page has loaded or gained focus.
    pub fn arms_timer(self) -> bool {
        !matches!(self, EventKind::BeforeNavigate)
    }
}

/// Only top-level http(s) documents are monitored.
pub fn is_monitorable_url(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_parse_from_extension_json() {
        let event: BrowserEvent = serde_json::from_str(
            r#"{"type":"navigationCompleted","tabId":4,"url":"https://a.com/x","frameId":0}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            BrowserEvent::NavigationCompleted {
                tab_id: 4,
                url: "https://a.com/x".into(),
                frame_id: 0
            }
        );

        let event: BrowserEvent =
            serde_json::from_str(r#"{"type":"tabActivated","tabId":9}"#).unwrap();
        assert_eq!(event.tab_id(), 9);
        assert_eq!(event.url(), None);
    }

    #[test]
    fn only_web_schemes_are_monitorable() {
        assert!(is_monitorable_url("https://example.com/"));
        assert!(is_monitorable_url("http://example.com"));
        assert!(!is_monitorable_url("chrome://newtab/"));
        assert!(!is_monitorable_url("file:///etc/hosts"));
        assert!(!is_monitorable_url("not a url"));
    }
}
