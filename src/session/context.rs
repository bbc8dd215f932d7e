use crate::timer::TabId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedSite {
    pub tab_id: TabId,
    pub site_id: String,
}

/// The site currently being timed in the foreground tab, if any.
#[derive(Debug, Default)]
pub struct SessionContext {
    current: Option<WatchedSite>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, site: WatchedSite) {
        // Never overwrite in place: a stale entry must be gone first.
        self.clear();
        self.current = Some(site);
    }

    pub fn clear(&mut self) -> Option<WatchedSite> {
        self.current.take()
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<&WatchedSite> {
        self.current.as_ref()
    }

    pub fn watched_tab(&self) -> Option<TabId> {
        self.current.as_ref().map(|site| site.tab_id)
    }

    pub fn is_watching(&self, tab_id: TabId) -> bool {
        self.watched_tab() == Some(tab_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(tab_id: TabId, site_id: &str) -> WatchedSite {
        WatchedSite {
            tab_id,
            site_id: site_id.to_string(),
        }
    }

    #[test]
    fn watch_replaces_previous_site() {
        let mut context = SessionContext::new();
        context.watch(site(1, "https://a.com"));
        context.watch(site(2, "https://b.com"));

        assert!(context.is_watching(2));
        assert!(!context.is_watching(1));
        assert_eq!(context.clear().unwrap().site_id, "https://b.com");
        assert!(context.current().is_none());
    }
}
