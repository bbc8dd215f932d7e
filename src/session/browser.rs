use std::future::Future;

use anyhow::Result;

use crate::timer::TabId;

/// Actions the engine needs from the browser hosting it.
pub trait Browser: Send + Sync {
    /// URL currently shown in `tab_id`, if the tab exists.
    fn tab_url(&self, tab_id: TabId) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Navigates `tab_id` to the blocked page.
    fn redirect_to_blocked(&self, tab_id: TabId) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
pub use recording::RecordingBrowser;
