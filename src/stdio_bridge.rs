//! Line-delimited JSON bridge to a browser host.
//!
//! Events arrive one JSON object per line on stdin; actions are written one
//! JSON object per line to stdout. A native-messaging shim on the browser
//! side translates both directions.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, Mutex as AsyncMutex},
};

use crate::{
    session::{Browser, BrowserEvent},
    timer::TabId,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Last known URL of each tab, learned from the event stream.
#[derive(Clone, Default)]
pub struct TabRegistry {
    urls: Arc<Mutex<HashMap<TabId, String>>>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, event: &BrowserEvent) {
        let mut urls = self.lock();
        match event {
            BrowserEvent::BeforeNavigate { frame_id: 0, .. }
            | BrowserEvent::NavigationCompleted { frame_id: 0, .. }
            | BrowserEvent::TabActivated { url: Some(_), .. } => {
                if let Some(url) = event.url() {
                    urls.insert(event.tab_id(), url.to_string());
                }
            }
            BrowserEvent::TabRemoved { tab_id } => {
                urls.remove(tab_id);
            }
            _ => {}
        }
    }

    pub fn url(&self, tab_id: TabId) -> Option<String> {
        self.lock().get(&tab_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TabId, String>> {
        match self.urls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum BrowserAction<'a> {
    #[serde(rename_all = "camelCase")]
    Redirect { tab_id: TabId, url: &'a str },
}

/// [`Browser`] that answers URL lookups from a [`TabRegistry`] and emits
/// redirects as JSON lines.
pub struct StdioBrowser<W> {
    tabs: TabRegistry,
    blocked_page_url: String,
    out: AsyncMutex<W>,
}

impl<W> StdioBrowser<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(tabs: TabRegistry, blocked_page_url: impl Into<String>, out: W) -> Self {
        Self {
            tabs,
            blocked_page_url: blocked_page_url.into(),
            out: AsyncMutex::new(out),
        }
    }

    async fn emit(&self, action: &BrowserAction<'_>) -> Result<()> {
        let mut line = serde_json::to_vec(action)?;
        line.push(b'\n');
        let mut out = self.out.lock().await;
        out.write_all(&line).await.context("failed to write action")?;
        out.flush().await.context("failed to flush action")?;
        Ok(())
    }
}

impl<W> Browser for StdioBrowser<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn tab_url(&self, tab_id: TabId) -> Result<Option<String>> {
        Ok(self.tabs.url(tab_id))
    }

    async fn redirect_to_blocked(&self, tab_id: TabId) -> Result<()> {
        self.emit(&BrowserAction::Redirect {
            tab_id,
            url: &self.blocked_page_url,
        })
        .await
    }
}

/// Parses events from `input` until EOF and forwards them. Unparsable lines
/// are logged and skipped.
pub async fn forward_events<R>(
    input: R,
    tabs: TabRegistry,
    events: mpsc::Sender<BrowserEvent>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("failed to read event")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: BrowserEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                log_warn!("skipping malformed event {line:?}: {err}");
                continue;
            }
        };

        tabs.observe(&event);
        if events.send(event).await.is_err() {
            break;
        }
    }

    log_info!("event input closed");
    Ok(())
}
