//! Read-modify-write operations on per-site usage counters.
//!
//! Every operation loads the `sites` entry, mutates a single record and
//! writes the entry back. Calls are not serialized against each other; a
//! rare lost update between two events for the same site is tolerated.
//! Operations on a site that no longer exists are silent no-ops because the
//! settings UI may delete a site while one of its timers is pending.

use anyhow::{Context, Result};

use crate::{
    models::{BlockedNotice, SiteMap, SiteRecord},
    storage::Storage,
};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

pub const SITES_KEY: &str = "sites";
pub const BLOCKED_NOTICE_KEY: &str = "blockedSite";

#[derive(Clone)]
pub struct UsageLedger<S> {
    storage: S,
}

impl<S: Storage> UsageLedger<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub async fn load_sites(&self) -> Result<SiteMap> {
        match self.storage.get(SITES_KEY).await? {
            Some(value) => {
                serde_json::from_value(value).context("stored sites entry is malformed")
            }
            None => Ok(SiteMap::new()),
        }
    }

    pub async fn save_sites(&self, sites: &SiteMap) -> Result<()> {
        let value = serde_json::to_value(sites)?;
        self.storage.set(SITES_KEY, value).await
    }

    pub async fn get_site(&self, site_id: &str) -> Result<Option<SiteRecord>> {
        Ok(self.load_sites().await?.get(site_id).cloned())
    }

    /// Applies `mutate` to one record and persists it. Returns the updated
    /// record, or `None` when the site is gone.
    pub async fn update_site<F>(&self, site_id: &str, mutate: F) -> Result<Option<SiteRecord>>
    where
        F: FnOnce(&mut SiteRecord),
    {
        let mut sites = self.load_sites().await?;
        let updated = match sites.get_mut(site_id) {
            Some(record) => {
                mutate(record);
                record.clone()
            }
            None => {
                log_debug!("site {site_id} no longer exists, skipping update");
                return Ok(None);
            }
        };
        self.save_sites(&sites).await?;
        Ok(Some(updated))
    }

    pub async fn increment_total_visits(&self, site_id: &str) -> Result<()> {
        self.update_site(site_id, |record| record.total_visits += 1)
            .await
            .map(drop)
    }

    pub async fn increment_total_visits_when_blocked(&self, site_id: &str) -> Result<()> {
        self.update_site(site_id, |record| record.total_visits_when_blocked += 1)
            .await
            .map(drop)
    }

    pub async fn set_blocked(&self, site_id: &str, blocked: bool) -> Result<()> {
        self.update_site(site_id, |record| record.blocked = blocked)
            .await
            .map(drop)
    }

    pub async fn record_session_start(&self, site_id: &str, now_ms: i64) -> Result<()> {
        self.update_site(site_id, |record| record.session_start_epoch_ms = Some(now_ms))
            .await
            .map(drop)
    }

    /// Folds the running session into `accumulatedSeconds` and closes it.
    ///
    /// Must run before the session start is overwritten, otherwise the
    /// elapsed time is lost. Returns the seconds added.
    pub async fn accumulate_elapsed(&self, site_id: &str, now_ms: i64) -> Result<u64> {
        let mut added = 0;
        self.update_site(site_id, |record| {
            added = record
                .session_start()
                .map(|start| elapsed_seconds(start, now_ms))
                .unwrap_or(0);
            record.accumulated_seconds = record.accumulated_seconds.saturating_add(added);
            record.session_start_epoch_ms = None;
            record.last_session_epoch_ms = Some(now_ms);
        })
        .await?;
        Ok(added)
    }

    /// Daily rollover for a blocked site: unblock and start the budget over.
    pub async fn grant_amnesty(&self, site_id: &str, now_ms: i64) -> Result<()> {
        self.update_site(site_id, |record| {
            record.blocked = false;
            record.accumulated_seconds = 0;
            record.session_start_epoch_ms = None;
            record.last_session_epoch_ms = Some(now_ms);
        })
        .await
        .map(drop)
    }

    /// Daily rollover for an unblocked site: yesterday's usage no longer counts.
    pub async fn refresh_budget(&self, site_id: &str, now_ms: i64) -> Result<()> {
        self.update_site(site_id, |record| {
            record.accumulated_seconds = 0;
            record.last_session_epoch_ms = Some(now_ms);
        })
        .await
        .map(drop)
    }

    /// Ties a block to today's date when no timing session recorded one.
    pub async fn stamp_day_anchor(&self, site_id: &str, now_ms: i64) -> Result<()> {
        self.update_site(site_id, |record| record.last_session_epoch_ms = Some(now_ms))
            .await
            .map(drop)
    }

    pub async fn persist_pattern(&self, site_id: &str, pattern: &str) -> Result<()> {
        self.update_site(site_id, |record| {
            if record.pattern.is_none() {
                record.pattern = Some(pattern.to_string());
            }
        })
        .await
        .map(drop)
    }

    pub async fn write_blocked_notice(&self, notice: &BlockedNotice) -> Result<()> {
        let value = serde_json::to_value(notice)?;
        self.storage.set(BLOCKED_NOTICE_KEY, value).await
    }

    /// Reads and clears the blocked-page notice.
    pub async fn take_blocked_notice(&self) -> Result<Option<BlockedNotice>> {
        let Some(value) = self.storage.get(BLOCKED_NOTICE_KEY).await? else {
            return Ok(None);
        };
        self.storage.remove(BLOCKED_NOTICE_KEY).await?;
        let notice = serde_json::from_value(value).context("blocked notice is malformed")?;
        Ok(Some(notice))
    }
}

fn elapsed_seconds(start_ms: i64, now_ms: i64) -> u64 {
    let elapsed_ms = now_ms.saturating_sub(start_ms).max(0) as u64;
    (elapsed_ms + 500) / 1000
}
