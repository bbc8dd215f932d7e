use std::{collections::HashMap, time::Duration};

use anyhow::{anyhow, Result};
use log::debug;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{ledger::UsageLedger, storage::Storage};

use super::{ArmedTimer, TabId, TimerFired};

/// Owns at most one countdown per tab.
///
/// Countdown tasks only report back over a channel; whoever drains the
/// receiver decides what a fire means. A fire is honoured only if the tab
/// still holds the timer with the same id, so a countdown that was
/// cancelled after its message was queued is dropped.
pub struct TimerManager {
    timers: HashMap<TabId, ArmedTimer>,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
}

impl TimerManager {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        (
            Self {
                timers: HashMap::new(),
                fired_tx,
            },
            fired_rx,
        )
    }

    /// Arms a countdown of `remaining` for `tab_id` and records the session
    /// start. The tab must not be timing already; callers close its session
    /// first. A zero budget is a block, never a countdown.
    pub async fn start<S: Storage>(
        &mut self,
        ledger: &UsageLedger<S>,
        site_id: &str,
        tab_id: TabId,
        url: &str,
        remaining: Duration,
        now_ms: i64,
    ) -> Result<()> {
        debug_assert!(!remaining.is_zero(), "zero budget must block, not arm");

        let deadline = Instant::now().checked_add(remaining).ok_or_else(|| {
            anyhow!(
                "countdown of {}s for {site_id} is out of range",
                remaining.as_secs()
            )
        })?;

        ledger.record_session_start(site_id, now_ms).await?;

        let id = Uuid::new_v4();
        let cancel_token = CancellationToken::new();

        let token = cancel_token.clone();
        let fired_tx = self.fired_tx.clone();
        let fired = TimerFired {
            timer_id: id,
            tab_id,
            site_id: site_id.to_string(),
        };
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    let _ = fired_tx.send(fired);
                }
                _ = token.cancelled() => {}
            }
        });

        debug!("armed {}s countdown for {site_id} in tab {tab_id}", remaining.as_secs());

        let replaced = self.timers.insert(
            tab_id,
            ArmedTimer {
                id,
                site_id: site_id.to_string(),
                url: url.to_string(),
                deadline,
                cancel_token,
            },
        );
        debug_assert!(replaced.is_none(), "tab {tab_id} was re-armed while timing");
        Ok(())
    }

    /// Cancels the tab's countdown, if any, and hands it back so the caller
    /// can close the session it was timing.
    pub fn cancel(&mut self, tab_id: TabId) -> Option<ArmedTimer> {
        let timer = self.timers.remove(&tab_id)?;
        timer.cancel_token.cancel();
        Some(timer)
    }

    /// Claims the timer a fire message refers to. Returns `None` for stale
    /// messages from countdowns that were cancelled or replaced.
    pub fn on_fire(&mut self, fired: &TimerFired) -> Option<ArmedTimer> {
        match self.timers.get(&fired.tab_id) {
            Some(timer) if timer.id == fired.timer_id => self.timers.remove(&fired.tab_id),
            _ => {
                debug!("ignoring stale fire for tab {}", fired.tab_id);
                None
            }
        }
    }

    #[cfg(test)]
    pub fn status(&self, tab_id: TabId) -> super::TimerStatus {
        if self.timers.contains_key(&tab_id) {
            super::TimerStatus::Armed
        } else {
            super::TimerStatus::Idle
        }
    }

    #[cfg(test)]
    pub fn get(&self, tab_id: TabId) -> Option<&ArmedTimer> {
        self.timers.get(&tab_id)
    }

    /// Tabs currently timing `site_id`.
    pub fn tabs_timing(&self, site_id: &str) -> Vec<TabId> {
        self.timers
            .iter()
            .filter(|(_, timer)| timer.site_id == site_id)
            .map(|(tab_id, _)| *tab_id)
            .collect()
    }

    pub fn armed_tabs(&self) -> Vec<TabId> {
        self.timers.keys().copied().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.cancel_token.cancel();
        }
    }
}
