use std::time::Duration;

use anyhow::Result;
use log::{error, info};
use tokio::sync::mpsc;

use crate::{
    block::{self, Verdict},
    clock::{Clock, SystemClock},
    ledger::UsageLedger,
    matcher::PatternMatcher,
    models::BlockedNotice,
    storage::Storage,
    timer::{TabId, TimerFired, TimerManager},
};

use super::{
    context::{SessionContext, WatchedSite},
    events::{is_monitorable_url, BrowserEvent, EventKind},
    Browser,
};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Routes browser lifecycle events through matching, the block decision and
/// the per-tab timers.
///
/// Owns all mutable engine state. Events and timer fires are handled one at
/// a time, each to completion.
pub struct SessionController<S, B, C = SystemClock> {
    ledger: UsageLedger<S>,
    browser: B,
    clock: C,
    matcher: PatternMatcher,
    timers: TimerManager,
    fired_rx: mpsc::UnboundedReceiver<TimerFired>,
    context: SessionContext,
}

impl<S, B, C> SessionController<S, B, C>
where
    S: Storage,
    B: Browser,
    C: Clock,
{
    pub fn new(storage: S, browser: B, clock: C) -> Self {
        let (timers, fired_rx) = TimerManager::new();
        Self {
            ledger: UsageLedger::new(storage),
            browser,
            clock,
            matcher: PatternMatcher::new(),
            timers,
            fired_rx,
            context: SessionContext::new(),
        }
    }

    pub fn ledger(&self) -> &UsageLedger<S> {
        &self.ledger
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn timers(&self) -> &TimerManager {
        &self.timers
    }

    /// Processes events until the sender side closes, then closes any
    /// sessions still being timed.
    pub async fn run(mut self, mut events: mpsc::Receiver<BrowserEvent>) -> Result<()> {
        info!("Session controller running");

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let tab_id = event.tab_id();
                    if let Err(err) = self.handle_event(event).await {
                        error!("Dropping event for tab {tab_id}: {err:#}");
                    }
                }
                Some(fired) = self.fired_rx.recv() => {
                    let tab_id = fired.tab_id;
                    if let Err(err) = self.handle_timer_fired(fired).await {
                        error!("Failed to enforce expired budget in tab {tab_id}: {err:#}");
                    }
                }
            }
        }

        self.shutdown().await
    }

    #[cfg(test)]
    pub async fn next_timer_fired(&mut self) -> Option<TimerFired> {
        self.fired_rx.recv().await
    }

    pub async fn handle_event(&mut self, event: BrowserEvent) -> Result<()> {
        match event {
            BrowserEvent::BeforeNavigate {
                tab_id,
                url,
                frame_id,
            } => {
                if frame_id != 0 {
                    return Ok(());
                }
                self.evaluate(EventKind::BeforeNavigate, tab_id, &url).await
            }
            BrowserEvent::NavigationCompleted {
                tab_id,
                url,
                frame_id,
            } => {
                if frame_id != 0 {
                    return Ok(());
                }
                self.evaluate(EventKind::NavigationCompleted, tab_id, &url)
                    .await
            }
            BrowserEvent::TabActivated { tab_id, url } => {
                // Time only accrues in the focused tab.
                for other in self.timers.armed_tabs() {
                    if other != tab_id {
                        self.stop_watching(other).await?;
                    }
                }
                if let Some(previous) = self.context.watched_tab() {
                    if previous != tab_id {
                        self.context.clear();
                    }
                }

                let url = match url {
                    Some(url) => Some(url),
                    None => self.browser.tab_url(tab_id).await?,
                };
                match url {
                    Some(url) => self.evaluate(EventKind::TabActivated, tab_id, &url).await,
                    None => self.stop_watching(tab_id).await,
                }
            }
            BrowserEvent::TabRemoved { tab_id } => self.stop_watching(tab_id).await,
        }
    }

    pub async fn handle_timer_fired(&mut self, fired: TimerFired) -> Result<()> {
        let Some(timer) = self.timers.on_fire(&fired) else {
            return Ok(());
        };
        if self.context.is_watching(fired.tab_id) {
            self.context.clear();
        }

        let now_ms = self.clock.now_ms();
        let Some(record) = block::block_on_expiry(&self.ledger, &timer.site_id, now_ms).await?
        else {
            log_debug!("site {} was removed before its countdown ran out", timer.site_id);
            return Ok(());
        };

        self.enforce_block(&timer.site_id, fired.tab_id, &timer.url, &record.message)
            .await
    }

    /// Closes every session still being timed.
    pub async fn shutdown(&mut self) -> Result<()> {
        for tab_id in self.timers.armed_tabs() {
            self.stop_watching(tab_id).await?;
        }
        info!("Session controller stopped");
        Ok(())
    }

    async fn evaluate(&mut self, kind: EventKind, tab_id: TabId, url: &str) -> Result<()> {
        // Whatever the tab showed before is being replaced or re-checked.
        self.stop_watching(tab_id).await?;

        if !is_monitorable_url(url) {
            return Ok(());
        }

        let mut sites = self.ledger.load_sites().await?;
        let Some(hit) = self.matcher.find_matching_site(&sites, url) else {
            return Ok(());
        };
        let site_id = hit.site_id;

        if let Some(pattern) = hit.generated_pattern.as_deref() {
            self.ledger.persist_pattern(&site_id, pattern).await?;
        }

        if kind.arms_timer() {
            // One countdown per site: the session start is stored per site.
            let others = self.timers.tabs_timing(&site_id);
            if !others.is_empty() {
                for other in others {
                    self.stop_watching(other).await?;
                }
                sites = self.ledger.load_sites().await?;
            }
        }

        let Some(record) = sites.get(&site_id) else {
            return Ok(());
        };

        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let decision = block::decide(record, now.date_naive());
        log_debug!("{kind:?} tab {tab_id} {site_id}: {decision:?}");

        block::record_decision(&self.ledger, &site_id, &decision, now_ms).await?;

        match decision.verdict {
            Verdict::Allow { remaining_secs } => {
                if kind.arms_timer() {
                    self.timers
                        .start(
                            &self.ledger,
                            &site_id,
                            tab_id,
                            url,
                            Duration::from_secs(remaining_secs),
                            now_ms,
                        )
                        .await?;
                    self.context.watch(WatchedSite {
                        tab_id,
                        site_id: site_id.clone(),
                    });
                }
                Ok(())
            }
            Verdict::Exhaust | Verdict::Redirect => {
                self.enforce_block(&site_id, tab_id, url, &record.message)
                    .await
            }
        }
    }

    async fn stop_watching(&mut self, tab_id: TabId) -> Result<()> {
        if self.context.is_watching(tab_id) {
            self.context.clear();
        }

        if let Some(timer) = self.timers.cancel(tab_id) {
            let now_ms = self.clock.now_ms();
            let added = self.ledger.accumulate_elapsed(&timer.site_id, now_ms).await?;
            log_debug!("tab {tab_id} stopped timing {} (+{added}s)", timer.site_id);
        }
        Ok(())
    }

    async fn enforce_block(
        &mut self,
        site_id: &str,
        tab_id: TabId,
        url: &str,
        message: &str,
    ) -> Result<()> {
        for other in self.timers.tabs_timing(site_id) {
            self.stop_watching(other).await?;
        }

        self.ledger
            .write_blocked_notice(&BlockedNotice {
                url: url.to_string(),
                message: message.to_string(),
            })
            .await?;
        self.browser.redirect_to_blocked(tab_id).await?;

        info!("Redirected tab {tab_id} away from {site_id}");
        Ok(())
    }
}
