use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Browser tab identifier as delivered by the event source.
pub type TabId = i64;

/// Countdown armed for one tab.
#[derive(Debug)]
pub struct ArmedTimer {
    pub id: Uuid,
    pub site_id: String,
    /// URL the tab was showing when the countdown started.
    pub url: String,
    pub deadline: Instant,
    pub(super) cancel_token: CancellationToken,
}

impl ArmedTimer {
    #[cfg(test)]
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Sent by a countdown task whose deadline passed without cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub timer_id: Uuid,
    pub tab_id: TabId,
    pub site_id: String,
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimerStatus {
    #[default]
    Idle,
    Armed,
}
