//! Per-visit block decision.
//!
//! [`decide`] is evaluated fresh for every pre-navigation, navigation
//! completion and tab activation that matched a site; it never caches a
//! previous outcome because the budget or the date may have moved between
//! events. [`record_decision`] then writes the counters the decision
//! implies.

use anyhow::Result;
use chrono::NaiveDate;

use crate::{clock::local_date, ledger::UsageLedger, models::SiteRecord, storage::Storage};

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteState {
    UnblockedWithinBudget,
    UnblockedBudgetExhausted,
    BlockedSameDay,
    BlockedNewDay,
}

/// Daily rollover applied before the budget is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollover {
    None,
    /// Blocked on an earlier day: unblock and reset the budget.
    Amnesty,
    /// Unblocked, but the recorded usage belongs to an earlier day.
    BudgetRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Budget left; time the visit for this many seconds.
    Allow { remaining_secs: u64 },
    /// Budget used up by this visit; block now and redirect.
    Exhaust,
    /// Already blocked today; redirect.
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// State the site was found in.
    pub state: SiteState,
    pub rollover: Rollover,
    pub verdict: Verdict,
    /// The record carries no date for its block; today's must be recorded.
    pub stamp_anchor: bool,
}

pub fn decide(record: &SiteRecord, today: NaiveDate) -> Decision {
    let anchor_day = record.day_anchor().and_then(local_date);
    let from_earlier_day = matches!(anchor_day, Some(day) if day != today);

    if record.blocked {
        if !from_earlier_day {
            return Decision {
                state: SiteState::BlockedSameDay,
                rollover: Rollover::None,
                verdict: Verdict::Redirect,
                stamp_anchor: anchor_day.is_none(),
            };
        }

        return Decision {
            state: SiteState::BlockedNewDay,
            rollover: Rollover::Amnesty,
            verdict: budget_verdict(record.daily_limit_seconds as i64),
            stamp_anchor: false,
        };
    }

    let (rollover, remaining) = if from_earlier_day {
        (Rollover::BudgetRefresh, record.daily_limit_seconds as i64)
    } else {
        (Rollover::None, record.remaining_seconds())
    };

    let verdict = budget_verdict(remaining);
    let state = match verdict {
        Verdict::Allow { .. } => SiteState::UnblockedWithinBudget,
        _ => SiteState::UnblockedBudgetExhausted,
    };

    Decision {
        state,
        rollover,
        verdict,
        stamp_anchor: false,
    }
}

fn budget_verdict(remaining: i64) -> Verdict {
    if remaining <= 0 {
        Verdict::Exhaust
    } else {
        Verdict::Allow {
            remaining_secs: remaining as u64,
        }
    }
}

/// Persists the counter changes a decision implies.
///
/// `totalVisits` is bumped exactly once per call. A visit that exhausts the
/// budget is the triggering visit and does not count as a blocked visit.
pub async fn record_decision<S: Storage>(
    ledger: &UsageLedger<S>,
    site_id: &str,
    decision: &Decision,
    now_ms: i64,
) -> Result<()> {
    ledger.increment_total_visits(site_id).await?;

    match decision.rollover {
        Rollover::Amnesty => {
            log_info!("new day for {site_id}, lifting block");
            ledger.grant_amnesty(site_id, now_ms).await?;
        }
        Rollover::BudgetRefresh => ledger.refresh_budget(site_id, now_ms).await?,
        Rollover::None => {}
    }

    match decision.verdict {
        Verdict::Redirect => {
            ledger.increment_total_visits_when_blocked(site_id).await?;
            if decision.stamp_anchor {
                ledger.stamp_day_anchor(site_id, now_ms).await?;
            }
        }
        Verdict::Exhaust => {
            log_info!("daily budget for {site_id} exhausted");
            ledger.set_blocked(site_id, true).await?;
            ledger.stamp_day_anchor(site_id, now_ms).await?;
        }
        Verdict::Allow { .. } => {}
    }

    Ok(())
}

/// Closes the session whose countdown ran out and blocks the site.
///
/// Returns the updated record, or `None` if the site was deleted meanwhile.
pub async fn block_on_expiry<S: Storage>(
    ledger: &UsageLedger<S>,
    site_id: &str,
    now_ms: i64,
) -> Result<Option<SiteRecord>> {
    ledger.accumulate_elapsed(site_id, now_ms).await?;
    let record = ledger
        .update_site(site_id, |record| record.blocked = true)
        .await?;
    if record.is_some() {
        log_info!("time is up for {site_id}, blocking");
    }
    Ok(record)
}
