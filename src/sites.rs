//! Storage-side operations behind the settings and unlock screens.

use anyhow::{anyhow, bail, Context, Result};
use url::Url;

use crate::{
    ledger::UsageLedger,
    models::{generate_pattern, SiteRecord},
    storage::Storage,
};

/// A daily limit longer than a day can never run out.
pub const MAX_DAILY_LIMIT_SECONDS: u64 = 24 * 60 * 60;

/// Converts a limit given in minutes, rejecting anything over a day.
pub fn limit_from_minutes(minutes: u64) -> Result<u64> {
    let seconds = minutes
        .checked_mul(60)
        .ok_or_else(|| anyhow!("limit of {minutes} minutes is out of range"))?;
    check_daily_limit(seconds)?;
    Ok(seconds)
}

fn check_daily_limit(seconds: u64) -> Result<()> {
    if seconds > MAX_DAILY_LIMIT_SECONDS {
        bail!("daily limit of {seconds}s exceeds one day ({MAX_DAILY_LIMIT_SECONDS}s)");
    }
    Ok(())
}

/// `<scheme>://<host>` of `url`, the key a site is stored under.
pub fn canonical_site_id(url: &str) -> Result<String> {
    let parsed = Url::parse(url.trim()).with_context(|| format!("invalid URL {url:?}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("URL {url:?} has no host"))?;
    Ok(format!("{}://{}", parsed.scheme(), host))
}

impl<S: Storage> UsageLedger<S> {
    /// Registers a site, or updates the message and limit of an existing one
    /// while keeping its counters. Returns the site id.
    pub async fn add_site(&self, url: &str, message: &str, daily_limit_seconds: u64) -> Result<String> {
        check_daily_limit(daily_limit_seconds)?;
        let site_id = canonical_site_id(url)?;
        let mut sites = self.load_sites().await?;

        match sites.get_mut(&site_id) {
            Some(existing) => {
                existing.message = message.to_string();
                existing.daily_limit_seconds = daily_limit_seconds;
                if existing.pattern.is_none() {
                    existing.pattern = Some(generate_pattern(&site_id));
                }
            }
            None => sites.insert(
                site_id.clone(),
                SiteRecord::new(&site_id, message, daily_limit_seconds),
            ),
        }

        self.save_sites(&sites).await?;
        Ok(site_id)
    }

    pub async fn remove_site(&self, site_id: &str) -> Result<bool> {
        let mut sites = self.load_sites().await?;
        if sites.remove(site_id).is_none() {
            return Ok(false);
        }
        self.save_sites(&sites).await?;
        Ok(true)
    }

    pub async fn list_sites(&self) -> Result<Vec<(String, SiteRecord)>> {
        let sites = self.load_sites().await?;
        Ok(sites
            .iter()
            .map(|(id, record)| (id.to_string(), record.clone()))
            .collect())
    }

    /// Lifts a block on request, recording why. The site gets today's budget
    /// back; otherwise the next visit would exhaust it again.
    pub async fn unlock_site(&self, site_id: &str, reason: &str) -> Result<SiteRecord> {
        if reason.trim().is_empty() {
            bail!("an unlock needs a reason");
        }
        self.update_site(site_id, |record| {
            record.unlocks += 1;
            record.unlock_msgs.push(reason.trim().to_string());
            record.blocked = false;
            record.accumulated_seconds = 0;
        })
        .await?
        .ok_or_else(|| anyhow!("no site registered as {site_id}"))
    }
}
