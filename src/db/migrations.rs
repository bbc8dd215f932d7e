use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::Connection;

/// Schema scripts in order; `user_version` counts how many have run.
const MIGRATIONS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let applied: usize = conn
        .pragma_query_value(None, "user_version", |row| row.get::<_, i64>(0))
        .context("failed to read sitebudget schema version")?
        .try_into()
        .context("sitebudget schema version is negative")?;

    if applied > MIGRATIONS.len() {
        bail!(
            "sitebudget database is at schema v{applied}, this build only knows v{}",
            MIGRATIONS.len()
        );
    }

    let pending = &MIGRATIONS[applied..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open schema upgrade transaction")?;
    for (offset, script) in pending.iter().enumerate() {
        let version = applied + offset + 1;
        tx.execute_batch(script)
            .with_context(|| format!("failed to apply schema v{version}"))?;
    }
    tx.pragma_update(None, "user_version", MIGRATIONS.len() as i64)
        .context("failed to record sitebudget schema version")?;
    tx.commit().context("failed to commit schema upgrade")?;

    info!("Upgraded site store from schema v{applied} to v{}", MIGRATIONS.len());
    Ok(())
}
