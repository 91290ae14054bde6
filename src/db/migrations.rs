use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; entry `n` upgrades `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

fn schema_version(conn: &Connection) -> Result<usize> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")?;
    Ok(usize::try_from(version).unwrap_or(0))
}

pub fn migrate(conn: &mut Connection) -> Result<()> {
    let version = schema_version(conn)?;
    if version > MIGRATIONS.len() {
        bail!(
            "transcript store schema v{version} is newer than this build (v{})",
            MIGRATIONS.len()
        );
    }

    let tx = conn.transaction()?;
    for (index, script) in MIGRATIONS.iter().enumerate().skip(version) {
        tx.execute_batch(script)
            .with_context(|| format!("schema migration to v{} failed", index + 1))?;
    }
    tx.pragma_update(None, "user_version", MIGRATIONS.len() as i64)?;
    tx.commit().context("failed to commit schema migrations")
}
