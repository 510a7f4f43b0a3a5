//! Forward-only schema upgrades for the index database.
//!
//! The applied version lives in `PRAGMA user_version` and is mirrored into
//! `index_meta.schema_version` for `quire stats`. An index written by a newer
//! binary is refused rather than silently downgraded.

use super::schema;
use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use tracing::debug;

struct Migration {
    version: u32,
    summary: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        summary: "metadata, ordinals and index_meta tables",
        sql: schema::MIGRATION_V1_SQL,
    },
    Migration {
        version: 2,
        summary: "reverse child lookup index",
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// Newest schema this build writes.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

/// Version recorded in `PRAGMA user_version` (0 for a fresh file).
///
/// # Errors
///
/// Returns an error if the pragma cannot be read or is negative.
pub fn current_schema_version(conn: &Connection) -> Result<u32> {
    let raw: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("read user_version")?;
    u32::try_from(raw).with_context(|| format!("user_version {raw} is not a valid schema version"))
}

/// Bring the schema up to [`LATEST_SCHEMA_VERSION`], one transaction per
/// step. Returns the version the database ends at.
///
/// # Errors
///
/// Returns an error if the database is newer than this build or a step
/// fails; a failed step leaves the previous version intact.
pub fn migrate(conn: &mut Connection) -> Result<u32> {
    let mut version = current_schema_version(conn)?;
    if version > LATEST_SCHEMA_VERSION {
        bail!(
            "index schema v{version} is newer than supported v{LATEST_SCHEMA_VERSION}; \
             rebuild the index with this version of quire"
        );
    }

    let start = version;
    for step in MIGRATIONS.iter().filter(|m| m.version > start) {
        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)
            .with_context(|| format!("schema v{}: {}", step.version, step.summary))?;
        tx.pragma_update(None, "user_version", i64::from(step.version))?;
        tx.execute(
            "UPDATE index_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(step.version)],
        )?;
        tx.commit()?;

        debug!(from = version, to = step.version, summary = step.summary, "migrated index schema");
        version = step.version;
    }

    Ok(version)
}
