//! SQLite ordinal metadata index.
//!
//! One database file holds two tables:
//! - `metadata`: event id to derived title
//! - `ordinals`: `(parent_id, ordinal)` to child id, with a reverse index on
//!   the child
//!
//! The indexing worker writes from its own thread while the service reads, so
//! every connection runs in WAL mode with a busy timeout long enough to outlast
//! one batch transaction.

pub mod migrations;
pub mod ordinal;
pub mod schema;
pub mod store;

pub use ordinal::{OrdinalError, format_ordinal, parse_ordinal};
pub use store::{
    IndexStats, MetadataRecord, OrdinalRecord, ParentInfo, get_child_ordinals, get_metadata,
    get_metadata_batch, get_ordered_children, get_parent_info, index_stats, mark_batch_committed,
    put_metadata_batch, put_ordinals_batch,
};

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// How long a reader waits on the worker's write lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the index at `path`, creating the file and its parent directories if
/// needed, and upgrade the schema.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created, WAL cannot be
/// enabled, or the schema is newer than this build.
pub fn open_index(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create index directory {}", dir.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("open index database {}", path.display()))?;
    enable_wal(&conn).with_context(|| format!("configure index database {}", path.display()))?;
    let version = migrations::migrate(&mut conn)?;
    tracing::debug!(path = %path.display(), schema = version, "opened index");
    Ok(conn)
}

/// Like [`open_index`], but a missing file is `Ok(None)` instead of being
/// created. Read-only commands use this so they never leave an empty index
/// behind.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be opened or migrated.
pub fn try_open_index(path: &Path) -> Result<Option<Connection>> {
    if path.exists() {
        open_index(path).map(Some)
    } else {
        Ok(None)
    }
}

fn enable_wal(conn: &Connection) -> rusqlite::Result<()> {
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        // Some network filesystems refuse WAL.
        tracing::warn!(journal_mode = %mode, "index is not in WAL mode");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
}
