//! Canonical SQLite schema for the ordinal metadata index.
//!
//! - `metadata` holds one derived title per event id
//! - `ordinals` maps `(parent_id, ordinal)` to a child id; `ordinal` is the
//!   7-digit zero-padded position so lexicographic order is display order
//! - `index_meta` records schema version and the last committed batch

/// Migration v1: metadata and ordinal tables plus index bookkeeping.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    event_id TEXT PRIMARY KEY,
    title TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS ordinals (
    parent_id TEXT NOT NULL,
    ordinal TEXT NOT NULL CHECK (length(ordinal) = 7 AND ordinal NOT GLOB '*[^0-9]*'),
    child_id TEXT NOT NULL CHECK (length(trim(child_id)) > 0),
    PRIMARY KEY (parent_id, ordinal)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS index_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    last_batch_at_ms INTEGER NOT NULL DEFAULT 0,
    last_batch_events INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO index_meta (
    id,
    schema_version,
    last_batch_at_ms,
    last_batch_events
) VALUES (1, 1, 0, 0);
";

/// Migration v2: reverse lookup index for `get_parent_info`.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_ordinals_child
    ON ordinals(child_id, parent_id, ordinal);
";

/// Indexes expected by the query paths.
pub const REQUIRED_INDEXES: &[&str] = &["idx_ordinals_child"];
