//! Batch writers and query helpers for the ordinal metadata index.
//!
//! Writers take `&mut Connection` and run each batch inside one transaction:
//! either the whole batch lands or none of it does. Readers take a shared
//! `&Connection` and return typed rows (never raw rows).

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use super::ordinal::{self, ORDINAL_RANGE_END, ORDINAL_RANGE_START, OrdinalError};

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// Derived title for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: String,
    pub title: String,
}

/// One `(parent_id, ordinal) → id` edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdinalRecord {
    pub parent_id: String,
    /// Encoded 7-digit position.
    pub ordinal: String,
    /// Child event id.
    pub id: String,
}

impl OrdinalRecord {
    /// Build a record for the child at `position` under `parent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`OrdinalError::OutOfRange`] if `position` exceeds the 7-digit
    /// ordinal space.
    pub fn new(
        parent_id: impl Into<String>,
        position: u64,
        id: impl Into<String>,
    ) -> Result<Self, OrdinalError> {
        Ok(Self {
            parent_id: parent_id.into(),
            ordinal: ordinal::format_ordinal(position)?,
            id: id.into(),
        })
    }
}

/// One place a child appears: which parent, at which position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentInfo {
    pub parent_id: String,
    pub ordinal: String,
}

/// Row counts and last-batch bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub metadata_rows: u64,
    pub ordinal_rows: u64,
    pub last_batch_at_ms: i64,
    pub last_batch_events: u64,
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Upsert every metadata record in one transaction.
///
/// # Errors
///
/// Returns an error if any write fails; the whole batch is rolled back.
pub fn put_metadata_batch(conn: &mut Connection, records: &[MetadataRecord]) -> Result<usize> {
    let tx = conn
        .transaction()
        .context("begin metadata transaction")?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO metadata (event_id, title) VALUES (?1, ?2)
             ON CONFLICT(event_id) DO UPDATE SET title = excluded.title",
        )?;
        for record in records {
            stmt.execute(params![record.id, record.title])
                .with_context(|| format!("write metadata for {}", record.id))?;
        }
    }
    tx.commit().context("commit metadata transaction")?;
    Ok(records.len())
}

/// Upsert every ordinal record in one transaction.
///
/// Rewriting the same `(parent_id, ordinal)` replaces the child id, so
/// re-indexing a batch never produces duplicate rows.
///
/// # Errors
///
/// Returns an error if a record carries a malformed ordinal or any write
/// fails; the whole batch is rolled back.
pub fn put_ordinals_batch(conn: &mut Connection, records: &[OrdinalRecord]) -> Result<usize> {
    let tx = conn
        .transaction()
        .context("begin ordinals transaction")?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO ordinals (parent_id, ordinal, child_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(parent_id, ordinal) DO UPDATE SET child_id = excluded.child_id",
        )?;
        for record in records {
            ordinal::parse_ordinal(&record.ordinal)
                .with_context(|| format!("ordinal under parent {}", record.parent_id))?;
            stmt.execute(params![record.parent_id, record.ordinal, record.id])
                .with_context(|| {
                    format!(
                        "write ordinal {} under parent {}",
                        record.ordinal, record.parent_id
                    )
                })?;
        }
    }
    tx.commit().context("commit ordinals transaction")?;
    Ok(records.len())
}

/// Record that a batch of `events` committed at `at_ms`.
///
/// # Errors
///
/// Returns an error if the bookkeeping row cannot be updated.
pub fn mark_batch_committed(conn: &Connection, events: usize, at_ms: i64) -> Result<()> {
    conn.execute(
        "UPDATE index_meta SET last_batch_at_ms = ?1, last_batch_events = ?2 WHERE id = 1",
        params![at_ms, i64::try_from(events).unwrap_or(i64::MAX)],
    )
    .context("update index_meta")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Fetch the metadata record for one event.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_metadata(conn: &Connection, id: &str) -> Result<Option<MetadataRecord>> {
    conn.query_row(
        "SELECT event_id, title FROM metadata WHERE event_id = ?1",
        params![id],
        |row| {
            Ok(MetadataRecord {
                id: row.get(0)?,
                title: row.get(1)?,
            })
        },
    )
    .optional()
    .with_context(|| format!("get metadata for {id}"))
}

/// Fetch metadata for several events, in input order. Unknown ids are
/// skipped.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn get_metadata_batch(conn: &Connection, ids: &[String]) -> Result<Vec<MetadataRecord>> {
    let mut stmt = conn.prepare_cached("SELECT title FROM metadata WHERE event_id = ?1")?;
    let mut records = Vec::with_capacity(ids.len());
    for id in ids {
        let title: Option<String> = stmt
            .query_row(params![id], |row| row.get(0))
            .optional()
            .with_context(|| format!("get metadata for {id}"))?;
        if let Some(title) = title {
            records.push(MetadataRecord {
                id: id.clone(),
                title,
            });
        }
    }
    Ok(records)
}

/// Child ids of `parent_id` in ordinal order.
///
/// Scans the bounded key range `[parent_id, "0000000"] ..= [parent_id,
/// "9999999"]`, so the cost is proportional to the number of children.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_ordered_children(conn: &Connection, parent_id: &str) -> Result<Vec<String>> {
    Ok(get_child_ordinals(conn, parent_id)?
        .into_iter()
        .map(|record| record.id)
        .collect())
}

/// Like [`get_ordered_children`], but keeps the stored ordinal of each row.
/// Ordinals need not be contiguous.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_child_ordinals(conn: &Connection, parent_id: &str) -> Result<Vec<OrdinalRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT ordinal, child_id FROM ordinals
         WHERE parent_id = ?1 AND ordinal BETWEEN ?2 AND ?3
         ORDER BY ordinal ASC",
    )?;
    let rows = stmt
        .query_map(
            params![parent_id, ORDINAL_RANGE_START, ORDINAL_RANGE_END],
            |row| {
                Ok(OrdinalRecord {
                    parent_id: parent_id.to_string(),
                    ordinal: row.get(0)?,
                    id: row.get(1)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("get ordered children of {parent_id}"))?;
    Ok(rows)
}

/// Every `(parent_id, ordinal)` pair that references `child_id`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_parent_info(conn: &Connection, child_id: &str) -> Result<Vec<ParentInfo>> {
    let mut stmt = conn.prepare_cached(
        "SELECT parent_id, ordinal FROM ordinals
         WHERE child_id = ?1
         ORDER BY parent_id ASC, ordinal ASC",
    )?;
    let rows = stmt
        .query_map(params![child_id], |row| {
            Ok(ParentInfo {
                parent_id: row.get(0)?,
                ordinal: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("get parent info for {child_id}"))?;
    Ok(rows)
}

/// Row counts and last-batch bookkeeping.
///
/// # Errors
///
/// Returns an error if a query fails.
pub fn index_stats(conn: &Connection) -> Result<IndexStats> {
    let metadata_rows: i64 = conn.query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))?;
    let ordinal_rows: i64 = conn.query_row("SELECT COUNT(*) FROM ordinals", [], |row| row.get(0))?;
    let (last_batch_at_ms, last_batch_events): (i64, i64) = conn
        .query_row(
            "SELECT last_batch_at_ms, last_batch_events FROM index_meta WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .context("read index_meta")?;

    Ok(IndexStats {
        metadata_rows: u64::try_from(metadata_rows).unwrap_or(0),
        ordinal_rows: u64::try_from(ordinal_rows).unwrap_or(0),
        last_batch_at_ms,
        last_batch_events: u64::try_from(last_batch_events).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;

    fn test_db() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory db");
        migrations::migrate(&mut conn).expect("migrate schema");
        conn
    }

    fn edge(parent: &str, position: u64, child: &str) -> OrdinalRecord {
        OrdinalRecord::new(parent, position, child).expect("ordinal in range")
    }

    fn meta(id: &str, title: &str) -> MetadataRecord {
        MetadataRecord {
            id: id.into(),
            title: title.into(),
        }
    }

    #[test]
    fn ordered_children_follow_ordinals_not_insert_order() {
        let mut conn = test_db();
        put_ordinals_batch(
            &mut conn,
            &[
                edge("root", 2, "c"),
                edge("root", 0, "a"),
                edge("other", 0, "x"),
                edge("root", 1, "b"),
            ],
        )
        .expect("write ordinals");

        assert_eq!(
            get_ordered_children(&conn, "root").expect("children"),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            get_ordered_children(&conn, "other").expect("children"),
            vec!["x"]
        );
        assert!(get_ordered_children(&conn, "missing").expect("children").is_empty());
    }

    #[test]
    fn ordinal_order_holds_past_single_digits() {
        let mut conn = test_db();
        let records: Vec<_> = (0..25).rev().map(|i| edge("root", i, &format!("c{i}"))).collect();
        put_ordinals_batch(&mut conn, &records).expect("write ordinals");

        let expected: Vec<String> = (0..25).map(|i| format!("c{i}")).collect();
        assert_eq!(get_ordered_children(&conn, "root").expect("children"), expected);
    }

    #[test]
    fn child_ordinals_keep_gaps_in_stored_positions() {
        let mut conn = test_db();
        put_ordinals_batch(&mut conn, &[edge("root", 7, "late"), edge("root", 3, "early")])
            .expect("write ordinals");

        assert_eq!(
            get_child_ordinals(&conn, "root").expect("children"),
            vec![edge("root", 3, "early"), edge("root", 7, "late")]
        );
    }

    #[test]
    fn parent_info_lists_every_parent() {
        let mut conn = test_db();
        put_ordinals_batch(
            &mut conn,
            &[
                edge("book-a", 3, "shared"),
                edge("book-b", 0, "shared"),
                edge("book-a", 0, "intro"),
            ],
        )
        .expect("write ordinals");

        let info = get_parent_info(&conn, "shared").expect("parent info");
        assert_eq!(
            info,
            vec![
                ParentInfo {
                    parent_id: "book-a".into(),
                    ordinal: "0000003".into()
                },
                ParentInfo {
                    parent_id: "book-b".into(),
                    ordinal: "0000000".into()
                },
            ]
        );
        assert!(get_parent_info(&conn, "nobody").expect("parent info").is_empty());
    }

    #[test]
    fn rewriting_a_batch_is_idempotent() {
        let mut conn = test_db();
        let ordinals = [edge("root", 0, "a"), edge("root", 1, "b")];
        let metadata = [meta("root", "Root"), meta("a", "A")];

        for _ in 0..2 {
            put_metadata_batch(&mut conn, &metadata).expect("metadata");
            put_ordinals_batch(&mut conn, &ordinals).expect("ordinals");
        }

        let stats = index_stats(&conn).expect("stats");
        assert_eq!(stats.metadata_rows, 2);
        assert_eq!(stats.ordinal_rows, 2);
    }

    #[test]
    fn metadata_upsert_overwrites_title() {
        let mut conn = test_db();
        put_metadata_batch(&mut conn, &[meta("e1", "Draft")]).expect("first write");
        put_metadata_batch(&mut conn, &[meta("e1", "Final")]).expect("second write");

        assert_eq!(
            get_metadata(&conn, "e1").expect("get"),
            Some(meta("e1", "Final"))
        );
        assert_eq!(get_metadata(&conn, "e2").expect("get"), None);
    }

    #[test]
    fn metadata_batch_lookup_keeps_input_order() {
        let mut conn = test_db();
        put_metadata_batch(&mut conn, &[meta("a", "A"), meta("b", "B")]).expect("write");

        let ids = vec!["b".to_string(), "missing".to_string(), "a".to_string()];
        assert_eq!(
            get_metadata_batch(&conn, &ids).expect("batch"),
            vec![meta("b", "B"), meta("a", "A")]
        );
    }

    #[test]
    fn failed_ordinal_batch_rolls_back_entirely() {
        let mut conn = test_db();
        let bad = OrdinalRecord {
            parent_id: "root".into(),
            ordinal: "0000002".into(),
            id: "   ".into(),
        };

        let result = put_ordinals_batch(&mut conn, &[edge("root", 0, "a"), edge("root", 1, "b"), bad]);
        assert!(result.is_err());
        assert!(get_ordered_children(&conn, "root").expect("children").is_empty());
    }

    #[test]
    fn malformed_ordinal_is_rejected_before_write() {
        let mut conn = test_db();
        let bad = OrdinalRecord {
            parent_id: "root".into(),
            ordinal: "12".into(),
            id: "a".into(),
        };

        let err = put_ordinals_batch(&mut conn, &[edge("root", 0, "ok"), bad]).expect_err("reject");
        assert!(format!("{err:#}").contains("malformed ordinal"));
        assert!(get_ordered_children(&conn, "root").expect("children").is_empty());
    }

    #[test]
    fn out_of_range_position_cannot_build_a_record() {
        assert_eq!(
            OrdinalRecord::new("root", 10_000_000, "x"),
            Err(OrdinalError::OutOfRange(10_000_000))
        );
    }

    #[test]
    fn mark_batch_committed_updates_stats() {
        let conn = test_db();
        mark_batch_committed(&conn, 12, 1_700_000_000_000).expect("mark");

        let stats = index_stats(&conn).expect("stats");
        assert_eq!(stats.last_batch_events, 12);
        assert_eq!(stats.last_batch_at_ms, 1_700_000_000_000);
    }
}
