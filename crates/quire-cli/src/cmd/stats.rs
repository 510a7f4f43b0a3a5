//! `quire stats`: row counts and last batch bookkeeping.

use anyhow::Result;
use quire_core::config::QuireConfig;
use quire_core::db;
use serde::Serialize;

use crate::output::{OutputMode, kv, render};

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub index_path: String,
    pub metadata_rows: u64,
    pub ordinal_rows: u64,
    pub last_batch_at_ms: i64,
    pub last_batch_events: u64,
}

pub fn run_stats(output: OutputMode, config: &QuireConfig) -> Result<()> {
    let conn = super::open_existing_index(&config.index.path)?;
    let stats = db::index_stats(&conn)?;
    let report = StatsReport {
        index_path: config.index.path.display().to_string(),
        metadata_rows: stats.metadata_rows,
        ordinal_rows: stats.ordinal_rows,
        last_batch_at_ms: stats.last_batch_at_ms,
        last_batch_events: stats.last_batch_events,
    };

    render(output, &report, |r, w| {
        kv(w, "index", &r.index_path)?;
        kv(w, "metadata", r.metadata_rows.to_string())?;
        kv(w, "ordinals", r.ordinal_rows.to_string())?;
        kv(w, "last batch", r.last_batch_events.to_string())
    })
}
