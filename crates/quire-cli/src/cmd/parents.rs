//! `quire parents`: every place a child appears in the index.

use anyhow::Result;
use clap::Args;
use quire_core::config::QuireConfig;
use quire_core::db;
use serde::Serialize;
use std::io::Write;

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct ParentsArgs {
    /// Child event id.
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct ParentRow {
    pub parent_id: String,
    pub ordinal: String,
    pub title: String,
}

pub fn run_parents(args: &ParentsArgs, output: OutputMode, config: &QuireConfig) -> Result<()> {
    let conn = super::open_existing_index(&config.index.path)?;

    let rows = db::get_parent_info(&conn, &args.id)?
        .into_iter()
        .map(|info| {
            let title = db::get_metadata(&conn, &info.parent_id)?
                .map(|record| record.title)
                .unwrap_or_default();
            Ok(ParentRow {
                parent_id: info.parent_id,
                ordinal: info.ordinal,
                title,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    render(output, &rows, |rows, w| {
        if rows.is_empty() {
            return writeln!(w, "{} has no parents in the index", args.id);
        }
        for row in rows {
            writeln!(w, "{}  {}  {}", row.parent_id, row.ordinal, row.title)?;
        }
        Ok(())
    })
}
