//! `quire toc`: table of contents from the index alone.
//!
//! Walks the stored ordinal rows recursively from the root; no event source
//! is consulted.

use anyhow::Result;
use clap::Args;
use quire_core::db;
use quire_core::config::QuireConfig;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::Write;

use crate::output::{OutputMode, render, section};

#[derive(Args, Debug)]
pub struct TocArgs {
    /// Root event id.
    pub root: String,

    /// Stop descending below this depth (root = 0).
    #[arg(long)]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TocEntry {
    pub id: String,
    pub title: String,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<String>,
}

pub fn run_toc(args: &TocArgs, output: OutputMode, config: &QuireConfig) -> Result<()> {
    let conn = super::open_existing_index(&config.index.path)?;
    let entries = collect_toc(&conn, &args.root, args.max_depth)?;

    render(output, &entries, |entries, w| {
        let heading = entries
            .first()
            .map_or(args.root.as_str(), display_title);
        section(w, heading)?;
        for entry in entries.iter().skip(1) {
            let indent = "  ".repeat(entry.depth.saturating_sub(1));
            writeln!(w, "{indent}{}  ({})", display_title(entry), entry.id)?;
        }
        Ok(())
    })
}

fn display_title(entry: &TocEntry) -> &str {
    if entry.title.is_empty() {
        &entry.id
    } else {
        &entry.title
    }
}

/// Pre-order entries under `root`, root first. A child already listed is
/// not expanded again.
pub fn collect_toc(conn: &Connection, root: &str, max_depth: Option<usize>) -> Result<Vec<TocEntry>> {
    let mut entries = Vec::new();
    let mut expanded = HashSet::new();
    let mut stack = vec![(root.to_string(), 0_usize, None::<String>)];

    while let Some((id, depth, ordinal)) = stack.pop() {
        entries.push(TocEntry {
            id: id.clone(),
            title: String::new(),
            depth,
            ordinal,
        });
        if max_depth.is_some_and(|max| depth >= max) || !expanded.insert(id.clone()) {
            continue;
        }

        let children = db::get_child_ordinals(conn, &id)?;
        for child in children.into_iter().rev() {
            stack.push((child.id, depth + 1, Some(child.ordinal)));
        }
    }

    let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
    let titles: HashMap<String, String> = db::get_metadata_batch(conn, &ids)?
        .into_iter()
        .map(|record| (record.id, record.title))
        .collect();
    for entry in &mut entries {
        if let Some(title) = titles.get(&entry.id) {
            entry.title.clone_from(title);
        }
    }
    Ok(entries)
}
