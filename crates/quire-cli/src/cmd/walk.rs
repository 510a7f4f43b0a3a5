//! `quire walk`: reveal a publication node by node, or seek a bookmark.
//!
//! Runs directly against the event source; the index is not consulted.

use anyhow::{Context, Result};
use clap::Args;
use quire_core::config::QuireConfig;
use quire_core::tree::{Node, NodeStatus};
use quire_core::worker::{IndexableEvent, derive_title};
use quire_core::{NodeKey, PublicationTree, TraversalMode, Visit};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct WalkArgs {
    /// Newline-delimited JSON events to read.
    pub events: PathBuf,

    /// Root index event: hex id or `kind:pubkey:d` address.
    #[arg(long)]
    pub root: String,

    /// Find the first node matching this id or address instead of walking.
    #[arg(long)]
    pub seek: Option<String>,

    /// Stop after this many nodes.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct WalkEntry {
    pub depth: usize,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<u32>,
    pub title: String,
    pub status: &'static str,
}

impl WalkEntry {
    fn from_node(node: &Node, depth: usize) -> Self {
        let event = node.event();
        Self {
            depth,
            key: node.key().to_string(),
            id: node.event_id().map(str::to_string),
            kind: event.map(|e| e.kind),
            title: event
                .map(|e| derive_title(&IndexableEvent::from(e.as_ref())))
                .unwrap_or_default(),
            status: match node.status() {
                NodeStatus::Resolved => "resolved",
                NodeStatus::Unresolved => "unresolved",
                NodeStatus::Errored => "errored",
            },
        }
    }

    fn from_visit(visit: &Visit) -> Self {
        Self::from_node(&visit.node, visit.depth)
    }
}

#[derive(Debug, Serialize)]
pub struct SeekReport {
    pub target: String,
    /// Ancestors of the match, root first.
    pub path: Vec<WalkEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<WalkEntry>,
}

pub async fn run_walk(args: &WalkArgs, output: OutputMode, config: &QuireConfig) -> Result<()> {
    let tree = super::tree_from_file(&args.events, &args.root, &config.fetch)?;
    super::require_root(&tree).await?;

    match &args.seek {
        Some(target) => seek(&tree, target, output).await,
        None => walk(&tree, args.limit, output).await,
    }
}

async fn walk(tree: &PublicationTree, limit: Option<usize>, output: OutputMode) -> Result<()> {
    let mut traversal = tree.traverse();
    let mut entries = Vec::new();
    while limit.is_none_or(|max| entries.len() < max) {
        let Some(visit) = traversal.next(TraversalMode::Linear).await? else {
            break;
        };
        entries.push(WalkEntry::from_visit(&visit));
    }

    render(output, &entries, |entries, w| {
        for entry in entries {
            let label = if entry.title.is_empty() {
                entry.key.as_str()
            } else {
                entry.title.as_str()
            };
            let marker = if entry.status == "errored" { " [errored]" } else { "" };
            writeln!(w, "{}{label}{marker}", "  ".repeat(entry.depth))?;
        }
        Ok(())
    })
}

async fn seek(tree: &PublicationTree, target: &str, output: OutputMode) -> Result<()> {
    let key: NodeKey = target
        .parse()
        .with_context(|| format!("invalid seek target '{target}'"))?;
    let predicate = {
        let key = key.clone();
        move |node: &Node| node.matches(&key)
    };

    let found = tree
        .traverse()
        .next(TraversalMode::Seek(&predicate))
        .await?;
    let path: Vec<WalkEntry> = found
        .as_ref()
        .map(|visit| {
            tree.ancestors(visit.node.key())
                .iter()
                .enumerate()
                .map(|(depth, node)| WalkEntry::from_node(node, depth))
                .collect()
        })
        .unwrap_or_default();

    let report = SeekReport {
        target: key.to_string(),
        path,
        found: found.as_ref().map(WalkEntry::from_visit),
    };

    render(output, &report, |r, w| {
        let Some(found) = &r.found else {
            return writeln!(w, "{} not found", r.target);
        };
        let mut crumbs: Vec<&str> = r
            .path
            .iter()
            .map(|e| if e.title.is_empty() { e.key.as_str() } else { e.title.as_str() })
            .collect();
        crumbs.push(if found.title.is_empty() {
            found.key.as_str()
        } else {
            found.title.as_str()
        });
        writeln!(w, "{}", crumbs.join(" > "))?;
        if let Some(id) = &found.id {
            writeln!(w, "id: {id}")?;
        }
        Ok(())
    })
}
