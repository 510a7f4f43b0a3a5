//! `quire index`: walk a publication from a JSONL dump and write its
//! titles and ordinals to the index.

use anyhow::Result;
use clap::Args;
use quire_core::config::QuireConfig;
use quire_core::error::ErrorCode;
use quire_core::worker::IndexEvent;
use quire_core::{IndexOutcome, IndexService};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::output::{CodedError, OutputMode, kv, render};

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Newline-delimited JSON events to read.
    pub events: PathBuf,

    /// Root index event: hex id or `kind:pubkey:d` address.
    #[arg(long)]
    pub root: String,
}

#[derive(Debug, Serialize)]
pub struct IndexReport {
    pub root: String,
    pub status: &'static str,
    pub events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub index_path: String,
}

pub async fn run_index(args: &IndexArgs, output: OutputMode, config: &QuireConfig) -> Result<()> {
    let tree = super::tree_from_file(&args.events, &args.root, &config.fetch)?;
    super::require_root(&tree).await?;

    let service = IndexService::new(config.clone());
    let mut updates = service.subscribe();
    let root = tree.root_key().to_string();

    let report = match service.index_hierarchy(&tree).await? {
        IndexOutcome::Skipped => IndexReport {
            root,
            status: "skipped",
            events: 0,
            duration_ms: None,
            index_path: config.index.path.display().to_string(),
        },
        IndexOutcome::Submitted { events } => {
            let duration_ms = wait_for_completion(&mut updates, &root).await?;
            IndexReport {
                root,
                status: "indexed",
                events,
                duration_ms: Some(duration_ms),
                index_path: config.index.path.display().to_string(),
            }
        }
    };
    service.close()?;

    render(output, &report, |r, w| {
        kv(w, "root", &r.root)?;
        kv(w, "status", r.status)?;
        kv(w, "events", r.events.to_string())?;
        if let Some(ms) = r.duration_ms {
            kv(w, "duration", format!("{ms} ms"))?;
        }
        kv(w, "index", &r.index_path)?;
        w.flush()
    })
}

async fn wait_for_completion(
    updates: &mut tokio::sync::broadcast::Receiver<IndexEvent>,
    root: &str,
) -> Result<u64> {
    loop {
        match updates.recv().await {
            Ok(IndexEvent::Progress {
                root: ref batch,
                processed,
                total,
            }) if batch == root => {
                debug!(processed, total, "indexing progress");
            }
            Ok(IndexEvent::Complete {
                root: ref batch,
                total_processed,
                duration_ms,
            }) if batch == root => {
                info!(root, total_processed, duration_ms, "indexing complete");
                return Ok(duration_ms);
            }
            Ok(IndexEvent::Error {
                root: ref batch,
                ref message,
            }) if batch == root => {
                return Err(CodedError::new(ErrorCode::IndexingFailed, message.clone()).into());
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "missed indexing progress updates");
            }
            Err(RecvError::Closed) => {
                anyhow::bail!("index worker stopped before reporting completion");
            }
        }
    }
}
