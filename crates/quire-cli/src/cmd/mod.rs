pub mod index;
pub mod parents;
pub mod stats;
pub mod toc;
pub mod walk;

use anyhow::{Context, Result};
use quire_core::config::FetchConfig;
use quire_core::db;
use quire_core::error::ErrorCode;
use quire_core::fetch::{MemoryFetcher, RetryingFetcher, load_events_jsonl};
use quire_core::{NodeKey, PublicationTree};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use crate::output::CodedError;

/// Open an index that must already exist.
pub fn open_existing_index(path: &Path) -> Result<Connection> {
    db::try_open_index(path)?.ok_or_else(|| {
        CodedError::new(
            ErrorCode::IndexNotFound,
            format!("index database not found at {}", path.display()),
        )
        .into()
    })
}

/// Build an unresolved tree over a JSONL event dump.
pub fn tree_from_file(events: &Path, root: &str, fetch: &FetchConfig) -> Result<PublicationTree> {
    let loaded = load_events_jsonl(events)
        .map_err(|error| CodedError::new(ErrorCode::FetchFailed, format!("{error:#}")))?;
    let root: NodeKey = root
        .parse()
        .with_context(|| format!("invalid root reference '{root}'"))?;
    tracing::debug!(events = loaded.len(), root = %root, "loaded event source");

    let fetcher = RetryingFetcher::new(MemoryFetcher::new(loaded), fetch);
    Ok(PublicationTree::new(root, Arc::new(fetcher)))
}

/// Resolve the root up front so a bad `--root` fails with a clear error.
pub async fn require_root(tree: &PublicationTree) -> Result<()> {
    if tree.resolve(&tree.root()).await.is_none() {
        return Err(CodedError::new(
            ErrorCode::RootNotFound,
            format!("root {} not found in event source", tree.root_key()),
        )
        .into());
    }
    Ok(())
}
