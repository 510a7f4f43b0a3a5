//! Indexing orchestrator.
//!
//! [`IndexService`] owns the reader connection and the background worker
//! (both created on first use), walks publication trees into batches, and
//! publishes worker notifications to subscribers. Indexing is detached:
//! [`IndexService::index_hierarchy`] returns as soon as the batch is queued.
//!
//! # Duplicate suppression
//!
//! The service keeps a set of roots currently being collected. A request
//! whose root is in the set is skipped. While collecting, every nested index
//! reached is added as well, so a request for a sub-hierarchy that arrives
//! while its enclosing publication is being walked is skipped too. In the
//! other order, a nested index already claimed by another job is not
//! descended into: its event is passed to the worker only to resolve the
//! enclosing index's `a` tags, and the owning job writes its rows. Claims
//! are released when collection ends, whether it succeeded or not.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::QuireConfig;
use crate::db::{self, IndexStats, MetadataRecord, ParentInfo};
use crate::event::NodeType;
use crate::tree::{PublicationTree, TraversalMode};
use crate::worker::{IndexEvent, IndexableEvent, WorkerHandle};

/// Result of an [`IndexService::index_hierarchy`] request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The root (or an enclosing hierarchy) is already being indexed.
    Skipped,
    /// A batch of `events` was queued for the worker.
    Submitted { events: usize },
}

pub struct IndexService {
    config: QuireConfig,
    store: Mutex<Option<Connection>>,
    worker: Mutex<Option<WorkerHandle>>,
    active: Mutex<HashSet<String>>,
    events: broadcast::Sender<IndexEvent>,
}

impl IndexService {
    pub fn new(config: QuireConfig) -> Self {
        let (events, _) = broadcast::channel(config.events.channel_capacity.max(1));
        Self {
            config,
            store: Mutex::new(None),
            worker: Mutex::new(None),
            active: Mutex::new(HashSet::new()),
            events,
        }
    }

    pub const fn config(&self) -> &QuireConfig {
        &self.config
    }

    /// Receive `Progress`, `Complete` and `Error` notifications for every
    /// batch submitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// Whether `id` (a root or nested index) is currently being collected.
    pub fn is_indexing(&self, id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Walk every node reachable from the tree's root and queue the
    /// resolved events as one batch.
    ///
    /// Errored nodes are left out of the batch. Returns
    /// [`IndexOutcome::Skipped`] without walking if the root is already
    /// claimed.
    ///
    /// # Errors
    ///
    /// Returns an error if the traversal is aborted, the root cannot be
    /// resolved, or the worker cannot be started or reached.
    pub async fn index_hierarchy(&self, tree: &PublicationTree) -> Result<IndexOutcome> {
        let root = tree.root_key().to_string();
        let mut claims = ActiveClaims::new(&self.active);
        if !claims.claim(&root) {
            info!(root = %root, "hierarchy already being indexed; skipping");
            return Ok(IndexOutcome::Skipped);
        }

        let mut traversal = tree.traverse();
        let mut batch = Vec::new();
        let mut deferred = Vec::new();
        let mut errored = 0_usize;
        while let Some(visit) = traversal.next(TraversalMode::All).await? {
            let Some(event) = visit.event else {
                errored += 1;
                continue;
            };
            if event.node_type() == NodeType::Index {
                let key = visit.node.key().to_string();
                if !claims.claim_all(&[event.id.as_str(), key.as_str()]) {
                    if visit.depth == 0 {
                        info!(root = %root, event_id = %event.id, "hierarchy already being indexed; skipping");
                        return Ok(IndexOutcome::Skipped);
                    }
                    info!(
                        root = %root,
                        nested = %event.id,
                        "nested hierarchy already being indexed; leaving it to that job"
                    );
                    traversal.skip_children();
                    deferred.push(IndexableEvent::from(event.as_ref()));
                    continue;
                }
            }
            batch.push(IndexableEvent::from(event.as_ref()));
        }

        if tree.root().event().is_none() {
            anyhow::bail!("root {root} could not be resolved");
        }

        let events = batch.len();
        debug!(root = %root, events, errored, deferred = deferred.len(), "collected publication batch");
        self.with_worker(|worker| {
            worker
                .submit_with_references(root.clone(), batch, deferred)
                .map_err(Into::into)
        })?;
        info!(root = %root, events, "queued publication for indexing");

        Ok(IndexOutcome::Submitted { events })
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or queried.
    pub fn get_metadata(&self, id: &str) -> Result<Option<MetadataRecord>> {
        self.with_store(|conn| db::get_metadata(conn, id))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or queried.
    pub fn get_metadata_batch(&self, ids: &[String]) -> Result<Vec<MetadataRecord>> {
        self.with_store(|conn| db::get_metadata_batch(conn, ids))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or queried.
    pub fn get_ordered_children(&self, parent_id: &str) -> Result<Vec<String>> {
        self.with_store(|conn| db::get_ordered_children(conn, parent_id))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or queried.
    pub fn get_parent_info(&self, child_id: &str) -> Result<Vec<ParentInfo>> {
        self.with_store(|conn| db::get_parent_info(conn, child_id))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or queried.
    pub fn stats(&self) -> Result<IndexStats> {
        self.with_store(db::index_stats)
    }

    /// Stop the worker (after any queued batches) and close the store.
    ///
    /// This blocks until the worker thread exits. Dropping the service
    /// instead lets the worker finish in the background without waiting.
    /// The service can be used again afterwards; both are reopened lazily.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread panicked.
    pub fn close(&self) -> Result<()> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.terminate().context("terminate index worker")?;
        }
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    fn with_store<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        if store.is_none() {
            *store = Some(db::open_index(&self.config.index.path)?);
        }
        let conn = store.as_ref().context("index store unavailable")?;
        f(conn)
    }

    fn with_worker<T>(&self, f: impl FnOnce(&WorkerHandle) -> Result<T>) -> Result<T> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_none() {
            *worker = Some(
                WorkerHandle::spawn(
                    self.config.index.path.clone(),
                    self.events.clone(),
                    self.config.index.progress_interval,
                )
                .context("start index worker")?,
            );
        }
        let handle = worker.as_ref().context("index worker unavailable")?;
        f(handle)
    }
}

impl std::fmt::Debug for IndexService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexService")
            .field("index_path", &self.config.index.path)
            .finish_non_exhaustive()
    }
}

/// Ids this request added to the active set; released on drop.
struct ActiveClaims<'a> {
    active: &'a Mutex<HashSet<String>>,
    claimed: Vec<String>,
}

impl<'a> ActiveClaims<'a> {
    const fn new(active: &'a Mutex<HashSet<String>>) -> Self {
        Self {
            active,
            claimed: Vec::new(),
        }
    }

    /// Add `id` to the active set. Returns `false` if it was already there.
    fn claim(&mut self, id: &str) -> bool {
        let inserted = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
        if inserted {
            self.claimed.push(id.to_string());
        }
        inserted
    }

    /// Claim every id in `ids` unless another job holds one of them, in
    /// which case nothing is claimed. Ids this guard already holds count as
    /// claimed.
    fn claim_all(&mut self, ids: &[&str]) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let foreign = ids
            .iter()
            .any(|id| active.contains(*id) && !self.claimed.iter().any(|own| own == id));
        if foreign {
            return false;
        }
        for id in ids {
            if active.insert((*id).to_string()) {
                self.claimed.push((*id).to_string());
            }
        }
        true
    }
}

impl Drop for ActiveClaims<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        for id in self.claimed.drain(..) {
            active.remove(&id);
        }
    }
}
