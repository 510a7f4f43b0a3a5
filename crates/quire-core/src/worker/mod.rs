//! Background indexing worker.
//!
//! The worker is a dedicated OS thread that owns its own SQLite connection.
//! Commands arrive over a channel; each [`WorkerCommand::IndexEvents`] batch
//! is planned (titles and ordinals derived), written as one metadata
//! transaction followed by one ordinals transaction, and reported on a
//! broadcast channel as [`IndexEvent`]s. A failed batch is rolled back by
//! the store and reported as [`IndexEvent::Error`]; the worker keeps serving
//! later batches.

pub mod derive;
pub mod protocol;

pub use derive::{IndexPlan, IndexPlanner, build_address_map, derive_title, humanize_d_tag, plan_batch};
pub use protocol::{IndexEvent, IndexableEvent, WorkerCommand};

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::db;

/// Errors talking to the worker thread itself (not indexing failures, which
/// are reported as [`IndexEvent::Error`]).
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn index worker thread")]
    Spawn(#[source] std::io::Error),
    #[error("index worker has shut down")]
    Closed,
    #[error("index worker thread panicked")]
    Panicked,
}

/// Owner-side handle to the worker thread.
///
/// Dropping the handle asks the worker to stop once its queue is drained but
/// does not wait for it, so a handle may be dropped on an async task. Call
/// [`WorkerHandle::terminate`] to wait for queued batches to be written, for
/// example before the process exits.
#[derive(Debug)]
pub struct WorkerHandle {
    commands: mpsc::Sender<WorkerCommand>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Start a worker writing to the index at `path`.
    ///
    /// The database is opened by the worker thread on its first batch.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] if the OS refuses the thread.
    pub fn spawn(
        path: PathBuf,
        events: broadcast::Sender<IndexEvent>,
        progress_interval: usize,
    ) -> Result<Self, WorkerError> {
        let (commands, inbox) = mpsc::channel();
        let indexer = Indexer {
            path,
            conn: None,
            events,
            progress_interval: progress_interval.max(1),
        };
        let thread = thread::Builder::new()
            .name("quire-indexer".to_string())
            .spawn(move || indexer.run(&inbox))
            .map_err(WorkerError::Spawn)?;

        Ok(Self {
            commands,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Queue a batch. Returns as soon as the command is queued.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Closed`] if the worker has terminated.
    pub fn submit(&self, root: String, batch: Vec<IndexableEvent>) -> Result<(), WorkerError> {
        self.submit_with_references(root, batch, Vec::new())
    }

    /// Queue a batch whose `a` tags may point at `references`, nested indices
    /// that another job writes.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Closed`] if the worker has terminated.
    pub fn submit_with_references(
        &self,
        root: String,
        batch: Vec<IndexableEvent>,
        references: Vec<IndexableEvent>,
    ) -> Result<(), WorkerError> {
        self.commands
            .send(WorkerCommand::IndexEvents {
                root,
                batch,
                references,
            })
            .map_err(|_| WorkerError::Closed)
    }

    /// Stop the worker and wait for the thread to exit. Queued batches ahead
    /// of the shutdown command are still processed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Panicked`] if the worker thread panicked.
    pub fn terminate(&self) -> Result<(), WorkerError> {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        // A closed channel means the thread already left its loop.
        let _ = self.commands.send(WorkerCommand::Shutdown);
        handle.join().map_err(|_| WorkerError::Panicked)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let detached = self
            .thread
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if detached.is_some() {
            let _ = self.commands.send(WorkerCommand::Shutdown);
            debug!("index worker detached; queued batches still run");
        }
    }
}

struct Indexer {
    path: PathBuf,
    conn: Option<Connection>,
    events: broadcast::Sender<IndexEvent>,
    progress_interval: usize,
}

impl Indexer {
    fn run(mut self, inbox: &mpsc::Receiver<WorkerCommand>) {
        debug!(path = %self.path.display(), "index worker started");
        while let Ok(command) = inbox.recv() {
            match command {
                WorkerCommand::IndexEvents {
                    root,
                    batch,
                    references,
                } => self.handle_batch(root, &batch, &references),
                WorkerCommand::Shutdown => break,
            }
        }
        debug!("index worker stopped");
    }

    fn handle_batch(&mut self, root: String, batch: &[IndexableEvent], references: &[IndexableEvent]) {
        let started = Instant::now();
        match self.index_batch(&root, batch, references) {
            Ok(total_processed) => {
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    root = %root,
                    events = total_processed,
                    duration_ms,
                    "indexed publication batch"
                );
                self.publish(IndexEvent::Complete {
                    root,
                    total_processed,
                    duration_ms,
                });
            }
            Err(err) => {
                error!(root = %root, error = %format!("{err:#}"), "indexing batch failed");
                self.publish(IndexEvent::Error {
                    root,
                    message: format!("{err:#}"),
                });
            }
        }
    }

    fn index_batch(
        &mut self,
        root: &str,
        batch: &[IndexableEvent],
        references: &[IndexableEvent],
    ) -> Result<usize> {
        let total = batch.len();
        let mut planner = IndexPlanner::with_references(batch, references);
        for (done, event) in batch.iter().enumerate() {
            planner
                .add(event)
                .with_context(|| format!("derive ordinals for event {}", event.id))?;
            let processed = done + 1;
            if processed % self.progress_interval == 0 && processed < total {
                self.publish(IndexEvent::Progress {
                    root: root.to_string(),
                    processed,
                    total,
                });
            }
        }
        let plan = planner.finish();

        let conn = self.connection()?;
        db::put_metadata_batch(conn, &plan.metadata)?;
        db::put_ordinals_batch(conn, &plan.ordinals)?;
        db::mark_batch_committed(conn, total, now_ms())?;

        self.publish(IndexEvent::Progress {
            root: root.to_string(),
            processed: total,
            total,
        });
        Ok(total)
    }

    fn connection(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            self.conn = Some(open(&self.path)?);
        }
        self.conn
            .as_mut()
            .context("index connection unavailable")
    }

    fn publish(&self, event: IndexEvent) {
        // No subscribers is fine: indexing is fire-and-forget.
        let _ = self.events.send(event);
    }
}

fn open(path: &Path) -> Result<Connection> {
    db::open_index(path).with_context(|| format!("open index at {}", path.display()))
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
