//! Messages across the worker boundary.
//!
//! One command in ([`WorkerCommand::IndexEvents`]), three events out
//! ([`IndexEvent::Progress`], [`IndexEvent::Complete`], [`IndexEvent::Error`]).
//! Payloads carry only serializable event fields, never tree state, so the
//! same contract could be served by an out-of-process indexer.

use serde::{Deserialize, Serialize};

use crate::event::{Event, Tag};

/// The subset of an [`Event`] the indexer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexableEvent {
    pub id: String,
    pub kind: u32,
    pub pubkey: String,
    pub tags: Vec<Tag>,
    pub created_at: u64,
}

impl From<&Event> for IndexableEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            kind: event.kind,
            pubkey: event.pubkey.clone(),
            tags: event.tags.clone(),
            created_at: event.created_at,
        }
    }
}

impl IndexableEvent {
    /// Value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.name() == Some(name))
            .and_then(Tag::value)
    }
}

/// Requests accepted by the worker thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerCommand {
    /// Index one batch collected from the hierarchy under `root`.
    ///
    /// `references` are nested indices owned by another indexing job: they
    /// resolve `a` tags inside `batch` but get no rows of their own.
    IndexEvents {
        root: String,
        batch: Vec<IndexableEvent>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        references: Vec<IndexableEvent>,
    },
    Shutdown,
}

/// Progress and outcome notifications published by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexEvent {
    Progress {
        root: String,
        processed: usize,
        total: usize,
    },
    Complete {
        root: String,
        total_processed: usize,
        duration_ms: u64,
    },
    Error {
        root: String,
        message: String,
    },
}

impl IndexEvent {
    /// Root of the batch this notification belongs to.
    pub fn root(&self) -> &str {
        match self {
            Self::Progress { root, .. } | Self::Complete { root, .. } | Self::Error { root, .. } => {
                root
            }
        }
    }

    /// Whether this is the last notification for its batch.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}
