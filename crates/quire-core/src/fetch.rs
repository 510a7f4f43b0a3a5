//! Event sources consumed by the publication tree.
//!
//! The tree only needs [`Fetcher::fetch`]: given an id or address, eventually
//! return the event or `None`. Relay pooling and selection live outside this
//! crate; the implementations here are an in-memory source (tests, offline
//! JSONL dumps) and a timeout/retry wrapper that keeps one unreachable node
//! from stalling a traversal.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::FetchConfig;
use crate::event::{Address, Event, NodeKey};

/// Source of events for unresolved tree nodes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the event an id refers to, or the latest version an address
    /// refers to. `Ok(None)` means "not found".
    async fn fetch(&self, key: &NodeKey) -> Result<Option<Event>>;
}

pub type SharedFetcher = Arc<dyn Fetcher>;

#[async_trait]
impl<F> Fetcher for Arc<F>
where
    F: Fetcher + ?Sized,
{
    async fn fetch(&self, key: &NodeKey) -> Result<Option<Event>> {
        (**self).fetch(key).await
    }
}

// ---------------------------------------------------------------------------
// MemoryFetcher
// ---------------------------------------------------------------------------

/// Fetcher over a fixed set of events.
///
/// Address lookups return the version with the newest `created_at`; ties go
/// to the event added last.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    by_id: HashMap<String, Event>,
    by_address: HashMap<Address, String>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        let mut fetcher = Self::default();
        for event in events {
            fetcher.insert(event);
        }
        fetcher
    }

    /// Add an event, replacing an older version at the same address.
    pub fn insert(&mut self, event: Event) {
        if let Some(address) = event.address() {
            let newer = self
                .by_address
                .get(&address)
                .and_then(|id| self.by_id.get(id))
                .is_none_or(|current| current.created_at <= event.created_at);
            if newer {
                self.by_address.insert(address, event.id.clone());
            }
        }
        self.by_id.insert(event.id.clone(), event);
    }

    /// Number of [`Fetcher::fetch`] calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Every stored event, in no particular order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.by_id.values()
    }

    fn lookup(&self, key: &NodeKey) -> Option<&Event> {
        match key {
            NodeKey::Id(id) => self.by_id.get(id),
            NodeKey::Address(address) => self
                .by_address
                .get(address)
                .and_then(|id| self.by_id.get(id)),
        }
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, key: &NodeKey) -> Result<Option<Event>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup(key).cloned())
    }
}

/// Read newline-delimited JSON events. Blank lines and `#` comments are
/// skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line is not a valid event.
pub fn load_events_jsonl(path: &Path) -> Result<Vec<Event>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("read events from {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str::<Event>(line)
                .with_context(|| format!("parse event at {}:{}", path.display(), idx + 1))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// RetryingFetcher
// ---------------------------------------------------------------------------

/// Applies a per-attempt timeout and a bounded number of attempts to an
/// inner fetcher.
///
/// Timeouts and errors are retried; `Ok(None)` is an answer and is not.
/// After the last failed attempt the failure is returned so the node
/// degrades to errored instead of hanging.
#[derive(Debug)]
pub struct RetryingFetcher<F> {
    inner: F,
    timeout: Duration,
    attempts: u32,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, config: &FetchConfig) -> Self {
        Self {
            inner,
            timeout: Duration::from_millis(config.timeout_ms),
            attempts: config.attempts.max(1),
        }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, key: &NodeKey) -> Result<Option<Event>> {
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            match tokio::time::timeout(self.timeout, self.inner.fetch(key)).await {
                Ok(Ok(found)) => return Ok(found),
                Ok(Err(error)) => {
                    tracing::debug!(key = %key, attempt, error = %error, "fetch attempt failed");
                    last_error = Some(error);
                }
                Err(_) => {
                    tracing::debug!(key = %key, attempt, "fetch attempt timed out");
                    last_error = Some(anyhow::anyhow!(
                        "fetch of {key} timed out after {:?}",
                        self.timeout
                    ));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("fetch of {key} made no attempts"))
            .context(format!("fetch {key} failed after {} attempts", self.attempts)))
    }
}
