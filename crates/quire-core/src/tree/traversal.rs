//! Traversal cursors over a [`PublicationTree`].
//!
//! A [`Traversal`] holds two independent pre-order cursors, one for
//! [`TraversalMode::All`] and one for [`TraversalMode::Linear`], so a bulk
//! walk and a progressive reveal never disturb each other. A
//! [`TraversalMode::Seek`] call starts from the root every time and stops at
//! the first match, leaving the rest of the tree unresolved.
//!
//! The cursor pops a frame only after its node has settled. If the abort
//! signal fires while a fetch is in flight, the traversal stops waiting but
//! the fetch keeps running; the frame stays on the stack, and the next call
//! (with a fresh signal) picks up at the same node without fetching it
//! again. Nothing already yielded is yielded again.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{Node, NodeStatus, PublicationTree};
use crate::event::{Event, NodeKey};

/// Caller-supplied match condition for [`TraversalMode::Seek`].
pub type SeekPredicate = dyn Fn(&Node) -> bool + Send + Sync;

/// How a single [`Traversal::next`] call advances.
#[derive(Clone, Copy)]
pub enum TraversalMode<'p> {
    /// Exhaustive pre-order walk on the bulk cursor.
    All,
    /// One step of the persistent reveal cursor.
    Linear,
    /// Depth-first search from the root for the first node matching the
    /// predicate.
    Seek(&'p SeekPredicate),
}

impl std::fmt::Debug for TraversalMode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Linear => f.write_str("Linear"),
            Self::Seek(_) => f.write_str("Seek(..)"),
        }
    }
}

/// A node yielded by a traversal.
#[derive(Debug, Clone)]
pub struct Visit {
    pub node: Arc<Node>,
    /// `None` when the node's fetch failed.
    pub event: Option<Arc<Event>>,
    /// Pre-order depth; the root is 0.
    pub depth: usize,
}

impl Visit {
    pub const fn is_errored(&self) -> bool {
        self.event.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraversalError {
    /// The abort signal fired before or during a fetch.
    #[error("traversal aborted")]
    Aborted,
}

#[derive(Debug)]
struct Frame {
    key: NodeKey,
    depth: usize,
}

#[derive(Debug)]
struct Cursor {
    stack: Vec<Frame>,
    visited_keys: HashSet<NodeKey>,
    visited_events: HashSet<String>,
    /// Frames pushed for the children of the node yielded last.
    last_children: usize,
}

impl Cursor {
    fn at(root: &NodeKey) -> Self {
        Self {
            stack: vec![Frame {
                key: root.clone(),
                depth: 0,
            }],
            visited_keys: HashSet::new(),
            visited_events: HashSet::new(),
            last_children: 0,
        }
    }

    /// Drop the child frames of the node yielded last. They sit on top of
    /// the stack until the next step.
    fn skip_children(&mut self) {
        let keep = self.stack.len().saturating_sub(self.last_children);
        self.stack.truncate(keep);
        self.last_children = 0;
    }

    /// Advance one node in pre-order.
    async fn step(
        &mut self,
        tree: &PublicationTree,
        signal: &CancellationToken,
    ) -> Result<Option<Visit>, TraversalError> {
        self.last_children = 0;
        loop {
            let Some(frame) = self.stack.last() else {
                return Ok(None);
            };
            let (key, depth) = (frame.key.clone(), frame.depth);

            if self.visited_keys.contains(&key) {
                self.stack.pop();
                continue;
            }
            let Some(node) = tree.get(&key) else {
                tracing::debug!(key = %key, "cursor frame without a node");
                self.stack.pop();
                continue;
            };

            let event = if node.status() == NodeStatus::Unresolved {
                if signal.is_cancelled() {
                    return Err(TraversalError::Aborted);
                }
                tokio::select! {
                    biased;
                    () = signal.cancelled() => return Err(TraversalError::Aborted),
                    event = tree.resolve(&node) => event,
                }
            } else {
                tree.resolve(&node).await
            };

            self.stack.pop();
            self.visited_keys.insert(key);

            if let Some(event) = &event {
                if !self.visited_events.insert(event.id.clone()) {
                    tracing::debug!(
                        event_id = %event.id,
                        key = %node.key(),
                        "event already visited under another reference"
                    );
                    continue;
                }
                let children = tree.children_of(&node).await;
                for child in children.iter().rev() {
                    if !self.visited_keys.contains(child.key()) {
                        self.stack.push(Frame {
                            key: child.key().clone(),
                            depth: depth + 1,
                        });
                        self.last_children += 1;
                    }
                }
            }

            return Ok(Some(Visit { node, event, depth }));
        }
    }
}

/// Iterator state over one tree. Create with [`PublicationTree::traverse`].
#[derive(Debug)]
pub struct Traversal {
    tree: PublicationTree,
    all: Cursor,
    linear: Cursor,
    signal: CancellationToken,
}

impl Traversal {
    pub(crate) fn new(tree: PublicationTree) -> Self {
        let root = tree.root_key().clone();
        Self {
            all: Cursor::at(&root),
            linear: Cursor::at(&root),
            tree,
            signal: CancellationToken::new(),
        }
    }

    pub const fn tree(&self) -> &PublicationTree {
        &self.tree
    }

    /// Replace the abort signal checked before every fetch.
    ///
    /// A cancelled token stays cancelled, so resuming after an abort means
    /// installing a fresh one.
    pub fn set_abort_signal(&mut self, signal: CancellationToken) {
        self.signal = signal;
    }

    pub const fn abort_signal(&self) -> &CancellationToken {
        &self.signal
    }

    /// Advance according to `mode`.
    ///
    /// Returns `Ok(None)` when the cursor is exhausted (or, for `Seek`, when
    /// nothing matched). Errored nodes are yielded with `event: None`.
    ///
    /// # Errors
    ///
    /// Returns [`TraversalError::Aborted`] if the abort signal fires before
    /// or during a fetch. The cursor is left at the interrupted node.
    pub async fn next(&mut self, mode: TraversalMode<'_>) -> Result<Option<Visit>, TraversalError> {
        match mode {
            TraversalMode::All => self.all.step(&self.tree, &self.signal).await,
            TraversalMode::Linear => self.linear.step(&self.tree, &self.signal).await,
            TraversalMode::Seek(predicate) => self.seek(predicate).await,
        }
    }

    /// Do not descend below the node the `All` cursor yielded last. Its
    /// children are not fetched by this cursor unless another branch
    /// references them.
    pub fn skip_children(&mut self) {
        self.all.skip_children();
    }

    /// Drain the `All` cursor.
    ///
    /// # Errors
    ///
    /// Returns [`TraversalError::Aborted`] if the abort signal fires.
    pub async fn collect_all(&mut self) -> Result<Vec<Visit>, TraversalError> {
        let mut visits = Vec::new();
        while let Some(visit) = self.next(TraversalMode::All).await? {
            visits.push(visit);
        }
        Ok(visits)
    }

    async fn seek(&self, predicate: &SeekPredicate) -> Result<Option<Visit>, TraversalError> {
        let mut cursor = Cursor::at(self.tree.root_key());
        while let Some(visit) = cursor.step(&self.tree, &self.signal).await? {
            if predicate(&visit.node) {
                return Ok(Some(visit));
            }
        }
        Ok(None)
    }
}
