//! Lazy hierarchical publication tree.
//!
//! A [`PublicationTree`] starts as a single unresolved root and grows as
//! traversals resolve nodes and derive their children from `a`/`e` tags.
//! Nothing is fetched until a traversal (or [`PublicationTree::resolve`])
//! asks for it.
//!
//! # Sharing
//!
//! The tree is a cheap-to-clone handle. Several traversals may run over the
//! same tree at once: resolved nodes are immutable, and an unresolved node's
//! payload is single-flight, so two traversals reaching the same node fetch
//! it once.
//!
//! # Graph shape
//!
//! The protocol does not promise acyclicity. A node referenced by several
//! parents is one node (its parent back-reference is the first referencer),
//! and a node that references one of its ancestors is reached again only as
//! an already-visited key, which every traversal skips.

mod node;
mod traversal;

pub use node::{Node, NodeStatus};
pub use traversal::{SeekPredicate, Traversal, TraversalError, TraversalMode, Visit};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::event::{Event, NodeKey};
use crate::fetch::SharedFetcher;

/// Handle to a partially resolved publication tree.
#[derive(Clone)]
pub struct PublicationTree {
    inner: Arc<TreeInner>,
}

struct TreeInner {
    root: NodeKey,
    fetcher: SharedFetcher,
    nodes: RwLock<HashMap<NodeKey, Arc<Node>>>,
    /// Resolved event id → key of the node holding it.
    by_event: RwLock<HashMap<String, NodeKey>>,
}

impl PublicationTree {
    /// A tree with exactly one node, the unresolved root.
    pub fn new(root: NodeKey, fetcher: SharedFetcher) -> Self {
        let node = Node::unresolved(root.clone(), None, Arc::clone(&fetcher));
        Self::from_root_node(root, node, fetcher)
    }

    /// A tree whose root payload is already in hand.
    pub fn with_root_event(root: Event, fetcher: SharedFetcher) -> Self {
        let key = root.node_key();
        let node = Node::resolved(key.clone(), None, root);
        let tree = Self::from_root_node(key, node, fetcher);
        tree.record_event(&tree.root());
        tree
    }

    fn from_root_node(root: NodeKey, node: Node, fetcher: SharedFetcher) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(root.clone(), Arc::new(node));
        Self {
            inner: Arc::new(TreeInner {
                root,
                fetcher,
                nodes: RwLock::new(nodes),
                by_event: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn root_key(&self) -> &NodeKey {
        &self.inner.root
    }

    pub fn root(&self) -> Arc<Node> {
        self.get(&self.inner.root)
            .unwrap_or_else(|| unreachable_root(&self.inner.root))
    }

    /// The node created for `key`, if any traversal has reached it.
    pub fn get(&self, key: &NodeKey) -> Option<Arc<Node>> {
        self.inner
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// The node holding the resolved event `id`.
    pub fn node_for_event(&self, id: &str) -> Option<Arc<Node>> {
        let key = self
            .inner
            .by_event
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        key.and_then(|key| self.get(&key))
            .or_else(|| self.get(&NodeKey::Id(id.to_string())))
    }

    /// Number of materialized nodes (resolved or not).
    pub fn len(&self) -> usize {
        self.inner
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a node's payload, fetching on first access.
    ///
    /// Concurrent calls for the same node share one fetch. Returns `None` if
    /// the node is errored.
    pub async fn resolve(&self, node: &Node) -> Option<Arc<Event>> {
        let event = node.resolve().await;
        if event.is_some() {
            self.record_event(node);
        }
        event
    }

    /// Children of `node` in tag order, resolving `node` first if needed.
    ///
    /// Leaf and errored nodes have no children. Child nodes are created on
    /// first reference and reused afterwards.
    pub async fn children_of(&self, node: &Node) -> Vec<Arc<Node>> {
        let Some(event) = self.resolve(node).await else {
            return Vec::new();
        };

        node.derive_children(&event)
            .iter()
            .map(|child| self.materialize(node.key(), child))
            .collect()
    }

    /// The node that first referenced `node`.
    pub fn parent_of(&self, node: &Node) -> Option<Arc<Node>> {
        node.parent_key().and_then(|key| self.get(key))
    }

    /// Breadcrumb path from the root down to (not including) `key`.
    pub fn ancestors(&self, key: &NodeKey) -> Vec<Arc<Node>> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get(key).and_then(|node| self.parent_of(&node));

        while let Some(node) = current {
            if !seen.insert(node.key().clone()) {
                break;
            }
            current = self.parent_of(&node);
            path.push(node);
        }

        path.reverse();
        path
    }

    /// A new traversal with fresh `All` and `Linear` cursors.
    pub fn traverse(&self) -> Traversal {
        Traversal::new(self.clone())
    }

    /// Get or create the node for `key`, recording `parent` as its
    /// back-reference on creation.
    fn materialize(&self, parent: &NodeKey, key: &NodeKey) -> Arc<Node> {
        if let Some(existing) = self.get(key) {
            return existing;
        }

        let mut nodes = self
            .inner
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(nodes.entry(key.clone()).or_insert_with(|| {
            Arc::new(Node::unresolved(
                key.clone(),
                Some(parent.clone()),
                Arc::clone(&self.inner.fetcher),
            ))
        }))
    }

    fn record_event(&self, node: &Node) {
        let Some(event) = node.event() else {
            return;
        };
        self.inner
            .by_event
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.id.clone())
            .or_insert_with(|| node.key().clone());
    }
}

#[cold]
fn unreachable_root(root: &NodeKey) -> ! {
    panic!("publication tree lost its root node {root}")
}

impl std::fmt::Debug for PublicationTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicationTree")
            .field("root", &self.inner.root)
            .field("nodes", &self.len())
            .finish_non_exhaustive()
    }
}
