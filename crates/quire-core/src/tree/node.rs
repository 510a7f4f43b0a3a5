//! Tree positions.
//!
//! A [`Node`] is created the first time something references it and is never
//! mutated afterwards except through write-once cells: its payload resolves
//! at most once (see [`Lazy`]) and its child list is derived at most once
//! from that payload.

use std::sync::{Arc, OnceLock};

use crate::event::{Event, NodeKey, NodeType};
use crate::fetch::{Fetcher, SharedFetcher};
use crate::lazy::{Lazy, LazyState};

/// Resolution status of a node's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Payload not fetched yet (or a fetch is in flight).
    Unresolved,
    Resolved,
    /// The fetch failed or found nothing. Errored nodes have no children.
    Errored,
}

/// One position in a publication tree.
#[derive(Debug)]
pub struct Node {
    key: NodeKey,
    /// Key of the node that first referenced this one. Lookup only.
    parent: Option<NodeKey>,
    payload: Lazy<Arc<Event>>,
    children: OnceLock<Vec<NodeKey>>,
}

impl Node {
    /// A node whose payload will be fetched on first resolve.
    pub(crate) fn unresolved(key: NodeKey, parent: Option<NodeKey>, fetcher: SharedFetcher) -> Self {
        let target = key.clone();
        let payload = Lazy::new(key.to_string(), move || {
            let fetcher = Arc::clone(&fetcher);
            let target = target.clone();
            async move {
                let event = fetcher
                    .fetch(&target)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("event {target} not found"))?;
                check_matches(&target, &event)?;
                Ok(Arc::new(event))
            }
        });

        Self {
            key,
            parent,
            payload,
            children: OnceLock::new(),
        }
    }

    /// A node whose payload is already known.
    pub(crate) fn resolved(key: NodeKey, parent: Option<NodeKey>, event: Event) -> Self {
        Self {
            payload: Lazy::resolved(key.to_string(), Arc::new(event)),
            key,
            parent,
            children: OnceLock::new(),
        }
    }

    /// The reference this node was created from.
    pub const fn key(&self) -> &NodeKey {
        &self.key
    }

    pub const fn parent_key(&self) -> Option<&NodeKey> {
        self.parent.as_ref()
    }

    /// The payload, if already resolved. Never fetches.
    pub fn event(&self) -> Option<&Arc<Event>> {
        self.payload.get()
    }

    /// The concrete event id: from the payload once resolved, or from the
    /// key when the key is already an id.
    pub fn event_id(&self) -> Option<&str> {
        self.event()
            .map(|event| event.id.as_str())
            .or_else(|| self.key.as_id())
    }

    pub fn status(&self) -> NodeStatus {
        match self.payload.state() {
            LazyState::Pending => NodeStatus::Unresolved,
            LazyState::Resolved => NodeStatus::Resolved,
            LazyState::Error => NodeStatus::Errored,
        }
    }

    /// Tree role: from the payload once resolved, from the address kind
    /// before that, unknown for unresolved id references.
    pub fn node_type(&self) -> Option<NodeType> {
        self.event()
            .map(|event| event.node_type())
            .or_else(|| self.key.as_address().map(crate::event::Address::node_type))
    }

    /// Child keys in tag order, once derived.
    pub fn child_keys(&self) -> Option<&[NodeKey]> {
        self.children.get().map(Vec::as_slice)
    }

    /// Whether this node is what `target` names: same key, same event id,
    /// or an event living at the target address.
    pub fn matches(&self, target: &NodeKey) -> bool {
        if &self.key == target {
            return true;
        }
        match target {
            NodeKey::Id(id) => self.event_id() == Some(id.as_str()),
            NodeKey::Address(address) => self
                .event()
                .and_then(|event| event.address())
                .is_some_and(|own| &own == address),
        }
    }

    pub(crate) async fn resolve(&self) -> Option<Arc<Event>> {
        self.payload.value().await
    }

    /// Derive (once) and return the child keys from a resolved payload.
    pub(crate) fn derive_children(&self, event: &Event) -> &[NodeKey] {
        self.children.get_or_init(|| event.child_refs())
    }
}

fn check_matches(target: &NodeKey, event: &Event) -> anyhow::Result<()> {
    match target {
        NodeKey::Id(id) if &event.id != id => {
            anyhow::bail!("fetched event {} does not match requested id {id}", event.id)
        }
        NodeKey::Address(address) if event.address().as_ref() != Some(address) => {
            anyhow::bail!(
                "fetched event {} does not live at requested address {address}",
                event.id
            )
        }
        _ => Ok(()),
    }
}
