//! Nostr event model for publications.
//!
//! A publication is stored as many small signed events. Index events
//! (kind 30040) carry an ordered list of `a` (address) and `e` (event id)
//! tags pointing at their children; every other kind is a leaf whose
//! `content` holds one fragment of the document.
//!
//! ```json
//! {
//!   "id": "aa11…",
//!   "pubkey": "f00d…",
//!   "kind": 30040,
//!   "created_at": 1700000000,
//!   "tags": [["d", "my-book"], ["title", "My Book"], ["a", "30041:f00d…:intro"]],
//!   "content": "",
//!   "sig": "deadbeef…"
//! }
//! ```
//!
//! Events are immutable once constructed. Signatures are carried verbatim
//! and never checked here.

pub mod address;
pub mod kind;

pub use address::{Address, AddressError, NodeKey};
pub use kind::NodeType;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// A Nostr tag: a small array whose first element names the tag.
///
/// Common tags in publications:
///
/// - `d` – identifier of an addressable event
/// - `a` – reference to an addressable event (`kind:pubkey:d`)
/// - `e` – reference to a concrete event id
/// - `title` / `T` – display title
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a tag from string slices.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    /// The tag name (first element), if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// The first value after the name, if any.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// An immutable signed Nostr record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Lowercase hex SHA-256 of the canonical serialization.
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Unix timestamp in seconds.
    pub created_at: u64,
    /// Kind discriminator, e.g. `30040` (index) or `30041` (content).
    pub kind: u32,
    pub tags: Vec<Tag>,
    /// Opaque body. Empty for index events.
    #[serde(default)]
    pub content: String,
    /// Schnorr signature (hex). Not validated.
    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// Compute the NIP-01 event id over
    /// `[0, pubkey, created_at, kind, tags, content]`.
    #[must_use]
    pub fn compute_id(&self) -> String {
        let canonical = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ]);
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }

    /// Value of the first tag named `name`.
    #[must_use]
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.name() == Some(name))
            .and_then(Tag::value)
    }

    /// The `d` tag value, present on addressable events.
    #[must_use]
    pub fn d_tag(&self) -> Option<&str> {
        self.tag_value("d")
    }

    /// The `kind:pubkey:d` address of this event, if it carries a `d` tag.
    #[must_use]
    pub fn address(&self) -> Option<Address> {
        self.d_tag()
            .map(|d| Address::new(self.kind, self.pubkey.clone(), d))
    }

    /// Concrete-id key for this event.
    #[must_use]
    pub fn node_key(&self) -> NodeKey {
        NodeKey::Id(self.id.clone())
    }

    /// Tree role implied by this event's kind.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        NodeType::from_kind(self.kind)
    }

    /// Child references in tag order: one per `a`/`e` tag.
    ///
    /// Malformed `a` coordinates and empty `e` values are skipped and logged.
    /// Leaf events have no children regardless of their tags.
    #[must_use]
    pub fn child_refs(&self) -> Vec<NodeKey> {
        if self.node_type() != NodeType::Index {
            return Vec::new();
        }

        let mut refs = Vec::new();
        for tag in &self.tags {
            match (tag.name(), tag.value()) {
                (Some("a"), Some(raw)) => match raw.parse::<Address>() {
                    Ok(address) => refs.push(NodeKey::Address(address)),
                    Err(error) => {
                        tracing::debug!(
                            parent = %self.id,
                            reference = raw,
                            error = %error,
                            "skipping malformed address reference"
                        );
                    }
                },
                (Some("e"), Some(id)) if !id.trim().is_empty() => {
                    refs.push(NodeKey::Id(id.to_string()));
                }
                (Some("a" | "e"), _) => {
                    tracing::debug!(parent = %self.id, "skipping empty child reference");
                }
                _ => {}
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_event(tags: Vec<Tag>) -> Event {
        Event {
            id: "root".into(),
            pubkey: "pub".into(),
            created_at: 1_700_000_000,
            kind: kind::PUBLICATION_INDEX,
            tags,
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn child_refs_follow_tag_order() {
        let event = index_event(vec![
            Tag::new(["d", "book"]),
            Tag::new(["e", "abc123"]),
            Tag::new(["title", "Book"]),
            Tag::new(["a", "30040:pub:child-index"]),
            Tag::new(["e", "def456"]),
        ]);

        let refs = event.child_refs();
        assert_eq!(
            refs,
            vec![
                NodeKey::Id("abc123".into()),
                NodeKey::Address(Address::new(30040, "pub", "child-index")),
                NodeKey::Id("def456".into()),
            ]
        );
    }

    #[test]
    fn child_refs_skip_malformed_references() {
        let event = index_event(vec![
            Tag::new(["a", "not-an-address"]),
            Tag::new(["e"]),
            Tag::new(["e", "  "]),
            Tag::new(["a", "30041:pub:ok"]),
        ]);

        assert_eq!(
            event.child_refs(),
            vec![NodeKey::Address(Address::new(30041, "pub", "ok"))]
        );
    }

    #[test]
    fn content_events_have_no_children() {
        let mut event = index_event(vec![Tag::new(["e", "abc123"])]);
        event.kind = kind::PUBLICATION_CONTENT;
        assert!(event.child_refs().is_empty());
    }

    #[test]
    fn address_uses_d_tag() {
        let event = index_event(vec![Tag::new(["d", "book"])]);
        assert_eq!(
            event.address(),
            Some(Address::new(kind::PUBLICATION_INDEX, "pub", "book"))
        );
        assert_eq!(index_event(vec![]).address(), None);
    }

    #[test]
    fn compute_id_is_stable_hex() {
        let event = index_event(vec![Tag::new(["d", "book"])]);
        let id = event.compute_id();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(id, event.compute_id());

        let mut other = event.clone();
        other.content = "changed".into();
        assert_ne!(id, other.compute_id());
    }

    #[test]
    fn tags_serialize_as_plain_arrays() {
        let event = index_event(vec![Tag::new(["e", "abc123"])]);
        let json = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(json["tags"], serde_json::json!([["e", "abc123"]]));

        let back: Event = serde_json::from_value(json).expect("deserialize event");
        assert_eq!(back, event);
    }
}
