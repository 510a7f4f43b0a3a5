//! Addressable-event coordinates and node keys.
//!
//! An [`Address`] names the *latest* version of an addressable event by
//! `(kind, pubkey, d)`. It must be resolved to a concrete event id before it
//! denotes an immutable node. A [`NodeKey`] is whichever of the two forms a
//! parent used to reference a child.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::kind::NodeType;

/// Error returned when parsing a malformed `kind:pubkey:d` coordinate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Fewer than three `:`-separated parts.
    #[error("address '{0}' is not of the form kind:pubkey:d")]
    MissingParts(String),
    /// The kind component is not an unsigned integer.
    #[error("address '{raw}' has a non-numeric kind '{kind}'")]
    InvalidKind { raw: String, kind: String },
    /// The pubkey component is empty.
    #[error("address '{0}' has an empty pubkey")]
    EmptyPubkey(String),
}

/// `(kind, pubkey, d-tag)` coordinate of an addressable event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub kind: u32,
    pub pubkey: String,
    /// The `d` tag value. May contain `:`.
    pub d: String,
}

impl Address {
    pub fn new(kind: u32, pubkey: impl Into<String>, d: impl Into<String>) -> Self {
        Self {
            kind,
            pubkey: pubkey.into(),
            d: d.into(),
        }
    }

    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        NodeType::from_kind(self.kind)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.pubkey, self.d)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(kind), Some(pubkey), Some(d)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AddressError::MissingParts(s.to_string()));
        };

        let kind = kind
            .trim()
            .parse::<u32>()
            .map_err(|_| AddressError::InvalidKind {
                raw: s.to_string(),
                kind: kind.to_string(),
            })?;

        if pubkey.trim().is_empty() {
            return Err(AddressError::EmptyPubkey(s.to_string()));
        }

        Ok(Self::new(kind, pubkey.trim(), d))
    }
}

/// How a parent refers to a child: by immutable id or by address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum NodeKey {
    Id(String),
    Address(Address),
}

impl NodeKey {
    /// The event id, when this key is already concrete.
    #[must_use]
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            Self::Address(_) => None,
        }
    }

    #[must_use]
    pub const fn as_address(&self) -> Option<&Address> {
        match self {
            Self::Id(_) => None,
            Self::Address(address) => Some(address),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => f.write_str(id),
            Self::Address(address) => address.fmt(f),
        }
    }
}

impl FromStr for NodeKey {
    type Err = AddressError;

    /// Strings containing `:` are parsed as addresses; anything else is an id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.contains(':') {
            trimmed.parse().map(Self::Address)
        } else {
            Ok(Self::Id(trimmed.to_string()))
        }
    }
}

impl From<Address> for NodeKey {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_through_display() {
        let address: Address = "30040:pub:child-index".parse().expect("parse");
        assert_eq!(address, Address::new(30040, "pub", "child-index"));
        assert_eq!(address.to_string(), "30040:pub:child-index");
    }

    #[test]
    fn d_tag_may_contain_colons() {
        let address: Address = "30041:pub:chapter:1".parse().expect("parse");
        assert_eq!(address.d, "chapter:1");
    }

    #[test]
    fn empty_d_tag_is_allowed() {
        let address: Address = "30041:pub:".parse().expect("parse");
        assert_eq!(address.d, "");
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert!(matches!(
            "30040:pub".parse::<Address>(),
            Err(AddressError::MissingParts(_))
        ));
        assert!(matches!(
            "book:pub:d".parse::<Address>(),
            Err(AddressError::InvalidKind { .. })
        ));
        assert!(matches!(
            "30040::d".parse::<Address>(),
            Err(AddressError::EmptyPubkey(_))
        ));
    }

    #[test]
    fn node_key_parse_distinguishes_forms() {
        assert_eq!(
            "abc123".parse::<NodeKey>().expect("id"),
            NodeKey::Id("abc123".into())
        );
        assert_eq!(
            "30040:pub:book".parse::<NodeKey>().expect("address"),
            NodeKey::Address(Address::new(30040, "pub", "book"))
        );
        assert!("nonsense:".parse::<NodeKey>().is_err());
    }
}
