//! Event kinds that participate in publication trees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Publication index: an ordered list of child references.
pub const PUBLICATION_INDEX: u32 = 30040;
/// Publication content: one section of text.
pub const PUBLICATION_CONTENT: u32 = 30041;
/// Long-form article.
pub const LONG_FORM: u32 = 30023;
/// Wiki page.
pub const WIKI_PAGE: u32 = 30818;

/// Role of a node in a publication tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// References children via `a`/`e` tags.
    Index,
    /// Leaf holding document text. Any non-index kind is a leaf.
    Content,
}

impl NodeType {
    #[must_use]
    pub const fn from_kind(kind: u32) -> Self {
        if kind == PUBLICATION_INDEX {
            Self::Index
        } else {
            Self::Content
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Content => "content",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
