use std::fmt;

use crate::db::OrdinalError;
use crate::event::AddressError;
use crate::tree::TraversalError;
use crate::worker::WorkerError;

/// Machine-readable error codes for scripts and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    IndexNotFound,
    ConfigParseError,
    RootNotFound,
    FetchFailed,
    InvalidReference,
    TraversalAborted,
    OrdinalOutOfRange,
    StoreTransactionFailed,
    IndexingFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::IndexNotFound => "E1001",
            Self::ConfigParseError => "E1002",
            Self::RootNotFound => "E2001",
            Self::FetchFailed => "E2002",
            Self::InvalidReference => "E2003",
            Self::TraversalAborted => "E2004",
            Self::OrdinalOutOfRange => "E3001",
            Self::StoreTransactionFailed => "E3002",
            Self::IndexingFailed => "E3003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::IndexNotFound => "Index database not found",
            Self::ConfigParseError => "Config file parse error",
            Self::RootNotFound => "Publication root not found",
            Self::FetchFailed => "Event source unreadable",
            Self::InvalidReference => "Invalid event id or address",
            Self::TraversalAborted => "Traversal aborted",
            Self::OrdinalOutOfRange => "Ordinal out of range",
            Self::StoreTransactionFailed => "Index transaction failed",
            Self::IndexingFailed => "Indexing failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::IndexNotFound => Some("Run `quire index` first, or pass --index <path>."),
            Self::ConfigParseError => Some("Fix syntax in .quire/config.toml and retry."),
            Self::RootNotFound => {
                Some("Check that the root id or kind:pubkey:d address exists in the event source.")
            }
            Self::FetchFailed => Some("Check the events file path and that each line is one JSON event."),
            Self::InvalidReference => Some("Use a hex event id or a kind:pubkey:d address."),
            Self::TraversalAborted => None,
            Self::OrdinalOutOfRange => {
                Some("A parent may reference at most 10,000,000 children; split the index.")
            }
            Self::StoreTransactionFailed => {
                Some("Check disk space and permissions on the index database.")
            }
            Self::IndexingFailed => Some("See the error message; the batch was rolled back."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }

    /// Best-effort classification of an error chain.
    #[must_use]
    pub fn classify(error: &anyhow::Error) -> Self {
        for cause in error.chain() {
            if cause.is::<OrdinalError>() {
                return Self::OrdinalOutOfRange;
            }
            if cause.is::<TraversalError>() {
                return Self::TraversalAborted;
            }
            if cause.is::<AddressError>() {
                return Self::InvalidReference;
            }
            if cause.is::<WorkerError>() {
                return Self::IndexingFailed;
            }
            if cause.is::<toml::de::Error>() {
                return Self::ConfigParseError;
            }
            if cause.is::<rusqlite::Error>() {
                return Self::StoreTransactionFailed;
            }
        }
        Self::InternalUnexpected
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
