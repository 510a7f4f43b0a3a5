//! quire-core library.
//!
//! A publication is a root index event whose `a`/`e` tags point, in order, at
//! nested indices or content leaves. This crate provides:
//!
//! - [`tree`]: a lazily resolved [`tree::PublicationTree`] with `All`,
//!   `Linear` and `Seek` traversals over an unreliable [`fetch::Fetcher`].
//! - [`db`]: the SQLite ordinal metadata index (`metadata` + `ordinals`).
//! - [`worker`]: the background thread that turns event batches into index
//!   rows.
//! - [`service`]: the orchestrator that walks trees, suppresses duplicate
//!   work, and broadcasts indexing progress.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types where appropriate;
//!   domain errors are `thiserror` enums.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod fetch;
pub mod lazy;
pub mod service;
pub mod tree;
pub mod worker;

pub use event::{Address, Event, NodeKey, Tag};
pub use fetch::Fetcher;
pub use lazy::Lazy;
pub use service::{IndexOutcome, IndexService};
pub use tree::{PublicationTree, TraversalMode, Visit};
