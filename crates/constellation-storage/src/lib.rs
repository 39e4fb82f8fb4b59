//! The Program Store (`spec.md` §4.7): a content-addressed store for
//! compiled program images, keyed by structural hash, with a mutable
//! alias table and a compile-cache index from source/registry hash pairs
//! back to the structural hash they produced.
//!
//! # Modules
//!
//! - [`error`]: `StoreError` -- the failure modes a persist/migrate call
//!   can hit; lookups never error, they return `None`.
//! - [`types`]: `ImageSummary`, `AliasSummary`, direct-hash-reference
//!   parsing.
//! - [`traits`]: the [`ProgramStore`] trait definition.
//! - [`memory`]: [`InMemoryStore`], a `dashmap`-backed implementation.
//! - [`schema`]: SQL schema constants and migration setup.
//! - [`sqlite`]: [`SqliteStore`] implementation.

pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::ProgramStore;
pub use types::{AliasSummary, ImageSummary};
