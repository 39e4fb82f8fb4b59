//! Errors for `constellation-storage`.
//!
//! Per `spec.md` §4.7, "Failure semantics: all lookups return absent rather
//! than erroring" -- so `StoreError` only covers operations that can
//! genuinely fail (persisting, serializing, migrating), never a plain
//! not-found, which every `get`/`resolve`/`lookup_syntactic` models as
//! `Option::None`. Grounded on `lmlang-storage`'s `StorageError`
//! one-enum-per-crate shape, trimmed to the failure modes an
//! image-keyed store (rather than a node/edge/function CRUD store) can hit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("stored image failed rehydration validation: {0}")]
    Rehydration(#[from] constellation_compiler::RehydrateError),
}
