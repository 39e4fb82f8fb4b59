//! The [`ProgramStore`] trait: the storage contract `spec.md` §4.7
//! specifies for a content-addressed program image store. Grounded on
//! `lmlang-storage`'s `GraphStore` trait shape (one trait, multiple swappable
//! backends, synchronous since a single process-wide keyed map needs no
//! async I/O) -- generalized here from node/edge/function CRUD to
//! whole-image store/alias/syntactic-index operations, since Constellation
//! has no incremental per-node save path (`DagSpec` is immutable once
//! compiled, per `spec.md` §3 lifecycle).

use constellation_compiler::{LoadedProgram, ProgramImage};

use crate::error::StoreError;
use crate::types::{AliasSummary, ImageSummary};

/// The Program Store contract (`spec.md` §4.7). All lookup operations
/// return `Option`/empty rather than an error on a miss -- "Failure
/// semantics: all lookups return absent rather than erroring."
pub trait ProgramStore {
    /// Stores `image`, keyed by its own `structural_hash`. Idempotent:
    /// storing the same structural hash twice overwrites with identical
    /// content and returns the same hash.
    fn store(&self, image: ProgramImage) -> Result<String, StoreError>;

    /// Loads a stored image by structural hash and rehydrates it into a
    /// `LoadedProgram` (branch-only synthetic module reconstruction,
    /// `spec.md` §4.6). `None` if no image with that hash is stored.
    fn get(&self, structural_hash: &str) -> Option<LoadedProgram>;

    /// Looks up a stored image by alias name. `None` if the alias is
    /// unregistered or points at a hash no longer stored.
    fn get_by_name(&self, name: &str) -> Option<LoadedProgram>;

    /// Registers `name` as an alias for `structural_hash`. Overwrites any
    /// prior alias with the same name.
    fn alias(&self, name: &str, structural_hash: &str);

    /// Resolves an alias name to its structural hash, or, if `reference`
    /// is of the form `sha256:<hex>`, returns the hex part directly without
    /// consulting the alias table (`spec.md` §4.7).
    fn resolve(&self, reference: &str) -> Option<String>;

    fn list_aliases(&self) -> Vec<AliasSummary>;

    fn list_images(&self) -> Vec<ImageSummary>;

    /// Removes a stored image and any aliases pointing at it.
    fn remove(&self, structural_hash: &str);

    /// Records that compiling `syntactic_hash` against `registry_hash`
    /// produced `structural_hash`, enabling O(1) compile-cache lookups
    /// (`spec.md` §4.6).
    fn index_syntactic(&self, syntactic_hash: &str, registry_hash: &str, structural_hash: &str);

    /// Looks up a prior compile-cache hit for `(syntactic_hash,
    /// registry_hash)`.
    fn lookup_syntactic(&self, syntactic_hash: &str, registry_hash: &str) -> Option<String>;
}
