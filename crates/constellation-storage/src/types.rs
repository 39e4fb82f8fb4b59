//! Reference-string parsing and summary types for the Program Store
//! (`spec.md` §4.7).
//!
//! `ProgramId` (a storage-layer-only identity for a generic program graph)
//! has no Constellation counterpart: programs here are identified by their
//! content -- the structural hash -- not by an assigned row id, so there is
//! nothing to allocate on first save.

use serde::{Deserialize, Serialize};

/// A `store()`/`list_images()` entry: just enough to list known programs
/// without loading each full `ProgramImage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSummary {
    pub structural_hash: String,
    pub program_name: String,
    pub compiled_at_epoch_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasSummary {
    pub name: String,
    pub structural_hash: String,
}

/// A reference string of the form `sha256:<hex>` bypasses alias resolution
/// (`spec.md` §4.7). Returns the bare hex hash when the prefix matches,
/// `None` otherwise (callers then treat the string as an alias name).
pub fn parse_direct_hash_reference(reference: &str) -> Option<&str> {
    reference.strip_prefix("sha256:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_hash_reference_strips_prefix() {
        assert_eq!(parse_direct_hash_reference("sha256:abcd"), Some("abcd"));
    }

    #[test]
    fn bare_name_is_not_a_direct_reference() {
        assert_eq!(parse_direct_hash_reference("my-alias"), None);
    }
}
