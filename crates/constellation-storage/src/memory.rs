//! A process-local, concurrent `ProgramStore` backed by `dashmap`.
//!
//! Grounded on `lmlang-storage`'s `InMemoryStore` (one `DashMap` per logical
//! table, atomic per-key, no cross-key transactionality) -- which matches
//! `spec.md` §5's "reads and writes must be atomic per key but need no
//! cross-key transactionality" verbatim, so the sharded-lock structure
//! carries over unchanged; only the table shapes are new.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use constellation_compiler::{rehydrate, LoadedProgram, ProgramImage};

use crate::error::StoreError;
use crate::traits::ProgramStore;
use crate::types::{parse_direct_hash_reference, AliasSummary, ImageSummary};

/// In-memory `ProgramStore`. Cheap to construct, never persists across
/// process restarts -- intended for tests and single-run CLI invocations
/// that don't pass `--db`.
#[derive(Default)]
pub struct InMemoryStore {
    images: DashMap<String, ProgramImage>,
    aliases: DashMap<String, String>,
    syntactic_index: DashMap<(String, String), String>,
    insertion_counter: AtomicU64,
    insertion_order: DashMap<String, u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgramStore for InMemoryStore {
    fn store(&self, image: ProgramImage) -> Result<String, StoreError> {
        let hash = image.structural_hash.clone();
        if !self.images.contains_key(&hash) {
            let order = self.insertion_counter.fetch_add(1, Ordering::SeqCst);
            self.insertion_order.insert(hash.clone(), order);
        }
        self.images.insert(hash.clone(), image);
        Ok(hash)
    }

    fn get(&self, structural_hash: &str) -> Option<LoadedProgram> {
        let image = self.images.get(structural_hash)?.clone();
        Some(rehydrate(image))
    }

    fn get_by_name(&self, name: &str) -> Option<LoadedProgram> {
        let hash = self.resolve(name)?;
        self.get(&hash)
    }

    fn alias(&self, name: &str, structural_hash: &str) {
        self.aliases.insert(name.to_string(), structural_hash.to_string());
    }

    fn resolve(&self, reference: &str) -> Option<String> {
        if let Some(hash) = parse_direct_hash_reference(reference) {
            return Some(hash.to_string());
        }
        self.aliases.get(reference).map(|entry| entry.value().clone())
    }

    fn list_aliases(&self) -> Vec<AliasSummary> {
        self.aliases
            .iter()
            .map(|entry| AliasSummary {
                name: entry.key().clone(),
                structural_hash: entry.value().clone(),
            })
            .collect()
    }

    fn list_images(&self) -> Vec<ImageSummary> {
        let mut summaries: Vec<(u64, ImageSummary)> = self
            .images
            .iter()
            .map(|entry| {
                let image = entry.value();
                let order = self
                    .insertion_order
                    .get(entry.key())
                    .map(|o| *o)
                    .unwrap_or(u64::MAX);
                (
                    order,
                    ImageSummary {
                        structural_hash: image.structural_hash.clone(),
                        program_name: image.dag.program_name.clone(),
                        compiled_at_epoch_ms: image.compiled_at_epoch_ms,
                    },
                )
            })
            .collect();
        summaries.sort_by_key(|(order, _)| *order);
        summaries.into_iter().map(|(_, summary)| summary).collect()
    }

    fn remove(&self, structural_hash: &str) {
        self.images.remove(structural_hash);
        self.insertion_order.remove(structural_hash);
        self.aliases.retain(|_, hash| hash != structural_hash);
        self.syntactic_index.retain(|_, hash| hash != structural_hash);
    }

    fn index_syntactic(&self, syntactic_hash: &str, registry_hash: &str, structural_hash: &str) {
        self.syntactic_index.insert(
            (syntactic_hash.to_string(), registry_hash.to_string()),
            structural_hash.to_string(),
        );
    }

    fn lookup_syntactic(&self, syntactic_hash: &str, registry_hash: &str) -> Option<String> {
        self.syntactic_index
            .get(&(syntactic_hash.to_string(), registry_hash.to_string()))
            .map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_check::FunctionRegistry;
    use constellation_compiler::compile;

    fn sample_image() -> ProgramImage {
        let registry = FunctionRegistry::new();
        let loaded = compile("in x: Int\nout x", "sample", &registry).unwrap();
        loaded.image
    }

    #[test]
    fn store_then_get_round_trips() {
        let store = InMemoryStore::new();
        let image = sample_image();
        let hash = store.store(image.clone()).unwrap();
        assert_eq!(hash, image.structural_hash);
        let loaded = store.get(&hash).unwrap();
        assert_eq!(loaded.image.structural_hash, hash);
    }

    #[test]
    fn store_is_idempotent() {
        let store = InMemoryStore::new();
        let image = sample_image();
        let first = store.store(image.clone()).unwrap();
        let second = store.store(image).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_images().len(), 1);
    }

    #[test]
    fn alias_resolves_to_hash() {
        let store = InMemoryStore::new();
        let hash = store.store(sample_image()).unwrap();
        store.alias("latest", &hash);
        assert_eq!(store.resolve("latest"), Some(hash.clone()));
        assert_eq!(store.get_by_name("latest").unwrap().image.structural_hash, hash);
    }

    #[test]
    fn direct_hash_reference_bypasses_alias_table() {
        let store = InMemoryStore::new();
        let hash = store.store(sample_image()).unwrap();
        let direct = format!("sha256:{hash}");
        assert_eq!(store.resolve(&direct), Some(hash));
    }

    #[test]
    fn missing_lookups_return_none_not_error() {
        let store = InMemoryStore::new();
        assert!(store.get("does-not-exist").is_none());
        assert!(store.resolve("no-such-alias").is_none());
        assert!(store.lookup_syntactic("x", "y").is_none());
    }

    #[test]
    fn remove_drops_image_and_its_aliases() {
        let store = InMemoryStore::new();
        let hash = store.store(sample_image()).unwrap();
        store.alias("latest", &hash);
        store.remove(&hash);
        assert!(store.get(&hash).is_none());
        assert!(store.resolve("latest").is_none());
    }

    #[test]
    fn syntactic_index_round_trips() {
        let store = InMemoryStore::new();
        let hash = store.store(sample_image()).unwrap();
        store.index_syntactic("syn123", "reg456", &hash);
        assert_eq!(store.lookup_syntactic("syn123", "reg456"), Some(hash));
        assert!(store.lookup_syntactic("syn123", "other-reg").is_none());
    }
}
