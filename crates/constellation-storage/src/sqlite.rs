//! SQLite implementation of [`ProgramStore`].
//!
//! [`SqliteStore`] persists program images in a SQLite database with WAL
//! mode and automatic schema migrations. `ProgramImage` is stored whole as
//! a JSON TEXT column via `serde_json` -- there is no relational
//! decomposition to do since an image is immutable once compiled and is
//! never queried field-by-field, only fetched by hash.
//!
//! `ProgramStore`'s methods all take `&self` (to match the concurrent,
//! lock-free `InMemoryStore`), so the single `rusqlite::Connection` is
//! guarded by a `Mutex`; SQLite itself serializes writers regardless, and
//! contention here is no worse than `lmlang-storage`'s own per-write
//! transaction already implied.

use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};

use constellation_compiler::{rehydrate, LoadedProgram, ProgramImage};

use crate::error::StoreError;
use crate::traits::ProgramStore;
use crate::types::{parse_direct_hash_reference, AliasSummary, ImageSummary};

/// SQLite-backed implementation of [`ProgramStore`].
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StoreError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }
}

impl ProgramStore for SqliteStore {
    fn store(&self, image: ProgramImage) -> Result<String, StoreError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let image_json = serde_json::to_string(&image)?;
        conn.execute(
            "INSERT INTO images (structural_hash, program_name, compiled_at_epoch_ms, image_json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(structural_hash) DO UPDATE SET
                program_name = excluded.program_name,
                compiled_at_epoch_ms = excluded.compiled_at_epoch_ms,
                image_json = excluded.image_json",
            params![
                image.structural_hash,
                image.dag.program_name,
                image.compiled_at_epoch_ms as i64,
                image_json,
            ],
        )?;
        Ok(image.structural_hash)
    }

    fn get(&self, structural_hash: &str) -> Option<LoadedProgram> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let image_json: Option<String> = conn
            .query_row(
                "SELECT image_json FROM images WHERE structural_hash = ?1",
                params![structural_hash],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten();
        let image: ProgramImage = serde_json::from_str(&image_json?).ok()?;
        Some(rehydrate(image))
    }

    fn get_by_name(&self, name: &str) -> Option<LoadedProgram> {
        let hash = self.resolve(name)?;
        self.get(&hash)
    }

    fn alias(&self, name: &str, structural_hash: &str) {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let _ = conn.execute(
            "INSERT INTO aliases (name, structural_hash) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET structural_hash = excluded.structural_hash",
            params![name, structural_hash],
        );
    }

    fn resolve(&self, reference: &str) -> Option<String> {
        if let Some(hash) = parse_direct_hash_reference(reference) {
            return Some(hash.to_string());
        }
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.query_row(
            "SELECT structural_hash FROM aliases WHERE name = ?1",
            params![reference],
            |row| row.get(0),
        )
        .optional()
        .ok()
        .flatten()
    }

    fn list_aliases(&self) -> Vec<AliasSummary> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = match conn.prepare("SELECT name, structural_hash FROM aliases ORDER BY name") {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let rows = stmt.query_map([], |row| {
            Ok(AliasSummary { name: row.get(0)?, structural_hash: row.get(1)? })
        });
        match rows {
            Ok(rows) => rows.filter_map(Result::ok).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn list_images(&self) -> Vec<ImageSummary> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = match conn.prepare(
            "SELECT structural_hash, program_name, compiled_at_epoch_ms
             FROM images ORDER BY rowid",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let rows = stmt.query_map([], |row| {
            Ok(ImageSummary {
                structural_hash: row.get(0)?,
                program_name: row.get(1)?,
                compiled_at_epoch_ms: row.get::<_, i64>(2)? as u64,
            })
        });
        match rows {
            Ok(rows) => rows.filter_map(Result::ok).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn remove(&self, structural_hash: &str) {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let _ = conn.execute("DELETE FROM images WHERE structural_hash = ?1", params![structural_hash]);
    }

    fn index_syntactic(&self, syntactic_hash: &str, registry_hash: &str, structural_hash: &str) {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let _ = conn.execute(
            "INSERT INTO syntactic_index (syntactic_hash, registry_hash, structural_hash)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(syntactic_hash, registry_hash) DO UPDATE SET
                structural_hash = excluded.structural_hash",
            params![syntactic_hash, registry_hash, structural_hash],
        );
    }

    fn lookup_syntactic(&self, syntactic_hash: &str, registry_hash: &str) -> Option<String> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.query_row(
            "SELECT structural_hash FROM syntactic_index
             WHERE syntactic_hash = ?1 AND registry_hash = ?2",
            params![syntactic_hash, registry_hash],
            |row| row.get(0),
        )
        .optional()
        .ok()
        .flatten()
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
        let store = SqliteStore::in_memory().unwrap();
        let image = sample_image();
        let hash = store.store(image.clone()).unwrap();
        assert_eq!(hash, image.structural_hash);
        let loaded = store.get(&hash).unwrap();
        assert_eq!(loaded.image.structural_hash, hash);
    }

    #[test]
    fn store_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let image = sample_image();
        let first = store.store(image.clone()).unwrap();
        let second = store.store(image).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_images().len(), 1);
    }

    #[test]
    fn alias_round_trips_and_direct_hash_bypasses_it() {
        let store = SqliteStore::in_memory().unwrap();
        let hash = store.store(sample_image()).unwrap();
        store.alias("latest", &hash);
        assert_eq!(store.resolve("latest"), Some(hash.clone()));
        let direct = format!("sha256:{hash}");
        assert_eq!(store.resolve(&direct), Some(hash.clone()));
        assert_eq!(store.get_by_name("latest").unwrap().image.structural_hash, hash);
    }

    #[test]
    fn remove_cascades_to_aliases_and_syntactic_index() {
        let store = SqliteStore::in_memory().unwrap();
        let hash = store.store(sample_image()).unwrap();
        store.alias("latest", &hash);
        store.index_syntactic("syn", "reg", &hash);
        store.remove(&hash);
        assert!(store.get(&hash).is_none());
        assert!(store.resolve("latest").is_none());
        assert!(store.lookup_syntactic("syn", "reg").is_none());
    }

    #[test]
    fn missing_lookups_return_none() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get("nope").is_none());
        assert!(store.resolve("nope").is_none());
        assert!(store.lookup_syntactic("a", "b").is_none());
    }
}
