// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-based persistence for built index snapshots.
//!
//! A snapshot is written in a single transaction that replaces the previous
//! contents, so another process opening the file sees either the old index
//! or the new one. The `meta` table records the [`IndexVersion`] used to
//! reject indices built from another model or corpus.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::metric::DistanceMetric;
use super::vector::{CorpusEntry, IndexSnapshot, IndexVersion};
use super::SCHEMA_VERSION;
use crate::errors::{Error, Result};
use crate::utils::INDEX_DIR;

/// Default index file name inside the index directory.
pub const INDEX_FILE: &str = "index.sqlite";

/// SQLite-based storage for index snapshots.
///
/// Stores the index in `.exemplar/index.sqlite` by default.
pub struct IndexStore {
    conn: Connection,
    path: PathBuf,
}

impl IndexStore {
    /// Opens or creates an index store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        let store = Self { conn, path };
        store.init_schema()?;

        Ok(store)
    }

    /// Opens an index store in the default location under `root`.
    pub fn open_default<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open(root.as_ref().join(INDEX_DIR).join(INDEX_FILE))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS exemplars (
                seq INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                query_text TEXT NOT NULL,
                output TEXT NOT NULL,
                embedding BLOB NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the storage connection explicitly.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    /// Replaces the stored index with `snapshot` in one transaction.
    pub fn save_snapshot(&mut self, snapshot: &IndexSnapshot) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute_batch(
            r#"
            DELETE FROM exemplars;
            DELETE FROM meta;
            "#,
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO exemplars (seq, id, query_text, output, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;

            for (seq, entry) in snapshot.entries().iter().enumerate() {
                let output = serde_json::to_string(&entry.output)?;
                stmt.execute(params![
                    seq as i64,
                    entry.id,
                    entry.query_text,
                    output,
                    Self::embedding_to_blob(&entry.embedding)
                ])?;
            }
        }

        let version = snapshot.version();
        let meta: [(&str, String); 7] = [
            ("schema_version", version.schema_version.to_string()),
            ("model_id", version.model_id.clone()),
            ("dimension", version.dimension.to_string()),
            ("metric", version.metric.to_string()),
            ("corpus_hash", version.corpus_hash.clone()),
            ("entry_count", version.entry_count.to_string()),
            ("built_at", version.built_at.to_string()),
        ];
        for (key, value) in meta {
            tx.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }

        tx.commit()?;
        debug!(
            "saved {} entries to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Reads the stored index version, or `None` if nothing was saved yet.
    pub fn version(&self) -> Result<Option<IndexVersion>> {
        let Some(schema_version) = self.get_meta("schema_version")? else {
            return Ok(None);
        };

        let schema_version = parse_meta::<u32>("schema_version", &schema_version)?;
        let model_id = self.require_meta("model_id")?;
        let dimension = parse_meta::<usize>("dimension", &self.require_meta("dimension")?)?;
        let metric = self
            .require_meta("metric")?
            .parse::<DistanceMetric>()
            .map_err(Error::StaleIndex)?;
        let corpus_hash = self.require_meta("corpus_hash")?;
        let entry_count = parse_meta::<usize>("entry_count", &self.require_meta("entry_count")?)?;
        let built_at = parse_meta::<i64>("built_at", &self.require_meta("built_at")?)?;

        Ok(Some(IndexVersion {
            schema_version,
            model_id,
            dimension,
            metric,
            corpus_hash,
            entry_count,
            built_at,
        }))
    }

    /// Loads the stored snapshot.
    ///
    /// Fails with [`Error::IndexNotReady`] if no index was ever saved and
    /// with [`Error::StaleIndex`] if the stored layout is from another
    /// schema version or is inconsistent.
    pub fn load_snapshot(&self) -> Result<IndexSnapshot> {
        let version = self.version()?.ok_or(Error::IndexNotReady)?;
        if version.schema_version != SCHEMA_VERSION {
            return Err(Error::StaleIndex(format!(
                "index schema version {} is not supported (expected {}); rebuild the index",
                version.schema_version, SCHEMA_VERSION
            )));
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, query_text, output, embedding
            FROM exemplars
            ORDER BY seq
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let query_text: String = row.get(1)?;
                let output: String = row.get(2)?;
                let embedding: Vec<u8> = row.get(3)?;
                Ok((id, query_text, output, embedding))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let expected_bytes = version.dimension * 4;
        let mut entries = Vec::with_capacity(rows.len());
        for (id, query_text, output, blob) in rows {
            if blob.len() != expected_bytes {
                return Err(Error::StaleIndex(format!(
                    "entry '{}' stores {} bytes of embedding, expected {}",
                    id,
                    blob.len(),
                    expected_bytes
                )));
            }
            entries.push(CorpusEntry {
                id,
                query_text,
                output: serde_json::from_str(&output)?,
                embedding: Self::blob_to_embedding(&blob),
            });
        }

        if entries.len() != version.entry_count {
            return Err(Error::StaleIndex(format!(
                "index lists {} entries but stores {}",
                version.entry_count,
                entries.len()
            )));
        }

        IndexSnapshot::new(version, entries)
            .map_err(|e| Error::StaleIndex(format!("stored index is inconsistent: {}", e)))
    }

    /// Counts stored entries.
    pub fn count_entries(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM exemplars", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Gets metadata value by key.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn require_meta(&self, key: &str) -> Result<String> {
        self.get_meta(key)?
            .ok_or_else(|| Error::StaleIndex(format!("index metadata is missing '{}'", key)))
    }

    /// Converts an embedding vector to a compact blob.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Converts a blob back to an embedding vector.
    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

fn parse_meta<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| Error::StaleIndex(format!("index metadata '{}' is invalid: {}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::vector::tests::{entry, version};
    use tempfile::tempdir;

    fn snapshot() -> IndexSnapshot {
        IndexSnapshot::new(
            version(3),
            vec![
                entry("a", vec![1.0, 0.0, 0.0]),
                entry("b", vec![0.0, 1.0, 0.0]),
                entry("c", vec![0.9, 0.1, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_store_create_and_open() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("index.sqlite");

        let store = IndexStore::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.path(), db_path.as_path());
        store.close().unwrap();

        let store = IndexStore::open(&db_path).unwrap();
        assert!(store.version().unwrap().is_none());
    }

    #[test]
    fn test_load_before_save_is_not_ready() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open_default(dir.path()).unwrap();
        assert!(matches!(store.load_snapshot(), Err(Error::IndexNotReady)));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = IndexStore::open(dir.path().join("index.sqlite")).unwrap();
        let original = snapshot();
        store.save_snapshot(&original).unwrap();

        let loaded = store.load_snapshot().unwrap();
        assert_eq!(loaded.version(), original.version());
        assert_eq!(loaded.entries(), original.entries());
        assert_eq!(store.count_entries().unwrap(), 3);
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let dir = tempdir().unwrap();
        let mut store = IndexStore::open(dir.path().join("index.sqlite")).unwrap();
        store.save_snapshot(&snapshot()).unwrap();

        let smaller = IndexSnapshot::new(version(3), vec![entry("z", vec![0.0, 0.0, 1.0])])
            .unwrap();
        store.save_snapshot(&smaller).unwrap();

        let loaded = store.load_snapshot().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].id, "z");
        assert_eq!(loaded.version().entry_count, 1);
    }

    #[test]
    fn test_schema_mismatch_is_stale() {
        let dir = tempdir().unwrap();
        let mut store = IndexStore::open(dir.path().join("index.sqlite")).unwrap();
        store.save_snapshot(&snapshot()).unwrap();
        store
            .conn
            .execute(
                "UPDATE meta SET value = '999' WHERE key = 'schema_version'",
                [],
            )
            .unwrap();

        assert!(matches!(store.load_snapshot(), Err(Error::StaleIndex(_))));
    }

    #[test]
    fn test_truncated_blob_is_stale() {
        let dir = tempdir().unwrap();
        let mut store = IndexStore::open(dir.path().join("index.sqlite")).unwrap();
        store.save_snapshot(&snapshot()).unwrap();
        store
            .conn
            .execute(
                "UPDATE exemplars SET embedding = x'0000' WHERE id = 'b'",
                [],
            )
            .unwrap();

        assert!(matches!(store.load_snapshot(), Err(Error::StaleIndex(_))));
    }
}
