//! SQLite staging store for raw entries
//!
//! Entries are collected here in any order, deduplicated, and then read back
//! sorted by name to feed the tree builder. Rows are buffered and inserted
//! in one transaction per batch.

use crate::config::BuildConfig;
use crate::error::{DictError, Result};
use crate::io::NodeSource;
use crate::tree::{TreeBuilder, TreeReader};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Rows buffered before a flush
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Which column holds the values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawKind {
    /// UTF-8 definitions
    Text,
    /// Resource blobs
    Binary,
}

impl RawKind {
    fn column(&self) -> &'static str {
        match self {
            RawKind::Text => "text",
            RawKind::Binary => "binary",
        }
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS entry (
        id     INTEGER PRIMARY KEY AUTOINCREMENT,
        name   TEXT NOT NULL,
        text   TEXT,
        binary BLOB
    );
    CREATE INDEX IF NOT EXISTS entry_name_idx ON entry (name);
";

pub struct RawStore {
    kind: RawKind,
    conn: Connection,
    pending: Vec<(String, Vec<u8>)>,
    batch_size: usize,
}

impl RawStore {
    fn with_connection(conn: Connection, kind: RawKind) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(RawStore {
            kind,
            conn,
            pending: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Create a store file, or reuse the table if it already exists
    pub fn create<P: AsRef<Path>>(path: P, kind: RawKind) -> Result<Self> {
        info!("Creating {:?} staging store at {:?}", kind, path.as_ref());
        Self::with_connection(Connection::open(path)?, kind)
    }

    /// Open an existing store file
    pub fn open<P: AsRef<Path>>(path: P, kind: RawKind) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DictError::NotFound(format!("staging store {:?}", path)));
        }
        info!("Opening staging store at {:?}", path);
        Self::with_connection(Connection::open(path)?, kind)
    }

    pub fn in_memory(kind: RawKind) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, kind)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn kind(&self) -> RawKind {
        self.kind
    }

    /// Queue one entry; flushes when the batch is full
    pub fn insert(&mut self, name: &str, value: &[u8]) -> Result<()> {
        if self.kind == RawKind::Text && std::str::from_utf8(value).is_err() {
            return Err(DictError::InvalidInput(format!(
                "text value for {:?} is not utf-8",
                name
            )));
        }
        self.pending.push((name.to_string(), value.to_vec()));
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write buffered rows in one transaction
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let sql = format!("INSERT INTO entry (name, {}) VALUES (?1, ?2)", self.kind.column());
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for (name, value) in &self.pending {
                match self.kind {
                    RawKind::Text => {
                        let text = String::from_utf8_lossy(value);
                        stmt.execute(params![name, text.as_ref()])?;
                    }
                    RawKind::Binary => {
                        stmt.execute(params![name, value])?;
                    }
                };
            }
        }
        tx.commit()?;

        debug!("Flushed {} staged rows", self.pending.len());
        self.pending.clear();
        Ok(())
    }

    /// Stored plus buffered rows
    pub fn total(&self) -> Result<u64> {
        let stored: i64 = self
            .conn
            .query_row("SELECT count(*) FROM entry", [], |row| row.get(0))?;
        Ok(stored as u64 + self.pending.len() as u64)
    }

    /// Names stored more than once, with their counts
    pub fn duplicate_names(&mut self) -> Result<Vec<(String, u64)>> {
        self.flush()?;
        let mut stmt = self.conn.prepare(
            "SELECT name, count(*) FROM entry GROUP BY name HAVING count(*) > 1 ORDER BY name",
        )?;
        let duplicates = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if !duplicates.is_empty() {
            warn!("Staging store holds {} duplicated names", duplicates.len());
        }
        Ok(duplicates)
    }

    /// Keep only the most recently inserted row per name
    pub fn dedup_keep_latest(&mut self) -> Result<usize> {
        self.flush()?;
        let removed = self.conn.execute(
            "DELETE FROM entry WHERE id NOT IN (SELECT max(id) FROM entry GROUP BY name)",
            [],
        )?;
        debug!("Removed {} duplicate rows", removed);
        Ok(removed)
    }

    /// Visit every row in byte order of name
    ///
    /// Text names compare with SQLite's BINARY collation, which for UTF-8
    /// is byte order. Returns the number of rows visited.
    pub fn for_each_sorted<F>(&mut self, mut visit: F) -> Result<u64>
    where
        F: FnMut(String, Vec<u8>) -> Result<()>,
    {
        self.flush()?;
        let kind = self.kind;
        let sql = format!(
            "SELECT name, {} FROM entry ORDER BY name, id",
            kind.column()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut visited = 0u64;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let value = match kind {
                RawKind::Text => row.get::<_, Option<String>>(1)?.map(String::into_bytes),
                RawKind::Binary => row.get::<_, Option<Vec<u8>>>(1)?,
            }
            .unwrap_or_default();
            visit(name, value)?;
            visited += 1;
        }
        Ok(visited)
    }

    /// Feed all rows, sorted, into a fresh tree builder
    ///
    /// Fails with `DuplicateKey` unless the store was deduplicated first.
    pub fn tree_builder(&mut self, config: &BuildConfig) -> Result<TreeBuilder> {
        let mut builder = TreeBuilder::new(config)?;
        self.for_each_sorted(|name, value| builder.push(name, value))?;
        Ok(builder)
    }

    /// Stage every entry of a built tree
    pub fn import_tree<S: NodeSource>(&mut self, tree: &TreeReader<'_, S>) -> Result<u64> {
        let mut imported = 0u64;
        for entry in tree.iter() {
            let (key, value) = entry?;
            let name = String::from_utf8(key)
                .map_err(|e| DictError::InvalidInput(format!("entry name is not utf-8: {}", e)))?;
            self.insert(&name, &value)?;
            imported += 1;
        }
        self.flush()?;
        info!("Imported {} entries into staging", imported);
        Ok(imported)
    }
}

impl Drop for RawStore {
    fn drop(&mut self) {
        let staged = self.pending.len();
        if let Err(e) = self.flush() {
            warn!("Failed to flush {} staged rows on drop: {}", staged, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(store: &mut RawStore) -> Vec<(String, Vec<u8>)> {
        let mut rows = Vec::new();
        store
            .for_each_sorted(|name, value| {
                rows.push((name, value));
                Ok(())
            })
            .unwrap();
        rows
    }

    #[test]
    fn test_batched_insert_and_total() {
        let mut store = RawStore::in_memory(RawKind::Text).unwrap();
        for i in 0..450 {
            store.insert(&format!("word{}", i), b"definition").unwrap();
        }
        // Two full batches written, 50 rows still buffered
        assert_eq!(store.total().unwrap(), 450);
        let stored: i64 = store
            .conn
            .query_row("SELECT count(*) FROM entry", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, 400);

        store.flush().unwrap();
        assert_eq!(store.total().unwrap(), 450);
    }

    #[test]
    fn test_sorted_by_bytes() {
        let mut store = RawStore::in_memory(RawKind::Text).unwrap();
        for name in ["banana", "Zebra", "apple", "éclair"] {
            store.insert(name, name.as_bytes()).unwrap();
        }
        let names: Vec<String> = collect(&mut store).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["Zebra", "apple", "banana", "éclair"]);
    }

    #[test]
    fn test_dedup_keeps_latest() {
        let mut store = RawStore::in_memory(RawKind::Binary).unwrap();
        store.insert("a", &[1]).unwrap();
        store.insert("b", &[2]).unwrap();
        store.insert("a", &[3]).unwrap();
        store.insert("a", &[4]).unwrap();

        assert_eq!(store.duplicate_names().unwrap(), vec![("a".to_string(), 3)]);
        assert!(store.tree_builder(&BuildConfig::default()).is_err());

        assert_eq!(store.dedup_keep_latest().unwrap(), 2);
        assert!(store.duplicate_names().unwrap().is_empty());
        assert_eq!(
            collect(&mut store),
            vec![("a".to_string(), vec![4]), ("b".to_string(), vec![2])]
        );

        let builder = store.tree_builder(&BuildConfig::default()).unwrap();
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_text_store_rejects_binary() {
        let mut store = RawStore::in_memory(RawKind::Text).unwrap();
        assert!(matches!(
            store.insert("bad", &[0xFF, 0xFE]),
            Err(DictError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_file_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.db");

        {
            let mut store = RawStore::create(&path, RawKind::Text).unwrap();
            store.insert("kept", b"value").unwrap();
            store.flush().unwrap();
        }

        let mut store = RawStore::open(&path, RawKind::Text).unwrap();
        assert_eq!(collect(&mut store), vec![("kept".to_string(), b"value".to_vec())]);

        assert!(matches!(
            RawStore::open(dir.path().join("missing.db"), RawKind::Text),
            Err(DictError::NotFound(_))
        ));
    }

    #[test]
    fn test_drop_flushes_pending_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.db");

        {
            let mut store = RawStore::create(&path, RawKind::Text).unwrap().with_batch_size(200);
            for i in 0..150 {
                store.insert(&format!("word{:03}", i), b"definition").unwrap();
            }
            assert_eq!(store.pending.len(), 150);
        }

        let mut store = RawStore::open(&path, RawKind::Text).unwrap();
        assert_eq!(store.total().unwrap(), 150);
        assert_eq!(collect(&mut store)[149].0, "word149");
    }
}
