//! Storage Engine
//!
//! Coordinates the WAL and the in-memory state. Every mutation follows
//! the same durability protocol: serialize the record, append it to the
//! log, fsync, and only then apply it in memory. The whole sequence runs
//! under one lock, so a bulk write is visible to other threads entirely
//! or not at all.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rand::Rng;

use super::index::{cosine_similarity, embed, Embedding, InvertedIndex};
use crate::error::Result;
use crate::wal::{replay, Version, WalRecord, WalWriter};

/// Probability that an unreliable set skips its fsync
const UNRELIABLE_SKIP_RATE: f64 = 0.01;

/// Per-write knobs for [`KvEngine::set_with`] and friends
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Skip the fsync with a small probability. Durability-testing aid;
    /// consulted by the set path only.
    pub unreliable: bool,

    /// Coordinator-assigned version for last-writer-wins replication
    pub version: Option<Version>,
}

impl WriteOptions {
    /// Options carrying only a replication version
    pub fn versioned(version: Option<Version>) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }
}

struct EngineInner {
    /// Open log writer; `None` after `close()` until the next mutation
    /// reopens the file in append mode
    wal: Option<WalWriter>,
    kv: HashMap<String, String>,
    inverted: InvertedIndex,
    embeddings: HashMap<String, Embedding>,
    /// Last-writer versions; only touched by versioned mutations
    versions: HashMap<String, Version>,
}

/// Durable key-value store with full-text and embedding search
///
/// Opening an engine replays its WAL; the engine then owns the file
/// append-only until it is dropped or closed. Mutations carrying a
/// version apply under the per-key last-writer-wins rule, which makes
/// the replicated write path idempotent under retries.
pub struct KvEngine {
    path: PathBuf,
    inner: Mutex<EngineInner>,
}

impl KvEngine {
    /// Open the engine backed by the log at `path`, replaying any
    /// existing records
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (records, report) = replay(&path)?;

        let mut inner = EngineInner {
            wal: None,
            kv: HashMap::new(),
            inverted: InvertedIndex::default(),
            embeddings: HashMap::new(),
            versions: HashMap::new(),
        };
        for record in &records {
            Self::apply(&mut inner, record);
        }

        if report.records > 0 || report.truncated {
            tracing::debug!(
                records = report.records,
                truncated = report.truncated,
                wal = %path.display(),
                "replayed write-ahead log"
            );
        }

        inner.wal = Some(WalWriter::open(&path)?);

        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    /// Set a key to a value
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_with(key, value, WriteOptions::default())
    }

    /// Set a key to a value with explicit write options
    pub fn set_with(&self, key: &str, value: &str, opts: WriteOptions) -> Result<()> {
        let mut inner = self.inner.lock();

        if let Some(v) = opts.version {
            if !Self::version_admits(&inner, key, v) {
                // Stale last-writer-wins version: successful no-op.
                return Ok(());
            }
        }

        let record = WalRecord::Set {
            key: key.to_string(),
            value: value.to_string(),
            version: opts.version,
        };
        self.log(&mut inner, &record, opts.unreliable)?;
        Self::apply(&mut inner, &record);
        Ok(())
    }

    /// Get the value for a key
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().kv.get(key).cloned()
    }

    /// Value and last-writer version for `key`; an absent key reads as
    /// no value at version 0
    pub fn fetch(&self, key: &str) -> (Option<String>, Version) {
        let inner = self.inner.lock();
        (
            inner.kv.get(key).cloned(),
            inner.versions.get(key).copied().unwrap_or(0),
        )
    }

    /// Delete a key, returning whether it existed
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.delete_with(key, None)
    }

    /// Delete a key under the per-key last-writer-wins rule
    pub fn delete_with(&self, key: &str, version: Option<Version>) -> Result<bool> {
        let mut inner = self.inner.lock();

        if let Some(v) = version {
            if !Self::version_admits(&inner, key, v) {
                return Ok(false);
            }
        } else if !inner.kv.contains_key(key) {
            // Nothing to remove, nothing to log.
            return Ok(false);
        }

        let record = WalRecord::Delete {
            key: key.to_string(),
            version,
        };
        self.log(&mut inner, &record, false)?;
        Ok(Self::apply_delete(&mut inner, key, version))
    }

    /// Set multiple keys atomically, in listed order; later pairs with
    /// the same key override earlier ones
    pub fn bulk_set(&self, items: &[(String, String)]) -> Result<()> {
        self.bulk_set_with(items, None)
    }

    /// Atomic bulk set carrying one version for the whole batch. Items
    /// with stale versions are skipped; the batch still commits.
    pub fn bulk_set_with(&self, items: &[(String, String)], version: Option<Version>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        let record = WalRecord::BulkSet {
            items: items.to_vec(),
            version,
        };
        self.log(&mut inner, &record, false)?;
        Self::apply(&mut inner, &record);
        Ok(())
    }

    /// Keys whose value tokens are a superset of the query tokens
    pub fn search_full_text(&self, query: &str) -> Vec<String> {
        self.inner.lock().inverted.search(query)
    }

    /// Top-`top_k` keys by cosine similarity against the query
    /// embedding, descending; ties break by key ascending
    pub fn search_embedding(&self, query: &str, top_k: usize) -> Vec<(String, f64)> {
        if top_k == 0 {
            return Vec::new();
        }

        let query_vec = embed(query);
        let mut scored: Vec<(String, f64)> = {
            let inner = self.inner.lock();
            inner
                .embeddings
                .iter()
                .map(|(key, vec)| (key.clone(), cosine_similarity(&query_vec, vec)))
                .collect()
        };

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);
        scored
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.inner.lock().kv.len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush and close the log file. The engine stays usable; the next
    /// mutation reopens the log in append mode.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(mut wal) = inner.wal.take() {
            wal.sync()?;
        }
        Ok(())
    }

    /// Path of the backing WAL file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` to the WAL. Unreliable writes occasionally skip
    /// the fsync; everything else is synced before this returns.
    fn log(&self, inner: &mut EngineInner, record: &WalRecord, unreliable: bool) -> Result<()> {
        if inner.wal.is_none() {
            inner.wal = Some(WalWriter::open(&self.path)?);
        }

        if let Some(wal) = inner.wal.as_mut() {
            if unreliable && rand::thread_rng().gen::<f64>() < UNRELIABLE_SKIP_RATE {
                wal.append(record)?;
                tracing::trace!(op = record.op_name(), "unreliable write skipped fsync");
            } else {
                wal.append_durable(record)?;
            }
        }
        Ok(())
    }

    /// True when a write at `v` wins against the key's recorded version
    fn version_admits(inner: &EngineInner, key: &str, v: Version) -> bool {
        inner.versions.get(key).map_or(true, |current| v > *current)
    }

    /// Apply a record to in-memory state. Replay and the live write path
    /// share this so the log and the store can never diverge.
    fn apply(inner: &mut EngineInner, record: &WalRecord) {
        match record {
            WalRecord::Set {
                key,
                value,
                version,
            } => {
                if version.map_or(true, |v| Self::version_admits(inner, key, v)) {
                    Self::apply_set(inner, key, value, *version);
                }
            }
            WalRecord::Delete { key, version } => {
                if version.map_or(true, |v| Self::version_admits(inner, key, v)) {
                    Self::apply_delete(inner, key, *version);
                }
            }
            WalRecord::BulkSet { items, version } => {
                for (key, value) in items {
                    if version.map_or(true, |v| Self::version_admits(inner, key, v)) {
                        Self::apply_set(inner, key, value, *version);
                    }
                }
            }
        }
    }

    fn apply_set(inner: &mut EngineInner, key: &str, value: &str, version: Option<Version>) {
        if let Some(old) = inner.kv.get(key) {
            inner.inverted.remove(key, old);
        }

        inner.kv.insert(key.to_string(), value.to_string());
        inner.inverted.insert(key, value);
        inner.embeddings.insert(key.to_string(), embed(value));

        if let Some(v) = version {
            inner.versions.insert(key.to_string(), v);
        }
    }

    fn apply_delete(inner: &mut EngineInner, key: &str, version: Option<Version>) -> bool {
        let existed = match inner.kv.remove(key) {
            Some(old) => {
                inner.inverted.remove(key, &old);
                inner.embeddings.remove(key);
                true
            }
            None => false,
        };

        // The version outlives the value, so a reordered older write
        // cannot resurrect a deleted key.
        if let Some(v) = version {
            inner.versions.insert(key.to_string(), v);
        }

        existed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn open_engine(dir: &TempDir) -> KvEngine {
        KvEngine::open(dir.path().join("data.log")).unwrap()
    }

    #[test]
    fn test_set_then_get() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine.set("foo", "bar").unwrap();
        assert_eq!(engine.get("foo"), Some("bar".to_string()));
        assert_eq!(engine.get("missing"), None);
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine.set("k", "v1").unwrap();
        engine.set("k", "v2").unwrap();
        assert_eq!(engine.get("k"), Some("v2".to_string()));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_delete_reports_existence() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine.set("k", "v").unwrap();
        assert!(engine.delete("k").unwrap());
        assert!(!engine.delete("k").unwrap());
        assert_eq!(engine.get("k"), None);
    }

    #[test]
    fn test_bulk_set_later_pairs_override() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine
            .bulk_set(&[
                ("a".to_string(), "1".to_string()),
                ("a".to_string(), "2".to_string()),
                ("b".to_string(), "3".to_string()),
            ])
            .unwrap();

        assert_eq!(engine.get("a"), Some("2".to_string()));
        assert_eq!(engine.get("b"), Some("3".to_string()));
        // The index tracks the final value only.
        assert_eq!(engine.search_full_text("1"), Vec::<String>::new());
        assert_eq!(engine.search_full_text("2"), vec!["a"]);
    }

    #[test]
    fn test_durability_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let engine = open_engine(&dir);
            engine.set("k", "v").unwrap();
            engine
                .bulk_set(&[
                    ("a".to_string(), "1".to_string()),
                    ("b".to_string(), "2".to_string()),
                ])
                .unwrap();
            engine.delete("a").unwrap();
            // Dropped without close(): every ack was already fsynced.
        }

        let engine = open_engine(&dir);
        assert_eq!(engine.get("k"), Some("v".to_string()));
        assert_eq!(engine.get("a"), None);
        assert_eq!(engine.get("b"), Some("2".to_string()));
    }

    #[test]
    fn test_indexes_rebuilt_on_replay() {
        let dir = tempdir().unwrap();
        {
            let engine = open_engine(&dir);
            engine.set("doc1", "python programming language").unwrap();
            engine.set("doc2", "java programming tutorial").unwrap();
        }

        let engine = open_engine(&dir);
        assert_eq!(engine.search_full_text("programming"), vec!["doc1", "doc2"]);
        let results = engine.search_embedding("python", 1);
        assert_eq!(results[0].0, "doc1");
    }

    #[test]
    fn test_replay_twice_yields_identical_state() {
        let dir = tempdir().unwrap();
        {
            let engine = open_engine(&dir);
            engine.set("a", "alpha beta").unwrap();
            engine.set("b", "gamma").unwrap();
            engine.delete("b").unwrap();
        }

        let first = open_engine(&dir);
        let first_state = (first.get("a"), first.get("b"), first.len());
        drop(first);

        let second = open_engine(&dir);
        assert_eq!(
            (second.get("a"), second.get("b"), second.len()),
            first_state
        );
    }

    #[test]
    fn test_engine_usable_after_close() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine.set("before", "close").unwrap();
        engine.close().unwrap();
        engine.set("after", "close").unwrap();

        drop(engine);
        let engine = open_engine(&dir);
        assert_eq!(engine.get("before"), Some("close".to_string()));
        assert_eq!(engine.get("after"), Some("close".to_string()));
    }

    #[test]
    fn test_versioned_write_is_last_writer_wins() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine
            .set_with("k", "newer", WriteOptions::versioned(Some(2)))
            .unwrap();
        engine
            .set_with("k", "older", WriteOptions::versioned(Some(1)))
            .unwrap();

        assert_eq!(engine.get("k"), Some("newer".to_string()));
        assert_eq!(engine.fetch("k"), (Some("newer".to_string()), 2));
    }

    #[test]
    fn test_versioned_write_idempotent() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine
            .set_with("k", "v", WriteOptions::versioned(Some(5)))
            .unwrap();
        engine
            .set_with("k", "replayed", WriteOptions::versioned(Some(5)))
            .unwrap();

        assert_eq!(engine.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_versions_survive_replay() {
        let dir = tempdir().unwrap();
        {
            let engine = open_engine(&dir);
            engine
                .set_with("k", "v5", WriteOptions::versioned(Some(5)))
                .unwrap();
        }

        let engine = open_engine(&dir);
        assert_eq!(engine.fetch("k"), (Some("v5".to_string()), 5));

        engine
            .set_with("k", "v3", WriteOptions::versioned(Some(3)))
            .unwrap();
        assert_eq!(engine.get("k"), Some("v5".to_string()));
    }

    #[test]
    fn test_versioned_delete_blocks_older_write() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine
            .set_with("k", "v", WriteOptions::versioned(Some(1)))
            .unwrap();
        assert!(engine.delete_with("k", Some(3)).unwrap());

        // A reordered write older than the delete must not resurrect it.
        engine
            .set_with("k", "ghost", WriteOptions::versioned(Some(2)))
            .unwrap();
        assert_eq!(engine.get("k"), None);
    }

    #[test]
    fn test_stale_versioned_delete_is_noop() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine
            .set_with("k", "v", WriteOptions::versioned(Some(4)))
            .unwrap();
        assert!(!engine.delete_with("k", Some(2)).unwrap());
        assert_eq!(engine.get("k"), Some("v".to_string()));
    }

    #[test]
    fn test_versioned_bulk_skips_stale_items_only() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine
            .set_with("a", "pinned", WriteOptions::versioned(Some(10)))
            .unwrap();
        engine
            .bulk_set_with(
                &[
                    ("a".to_string(), "stale".to_string()),
                    ("b".to_string(), "fresh".to_string()),
                ],
                Some(5),
            )
            .unwrap();

        assert_eq!(engine.get("a"), Some("pinned".to_string()));
        assert_eq!(engine.get("b"), Some("fresh".to_string()));
    }

    #[test]
    fn test_unreliable_set_still_visible_in_memory() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        for i in 0..50 {
            engine
                .set_with(
                    &format!("k{i}"),
                    "v",
                    WriteOptions {
                        unreliable: true,
                        version: None,
                    },
                )
                .unwrap();
        }

        assert_eq!(engine.len(), 50);
    }

    #[test]
    fn test_search_scenarios() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine.set("doc1", "python programming language").unwrap();
        engine.set("doc2", "java programming tutorial").unwrap();
        engine.set("doc3", "machine learning with python").unwrap();

        assert_eq!(engine.search_full_text("python programming"), vec!["doc1"]);
        assert_eq!(engine.search_full_text("programming"), vec!["doc1", "doc2"]);

        let results = engine.search_embedding("python", 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "doc1");
        assert_eq!(results[1].0, "doc3");
        assert!(results[0].1 > results[1].1);
        assert!(results[1].1 > 0.0);
    }

    #[test]
    fn test_search_embedding_tie_breaks_by_key() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine.set("zebra", "same words").unwrap();
        engine.set("apple", "same words").unwrap();

        let results = engine.search_embedding("same words", 2);
        assert_eq!(results[0].0, "apple");
        assert_eq!(results[1].0, "zebra");
    }

    #[test]
    fn test_search_embedding_zero_top_k() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine.set("k", "v").unwrap();
        assert!(engine.search_embedding("v", 0).is_empty());
    }

    #[test]
    fn test_delete_removes_from_indexes() {
        let dir = tempdir().unwrap();
        let engine = open_engine(&dir);

        engine.set("doc", "searchable words").unwrap();
        engine.delete("doc").unwrap();

        assert!(engine.search_full_text("searchable").is_empty());
        assert!(engine.search_embedding("searchable words", 5).is_empty());
    }

    #[test]
    fn test_bulk_set_visible_all_or_nothing() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(open_engine(&dir));

        let writer = Arc::clone(&engine);
        let handle = std::thread::spawn(move || {
            for _ in 0..200 {
                writer
                    .bulk_set(&[
                        ("a".to_string(), "1".to_string()),
                        ("b".to_string(), "2".to_string()),
                        ("c".to_string(), "3".to_string()),
                    ])
                    .unwrap();
            }
        });

        // Sample in reverse write order: once the last key of the batch
        // is visible, the whole batch must already be applied.
        for _ in 0..500 {
            if engine.get("c").is_some() {
                assert!(engine.get("b").is_some());
                assert!(engine.get("a").is_some());
            }
        }

        handle.join().unwrap();
        assert_eq!(engine.get("a"), Some("1".to_string()));
        assert_eq!(engine.get("b"), Some("2".to_string()));
        assert_eq!(engine.get("c"), Some("3".to_string()));
    }

    #[test]
    fn test_concurrent_bulk_sets_do_not_interleave() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(open_engine(&dir));
        let keys: Vec<String> = (0..5).map(|i| format!("k{i}")).collect();

        let mut handles = Vec::new();
        for value in ["v1", "v2"] {
            let engine = Arc::clone(&engine);
            let items: Vec<(String, String)> = keys
                .iter()
                .map(|k| (k.clone(), value.to_string()))
                .collect();
            handles.push(std::thread::spawn(move || {
                for _ in 0..20 {
                    engine.bulk_set(&items).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every key ends with the same value: one whole bulk write won.
        let values: std::collections::HashSet<Option<String>> =
            keys.iter().map(|k| engine.get(k)).collect();
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_concurrent_writers_replay_to_final_state() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(open_engine(&dir));

        let mut handles = Vec::new();
        for t in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    engine
                        .set(&format!("t{t}_k{i}"), &format!("value {t} {i}"))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let expected: Vec<(String, Option<String>)> = (0..4)
            .flat_map(|t| (0..25).map(move |i| format!("t{t}_k{i}")))
            .map(|k| (k.clone(), engine.get(&k)))
            .collect();
        drop(engine);

        let reopened = KvEngine::open(dir.path().join("data.log")).unwrap();
        assert_eq!(reopened.len(), 100);
        for (key, value) in expected {
            assert_eq!(reopened.get(&key), value);
        }
    }

    #[test]
    fn test_torn_trailing_record_ignored_at_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.log");
        std::fs::write(
            &path,
            "{\"op\":\"set\",\"key\":\"k\",\"value\":\"v\"}\n{\"op\":\"set\",\"ke",
        )
        .unwrap();

        let engine = KvEngine::open(&path).unwrap();
        assert_eq!(engine.get("k"), Some("v".to_string()));
        assert_eq!(engine.len(), 1);

        // The engine appends cleanly after the truncated tail.
        engine.set("k2", "v2").unwrap();
        drop(engine);
        let engine = KvEngine::open(&path).unwrap();
        assert_eq!(engine.get("k2"), Some("v2".to_string()));
    }
}
