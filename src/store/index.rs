//! Search Indexes
//!
//! Derived, in-memory indexes over the key-value map: an inverted
//! full-text index and a fixed-dimension bag-of-words embedding. Neither
//! is persisted; both are rebuilt from the WAL at open.

use std::collections::{HashMap, HashSet};

/// Dimension of the bag-of-words embedding vectors
pub const EMBEDDING_DIM: usize = 16;

/// A bag-of-words embedding: token counts bucketed by hash
pub type Embedding = [u32; EMBEDDING_DIM];

/// Split `text` into lowercase alphanumeric tokens.
///
/// A token is a maximal run of alphanumeric characters; everything else
/// (whitespace, punctuation, underscores) separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// FNV-1a 64-bit. The offset basis and prime are written out so bucket
/// assignment is identical on every platform and run.
fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3_u64);
    }
    hash
}

/// Embed `text` as token counts over [`EMBEDDING_DIM`] hash buckets
pub fn embed(text: &str) -> Embedding {
    let mut vec = [0u32; EMBEDDING_DIM];
    for token in tokenize(text) {
        let bucket = (fnv1a_hash(token.as_bytes()) % EMBEDDING_DIM as u64) as usize;
        vec[bucket] += 1;
    }
    vec
}

/// Cosine similarity between two embeddings; 0.0 whenever either side is
/// the zero vector
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f64 {
    let mut dot = 0.0;
    let mut mag_a = 0.0;
    let mut mag_b = 0.0;
    for i in 0..EMBEDDING_DIM {
        let (x, y) = (a[i] as f64, b[i] as f64);
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    if mag_a > 0.0 && mag_b > 0.0 {
        dot / (mag_a.sqrt() * mag_b.sqrt())
    } else {
        0.0
    }
}

/// Inverted full-text index: token -> keys whose value contains it
#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, HashSet<String>>,
}

impl InvertedIndex {
    /// Record `key` under every token of `value`
    pub fn insert(&mut self, key: &str, value: &str) {
        for token in tokenize(value) {
            self.postings
                .entry(token)
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Drop `key` from every token of `value`, pruning empty postings
    pub fn remove(&mut self, key: &str, value: &str) {
        for token in tokenize(value) {
            let now_empty = match self.postings.get_mut(&token) {
                Some(keys) => {
                    keys.remove(key);
                    keys.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.postings.remove(&token);
            }
        }
    }

    /// Keys whose indexed tokens are a superset of the query tokens
    /// (AND semantics). An empty query matches nothing. Results are
    /// sorted for determinism.
    pub fn search(&self, query: &str) -> Vec<String> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut matched: Option<HashSet<&String>> = None;
        for token in &tokens {
            let keys: HashSet<&String> = match self.postings.get(token) {
                Some(keys) => keys.iter().collect(),
                None => return Vec::new(),
            };
            matched = Some(match matched {
                Some(acc) => acc.intersection(&keys).copied().collect(),
                None => keys,
            });
        }

        let mut keys: Vec<String> = matched
            .unwrap_or_default()
            .into_iter()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of distinct tokens currently indexed
    pub fn token_count(&self) -> usize {
        self.postings.len()
    }
}
