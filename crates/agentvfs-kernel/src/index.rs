//! Search index over memory store content.
//!
//! The index holds one derived projection per memory key: an embedding of
//! the content plus the content version and update sequence it was computed
//! from. The memory store refreshes a key's projection before a write
//! returns, so a query issued after a write always sees that write.
//!
//! Scoring is pluggable through [`Scorer`]. The default
//! [`HashedBagOfWords`] is deterministic and dependency-light; production
//! deployments can swap in a model-backed embedder.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use agentvfs_types::VirtualPath;

use crate::vfs::{VfsError, VfsResult};

/// Turns text into vectors and compares them.
pub trait Scorer: Send + Sync {
    /// Embed a document or query.
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Similarity between a query embedding and a document embedding.
    /// Higher is more similar.
    fn similarity(&self, query: &[f32], document: &[f32]) -> f32;
}

/// Token-hashing embedder with cosine similarity.
///
/// Lowercased alphanumeric tokens are hashed (BLAKE3) into a fixed number of
/// buckets. Identical inputs always produce identical vectors.
#[derive(Debug, Clone)]
pub struct HashedBagOfWords {
    dimensions: usize,
}

impl HashedBagOfWords {
    /// Default bucket count.
    pub const DEFAULT_DIMENSIONS: usize = 256;

    /// Create an embedder with the given bucket count (at least 1).
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let hash = blake3::hash(token.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(prefix) % self.dimensions as u64) as usize
    }
}

impl Default for HashedBagOfWords {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

impl Scorer for HashedBagOfWords {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            vector[self.bucket(&token)] += 1.0;
        }
        vector
    }

    fn similarity(&self, query: &[f32], document: &[f32]) -> f32 {
        let dot: f32 = query.iter().zip(document).map(|(a, b)| a * b).sum();
        let qn: f32 = query.iter().map(|v| v * v).sum::<f32>().sqrt();
        let dn: f32 = document.iter().map(|v| v * v).sum::<f32>().sqrt();
        if qn == 0.0 || dn == 0.0 {
            0.0
        } else {
            dot / (qn * dn)
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The memory key.
    pub key: VirtualPath,
    /// Similarity score.
    pub score: f32,
    /// Content version the projection was computed from.
    pub version: u64,
}

#[derive(Debug, Clone)]
struct Projection {
    version: u64,
    /// Global update sequence of the write; larger is more recent.
    sequence: u64,
    embedding: Vec<f32>,
}

/// Similarity-queryable projection of memory store content.
pub struct SearchIndex {
    scorer: Arc<dyn Scorer>,
    min_score: f32,
    projections: RwLock<HashMap<VirtualPath, Projection>>,
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("min_score", &self.min_score)
            .field("projections", &self.projections.read().len())
            .finish()
    }
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::new(Arc::new(HashedBagOfWords::default()), 0.0)
    }
}

impl SearchIndex {
    /// Create an index with a scorer and a minimum score for results.
    pub fn new(scorer: Arc<dyn Scorer>, min_score: f32) -> Self {
        Self {
            scorer,
            min_score,
            projections: RwLock::new(HashMap::new()),
        }
    }

    /// Recompute the projection for `key` from its current content.
    ///
    /// A refresh older than the version already indexed is ignored.
    pub fn refresh(&self, key: &VirtualPath, version: u64, sequence: u64, content: &[u8]) {
        let embedding = self.scorer.embed(&String::from_utf8_lossy(content));
        let mut projections = self.projections.write();
        if let Some(existing) = projections.get(key)
            && existing.version > version
        {
            tracing::debug!(key = %key, version, indexed = existing.version, "ignoring stale refresh");
            return;
        }
        projections.insert(
            key.clone(),
            Projection {
                version,
                sequence,
                embedding,
            },
        );
    }

    /// Drop the projection for `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &VirtualPath) -> bool {
        self.projections.write().remove(key).is_some()
    }

    /// Drop every projection whose key is not in `keep`.
    pub fn retain(&self, keep: &HashSet<VirtualPath>) {
        self.projections.write().retain(|key, _| keep.contains(key));
    }

    /// Indexed version of a key, if any.
    pub fn indexed_version(&self, key: &VirtualPath) -> Option<u64> {
        self.projections.read().get(key).map(|p| p.version)
    }

    /// Number of indexed keys.
    pub fn len(&self) -> usize {
        self.projections.read().len()
    }

    /// Whether nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rank keys against `text`, returning at most `top_k` hits.
    pub fn query(&self, text: &str, top_k: usize) -> VfsResult<Vec<SearchHit>> {
        self.query_filtered(text, top_k, |_| true)
    }

    /// Like [`query`](Self::query), considering only keys accepted by `visible`.
    ///
    /// Ranking is by score (highest first), then by most recent update, then
    /// by key, so results are stable for a fixed index state.
    pub fn query_filtered<F>(&self, text: &str, top_k: usize, visible: F) -> VfsResult<Vec<SearchHit>>
    where
        F: Fn(&VirtualPath) -> bool,
    {
        if top_k == 0 {
            return Err(VfsError::invalid_argument("top_k must be positive"));
        }

        let query = self.scorer.embed(text);
        let projections = self.projections.read();
        let mut scored: Vec<(SearchHit, u64)> = projections
            .iter()
            .filter(|(key, _)| visible(key))
            .filter_map(|(key, projection)| {
                let score = self.scorer.similarity(&query, &projection.embedding);
                (score > self.min_score).then(|| {
                    (
                        SearchHit {
                            key: key.clone(),
                            score,
                            version: projection.version,
                        },
                        projection.sequence,
                    )
                })
            })
            .collect();
        drop(projections);

        scored.sort_by(|(a, a_seq), (b, b_seq)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b_seq.cmp(a_seq))
                .then_with(|| a.key.cmp(&b.key))
        });
        scored.truncate(top_k);
        Ok(scored.into_iter().map(|(hit, _)| hit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> VirtualPath {
        VirtualPath::parse(s).unwrap()
    }

    /// Scores every document identically so ordering falls to the tie-breaks.
    struct ConstantScorer;

    impl Scorer for ConstantScorer {
        fn embed(&self, _text: &str) -> Vec<f32> {
            vec![1.0]
        }

        fn similarity(&self, _query: &[f32], _document: &[f32]) -> f32 {
            0.5
        }
    }

    #[test]
    fn test_exact_match_ranks_first() {
        let index = SearchIndex::default();
        index.refresh(&p("memory/notes/a"), 1, 1, b"hello");
        index.refresh(&p("memory/notes/b"), 1, 2, b"goodbye moon");

        let hits = index.query("hello", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, p("memory/notes/a"));
        assert!(hits[0].score > 0.99);
    }

    #[test]
    fn test_zero_top_k_is_invalid() {
        let index = SearchIndex::default();
        assert!(matches!(
            index.query("hello", 0),
            Err(VfsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_non_matching_documents_are_omitted() {
        let index = SearchIndex::default();
        index.refresh(&p("memory/a"), 1, 1, b"alpha beta");
        let hits = index.query("zzzz-unrelated", 5).unwrap();
        assert!(hits.is_empty());
        assert!(index.query("", 5).unwrap().is_empty());
    }

    #[test]
    fn test_ties_prefer_most_recent_update() {
        let index = SearchIndex::new(Arc::new(ConstantScorer), 0.0);
        index.refresh(&p("memory/old"), 1, 1, b"x");
        index.refresh(&p("memory/new"), 1, 5, b"x");
        index.refresh(&p("memory/mid"), 1, 3, b"x");

        let keys: Vec<_> = index
            .query("x", 10)
            .unwrap()
            .into_iter()
            .map(|h| h.key.to_string())
            .collect();
        assert_eq!(keys, vec!["memory/new", "memory/mid", "memory/old"]);
    }

    #[test]
    fn test_stale_refresh_is_ignored() {
        let index = SearchIndex::default();
        index.refresh(&p("memory/a"), 3, 3, b"fresh");
        index.refresh(&p("memory/a"), 2, 2, b"stale");

        assert_eq!(index.indexed_version(&p("memory/a")), Some(3));
        assert!(index.query("stale", 1).unwrap().is_empty());
        assert_eq!(index.query("fresh", 1).unwrap()[0].version, 3);
    }

    #[test]
    fn test_invalidate_and_retain() {
        let index = SearchIndex::default();
        index.refresh(&p("memory/a"), 1, 1, b"one");
        index.refresh(&p("memory/b"), 1, 2, b"two");
        index.refresh(&p("memory/c"), 1, 3, b"three");

        assert!(index.invalidate(&p("memory/a")));
        assert!(!index.invalidate(&p("memory/a")));

        let keep: HashSet<_> = [p("memory/b")].into_iter().collect();
        index.retain(&keep);
        assert_eq!(index.len(), 1);
        assert_eq!(index.indexed_version(&p("memory/b")), Some(1));
    }

    #[test]
    fn test_filtered_query() {
        let index = SearchIndex::default();
        index.refresh(&p("memory/a/x"), 1, 1, b"shared words");
        index.refresh(&p("memory/b/x"), 1, 2, b"shared words");

        let scope = p("memory/a");
        let hits = index
            .query_filtered("shared", 10, |key| key.starts_with(&scope))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, p("memory/a/x"));
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let scorer = HashedBagOfWords::new(64);
        assert_eq!(scorer.embed("Hello, World"), scorer.embed("hello world"));
        assert_eq!(scorer.embed("abc").len(), 64);
    }
}
