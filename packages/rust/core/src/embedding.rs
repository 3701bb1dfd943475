//! Relevance scoring contract and the bundled lexical implementation.
//!
//! The retriever only relies on [`EmbeddingService`]: build an index over a
//! chunk list, then score a query against it, returning every indexed chunk
//! with a score in `[0, 1]`, best first.

use std::collections::HashMap;
use std::future::Future;

use tracing::{debug, instrument, warn};

use energyqa_shared::{Chunk, Result, ScoredChunk};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A ranking capability over corpus chunks.
pub trait EmbeddingService: Send + Sync {
    /// Searchable structure built from one corpus snapshot.
    type Index: Send + Sync + 'static;

    /// Build an index over `chunks`.
    fn build_index(
        &self,
        chunks: &[Chunk],
        use_neural: bool,
    ) -> impl Future<Output = Result<Self::Index>> + Send;

    /// Score `query` against every chunk in `index`, descending by score.
    fn score_chunks(
        &self,
        index: &Self::Index,
        query: &str,
        use_neural: bool,
    ) -> impl Future<Output = Result<Vec<ScoredChunk>>> + Send;
}

// ---------------------------------------------------------------------------
// Lexical TF-IDF service
// ---------------------------------------------------------------------------

/// Words too common to carry relevance.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "in", "into", "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to",
    "was", "what", "when", "where", "which", "who", "why", "will", "with",
];

/// Sparse L2-normalized TF-IDF vector.
type TermVector = HashMap<String, f64>;

/// TF-IDF cosine scorer. Neural scoring is not bundled; requests for it fall
/// back to lexical scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalEmbeddingService;

/// Index produced by [`LexicalEmbeddingService`].
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    chunks: Vec<Chunk>,
    idf: HashMap<String, f64>,
    vectors: Vec<TermVector>,
}

impl LexicalIndex {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn build(chunks: &[Chunk]) -> Self {
        let documents: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.text)).collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in &documents {
            let mut seen: Vec<&str> = Vec::new();
            for token in tokens {
                if !seen.contains(&token.as_str()) {
                    seen.push(token);
                    *doc_freq.entry(token).or_insert(0) += 1;
                }
            }
        }

        // Smoothed IDF keeps terms present in every chunk above zero.
        let n = documents.len() as f64;
        let idf: HashMap<String, f64> = doc_freq
            .into_iter()
            .map(|(term, df)| (term.to_string(), ((n + 1.0) / (df as f64 + 1.0)).ln() + 1.0))
            .collect();

        let vectors = documents
            .iter()
            .map(|tokens| weigh(tokens, &idf))
            .collect();

        Self {
            chunks: chunks.to_vec(),
            idf,
            vectors,
        }
    }

    fn score(&self, query: &str) -> Vec<ScoredChunk> {
        let query_vector = weigh(&tokenize(query), &self.idf);

        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .zip(&self.vectors)
            .map(|(chunk, vector)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine(&query_vector, vector).clamp(0.0, 1.0),
            })
            .collect();

        // Stable: ties keep corpus order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }
}

impl EmbeddingService for LexicalEmbeddingService {
    type Index = LexicalIndex;

    #[instrument(skip_all, fields(chunks = chunks.len(), use_neural = use_neural))]
    async fn build_index(&self, chunks: &[Chunk], use_neural: bool) -> Result<LexicalIndex> {
        if use_neural {
            warn!("neural scoring is not available, using lexical TF-IDF");
        }
        let index = LexicalIndex::build(chunks);
        debug!(vocabulary = index.idf.len(), "lexical index built");
        Ok(index)
    }

    async fn score_chunks(
        &self,
        index: &LexicalIndex,
        query: &str,
        _use_neural: bool,
    ) -> Result<Vec<ScoredChunk>> {
        Ok(index.score(query))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lowercase alphanumeric tokens, stopwords and single characters removed.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Term frequency times IDF, normalized to unit length. Unknown terms are dropped.
fn weigh(tokens: &[String], idf: &HashMap<String, f64>) -> TermVector {
    let mut vector: TermVector = HashMap::new();
    for token in tokens {
        if let Some(weight) = idf.get(token) {
            *vector.entry(token.clone()).or_insert(0.0) += weight;
        }
    }

    let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for weight in vector.values_mut() {
            *weight /= norm;
        }
    }
    vector
}

fn cosine(a: &TermVector, b: &TermVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|v| w * v))
        .sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
