//! Evidence retrieval over the current corpus generation.
//!
//! A [`Retriever`] owns one *generation* at a time: a corpus snapshot plus a
//! lazily built index. The index build is memoized in-flight, so callers that
//! arrive before the first build completes await that same build. Swapping the
//! corpus or resetting publishes a new generation; queries already running
//! keep the generation they started with.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use energyqa_corpus::CorpusSnapshot;
use energyqa_shared::{
    EnergyQaError, Result, RetrievalConfidence, RetrievalOptions, RetrievalResult, ScoredChunk,
};

use crate::embedding::EmbeddingService;

/// Best score at or above which confidence is `high`.
pub const HIGH_CONFIDENCE_SCORE: f64 = 0.3;

/// Best score at or above which confidence is `medium`.
pub const MEDIUM_CONFIDENCE_SCORE: f64 = 0.12;

/// A corpus snapshot and the index built from it.
struct Generation<I> {
    corpus: Arc<CorpusSnapshot>,
    index: OnceCell<Arc<I>>,
}

impl<I> Generation<I> {
    fn new(corpus: Arc<CorpusSnapshot>) -> Self {
        Self {
            corpus,
            index: OnceCell::new(),
        }
    }
}

/// Retrieves ranked evidence chunks through an [`EmbeddingService`].
pub struct Retriever<E: EmbeddingService> {
    service: E,
    current: Mutex<Arc<Generation<E::Index>>>,
}

impl<E: EmbeddingService> Retriever<E> {
    /// A retriever over an empty corpus.
    pub fn new(service: E) -> Self {
        Self::with_corpus(service, Arc::new(CorpusSnapshot::empty()))
    }

    pub fn with_corpus(service: E, corpus: Arc<CorpusSnapshot>) -> Self {
        Self {
            service,
            current: Mutex::new(Arc::new(Generation::new(corpus))),
        }
    }

    pub fn service(&self) -> &E {
        &self.service
    }

    /// The corpus snapshot new queries will see.
    pub fn corpus(&self) -> Arc<CorpusSnapshot> {
        self.generation().corpus.clone()
    }

    /// Install a new corpus. Its index is built on the next retrieval.
    ///
    /// A snapshot older than the current one is ignored, so overlapping
    /// reloads cannot publish a stale corpus last. Returns whether it was installed.
    pub fn replace_corpus(&self, corpus: Arc<CorpusSnapshot>) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if corpus.version < current.corpus.version {
            warn!(
                version = corpus.version,
                current = current.corpus.version,
                "ignoring stale corpus snapshot"
            );
            return false;
        }
        info!(
            version = corpus.version,
            chunks = corpus.len(),
            "corpus replaced, index will rebuild"
        );
        *current = Arc::new(Generation::new(corpus));
        true
    }

    /// Drop the built index so the next retrieval rebuilds it.
    pub fn reset(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(version = current.corpus.version, "retriever reset");
        *current = Arc::new(Generation::new(current.corpus.clone()));
    }

    /// Whether the current generation has a finished index.
    pub fn is_index_built(&self) -> bool {
        self.generation().index.initialized()
    }

    /// Build the index for the current corpus if it is not built yet.
    ///
    /// No-op for an empty corpus.
    pub async fn ensure_index(&self, use_neural: bool) -> Result<()> {
        let generation = self.generation();
        self.index_for(&generation, use_neural).await.map(|_| ())
    }

    /// Retrieve up to `top_k` chunks scoring at least `min_score`, with a confidence bucket.
    ///
    /// Scoring failures surface as [`EnergyQaError::Retrieval`].
    #[instrument(skip(self, options), fields(top_k = options.top_k, min_score = options.min_score))]
    pub async fn retrieve(&self, query: &str, options: &RetrievalOptions) -> Result<RetrievalResult> {
        let generation = self.generation();

        let Some(index) = self.index_for(&generation, options.use_neural).await? else {
            debug!("corpus is empty, nothing to retrieve");
            return Ok(RetrievalResult::empty());
        };

        let scored = self
            .service
            .score_chunks(&index, query, options.use_neural)
            .await
            .map_err(|e| EnergyQaError::Retrieval(format!("scoring failed: {e}")))?;

        let result = rank(scored, options);
        debug!(
            returned = result.chunks.len(),
            confidence = result.confidence.as_str(),
            corpus_version = generation.corpus.version,
            "retrieval complete"
        );
        Ok(result)
    }

    fn generation(&self) -> Arc<Generation<E::Index>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The generation's index, building it once. A failed build leaves the
    /// cell empty, so the next caller retries.
    async fn index_for(
        &self,
        generation: &Generation<E::Index>,
        use_neural: bool,
    ) -> Result<Option<Arc<E::Index>>> {
        if generation.corpus.is_empty() {
            return Ok(None);
        }

        let index = generation
            .index
            .get_or_try_init(|| async {
                let started = Instant::now();
                info!(
                    version = generation.corpus.version,
                    chunks = generation.corpus.len(),
                    use_neural,
                    "building embedding index"
                );
                let index = self
                    .service
                    .build_index(&generation.corpus.chunks, use_neural)
                    .await
                    .map_err(|e| EnergyQaError::Retrieval(format!("index build failed: {e}")))?;
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "embedding index ready"
                );
                Ok::<_, EnergyQaError>(Arc::new(index))
            })
            .await?;

        Ok(Some(index.clone()))
    }
}

/// Filter and cut a descending score list, then bucket the confidence.
///
/// Confidence comes from the best score of the whole list, not only the
/// chunks that survived the filter; it is `none` exactly when nothing survived.
pub fn rank(scored: Vec<ScoredChunk>, options: &RetrievalOptions) -> RetrievalResult {
    let best = scored
        .iter()
        .map(|s| s.score)
        .fold(f64::NEG_INFINITY, f64::max);

    let chunks: Vec<_> = scored
        .into_iter()
        .filter(|s| s.score >= options.min_score)
        .take(options.top_k)
        .map(|s| s.chunk)
        .collect();

    let confidence = if chunks.is_empty() {
        RetrievalConfidence::None
    } else if best >= HIGH_CONFIDENCE_SCORE {
        RetrievalConfidence::High
    } else if best >= MEDIUM_CONFIDENCE_SCORE {
        RetrievalConfidence::Medium
    } else {
        RetrievalConfidence::Low
    };

    RetrievalResult { chunks, confidence }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
