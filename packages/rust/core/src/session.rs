//! Per-query control flow: scope check → retrieval → prompt payload.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};

use energyqa_corpus::{CorpusBuilder, CorpusSnapshot};
use energyqa_shared::{
    AppConfig, Material, Message, RetrievalConfidence, RetrievalOptions, RetrievalResult,
    ScopeDecision,
};

use crate::embedding::EmbeddingService;
use crate::prompt::{self, GENERAL_KNOWLEDGE_PREFIX, OFF_TOPIC_REFUSAL};
use crate::retriever::Retriever;
use crate::scope::{ScopeGuard, ScopeVocabulary};

/// Outcome of [`Session::answer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    /// The question is outside the study domain; reply with `message` verbatim.
    Refused {
        decision: ScopeDecision,
        message: &'static str,
    },
    /// The question is in scope; send `messages` to the model.
    Prompt {
        decision: ScopeDecision,
        retrieval: RetrievalResult,
        messages: Vec<Message>,
        /// Set when evidence is weak; the caller prepends it to the model's reply.
        #[serde(skip_serializing_if = "Option::is_none")]
        fallback_prefix: Option<&'static str>,
        /// Why retrieval produced no evidence, when it failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        retrieval_error: Option<String>,
    },
}

impl Answer {
    pub fn decision(&self) -> &ScopeDecision {
        match self {
            Answer::Refused { decision, .. } | Answer::Prompt { decision, .. } => decision,
        }
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, Answer::Refused { .. })
    }
}

/// Progress callback for reporting session phases.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the answer is ready.
    fn done(&self, answer: &Answer);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _answer: &Answer) {}
}

/// Everything one conversation needs: scope guard, corpus and retriever.
pub struct Session<E: EmbeddingService> {
    guard: ScopeGuard,
    corpus: CorpusBuilder,
    retriever: Retriever<E>,
    options: RetrievalOptions,
}

impl<E: EmbeddingService> Session<E> {
    /// A session over an empty corpus. Call [`Session::load_material`] to add evidence.
    pub fn new(service: E, options: RetrievalOptions, vocabulary: ScopeVocabulary) -> Self {
        Self {
            guard: ScopeGuard::new(vocabulary),
            corpus: CorpusBuilder::new(),
            retriever: Retriever::new(service),
            options,
        }
    }

    pub fn from_config(service: E, config: &AppConfig) -> Self {
        Self::new(
            service,
            config.retrieval.clone(),
            ScopeVocabulary::from_config(&config.scope),
        )
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: RetrievalOptions) {
        self.options = options;
    }

    pub fn guard(&self) -> &ScopeGuard {
        &self.guard
    }

    pub fn retriever(&self) -> &Retriever<E> {
        &self.retriever
    }

    /// The corpus new queries will search.
    pub fn corpus(&self) -> Arc<CorpusSnapshot> {
        self.retriever.corpus()
    }

    /// Build a corpus from `material` and make it the one queries search.
    pub fn load_material(&self, material: &Material) -> Arc<CorpusSnapshot> {
        let snapshot = self.corpus.build(material);
        self.retriever.replace_corpus(snapshot.clone());
        snapshot
    }

    pub async fn answer(&self, query: &str) -> Answer {
        self.answer_with_progress(query, &SilentProgress).await
    }

    /// Run one query through the scope check, retrieval and prompt assembly.
    ///
    /// Never fails: a retrieval error is logged and answered as if no
    /// evidence was found.
    #[instrument(skip_all, fields(query_len = query.len()))]
    pub async fn answer_with_progress(&self, query: &str, progress: &dyn ProgressReporter) -> Answer {
        let start = Instant::now();

        progress.phase("Checking scope");
        let decision = self.guard.check_scope(query);
        if !decision.in_scope {
            info!(reason = %decision.reason, "query refused as out of scope");
            let answer = Answer::Refused {
                decision,
                message: OFF_TOPIC_REFUSAL,
            };
            progress.done(&answer);
            return answer;
        }

        progress.phase("Retrieving evidence");
        let (retrieval, retrieval_error) = match self.retriever.retrieve(query, &self.options).await {
            Ok(result) => (result, None),
            Err(e) => {
                warn!(error = %e, "retrieval failed, answering without evidence");
                (RetrievalResult::empty(), Some(e.to_string()))
            }
        };

        progress.phase("Building prompt");
        let messages = prompt::build_messages(query, &retrieval.chunks);
        let fallback_prefix = match retrieval.confidence {
            RetrievalConfidence::None | RetrievalConfidence::Low => Some(GENERAL_KNOWLEDGE_PREFIX),
            RetrievalConfidence::Medium | RetrievalConfidence::High => None,
        };

        info!(
            reason = %decision.reason,
            evidence = retrieval.chunks.len(),
            confidence = retrieval.confidence.as_str(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "prompt assembled"
        );

        let answer = Answer::Prompt {
            decision,
            retrieval,
            messages,
            fallback_prefix,
            retrieval_error,
        };
        progress.done(&answer);
        answer
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use energyqa_shared::{Chunk, EnergyQaError, Result, ScopeReason, ScoredChunk};

    use super::*;
    use crate::embedding::LexicalEmbeddingService;
    use crate::prompt::{NO_EVIDENCE_PLACEHOLDER, SYSTEM_PROMPT};

    fn fixture() -> Material {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../../fixtures/json/material.fixture.json");
        Material::from_path(std::path::Path::new(path)).unwrap()
    }

    fn lexical_session() -> Session<LexicalEmbeddingService> {
        Session::new(
            LexicalEmbeddingService,
            RetrievalOptions::default(),
            ScopeVocabulary::default(),
        )
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<String>>,
        done: Mutex<usize>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }
        fn done(&self, _answer: &Answer) {
            *self.done.lock().unwrap() += 1;
        }
    }

    struct BrokenService;

    impl EmbeddingService for BrokenService {
        type Index = ();

        async fn build_index(&self, _chunks: &[Chunk], _use_neural: bool) -> Result<()> {
            Ok(())
        }

        async fn score_chunks(&self, _index: &(), _query: &str, _use_neural: bool) -> Result<Vec<ScoredChunk>> {
            Err(EnergyQaError::Embedding("backend offline".into()))
        }
    }

    #[tokio::test]
    async fn off_topic_query_is_refused() {
        let session = lexical_session();
        session.load_material(&fixture());

        let answer = session.answer("I love football and soccer").await;
        match answer {
            Answer::Refused { decision, message } => {
                assert_eq!(decision.reason, ScopeReason::HardRefusal);
                assert_eq!(message, OFF_TOPIC_REFUSAL);
            }
            other => panic!("expected refusal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn grounded_query_builds_prompt_without_fallback() {
        let session = lexical_session();
        let snapshot = session.load_material(&fixture());
        assert_eq!(snapshot.len(), 8);

        let query = "How do control rods absorb neutrons in a reactor?";
        let answer = session.answer(query).await;
        let Answer::Prompt {
            decision,
            retrieval,
            messages,
            fallback_prefix,
            retrieval_error,
        } = answer
        else {
            panic!("expected prompt");
        };

        assert!(decision.in_scope);
        assert_eq!(retrieval.chunks[0].id, "nuclear-control-rods");
        assert!(retrieval.chunks.len() <= 4);
        assert_eq!(retrieval.confidence, RetrievalConfidence::High);
        assert_eq!(fallback_prefix, None);
        assert_eq!(retrieval_error, None);
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert!(messages[1].content.contains("\"Control Rods\" (Nuclear Power)"));
        assert!(messages[1].content.ends_with(query));
    }

    #[tokio::test]
    async fn empty_corpus_falls_back_to_general_knowledge() {
        let session = lexical_session();
        let answer = session.answer("How does a nuclear reactor work?").await;
        let Answer::Prompt {
            retrieval,
            messages,
            fallback_prefix,
            ..
        } = answer
        else {
            panic!("expected prompt");
        };
        assert_eq!(retrieval.confidence, RetrievalConfidence::None);
        assert_eq!(fallback_prefix, Some(GENERAL_KNOWLEDGE_PREFIX));
        assert!(messages[1].content.contains(NO_EVIDENCE_PLACEHOLDER));
    }

    #[tokio::test]
    async fn retrieval_failure_answers_without_evidence() {
        let session = Session::new(BrokenService, RetrievalOptions::default(), ScopeVocabulary::default());
        session.load_material(&fixture());

        let answer = session.answer("What limits the efficiency of a heat engine?").await;
        let Answer::Prompt {
            retrieval,
            fallback_prefix,
            retrieval_error,
            messages,
            ..
        } = answer
        else {
            panic!("expected prompt");
        };
        assert!(retrieval.chunks.is_empty());
        assert_eq!(retrieval.confidence, RetrievalConfidence::None);
        assert_eq!(fallback_prefix, Some(GENERAL_KNOWLEDGE_PREFIX));
        assert!(retrieval_error.unwrap().contains("backend offline"));
        assert!(messages[1].content.contains(NO_EVIDENCE_PLACEHOLDER));
    }

    #[tokio::test]
    async fn progress_reports_phases() {
        let session = lexical_session();
        let progress = RecordingProgress::default();

        session.answer_with_progress("What is solar power?", &progress).await;
        assert_eq!(
            *progress.phases.lock().unwrap(),
            vec!["Checking scope", "Retrieving evidence", "Building prompt"]
        );

        session.answer_with_progress("I love football and soccer", &progress).await;
        assert_eq!(progress.phases.lock().unwrap().len(), 4);
        assert_eq!(*progress.done.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn reloading_material_swaps_corpus() {
        let session = lexical_session();
        session.load_material(&fixture());
        assert_eq!(session.corpus().len(), 8);

        session.load_material(&Material::default());
        assert!(session.corpus().is_empty());
        let answer = session.answer("Explain wind turbines and electricity").await;
        assert!(!answer.is_refused());
        assert!(answer.decision().in_scope);
    }

    #[test]
    fn answer_serializes_with_kind_tag() {
        let answer = Answer::Refused {
            decision: ScopeGuard::default().check_scope(""),
            message: OFF_TOPIC_REFUSAL,
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["kind"], "refused");
        assert_eq!(json["message"], OFF_TOPIC_REFUSAL);
    }
}
