//! Rule-based domain scoping, evaluated before any retrieval happens.
//!
//! The decision is an ordered cascade: the first rule whose predicate holds
//! decides. Matching is case-insensitive literal substring search with no
//! tokenization or stemming, so overlapping vocabulary phrases ("nuclear" and
//! "nuclear power") each count when both occur.

use std::sync::LazyLock;

use regex::RegexSet;
use tracing::debug;

use energyqa_shared::{ScopeConfidence, ScopeConfig, ScopeDecision, ScopeReason};

/// Built-in in-domain vocabulary (lowercase).
pub const DEFAULT_DOMAIN_TERMS: &[&str] = &[
    "energy",
    "power",
    "physics",
    "nuclear",
    "nuclear power",
    "fission",
    "fusion",
    "reactor",
    "uranium",
    "plutonium",
    "neutron",
    "chain reaction",
    "control rod",
    "radiation",
    "radioactive",
    "half-life",
    "isotope",
    "solar",
    "photovoltaic",
    "wind",
    "turbine",
    "hydro",
    "geothermal",
    "battery",
    "batteries",
    "storage",
    "electricity",
    "electric",
    "grid",
    "generator",
    "fossil fuel",
    "coal",
    "natural gas",
    "carbon",
    "emission",
    "greenhouse",
    "climate",
    "renewable",
    "biomass",
    "thermodynamic",
    "entropy",
    "efficiency",
    "heat",
    "joule",
    "watt",
];

/// Built-in off-domain vocabulary that triggers a hard refusal (lowercase).
pub const DEFAULT_REFUSAL_TERMS: &[&str] = &[
    "football",
    "soccer",
    "basketball",
    "baseball",
    "cricket",
    "tennis",
    "recipe",
    "cooking",
    "movie",
    "celebrity",
    "music",
    "song lyrics",
    "video game",
    "fortnite",
    "minecraft",
    "horoscope",
    "fashion",
    "makeup",
    "bitcoin",
    "crypto",
    "lottery",
    "election",
];

/// Questions about the assistant itself. Always in scope.
static META_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\bwho (are|r) (you|u)\b",
        r"\bwhat (are|r) (you|u)\b",
        r"\bwhat can (you|u) (do|help|answer|tell)\b",
        r"\bwhat do (you|u) (know|cover|do)\b",
        r"\bwhat (topics|subjects|questions) (can|do) (you|u)\b",
        r"\bhow (do|does) (you|u|this (assistant|bot|chatbot)) work\b",
        r"\b(are|r) (you|u) (an? )?(ai|bot|chatbot|robot|human|real person)\b",
        r"\bwhat('s| is) your (name|purpose|job|role)\b",
    ])
    .expect("valid meta patterns")
});

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Domain and refusal terms used by [`ScopeGuard`].
#[derive(Debug, Clone)]
pub struct ScopeVocabulary {
    domain_terms: Vec<String>,
    refusal_terms: Vec<String>,
}

impl Default for ScopeVocabulary {
    fn default() -> Self {
        Self {
            domain_terms: DEFAULT_DOMAIN_TERMS.iter().map(|t| t.to_string()).collect(),
            refusal_terms: DEFAULT_REFUSAL_TERMS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl ScopeVocabulary {
    /// Built-in vocabulary extended with the `[scope]` config terms.
    pub fn from_config(config: &ScopeConfig) -> Self {
        let mut vocabulary = Self::default();
        extend_terms(&mut vocabulary.domain_terms, &config.extra_domain_terms);
        extend_terms(&mut vocabulary.refusal_terms, &config.extra_refusal_terms);
        vocabulary
    }

    pub fn domain_terms(&self) -> &[String] {
        &self.domain_terms
    }

    pub fn refusal_terms(&self) -> &[String] {
        &self.refusal_terms
    }
}

fn extend_terms(terms: &mut Vec<String>, extra: &[String]) {
    for term in extra {
        let term = term.trim().to_lowercase();
        if !term.is_empty() && !terms.contains(&term) {
            terms.push(term);
        }
    }
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Everything the rules look at, computed once per query.
#[derive(Debug)]
struct QueryFeatures {
    empty: bool,
    meta: bool,
    hard_refusal: bool,
    matched: Vec<String>,
    word_count: usize,
}

impl QueryFeatures {
    fn extract(query: &str, vocabulary: &ScopeVocabulary) -> Self {
        let text = query.trim().to_lowercase();
        if text.is_empty() {
            return Self {
                empty: true,
                meta: false,
                hard_refusal: false,
                matched: Vec::new(),
                word_count: 0,
            };
        }

        Self {
            empty: false,
            meta: META_PATTERNS.is_match(&text),
            hard_refusal: vocabulary
                .refusal_terms
                .iter()
                .any(|term| text.contains(term.as_str())),
            matched: vocabulary
                .domain_terms
                .iter()
                .filter(|term| text.contains(term.as_str()))
                .cloned()
                .collect(),
            word_count: text.split_whitespace().count(),
        }
    }

    fn score(&self) -> usize {
        self.matched.len()
    }
}

struct ScopeRule {
    reason: ScopeReason,
    applies: fn(&QueryFeatures) -> bool,
    in_scope: bool,
    confidence: ScopeConfidence,
}

fn is_empty(f: &QueryFeatures) -> bool {
    f.empty
}
fn is_meta(f: &QueryFeatures) -> bool {
    f.meta
}
fn strong_domain_match(f: &QueryFeatures) -> bool {
    f.score() >= 2
}
fn single_domain_match(f: &QueryFeatures) -> bool {
    f.score() == 1 && !f.hard_refusal
}
fn refused_off_domain(f: &QueryFeatures) -> bool {
    f.hard_refusal && f.score() == 0
}
fn short_query(f: &QueryFeatures) -> bool {
    f.word_count <= 4
}
fn long_without_keywords(f: &QueryFeatures) -> bool {
    f.score() == 0 && f.word_count > 8
}
fn always(_: &QueryFeatures) -> bool {
    true
}

/// Ordered cascade; precedence is the table order.
static RULES: &[ScopeRule] = &[
    ScopeRule {
        reason: ScopeReason::EmptyQuery,
        applies: is_empty,
        in_scope: false,
        confidence: ScopeConfidence::High,
    },
    ScopeRule {
        reason: ScopeReason::MetaQuery,
        applies: is_meta,
        in_scope: true,
        confidence: ScopeConfidence::High,
    },
    ScopeRule {
        reason: ScopeReason::DomainMatch,
        applies: strong_domain_match,
        in_scope: true,
        confidence: ScopeConfidence::High,
    },
    ScopeRule {
        reason: ScopeReason::DomainMatch,
        applies: single_domain_match,
        in_scope: true,
        confidence: ScopeConfidence::Medium,
    },
    ScopeRule {
        reason: ScopeReason::HardRefusal,
        applies: refused_off_domain,
        in_scope: false,
        confidence: ScopeConfidence::High,
    },
    // Deliberately lenient: short queries defer to retrieval and the model.
    ScopeRule {
        reason: ScopeReason::ShortQuery,
        applies: short_query,
        in_scope: true,
        confidence: ScopeConfidence::Low,
    },
    ScopeRule {
        reason: ScopeReason::NoDomainKeywords,
        applies: long_without_keywords,
        in_scope: false,
        confidence: ScopeConfidence::Medium,
    },
    ScopeRule {
        reason: ScopeReason::Uncertain,
        applies: always,
        in_scope: true,
        confidence: ScopeConfidence::Low,
    },
];

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// Classifies queries as in or out of the study domain. Never fails.
#[derive(Debug, Clone, Default)]
pub struct ScopeGuard {
    vocabulary: ScopeVocabulary,
}

impl ScopeGuard {
    pub fn new(vocabulary: ScopeVocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &ScopeVocabulary {
        &self.vocabulary
    }

    /// Run the rule cascade over `query`.
    pub fn check_scope(&self, query: &str) -> ScopeDecision {
        let features = QueryFeatures::extract(query, &self.vocabulary);

        // The last rule always applies, so the fallback is never reached.
        let rule = RULES
            .iter()
            .find(|rule| (rule.applies)(&features))
            .unwrap_or(&RULES[RULES.len() - 1]);

        let report_matches = !matches!(
            rule.reason,
            ScopeReason::EmptyQuery | ScopeReason::MetaQuery
        );
        let decision = ScopeDecision {
            in_scope: rule.in_scope,
            confidence: rule.confidence,
            reason: rule.reason,
            matched: (report_matches && !features.matched.is_empty())
                .then(|| features.matched.clone()),
        };

        debug!(
            reason = %decision.reason,
            in_scope = decision.in_scope,
            score = features.score(),
            words = features.word_count,
            "scope decided"
        );
        decision
    }

    /// Scope check over arbitrary JSON input; anything but a string is an empty query.
    pub fn check_scope_value(&self, query: &serde_json::Value) -> ScopeDecision {
        match query {
            serde_json::Value::String(text) => self.check_scope(text),
            _ => self.check_scope(""),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
