//! Core domain types for the energyqa corpus and query pipeline.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EnergyQaError, Result};

/// The recognized material sections, in corpus traversal order.
pub const SECTION_KEYS: [&str; 5] = ["fundamentals", "nuclear", "renewables", "storage", "impacts"];

// ---------------------------------------------------------------------------
// Material (input)
// ---------------------------------------------------------------------------

/// A citation entry, resolvable by its numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Citation key, unique within the footer list.
    pub id: u32,
    /// Bibliographic text.
    pub text: String,
    /// Optional link to the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One item (or card) inside a material section. All fields are HTML fragments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub detail: String,
}

/// A named section of the study material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialSection {
    /// Display name (falls back to the section key when empty).
    #[serde(default)]
    pub name: String,
    /// Items or cards, in page order.
    #[serde(default, alias = "cards")]
    pub items: Vec<MaterialItem>,
    /// Inline references supplied by the section itself.
    #[serde(default)]
    pub references: Vec<Reference>,
}

/// The already-loaded study material: named sections plus the footer reference list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Material {
    #[serde(default)]
    pub sections: HashMap<String, MaterialSection>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

impl Material {
    /// Parse material from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| EnergyQaError::parse(format!("invalid material JSON: {e}")))
    }

    /// Read and parse a material JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EnergyQaError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            EnergyQaError::parse(format!("invalid material JSON in {}: {e}", path.display()))
        })
    }

    /// Look up a section by key.
    pub fn section(&self, key: &str) -> Option<&MaterialSection> {
        self.sections.get(key)
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A retrievable unit of corpus text with resolved citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id: section key + normalized title. Not guaranteed unique.
    pub id: String,
    /// Section key (e.g. `nuclear`).
    pub section: String,
    /// Section display name.
    pub section_name: String,
    /// Plain-text title.
    pub title: String,
    /// Title, description and detail with markup removed and whitespace collapsed.
    pub text: String,
    /// Citation markers found in the HTML, first-seen order, deduplicated.
    pub ref_ids: Vec<u32>,
    /// Resolved references followed by merged section references.
    pub refs: Vec<Reference>,
}

impl Chunk {
    /// Citation ids that resolved to a reference attached to this chunk.
    pub fn resolved_ref_ids(&self) -> Vec<u32> {
        self.ref_ids
            .iter()
            .copied()
            .filter(|id| self.refs.iter().any(|r| r.id == *id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Scope decisions
// ---------------------------------------------------------------------------

/// Certainty of a scope decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeConfidence {
    High,
    Medium,
    Low,
}

/// Which rule of the scope cascade produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeReason {
    EmptyQuery,
    MetaQuery,
    DomainMatch,
    HardRefusal,
    ShortQuery,
    NoDomainKeywords,
    Uncertain,
}

impl ScopeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::MetaQuery => "meta_query",
            Self::DomainMatch => "domain_match",
            Self::HardRefusal => "hard_refusal",
            Self::ShortQuery => "short_query",
            Self::NoDomainKeywords => "no_domain_keywords",
            Self::Uncertain => "uncertain",
        }
    }
}

impl std::fmt::Display for ScopeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In/out-of-domain verdict for a query, with the rule that decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDecision {
    pub in_scope: bool,
    pub confidence: ScopeConfidence,
    pub reason: ScopeReason,
    /// Domain terms found in the query (domain-match decisions only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// Ordinal retrieval confidence: `None < Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalConfidence {
    None,
    Low,
    Medium,
    High,
}

impl RetrievalConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A chunk paired with its relevance score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// Evidence chunks for a query plus the confidence bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<Chunk>,
    pub confidence: RetrievalConfidence,
}

impl RetrievalResult {
    /// A result with no evidence.
    pub fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            confidence: RetrievalConfidence::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One message of the payload handed to the model-calling collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}
