//! Shared types, error model, and configuration for energyqa.
//!
//! This crate is the foundation depended on by all other energyqa crates.
//! It provides:
//! - [`EnergyQaError`], the unified error type
//! - Domain types ([`Material`], [`Chunk`], [`Reference`], [`ScopeDecision`], [`RetrievalResult`])
//! - Configuration ([`AppConfig`], [`RetrievalOptions`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CorpusConfig, RetrievalOptions, ScopeConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{EnergyQaError, Result};
pub use types::{
    Chunk, Material, MaterialItem, MaterialSection, Message, Reference, RetrievalConfidence,
    RetrievalResult, Role, SECTION_KEYS, ScopeConfidence, ScopeDecision, ScopeReason,
    ScoredChunk,
};
