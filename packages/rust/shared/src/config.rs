//! Application configuration for energyqa.
//!
//! User config lives at `~/.energyqa/energyqa.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EnergyQaError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "energyqa.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".energyqa";

// ---------------------------------------------------------------------------
// Config structs (matching energyqa.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Retrieval defaults.
    #[serde(default)]
    pub retrieval: RetrievalOptions,

    /// Scope vocabulary extensions.
    #[serde(default)]
    pub scope: ScopeConfig,

    /// Material location.
    #[serde(default)]
    pub corpus: CorpusConfig,
}

impl AppConfig {
    /// Reject values the retrieval pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()
    }
}

/// `[retrieval]` section, also the per-query options for `Retriever::retrieve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOptions {
    /// Maximum number of evidence chunks returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Ask the embedding service for neural scoring.
    #[serde(default)]
    pub use_neural: bool,

    /// Chunks scoring below this are never returned.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            use_neural: false,
            min_score: default_min_score(),
        }
    }
}

impl RetrievalOptions {
    /// Scores live in `[0, 1]`, so a threshold outside that range is a mistake.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(EnergyQaError::validation(format!(
                "min_score must be within [0, 1], got {}",
                self.min_score
            )));
        }
        Ok(())
    }
}

fn default_top_k() -> usize {
    4
}
fn default_min_score() -> f64 {
    0.05
}

/// `[scope]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Additional in-domain terms appended to the built-in vocabulary.
    #[serde(default)]
    pub extra_domain_terms: Vec<String>,

    /// Additional off-domain terms that trigger a hard refusal.
    #[serde(default)]
    pub extra_refusal_terms: Vec<String>,
}

/// `[corpus]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Default material JSON file used when `--material` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.energyqa/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EnergyQaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.energyqa/energyqa.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EnergyQaError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        EnergyQaError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnergyQaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EnergyQaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnergyQaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
