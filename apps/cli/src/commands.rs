//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use energyqa_core::embedding::LexicalEmbeddingService;
use energyqa_core::scope::{ScopeGuard, ScopeVocabulary};
use energyqa_core::session::{Answer, ProgressReporter, Session};
use energyqa_corpus::CorpusBuilder;
use energyqa_shared::{AppConfig, Material, init_config, load_config};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// energyqa: scoped, evidence-grounded prompts for energy physics questions.
#[derive(Parser)]
#[command(
    name = "energyqa",
    version,
    about = "Check question scope, retrieve evidence from project materials, and build model prompts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Answer a question: scope check, evidence retrieval, prompt payload.
    Ask {
        /// The student's question.
        question: String,

        /// Material JSON file (defaults to `corpus.material_path` from config).
        #[arg(short, long, env = "ENERGYQA_MATERIAL")]
        material: Option<PathBuf>,

        /// Maximum evidence chunks.
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum relevance score in [0, 1].
        #[arg(long)]
        min_score: Option<f64>,

        /// Request neural scoring.
        #[arg(long)]
        neural: bool,

        /// Print the full answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Classify a question as in or out of scope.
    Scope {
        /// The question to classify.
        question: String,
    },

    /// Print the chunks built from a material file.
    Chunks {
        /// Material JSON file (defaults to `corpus.material_path` from config).
        #[arg(short, long, env = "ENERGYQA_MATERIAL")]
        material: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "energyqa=info",
        1 => "energyqa=debug",
        _ => "energyqa=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout stays parseable.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ask {
            question,
            material,
            top_k,
            min_score,
            neural,
            json,
        } => {
            let overrides = AskOverrides {
                top_k,
                min_score,
                neural,
            };
            cmd_ask(&question, material.as_deref(), overrides, json).await
        }
        Command::Scope { question } => cmd_scope(&question).await,
        Command::Chunks { material } => cmd_chunks(material.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Retrieval flags that override the config file.
struct AskOverrides {
    top_k: Option<usize>,
    min_score: Option<f64>,
    neural: bool,
}

impl AskOverrides {
    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
        if let Some(min_score) = self.min_score {
            config.retrieval.min_score = min_score;
        }
        if self.neural {
            config.retrieval.use_neural = true;
        }
        config.validate()?;
        Ok(())
    }
}

/// Resolve the material path from the flag or the config file.
fn material_path(flag: Option<&Path>, config: &AppConfig) -> Option<PathBuf> {
    flag.map(Path::to_path_buf)
        .or_else(|| config.corpus.material_path.as_ref().map(PathBuf::from))
}

async fn cmd_ask(
    question: &str,
    material: Option<&Path>,
    overrides: AskOverrides,
    json: bool,
) -> Result<()> {
    let mut config = load_config()?;
    overrides.apply(&mut config)?;

    let session = Session::from_config(LexicalEmbeddingService, &config);
    match material_path(material, &config) {
        Some(path) => {
            let material = Material::from_path(&path)?;
            let snapshot = session.load_material(&material);
            info!(path = %path.display(), chunks = snapshot.len(), "material loaded");
        }
        None => warn!("no material given; answers will rely on general knowledge"),
    }

    let reporter = CliProgress::new(!json);
    let answer = session.answer_with_progress(question, &reporter).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    print_answer(&answer);
    Ok(())
}

fn print_answer(answer: &Answer) {
    match answer {
        Answer::Refused { decision, message } => {
            println!();
            println!("  Out of scope ({})", decision.reason);
            println!();
            println!("  {message}");
            println!();
        }
        Answer::Prompt {
            decision,
            retrieval,
            messages,
            fallback_prefix,
            retrieval_error,
        } => {
            println!();
            println!("  Scope:      {} ({:?})", decision.reason, decision.confidence);
            println!("  Evidence:   {} chunk(s)", retrieval.chunks.len());
            println!("  Confidence: {}", retrieval.confidence.as_str());
            for chunk in &retrieval.chunks {
                println!("    - {} ({})", chunk.title, chunk.section_name);
            }
            if let Some(error) = retrieval_error {
                println!("  Retrieval:  failed ({error})");
            }
            if let Some(prefix) = fallback_prefix {
                println!("  Prefix:     {prefix}");
            }
            for message in messages {
                println!();
                println!("--- {:?} ---", message.role);
                println!("{}", message.content);
            }
            println!();
        }
    }
}

async fn cmd_scope(question: &str) -> Result<()> {
    let config = load_config()?;
    let guard = ScopeGuard::new(ScopeVocabulary::from_config(&config.scope));
    let decision = guard.check_scope(question);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

async fn cmd_chunks(material: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let path = material_path(material, &config)
        .ok_or_else(|| eyre!("no material file: pass --material or set corpus.material_path"))?;

    let material = Material::from_path(&path)?;
    let snapshot = CorpusBuilder::new().build(&material);

    for id in snapshot.duplicate_ids() {
        warn!(%id, "chunk id is not unique");
    }
    println!("{}", serde_json::to_string_pretty(&snapshot.chunks)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _answer: &Answer) {
        self.spinner.finish_and_clear();
    }
}
