//! TOML configuration.
//!
//! ```toml
//! [index]
//! graph_path = "./data/graph.json"
//! vector_dir = "./data/vectors"
//!
//! [retrieval]
//! seed_top_k = 4
//! final_top_k = 8
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//!
//! [runtime]
//! worker_threads = 2
//! ```
//!
//! Every section is optional; [`load_config`] fills defaults and validates.

use anyhow::{bail, Context, Result};
use graphrag_core::search::RetrievalParams;
use graphrag_core::store::flat::DEFAULT_OVERFETCH;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalParams,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_graph_path")]
    pub graph_path: PathBuf,
    #[serde(default = "default_vector_dir")]
    pub vector_dir: PathBuf,
    /// Write both indexes back to disk after every mutation.
    #[serde(default = "default_persist")]
    pub persist: bool,
    /// Vector search over-fetch factor applied before metadata filtering.
    #[serde(default = "default_overfetch")]
    pub overfetch: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            graph_path: default_graph_path(),
            vector_dir: default_vector_dir(),
            persist: default_persist(),
            overfetch: default_overfetch(),
        }
    }
}

fn default_graph_path() -> PathBuf {
    PathBuf::from("./data/graph.json")
}
fn default_vector_dir() -> PathBuf {
    PathBuf::from("./data/vectors")
}
fn default_persist() -> bool {
    true
}
fn default_overfetch() -> usize {
    DEFAULT_OVERFETCH
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Overrides the model's default dimension until the first response.
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL: OpenAI-compatible endpoint root or the Ollama server.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Concurrent blocking jobs (vector rebuilds, file I/O, local inference).
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
        }
    }
}

fn default_worker_threads() -> usize {
    2
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.retrieval.seed_top_k == 0 {
        bail!("retrieval.seed_top_k must be >= 1");
    }
    if config.retrieval.final_top_k == 0 {
        bail!("retrieval.final_top_k must be >= 1");
    }
    if config.index.overfetch == 0 {
        bail!("index.overfetch must be >= 1");
    }
    if config.runtime.worker_threads == 0 {
        bail!("runtime.worker_threads must be >= 1");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
