//! Configuration management for guichet
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Chat model and memory configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Structured document analysis configuration
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Downstream record services
    #[serde(default)]
    pub services: ServicesConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Embedding backend URL
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

/// Chunking configuration (token-denominated)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target chunk size in tokens
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Tokens shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Minimum chunk size in tokens (smaller trailing text is merged or dropped)
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    /// Hard ceiling on chunk size in tokens
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Prefer breaking at heading boundaries
    #[serde(default = "default_prefer_heading_boundaries")]
    pub prefer_heading_boundaries: bool,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks to retrieve
    #[serde(default = "default_retrieval_top_k")]
    pub top_k: usize,

    /// Minimum similarity score (0.0 - 1.0)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

/// Chat model and conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model identifier
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// OpenAI-compatible backend base URL
    #[serde(default = "default_chat_backend_url")]
    pub backend_url: String,

    /// Environment variable name holding the API key
    #[serde(default = "default_chat_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,

    /// Completion token budget
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,

    /// Conversation turns kept in the recency window
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,

    /// Maximum model/tool rounds per turn
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// System instruction prepended to every prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

/// Structured document analysis backend (optional high-fidelity extractor)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Enable the structured analyzer; falls back to local extraction when off
    #[serde(default)]
    pub enabled: bool,

    /// Analyzer endpoint URL
    #[serde(default)]
    pub endpoint: String,

    /// Environment variable name holding the analyzer API key
    #[serde(default = "default_analysis_key_env")]
    pub api_key_env: String,
}

/// Downstream CRUD record services reachable by the tool dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Beneficiary service base URL
    #[serde(default = "default_beneficiary_service_url")]
    pub beneficiary_url: String,

    /// Transfer service base URL
    #[serde(default = "default_transfer_service_url")]
    pub transfer_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for guichet data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,

    /// Directory where uploaded documents are stored
    pub documents_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            collection_name: default_collection_name(),
            embedding: EmbeddingConfig::default(),
            chunk: ChunkConfig::default(),
            retrieval: RetrievalConfig::default(),
            chat: ChatConfig::default(),
            analysis: AnalysisConfig::default(),
            services: ServicesConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            backend_url: default_embedding_backend_url(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            prefer_heading_boundaries: default_prefer_heading_boundaries(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_retrieval_top_k(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            backend_url: default_chat_backend_url(),
            api_key_env: default_chat_api_key_env(),
            temperature: default_chat_temperature(),
            max_tokens: default_chat_max_tokens(),
            memory_window: default_memory_window(),
            max_tool_rounds: default_max_tool_rounds(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key_env: default_analysis_key_env(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            beneficiary_url: default_beneficiary_service_url(),
            transfer_url: default_transfer_service_url(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Config {
    /// Get the default base directory for guichet (~/.guichet)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".guichet")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metadata.db"),
            documents_dir: base.join(default_documents_path()),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Set up paths based on config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("metadata.db"),
            documents_dir: base.join(default_documents_path()),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        if self.qdrant_api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Get the chat API key from environment
    pub fn chat_api_key(&self) -> Option<String> {
        std::env::var(&self.chat.api_key_env).ok()
    }

    /// Get the analyzer API key from environment
    pub fn analysis_api_key(&self) -> Option<String> {
        std::env::var(&self.analysis.api_key_env).ok()
    }

    /// Check if guichet is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.chunk_size < self.chunk.min_chunk_size {
            return Err(Error::Config(
                "chunk.chunk_size must be >= chunk.min_chunk_size".to_string(),
            ));
        }

        if self.chunk.chunk_size > self.chunk.max_chunk_size {
            return Err(Error::Config(
                "chunk.chunk_size must be <= chunk.max_chunk_size".to_string(),
            ));
        }

        if self.chunk.chunk_overlap >= self.chunk.chunk_size {
            return Err(Error::Config(
                "chunk.chunk_overlap must be < chunk.chunk_size".to_string(),
            ));
        }

        if self.retrieval.similarity_threshold < 0.0 || self.retrieval.similarity_threshold > 1.0 {
            return Err(Error::Config(
                "retrieval.similarity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be positive".to_string()));
        }

        if self.chat.memory_window == 0 {
            return Err(Error::Config("chat.memory_window must be positive".to_string()));
        }

        if self.analysis.enabled && self.analysis.endpoint.is_empty() {
            return Err(Error::Config(
                "analysis.enabled requires analysis.endpoint to be set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the database URL for sqlx
pub fn database_url(config: &Config) -> String {
    format!("sqlite://{}?mode=rwc", config.paths.db_file.display())
}
