//! Configuration management for Augment
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Provider key variables (OPENAI_API_KEY, ANTHROPIC_API_KEY, GOOGLE_SEARCH_API_KEY, SEARCH_ENGINE_ID)
//! - Default values
//!
//! The loaded [`AppConfig`] is the one place the retriever set is described;
//! it is constructed once at startup and passed by reference.

use crate::errors::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Language model used for rewriting and responding
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Trace cache (Redis pub/sub) configuration
    #[serde(default)]
    pub cache: TraceCacheConfig,

    /// External search tools
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Retriever set and strategy parameters
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Completion provider
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider; inferred from the model name when absent
    pub provider: Option<LlmProvider>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Maximum output tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashing
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (hashing embedder only)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per request
    #[serde(default = "default_embedding_tries")]
    pub max_tries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraceCacheConfig {
    /// Redis URL; tracing is disabled when unset
    pub url: Option<String>,

    /// Pub/sub channel traces are published on
    #[serde(default = "default_trace_channel")]
    pub channel: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub google: GoogleSearchConfig,

    #[serde(default)]
    pub wikipedia: WikipediaConfig,

    #[serde(default)]
    pub image: ImageSearchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GoogleSearchConfig {
    /// Custom Search API key
    pub api_key: Option<String>,

    /// Programmable search engine id (cx)
    pub engine_id: Option<String>,

    /// API base URL
    #[serde(default = "default_google_base")]
    pub api_base: String,

    /// Results per query, 1..=10
    #[serde(default = "default_google_num")]
    pub num_results: u8,

    /// Pages scraped in parallel
    #[serde(default = "default_scrape_concurrency")]
    pub scrape_concurrency: usize,

    /// Per-page scrape timeout in seconds
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WikipediaConfig {
    /// Wikipedia language edition
    #[serde(default = "default_wikipedia_language")]
    pub language: String,

    /// Pages summarized per query
    #[serde(default = "default_wikipedia_num")]
    pub num_results: usize,

    /// Overrides `https://{language}.wikipedia.org`
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageSearchConfig {
    /// Images returned per query
    #[serde(default = "default_image_num")]
    pub num_results: u8,

    /// Accepted file types, `|`-separated
    #[serde(default = "default_image_file_types")]
    pub file_types: String,

    /// Usage rights filter, `|`-separated
    #[serde(default = "default_image_rights")]
    pub rights: String,

    /// Safe search level
    #[serde(default = "default_image_safe")]
    pub safe: String,
}

/// Which external tool a retriever drives
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    GoogleSearch,
    WikipediaSearch,
    ImageSearch,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::GoogleSearch => "google_search",
            ToolKind::WikipediaSearch => "wikipedia_search",
            ToolKind::ImageSearch => "image_search",
        }
    }
}

/// Load-and-search strategy
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Flat,
    AutoMerging,
    Simple,
}

/// One configured retriever
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Retriever name, e.g. `google_search_retriever`
    pub name: String,

    /// Human-readable purpose, shown to planners
    pub description: String,

    /// Tool the retriever drives
    pub tool: ToolKind,

    /// Strategy used to index and search the tool output
    pub strategy: StrategyKind,

    /// Results per retrieval
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Pass the question to the tool unchanged
    #[serde(default)]
    pub skip_rewrite: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Sub-retrievers in fan-out order
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,

    /// Chunk sizes (characters) for each level below the document, coarse to fine
    #[serde(default = "default_chunk_sizes")]
    pub chunk_sizes: Vec<usize>,

    /// Fraction of a parent's children that must be retrieved before merging
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f32,

    /// Deadline for a whole fan-out, in seconds
    pub fanout_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter (debug, info, warn, error or an EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

// Default value functions
fn default_llm_model() -> String { "claude-3-haiku-20240307".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_llm_timeout() -> u64 { 60 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 256 }
fn default_embedding_timeout() -> u64 { 60 }
fn default_embedding_tries() -> u32 { 3 }
fn default_batch_size() -> usize { 100 }
fn default_trace_channel() -> String { "tools".to_string() }
fn default_google_base() -> String { "https://www.googleapis.com/customsearch/v1".to_string() }
fn default_google_num() -> u8 { 5 }
fn default_scrape_concurrency() -> usize { 4 }
fn default_scrape_timeout() -> u64 { 10 }
fn default_wikipedia_language() -> String { "en".to_string() }
fn default_wikipedia_num() -> usize { 5 }
fn default_image_num() -> u8 { 7 }
fn default_image_file_types() -> String { "jpg|gif|png|bmp|svg|webp|ico".to_string() }
fn default_image_rights() -> String {
    "cc_publicdomain|cc_attribute|cc_sharealike|cc_noncommercial|cc_nonderived".to_string()
}
fn default_image_safe() -> String { "off".to_string() }
fn default_top_k() -> usize { 5 }
fn default_chunk_sizes() -> Vec<usize> { vec![1024, 256] }
fn default_merge_threshold() -> f32 { 0.5 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "google_search_retriever".to_string(),
            description: "Use this tool to search information from Google to answer questions"
                .to_string(),
            tool: ToolKind::GoogleSearch,
            strategy: StrategyKind::AutoMerging,
            top_k: 5,
            skip_rewrite: false,
        },
        SourceConfig {
            name: "wikipedia_search_retriever".to_string(),
            description: "Use this tool to search information from Wikipedia to answer questions"
                .to_string(),
            tool: ToolKind::WikipediaSearch,
            strategy: StrategyKind::AutoMerging,
            top_k: 5,
            skip_rewrite: false,
        },
        SourceConfig {
            name: "google_image_search_retriever".to_string(),
            description: "Use this tool to search images related to user's query from Google"
                .to_string(),
            tool: ToolKind::ImageSearch,
            strategy: StrategyKind::Simple,
            top_k: 7,
            skip_rewrite: false,
        },
    ]
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__LLM__MODEL=gpt-4o-mini
            .add_source(app_environment())

            .build()?;

        let mut config: AppConfig = config.try_deserialize()?;
        config.apply_provider_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(app_environment())
            .build()?;

        let mut config: AppConfig = config.try_deserialize()?;
        config.apply_provider_env();
        config.validate()?;
        Ok(config)
    }

    /// Fill unset keys from the provider variables that `.env` files carry
    fn apply_provider_env(&mut self) {
        fn env(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }

        if self.llm.api_key.is_none() {
            self.llm.api_key = match self.llm_provider() {
                LlmProvider::OpenAi => env("OPENAI_API_KEY"),
                LlmProvider::Anthropic => env("ANTHROPIC_API_KEY"),
            };
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = env("OPENAI_API_KEY");
        }
        if self.tools.google.api_key.is_none() {
            self.tools.google.api_key = env("GOOGLE_SEARCH_API_KEY");
        }
        if self.tools.google.engine_id.is_none() {
            self.tools.google.engine_id = env("SEARCH_ENGINE_ID");
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let google = &self.tools.google;
        if !(1..=10).contains(&google.num_results) {
            return Err(AppError::Configuration {
                message: format!(
                    "tools.google.num_results should be an integer between 1 and 10, inclusive (got {})",
                    google.num_results
                ),
            });
        }

        let sizes = &self.retrieval.chunk_sizes;
        if sizes.is_empty() || sizes.contains(&0) {
            return Err(AppError::Configuration {
                message: "retrieval.chunk_sizes must list at least one non-zero size".to_string(),
            });
        }
        if sizes.windows(2).any(|w| w[1] >= w[0]) {
            return Err(AppError::Configuration {
                message: format!("retrieval.chunk_sizes must be strictly decreasing (got {:?})", sizes),
            });
        }

        let threshold = self.retrieval.merge_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::Configuration {
                message: format!("retrieval.merge_threshold must be within [0, 1] (got {})", threshold),
            });
        }

        if let Some(source) = self.retrieval.sources.iter().find(|s| s.top_k == 0) {
            return Err(AppError::Configuration {
                message: format!("retriever '{}' has top_k = 0", source.name),
            });
        }

        Ok(())
    }

    /// Completion provider, inferred from the model name when not set
    pub fn llm_provider(&self) -> LlmProvider {
        self.llm.provider.unwrap_or_else(|| {
            if self.llm.model.contains("claude") {
                LlmProvider::Anthropic
            } else {
                LlmProvider::OpenAi
            }
        })
    }

    /// Get the fan-out deadline as Duration
    pub fn fanout_timeout(&self) -> Option<Duration> {
        self.retrieval.fanout_timeout_secs.map(Duration::from_secs)
    }
}

fn app_environment() -> Environment {
    Environment::with_prefix("APP")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("retrieval.chunk_sizes")
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: default_llm_model(),
            api_key: None,
            api_base: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_tries: default_embedding_tries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for TraceCacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            channel: default_trace_channel(),
        }
    }
}

impl Default for GoogleSearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            engine_id: None,
            api_base: default_google_base(),
            num_results: default_google_num(),
            scrape_concurrency: default_scrape_concurrency(),
            scrape_timeout_secs: default_scrape_timeout(),
        }
    }
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            language: default_wikipedia_language(),
            num_results: default_wikipedia_num(),
            api_base: None,
        }
    }
}

impl Default for ImageSearchConfig {
    fn default() -> Self {
        Self {
            num_results: default_image_num(),
            file_types: default_image_file_types(),
            rights: default_image_rights(),
            safe: default_image_safe(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            chunk_sizes: default_chunk_sizes(),
            merge_threshold: default_merge_threshold(),
            fanout_timeout_secs: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.model, "claude-3-haiku-20240307");
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.cache.channel, "tools");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_registry_order() {
        let config = AppConfig::default();
        let tools: Vec<ToolKind> = config.retrieval.sources.iter().map(|s| s.tool).collect();
        assert_eq!(
            tools,
            vec![ToolKind::GoogleSearch, ToolKind::WikipediaSearch, ToolKind::ImageSearch]
        );
        assert_eq!(config.retrieval.sources[0].strategy, StrategyKind::AutoMerging);
        assert_eq!(config.retrieval.sources[2].strategy, StrategyKind::Simple);
    }

    #[test]
    fn test_provider_inferred_from_model() {
        let mut config = AppConfig::default();
        assert_eq!(config.llm_provider(), LlmProvider::Anthropic);

        config.llm.model = "gpt-4o-mini".to_string();
        assert_eq!(config.llm_provider(), LlmProvider::OpenAi);

        config.llm.provider = Some(LlmProvider::Anthropic);
        assert_eq!(config.llm_provider(), LlmProvider::Anthropic);
    }

    #[test]
    fn test_google_result_count_bounds() {
        let mut config = AppConfig::default();
        config.tools.google.num_results = 11;
        assert!(config.validate().is_err());

        config.tools.google.num_results = 0;
        assert!(config.validate().is_err());

        config.tools.google.num_results = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_sizes_must_decrease() {
        let mut config = AppConfig::default();
        config.retrieval.chunk_sizes = vec![256, 1024];
        assert!(config.validate().is_err());

        config.retrieval.chunk_sizes = vec![];
        assert!(config.validate().is_err());

        config.retrieval.chunk_sizes = vec![512];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_threshold_range() {
        let mut config = AppConfig::default();
        config.retrieval.merge_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
