//! Augment Common Library
//!
//! Shared code for the Augment crates including:
//! - Error types and handling
//! - Configuration management
//! - Language model and embedding clients
//! - Redis publish client for retrieval traces
//! - Metrics

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::{ChatMessage, Completer};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default completion model
pub const DEFAULT_MODEL_NAME: &str = "claude-3-haiku-20240307";
