//! Error types for Augment
//!
//! Provides a single error enum for the retrieval pipeline with:
//! - Distinct variants for each failure mode of a retrieval call
//! - Machine-readable error codes grouped by family
//! - A recoverability flag used by the skip-and-continue paths

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Retrieval pipeline (1xxx)
    RewriteFailure,
    ToolInvocationFailure,
    RecordParseFailure,
    IndexBuildFailure,
    AllRetrieversFailed,
    Cancelled,

    // Upstream collaborators (2xxx)
    CompletionError,
    EmbeddingError,
    UpstreamError,

    // Trace sink (3xxx)
    CacheError,

    // Internal (9xxx)
    ConfigurationError,
    SerializationError,
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::RewriteFailure => 1001,
            ErrorCode::ToolInvocationFailure => 1002,
            ErrorCode::RecordParseFailure => 1003,
            ErrorCode::IndexBuildFailure => 1004,
            ErrorCode::AllRetrieversFailed => 1005,
            ErrorCode::Cancelled => 1006,

            ErrorCode::CompletionError => 2001,
            ErrorCode::EmbeddingError => 2002,
            ErrorCode::UpstreamError => 2003,

            ErrorCode::CacheError => 3001,

            ErrorCode::ConfigurationError => 9001,
            ErrorCode::SerializationError => 9002,
            ErrorCode::InternalError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Retrieval pipeline
    #[error("Query rewrite failed: {message}")]
    RewriteFailure { message: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("Could not parse record {record} from '{tool}': {message}")]
    RecordParse {
        tool: String,
        record: String,
        message: String,
    },

    #[error("Index build failed: {message}")]
    IndexBuild { message: String },

    #[error("All {count} retrievers failed")]
    AllRetrieversFailed { count: usize },

    #[error("Retrieval cancelled after {completed} of {total} retrievers")]
    Cancelled { completed: usize, total: usize },

    // Upstream collaborators
    #[error("Completion error: {message}")]
    Completion { message: String },

    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Trace sink
    #[error("Cache error: {message}")]
    CacheError { message: String },

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::RewriteFailure { .. } => ErrorCode::RewriteFailure,
            AppError::ToolInvocation { .. } => ErrorCode::ToolInvocationFailure,
            AppError::RecordParse { .. } => ErrorCode::RecordParseFailure,
            AppError::IndexBuild { .. } => ErrorCode::IndexBuildFailure,
            AppError::AllRetrieversFailed { .. } => ErrorCode::AllRetrieversFailed,
            AppError::Cancelled { .. } => ErrorCode::Cancelled,
            AppError::Completion { .. } => ErrorCode::CompletionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Internal { .. } | AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the failure only affects one record of a multi-record result.
    ///
    /// Recoverable errors are logged and skipped where they occur; everything
    /// else fails the retriever's contribution.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppError::RecordParse { .. })
    }

    /// Whether the failure came from a remote collaborator
    pub fn is_upstream(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::CompletionError
                | ErrorCode::EmbeddingError
                | ErrorCode::UpstreamError
                | ErrorCode::ToolInvocationFailure
                | ErrorCode::RewriteFailure
        )
    }

    /// Wrap any error raised by a tool call
    pub fn tool(tool: impl Into<String>, err: impl std::fmt::Display) -> Self {
        AppError::ToolInvocation {
            tool: tool.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
