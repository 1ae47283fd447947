//! Augment Retrieval Library
//!
//! The retrieval-augmentation core:
//! - Evidence units and tool output normalization
//! - Chunk hierarchies and in-memory vector/BM25 indexes
//! - Tool-specific query rewriting and the external search tools
//! - Load-and-search, hybrid and multi retrievers
//! - Retrieval traces for the observability cache
//! - Retriever registry and host step functions

pub mod evidence;
pub mod hierarchy;
pub mod index;
pub mod registry;
pub mod retriever;
pub mod rewrite;
pub mod step;
pub mod testing;
pub mod tools;
pub mod trace;

// Re-export commonly used types
pub use evidence::{normalize, EvidenceUnit, MetadataMode, RawOutput};
pub use registry::{RetrieverEntry, RetrieverRegistry};
pub use retriever::{MultiRetriever, RetrieveBlocking, Retriever, ScoredResult};
pub use step::{ResponseStep, SearchStep, Step, StepInputs, StepOutputs, StepValue};
pub use trace::{spawn_trace_publisher, TraceEmitter, TracePublisher};
