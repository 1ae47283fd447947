//! Augment Runner
//!
//! Answers one question with retrieval-augmented context:
//! - Fans the question out to every configured retriever
//! - Publishes retrieval traces to Redis when a cache URL is configured
//! - Sends the retrieved context to the language model and prints the answer

use augment_common::cache::{Cache, CacheConfig};
use augment_common::config::{AppConfig, ObservabilityConfig};
use augment_common::embeddings::create_embedder;
use augment_common::llm::create_completer;
use augment_common::metrics::register_metrics;
use augment_common::{AppError, VERSION};
use augment_retrieval::retriever::MultiRetriever;
use augment_retrieval::step::{ResponseStep, Step, StepInputs, StepValue};
use augment_retrieval::trace::{spawn_trace_publisher, TraceEmitter};
use augment_retrieval::RetrieverRegistry;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    init_tracing(&config.observability);
    register_metrics();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        anyhow::bail!("usage: augment <question>");
    }

    info!("Starting Augment v{}", VERSION);

    let completer = create_completer(&config)?;
    let embedder = create_embedder(&config.embedding)?;
    let registry = RetrieverRegistry::from_config(&config, completer.clone(), embedder)?;
    info!(retrievers = registry.len(), "Retriever registry ready");

    let (tracer, publisher) = match connect_trace_cache(&config).await {
        Some((tracer, handle)) => (Some(tracer), Some(handle)),
        None => (None, None),
    };

    let multi = registry.multi(tracer);
    let response = ResponseStep::new(completer);

    let outcome = answer(&multi, &response, &question).await;

    // Dropping the last emitter lets the publisher drain and exit
    drop(multi);
    if let Some(handle) = publisher {
        match handle.await {
            Ok(published) => info!(published, "Trace channel drained"),
            Err(e) => warn!(error = %e, "Trace publisher task failed"),
        }
    }

    match outcome {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, code = e.code().as_code(), "Request failed");
            Err(e.into())
        }
    }
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Connect to Redis and spawn the trace publisher; tracing is off without a URL
async fn connect_trace_cache(config: &AppConfig) -> Option<(TraceEmitter, JoinHandle<usize>)> {
    let Some(url) = config.cache.url.clone() else {
        info!("cache.url not set, retrieval traces disabled");
        return None;
    };

    info!("Connecting to Redis at {}", url);
    match Cache::new(CacheConfig { url }).await {
        Ok(cache) => {
            info!(channel = %config.cache.channel, "Publishing retrieval traces");
            Some(spawn_trace_publisher(Arc::new(cache), config.cache.channel.clone()))
        }
        Err(e) => {
            warn!("Failed to connect to Redis, retrieval traces disabled: {}", e);
            None
        }
    }
}

/// Resolves on the first Ctrl+C
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    warn!("Received Ctrl+C, stopping retrieval");
}

/// Retrieve, then answer from the retrieved context
///
/// A Ctrl+C during retrieval keeps what the finished retrievers found; one
/// during the response cancels the request.
async fn answer(multi: &MultiRetriever, response: &ResponseStep, question: &str) -> augment_common::Result<String> {
    let total = multi.retrievers().len();
    let results = multi.retrieve_until(question, interrupted()).await?;
    info!(results = results.len(), "Retrieval finished");

    let inputs = StepInputs::from([
        ("query".to_string(), StepValue::Text(question.to_string())),
        ("nodes".to_string(), StepValue::Results(results)),
    ]);
    let outputs = tokio::select! {
        outputs = response.run(inputs) => outputs?,
        _ = interrupted() => return Err(AppError::Cancelled { completed: total, total }),
    };

    outputs
        .get("response")
        .and_then(StepValue::as_text)
        .map(str::to_string)
        .ok_or_else(|| AppError::Internal {
            message: "response step produced no text".to_string(),
        })
}
