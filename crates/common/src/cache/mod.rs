//! Redis pub/sub integration
//!
//! Retrieval traces are published, not stored: subscribers that are not
//! listening when a trace is published never see it. This module owns the
//! connection; deciding what to publish belongs to the retrieval core.

use crate::errors::{AppError, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tokio::sync::Mutex;
use tracing::debug;

/// Redis connection settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Redis publish client
pub struct Cache {
    connection: Mutex<MultiplexedConnection>,
    config: CacheConfig,
}

impl Cache {
    /// Connect to Redis
    pub async fn new(config: CacheConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to create Redis client: {}", e),
            })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection: Mutex::new(connection),
            config,
        })
    }

    /// Publish a payload; returns the number of subscribers that received it
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        let mut conn = self.connection.lock().await;

        let receivers: usize = conn.publish(channel, payload).await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to publish to '{}': {}", channel, e),
            })?;

        debug!(channel, receivers, bytes = payload.len(), "Published");
        Ok(receivers)
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.lock().await;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }

    /// Redis URL this client connected to
    pub fn url(&self) -> &str {
        &self.config.url
    }
}
