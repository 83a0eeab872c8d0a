//! Error types for the store crate.

use thiserror::Error;

/// Errors from index-store backends and the bulk pipeline.
///
/// None of these ever reach an RPC caller; the pipeline logs and drops.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never reached the backend (connect, DNS, timeout).
    #[error("store transport error: {0}")]
    Transport(String),

    /// The backend answered with an error status.
    #[error("store returned error: {0}")]
    Backend(String),

    /// Non-blocking enqueue was rejected because the queue is at capacity.
    #[error("audit queue is full")]
    QueueFull,

    /// Enqueue after the indexer was closed.
    #[error("bulk indexer is stopped")]
    Stopped,

    /// The event carries no primary key and must not be stored.
    #[error("event has an empty primary key")]
    EmptyPrimaryKey,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
