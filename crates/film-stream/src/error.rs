//! Error types for the event log client.

use crate::HandlerError;
use std::time::Duration;
use thiserror::Error;

/// Event log error type.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Unexpected reply shape or stream entry layout
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Handler rejected the message; its offset was not committed
    #[error("Handler failed for message {message_id}: {source}")]
    Handler {
        message_id: String,
        #[source]
        source: HandlerError,
    },

    /// Handler succeeded but the offset commit failed; the message will be
    /// delivered again even though its side effects are in place
    #[error("Commit failed for message {message_id}: {source}")]
    Commit {
        message_id: String,
        #[source]
        source: Box<StreamError>,
    },

    /// Fewer replicas acknowledged a publish than required
    #[error("Publish {message_id} reached {acknowledged} of {required} replicas")]
    Replication {
        message_id: String,
        acknowledged: i64,
        required: u32,
    },

    /// Publish did not complete in time
    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    /// Client was closed
    #[error("Event log client is closed")]
    Closed,
}

impl StreamError {
    /// Transport-level failures worth a reconnect; handler and commit
    /// outcomes are about a single message and are not.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Redis(_) | Self::Timeout(_))
    }
}

/// Result type for event log operations.
pub type StreamResult<T> = Result<T, StreamError>;
