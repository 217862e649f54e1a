//! Error types for the sync pipeline.

use film_store::StoreError;
use film_stream::StreamError;
use thiserror::Error;

/// Sync error type.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No film with this identity
    #[error("Film not found: {0}")]
    NotFound(String),

    /// Payload could not be decoded or fails validation
    #[error("Malformed film payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The row was written but the change event never reached the log.
    /// The store and the downstream sides disagree until the next write
    /// of this film.
    #[error("Film {uuid} was stored but its change event was not published: {source}")]
    PublishAfterWrite {
        uuid: String,
        #[source]
        source: StreamError,
    },
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;
