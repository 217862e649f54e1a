//! Store error types.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Write operation that failed its row-count check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Update,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => f.write_str("insert"),
            Self::Update => f.write_str("update"),
        }
    }
}

/// Store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Executor thread or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Store call did not finish inside its execution window
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// Write matched no row (row disappeared or guard predicate never matched)
    #[error("Film {uuid} was not written: {op} affected no rows")]
    WriteLost { op: WriteOp, uuid: String },

    /// Write changed more than one row
    #[error("Data integrity violation: {op} of film {uuid} affected {affected} rows")]
    Integrity {
        op: WriteOp,
        uuid: String,
        affected: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be mapped back to a film
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
