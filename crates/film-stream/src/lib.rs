//! Event log client for film change events.
//!
//! The log is a Redis stream per topic partition, consumed through a
//! consumer group. A message's offset is committed (`XACK`) only after its
//! handler returned `Ok`.
//!
//! # Core Invariants
//!
//! 1. **Commit-after-success**: a failed handler leaves the message pending
//! 2. **One In-Flight**: each pull delivers at most one message
//! 3. **At-least-once**: pending messages are delivered again on later pulls,
//!    so handlers must be idempotent
//! 4. **Acknowledged publish**: `write` returns only after the broker (and
//!    the configured number of replicas) accepted the message
//!
//! ```text
//! producer --XADD--> stream --XREADGROUP--> reader --handler--> store
//!                       ^                                   |
//!                       |__________ XACK on Ok _____________|
//! ```

mod client;
mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod redis_log;

#[cfg(test)]
mod tests;

pub use client::{EventReader, EventWriter, HandlerError, LogMessage, MessageHandler, ReadOutcome};
pub use error::{StreamError, StreamResult};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryLog, MemoryReader};
pub use redis_log::{RedisStreamReader, RedisStreamWriter};
