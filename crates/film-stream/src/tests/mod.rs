//! Consumption discipline tests against the in-memory log.
//!
//! - `harness.rs`    - Scripted handler that records what it saw
//! - `commit.rs`     - Commit only after the handler accepted a message
//! - `redelivery.rs` - Uncommitted messages come back without blocking new ones
//! - `lifecycle.rs`  - Close, recover and publish failures

pub(crate) mod harness;
mod lifecycle;
