//! In-process event log with consumer-group semantics.
//!
//! Mirrors what the Redis implementation does for a single group and a
//! single consumer: delivered messages stay pending until committed and
//! come back on later pulls. Fault injection hooks let callers exercise
//! commit and transport failures without a broker.

use crate::{EventReader, EventWriter, LogMessage, StreamError, StreamResult};
use async_trait::async_trait;
use redis::{ErrorKind, RedisError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How long an idle pull waits before reporting nothing arrived.
const IDLE_WAIT: Duration = Duration::from_millis(10);

#[derive(Default)]
struct State {
    entries: Vec<(u64, LogMessage)>,
    /// Index of the first entry never delivered.
    delivered: usize,
    /// Sequence numbers delivered but not committed, in delivery order.
    pending: Vec<u64>,
    ack_log: Vec<String>,
    next_seq: u64,
    fail_commits: usize,
    fail_writes: usize,
    fail_fetches: usize,
    recoveries: usize,
}

impl State {
    fn message(&self, seq: u64) -> Option<LogMessage> {
        self.entries
            .iter()
            .find(|(s, _)| *s == seq)
            .map(|(_, m)| m.clone())
    }
}

fn injected(what: &'static str) -> StreamError {
    StreamError::Redis(RedisError::from((ErrorKind::IoError, what)))
}

fn seq_of(message_id: &str) -> Option<u64> {
    message_id.split('-').next()?.parse().ok()
}

/// Shared in-memory stream. Clones see the same messages.
#[derive(Clone, Default)]
pub struct MemoryLog {
    state: Arc<Mutex<State>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reader bound to this log's only consumer group.
    pub fn reader(&self) -> MemoryReader {
        MemoryReader {
            log: self.clone(),
            pending_cursor: None,
            closed: false,
        }
    }

    /// Append a message and return its id.
    pub fn push(&self, key: &[u8], value: &[u8]) -> String {
        let mut state = self.state();
        state.next_seq += 1;
        let seq = state.next_seq;
        let id = format!("{seq}-0");
        state.entries.push((
            seq,
            LogMessage {
                id: id.clone(),
                key: key.to_vec(),
                value: value.to_vec(),
            },
        ));
        id
    }

    /// Every message ever appended, in log order.
    pub fn messages(&self) -> Vec<LogMessage> {
        self.state().entries.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivered but uncommitted messages.
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Messages never delivered to the group.
    pub fn undelivered_count(&self) -> usize {
        let state = self.state();
        state.entries.len() - state.delivered
    }

    /// Commits in the order they happened.
    pub fn ack_log(&self) -> Vec<String> {
        self.state().ack_log.clone()
    }

    pub fn ack_count(&self) -> usize {
        self.state().ack_log.len()
    }

    pub fn was_acked(&self, message_id: &str) -> bool {
        self.state().ack_log.iter().any(|id| id == message_id)
    }

    /// Make the next `n` commits fail with a transport error.
    pub fn fail_next_commits(&self, n: usize) {
        self.state().fail_commits = n;
    }

    /// Make the next `n` writes fail with a transport error.
    pub fn fail_next_writes(&self, n: usize) {
        self.state().fail_writes = n;
    }

    /// Make the next `n` fetches fail with a transport error.
    pub fn fail_next_fetches(&self, n: usize) {
        self.state().fail_fetches = n;
    }

    /// Number of times a reader re-established its connection.
    pub fn recoveries(&self) -> usize {
        self.state().recoveries
    }
}

#[async_trait]
impl EventWriter for MemoryLog {
    async fn write(&self, key: &[u8], value: &[u8]) -> StreamResult<String> {
        {
            let mut state = self.state();
            if state.fail_writes > 0 {
                state.fail_writes -= 1;
                return Err(injected("injected write failure"));
            }
        }
        Ok(self.push(key, value))
    }
}

/// Reader over a [`MemoryLog`].
pub struct MemoryReader {
    log: MemoryLog,
    /// Last pending entry handed out; `None` restarts at the head of the
    /// pending list.
    pending_cursor: Option<u64>,
    closed: bool,
}

impl MemoryReader {
    fn next(&mut self) -> StreamResult<Option<LogMessage>> {
        let mut state = self.log.state();
        if state.fail_fetches > 0 {
            state.fail_fetches -= 1;
            return Err(injected("injected fetch failure"));
        }

        let after = self.pending_cursor.unwrap_or(0);
        if let Some(seq) = state.pending.iter().copied().find(|seq| *seq > after) {
            self.pending_cursor = Some(seq);
            return Ok(state.message(seq));
        }
        self.pending_cursor = None;

        if state.delivered < state.entries.len() {
            let (seq, message) = state.entries[state.delivered].clone();
            state.delivered += 1;
            state.pending.push(seq);
            return Ok(Some(message));
        }

        Ok(None)
    }
}

#[async_trait]
impl EventReader for MemoryReader {
    async fn fetch(&mut self) -> StreamResult<Option<LogMessage>> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let message = self.next()?;
        if message.is_none() {
            tokio::time::sleep(IDLE_WAIT).await;
        }
        Ok(message)
    }

    async fn commit(&mut self, message: &LogMessage) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let mut state = self.log.state();
        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            return Err(injected("injected commit failure"));
        }

        let seq = seq_of(&message.id)
            .ok_or_else(|| StreamError::Protocol(format!("Bad message id {}", message.id)))?;
        if let Some(pos) = state.pending.iter().position(|s| *s == seq) {
            state.pending.remove(pos);
            state.ack_log.push(message.id.clone());
        }
        Ok(())
    }

    async fn recover(&mut self) -> StreamResult<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.log.state().recoveries += 1;
        self.pending_cursor = None;
        Ok(())
    }

    async fn close(&mut self) -> StreamResult<()> {
        self.closed = true;
        Ok(())
    }
}
