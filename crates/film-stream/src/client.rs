//! Reader and writer capabilities of the event log.

use crate::{StreamError, StreamResult};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Error a handler hands back to the reader.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// One message pulled from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    /// Log-assigned id (e.g. `1712345678901-0`). Commits refer to it.
    pub id: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Result of a successful pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Nothing arrived within the block window.
    Idle,
    /// The handler accepted the message and its offset is committed.
    Committed { message_id: String },
}

/// Processes one message's key and value.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, key: &[u8], value: &[u8]) -> Result<(), HandlerError>;
}

/// Consuming side of the log.
///
/// Implementors provide `fetch` and `commit`; [`EventReader::read`] ties
/// them together with the commit-after-success rule.
#[async_trait]
pub trait EventReader: Send {
    /// Next message for this consumer, or `None` when the block window
    /// expired. Messages that were delivered but never committed come back
    /// through here as well.
    async fn fetch(&mut self) -> StreamResult<Option<LogMessage>>;

    /// Commit the offset of `message`.
    async fn commit(&mut self, message: &LogMessage) -> StreamResult<()>;

    /// Re-establish the connection after a transport error.
    async fn recover(&mut self) -> StreamResult<()> {
        Ok(())
    }

    /// Release the connection. Later reads fail with [`StreamError::Closed`].
    async fn close(&mut self) -> StreamResult<()> {
        Ok(())
    }

    /// Pull exactly one message and run `handler` on it.
    ///
    /// The offset is committed only if the handler returns `Ok`. A handler
    /// error leaves the message uncommitted so it is delivered again. A
    /// failed commit after a successful handler is reported; the handler's
    /// side effects stay in place.
    async fn read(&mut self, handler: &dyn MessageHandler) -> StreamResult<ReadOutcome> {
        let Some(message) = self.fetch().await? else {
            return Ok(ReadOutcome::Idle);
        };

        if let Err(source) = handler.handle(&message.key, &message.value).await {
            debug!(message_id = %message.id, "Handler failed, leaving message uncommitted");
            return Err(StreamError::Handler {
                message_id: message.id,
                source,
            });
        }

        if let Err(e) = self.commit(&message).await {
            warn!(
                message_id = %message.id,
                error = %e,
                "Handler succeeded but commit failed; message will be redelivered"
            );
            return Err(StreamError::Commit {
                message_id: message.id,
                source: Box::new(e),
            });
        }

        Ok(ReadOutcome::Committed {
            message_id: message.id,
        })
    }
}

/// Producing side of the log.
#[async_trait]
pub trait EventWriter: Send + Sync {
    /// Append one message and wait until the log acknowledged it.
    /// Returns the id the log assigned.
    async fn write(&self, key: &[u8], value: &[u8]) -> StreamResult<String>;
}
