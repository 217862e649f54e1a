//! Downstream consumer loop.
//!
//! Pulls one event at a time, decodes it and reconciles it into the local
//! store. A failing message is logged and left uncommitted; the loop moves
//! on and the message is retried on a later pull, indefinitely.

use crate::codec;
use crate::reconcile::Reconciler;
use async_trait::async_trait;
use film_stream::{EventReader, HandlerError, MessageHandler, ReadOutcome, StreamError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

const ERROR_PAUSE: Duration = Duration::from_millis(100);
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Decodes a film event and reconciles it.
pub struct FilmEventHandler {
    reconciler: Reconciler,
}

impl FilmEventHandler {
    pub fn new(reconciler: Reconciler) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl MessageHandler for FilmEventHandler {
    async fn handle(&self, _key: &[u8], value: &[u8]) -> Result<(), HandlerError> {
        let event = codec::decode(value)?;
        self.reconciler.insert_or_update(event).await?;
        Ok(())
    }
}

/// Runs a [`FilmEventHandler`] against one reader until told to stop.
pub struct ConsumerLoop<R> {
    name: String,
    reader: R,
    handler: FilmEventHandler,
    error_pause: Duration,
    reconnect_pause: Duration,
}

impl<R: EventReader> ConsumerLoop<R> {
    pub fn new(name: impl Into<String>, reader: R, handler: FilmEventHandler) -> Self {
        Self {
            name: name.into(),
            reader,
            handler,
            error_pause: ERROR_PAUSE,
            reconnect_pause: RECONNECT_PAUSE,
        }
    }

    /// Override the pauses taken after a failed message and after a
    /// transport error.
    pub fn with_pauses(mut self, error_pause: Duration, reconnect_pause: Duration) -> Self {
        self.error_pause = error_pause;
        self.reconnect_pause = reconnect_pause;
        self
    }

    /// Loop until `shutdown` fires (or its sender is dropped) and hand the
    /// reader back so the caller can close it.
    ///
    /// A pull in progress when shutdown arrives is abandoned. Its message is
    /// not committed and will be delivered again.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> R {
        info!(consumer = %self.name, "Starting consumer loop");

        loop {
            let result = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                result = self.reader.read(&self.handler) => Some(result),
            };

            let Some(result) = result else {
                info!(consumer = %self.name, "Consumer loop stopping");
                break;
            };

            match result {
                Ok(ReadOutcome::Idle) => {
                    debug!(consumer = %self.name, "No messages available, continuing to poll...");
                }
                Ok(ReadOutcome::Committed { message_id }) => {
                    debug!(consumer = %self.name, message_id = %message_id, "Message applied");
                }
                Err(StreamError::Closed) => {
                    warn!(consumer = %self.name, "Event log reader closed, stopping");
                    break;
                }
                Err(e) if e.is_transport() => {
                    error!(consumer = %self.name, error = %e, "Event log error, attempting to reconnect...");
                    tokio::time::sleep(self.reconnect_pause).await;
                    if let Err(reconnect_err) = self.reader.recover().await {
                        error!(consumer = %self.name, error = %reconnect_err, "Failed to reconnect");
                    }
                }
                Err(e) => {
                    error!(consumer = %self.name, error = %e, "Error processing message");
                    tokio::time::sleep(self.error_pause).await;
                }
            }
        }

        self.reader
    }
}
