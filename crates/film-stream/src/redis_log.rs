//! Redis Streams implementation of the event log.
//!
//! Handles XREADGROUP, XACK and XADD against one stream key. Each entry
//! carries two fields, `key` and `value`.

use crate::{EventReader, EventWriter, LogMessage, StreamError, StreamResult};
use async_trait::async_trait;
use film_sync_config::StreamConfig;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const KEY_FIELD: &str = "key";
const VALUE_FIELD: &str = "value";

/// Start of the consumer's own pending entries list.
const PENDING_START: &str = "0";

/// Only messages never delivered to any consumer of the group.
const NEW_MESSAGES: &str = ">";

/// One stream entry as returned by XREADGROUP.
enum Entry {
    Message(LogMessage),
    /// Pending entry whose payload was trimmed from the stream.
    Deleted(String),
}

/// Consumer-group reader for one stream.
pub struct RedisStreamReader {
    client: Client,
    conn: Option<MultiplexedConnection>,
    stream_key: String,
    group: String,
    consumer: String,
    block_ms: u64,
    /// Position inside this consumer's pending list. Walking it one entry
    /// per pull means a message that keeps failing is retried without
    /// holding back the ones behind it.
    pending_cursor: String,
}

impl RedisStreamReader {
    /// Connect and make sure the consumer group exists.
    ///
    /// `default_group` is used when the configuration does not name one.
    pub async fn connect(config: &StreamConfig, default_group: &str) -> StreamResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;

        let reader = Self {
            client,
            conn: Some(conn),
            stream_key: config.stream_key(),
            group: config.group_or(default_group),
            consumer: config.consumer_or(default_group),
            block_ms: config.block_ms,
            pending_cursor: PENDING_START.to_string(),
        };

        reader.ensure_consumer_group().await?;

        info!(
            stream = %reader.stream_key,
            group = %reader.group,
            consumer = %reader.consumer,
            "Connected event log reader"
        );

        Ok(reader)
    }

    fn conn(&self) -> StreamResult<MultiplexedConnection> {
        self.conn.clone().ok_or(StreamError::Closed)
    }

    /// Ensure the consumer group exists, creating it if necessary.
    async fn ensure_consumer_group(&self) -> StreamResult<()> {
        // `0` so a freshly created group also sees messages published
        // before the first consumer started.
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.conn()?)
            .await;

        match result {
            Ok(()) => {
                info!(stream = %self.stream_key, group = %self.group, "Created consumer group");
            }
            Err(e) => {
                // BUSYGROUP means the group already exists, which is fine
                if e.to_string().contains("BUSYGROUP") {
                    debug!(stream = %self.stream_key, group = %self.group, "Consumer group already exists");
                } else {
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    /// XREADGROUP with COUNT=1 from `start`. Only new-message reads block.
    async fn read_group(&self, start: &str) -> StreamResult<Option<Entry>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1);
        if start == NEW_MESSAGES {
            cmd.arg("BLOCK").arg(self.block_ms);
        }
        cmd.arg("STREAMS").arg(&self.stream_key).arg(start);

        let value: Value = cmd.query_async(&mut self.conn()?).await?;
        parse_xreadgroup_response(value)
    }

    async fn ack(&self, message_id: &str) -> StreamResult<()> {
        let acked: i64 = self
            .conn()?
            .xack(&self.stream_key, &self.group, &[message_id])
            .await?;

        if acked == 1 {
            debug!(message_id = %message_id, stream = %self.stream_key, "Acknowledged message");
        } else {
            warn!(
                message_id = %message_id,
                stream = %self.stream_key,
                "XACK returned {}, message may not exist",
                acked
            );
        }
        Ok(())
    }
}

#[async_trait]
impl EventReader for RedisStreamReader {
    async fn fetch(&mut self) -> StreamResult<Option<LogMessage>> {
        // Redeliver from the pending list first, one entry per pull
        loop {
            let cursor = self.pending_cursor.clone();
            match self.read_group(&cursor).await? {
                Some(Entry::Message(message)) => {
                    self.pending_cursor = message.id.clone();
                    info!(message_id = %message.id, "Redelivering uncommitted message");
                    return Ok(Some(message));
                }
                Some(Entry::Deleted(id)) => {
                    warn!(message_id = %id, "Pending message was trimmed from the stream, acknowledging");
                    self.pending_cursor = id.clone();
                    self.ack(&id).await?;
                }
                None => {
                    self.pending_cursor = PENDING_START.to_string();
                    break;
                }
            }
        }

        match self.read_group(NEW_MESSAGES).await? {
            Some(Entry::Message(message)) => {
                debug!(
                    message_id = %message.id,
                    value_len = message.value.len(),
                    "Read message from stream"
                );
                Ok(Some(message))
            }
            Some(Entry::Deleted(id)) => {
                self.ack(&id).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn commit(&mut self, message: &LogMessage) -> StreamResult<()> {
        self.ack(&message.id).await
    }

    async fn recover(&mut self) -> StreamResult<()> {
        if self.conn.is_none() {
            return Err(StreamError::Closed);
        }
        info!("Reconnecting to Redis...");
        self.conn = Some(self.client.get_multiplexed_async_connection().await?);
        self.ensure_consumer_group().await?;
        Ok(())
    }

    async fn close(&mut self) -> StreamResult<()> {
        if self.conn.take().is_some() {
            info!(stream = %self.stream_key, "Event log reader released");
        }
        Ok(())
    }
}

/// Producer for one stream.
#[derive(Clone)]
pub struct RedisStreamWriter {
    conn: MultiplexedConnection,
    stream_key: String,
    min_replicas: u32,
    publish_timeout: Duration,
}

impl RedisStreamWriter {
    pub async fn connect(config: &StreamConfig) -> StreamResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;

        info!(
            stream = %config.stream_key(),
            min_replicas = config.min_replicas,
            "Connected event log writer"
        );

        Ok(Self {
            conn,
            stream_key: config.stream_key(),
            min_replicas: config.min_replicas,
            publish_timeout: config.publish_timeout,
        })
    }

    async fn append(&self, key: &[u8], value: &[u8]) -> StreamResult<String> {
        let mut conn = self.conn.clone();

        let message_id: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg(KEY_FIELD)
            .arg(key)
            .arg(VALUE_FIELD)
            .arg(value)
            .query_async(&mut conn)
            .await?;

        if self.min_replicas > 0 {
            let timeout_ms = self.publish_timeout.as_millis() as u64;
            let acknowledged: i64 = redis::cmd("WAIT")
                .arg(self.min_replicas)
                .arg(timeout_ms)
                .query_async(&mut conn)
                .await?;

            if acknowledged < i64::from(self.min_replicas) {
                return Err(StreamError::Replication {
                    message_id,
                    acknowledged,
                    required: self.min_replicas,
                });
            }
        }

        Ok(message_id)
    }
}

#[async_trait]
impl EventWriter for RedisStreamWriter {
    async fn write(&self, key: &[u8], value: &[u8]) -> StreamResult<String> {
        let message_id = tokio::time::timeout(self.publish_timeout, self.append(key, value))
            .await
            .map_err(|_| StreamError::Timeout(self.publish_timeout))??;

        debug!(message_id = %message_id, stream = %self.stream_key, "Published message");
        Ok(message_id)
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(s) => Some(String::from_utf8_lossy(s).to_string()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn value_to_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::BulkString(s) => Some(s.clone()),
        Value::SimpleString(s) => Some(s.as_bytes().to_vec()),
        _ => None,
    }
}

/// Extract the first entry from an XREADGROUP reply.
///
/// Reply format:
/// `[[stream_key, [[message_id, [field1, value1, ...]]]]]`
fn parse_xreadgroup_response(value: Value) -> StreamResult<Option<Entry>> {
    let streams = match value {
        Value::Array(streams) => streams,
        Value::Nil => return Ok(None),
        other => {
            return Err(StreamError::Protocol(format!(
                "Unexpected XREADGROUP response type: {:?}",
                other
            )))
        }
    };

    let Some(stream) = streams.first() else {
        return Ok(None);
    };
    let stream = match stream {
        Value::Array(s) if s.len() >= 2 => s,
        _ => {
            return Err(StreamError::Protocol(
                "Expected [key, messages] for stream entry".to_string(),
            ))
        }
    };

    let messages = match &stream[1] {
        Value::Array(m) => m,
        Value::Nil => return Ok(None),
        _ => {
            return Err(StreamError::Protocol(
                "Expected array for messages".to_string(),
            ))
        }
    };

    let Some(message) = messages.first() else {
        return Ok(None);
    };
    let message = match message {
        Value::Array(m) if !m.is_empty() => m,
        _ => {
            return Err(StreamError::Protocol(
                "Expected array for message".to_string(),
            ))
        }
    };

    let message_id = value_to_string(&message[0]).ok_or_else(|| {
        StreamError::Protocol(format!(
            "Expected string for message ID, got {:?}",
            message[0]
        ))
    })?;

    let fields = match message.get(1) {
        Some(Value::Array(f)) => f,
        Some(Value::Nil) | None => return Ok(Some(Entry::Deleted(message_id))),
        Some(other) => {
            return Err(StreamError::Protocol(format!(
                "Expected array for fields, got {:?}",
                other
            )))
        }
    };

    let mut key = Vec::new();
    let mut payload = None;
    for pair in fields.chunks_exact(2) {
        match value_to_string(&pair[0]).as_deref() {
            Some(KEY_FIELD) => key = value_to_bytes(&pair[1]).unwrap_or_default(),
            Some(VALUE_FIELD) => payload = value_to_bytes(&pair[1]),
            _ => {}
        }
    }

    // A missing value field is handed on as an empty payload so the handler
    // rejects it like any other undecodable message.
    Ok(Some(Entry::Message(LogMessage {
        id: message_id,
        key,
        value: payload.unwrap_or_default(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn reply(id: &str, fields: Value) -> Value {
        Value::Array(vec![Value::Array(vec![
            bulk("catalogue.films:0"),
            Value::Array(vec![Value::Array(vec![bulk(id), fields])]),
        ])])
    }

    #[test]
    fn test_parse_message_with_key_and_value() {
        let value = reply(
            "1-0",
            Value::Array(vec![bulk("key"), bulk("uuid-1"), bulk("value"), bulk("{}")]),
        );

        match parse_xreadgroup_response(value).unwrap() {
            Some(Entry::Message(message)) => {
                assert_eq!(message.id, "1-0");
                assert_eq!(message.key, b"uuid-1");
                assert_eq!(message.value, b"{}");
            }
            _ => panic!("expected a message"),
        }
    }

    #[test]
    fn test_parse_nil_is_idle() {
        assert!(parse_xreadgroup_response(Value::Nil).unwrap().is_none());
    }

    #[test]
    fn test_parse_empty_pending_list() {
        let value = Value::Array(vec![Value::Array(vec![
            bulk("catalogue.films:0"),
            Value::Array(vec![]),
        ])]);
        assert!(parse_xreadgroup_response(value).unwrap().is_none());
    }

    #[test]
    fn test_parse_trimmed_pending_entry() {
        let value = reply("7-0", Value::Nil);
        match parse_xreadgroup_response(value).unwrap() {
            Some(Entry::Deleted(id)) => assert_eq!(id, "7-0"),
            _ => panic!("expected a deleted entry"),
        }
    }

    #[test]
    fn test_parse_missing_value_field_yields_empty_payload() {
        let value = reply("2-0", Value::Array(vec![bulk("key"), bulk("k")]));
        match parse_xreadgroup_response(value).unwrap() {
            Some(Entry::Message(message)) => assert!(message.value.is_empty()),
            _ => panic!("expected a message"),
        }
    }

    #[test]
    fn test_parse_unexpected_shape_is_protocol_error() {
        let result = parse_xreadgroup_response(Value::Int(3));
        assert!(matches!(result, Err(StreamError::Protocol(_))));
    }
}
