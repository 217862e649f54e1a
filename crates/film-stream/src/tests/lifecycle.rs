//! Close, recover and publish behavior.

use super::harness::ScriptedHandler;
use crate::{EventReader, EventWriter, MemoryLog, StreamError};

#[tokio::test]
async fn closed_reader_refuses_reads() {
    let log = MemoryLog::new();
    log.push(b"k", b"v");
    let mut reader = log.reader();

    reader.close().await.unwrap();
    let result = reader.read(&ScriptedHandler::new()).await;

    assert!(matches!(result, Err(StreamError::Closed)));
    assert_eq!(log.pending_count(), 0);
}

#[tokio::test]
async fn transport_failure_is_flagged_for_recovery() {
    let log = MemoryLog::new();
    log.fail_next_fetches(1);
    let mut reader = log.reader();

    let err = reader.fetch().await.unwrap_err();
    assert!(err.is_transport());

    reader.recover().await.unwrap();
    assert_eq!(log.recoveries(), 1);
}

#[tokio::test]
async fn write_returns_assigned_id() {
    let log = MemoryLog::new();

    let id = log.write(b"uuid-1", b"payload").await.unwrap();

    let messages = log.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, id);
    assert_eq!(messages[0].key, b"uuid-1");
}

#[tokio::test]
async fn failed_write_appends_nothing() {
    let log = MemoryLog::new();
    log.fail_next_writes(1);

    let result = log.write(b"uuid-1", b"payload").await;

    assert!(result.is_err());
    assert!(log.is_empty());
}
