//! Write path of the authoritative catalogue.
//!
//! Every mutation is persist, then publish, then re-read. The store write
//! and the publish do not share a transaction: when publishing fails the
//! row stays written and the caller gets [`SyncError::PublishAfterWrite`].
//! Nothing compensates for it; the next successful write of the same film
//! publishes the current state again.

use crate::codec::{self, FilmEvent};
use crate::{SyncError, SyncResult};
use chrono::Utc;
use film_store::{Film, FilmStore};
use film_stream::EventWriter;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Create, read and update films on the catalogue side.
#[derive(Clone)]
pub struct CatalogueService {
    store: Arc<dyn FilmStore>,
    writer: Arc<dyn EventWriter>,
}

impl CatalogueService {
    pub fn new(store: Arc<dyn FilmStore>, writer: Arc<dyn EventWriter>) -> Self {
        Self { store, writer }
    }

    /// Store a new film under a fresh identity and publish it.
    pub async fn create(&self, input: FilmEvent) -> SyncResult<Film> {
        validate(&input)?;

        let film = Film {
            row_id: None,
            uuid: Uuid::new_v4().to_string(),
            external_id: None,
            title: input.title,
            year: input.year,
            last_update: Some(Utc::now()),
        };

        self.store.insert(&film).await?;
        self.publish(&film).await?;
        info!(uuid = %film.uuid, "Created film");

        self.read(&film.uuid).await
    }

    pub async fn read(&self, uuid: &str) -> SyncResult<Film> {
        self.store
            .find_by_identity(uuid)
            .await?
            .ok_or_else(|| SyncError::NotFound(uuid.to_string()))
    }

    /// Overwrite title and year of an existing film and publish it.
    pub async fn update(&self, uuid: &str, input: FilmEvent) -> SyncResult<Film> {
        validate(&input)?;

        let existing = self.read(uuid).await?;
        let row_id = existing
            .row_id
            .ok_or_else(|| SyncError::NotFound(uuid.to_string()))?;

        let film = Film {
            row_id: Some(row_id),
            uuid: existing.uuid,
            external_id: existing.external_id,
            title: input.title,
            year: input.year,
            last_update: Some(Utc::now()),
        };

        self.store.update(row_id, &film).await?;
        self.publish(&film).await?;
        info!(uuid = %film.uuid, row_id, "Updated film");

        self.read(uuid).await
    }

    async fn publish(&self, film: &Film) -> SyncResult<()> {
        let payload = codec::encode(&FilmEvent::from(film))?;

        if let Err(source) = self.writer.write(film.uuid.as_bytes(), &payload).await {
            error!(
                uuid = %film.uuid,
                error = %source,
                "Film stored but change event not published"
            );
            return Err(SyncError::PublishAfterWrite {
                uuid: film.uuid.clone(),
                source,
            });
        }
        Ok(())
    }
}

fn validate(input: &FilmEvent) -> SyncResult<()> {
    if input.title.trim().is_empty() {
        return Err(SyncError::Malformed("title is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use film_store::{FilmTable, SqliteFilmStore};
    use film_stream::MemoryLog;
    use film_sync_config::StoreConfig;

    async fn service() -> (CatalogueService, SqliteFilmStore, MemoryLog) {
        let config = StoreConfig {
            dsn: ":memory:".to_string(),
            ..Default::default()
        };
        let store = SqliteFilmStore::open(&config, FilmTable::Catalogue)
            .await
            .unwrap();
        let log = MemoryLog::new();
        let service = CatalogueService::new(Arc::new(store.clone()), Arc::new(log.clone()));
        (service, store, log)
    }

    fn input(title: &str, year: i32) -> FilmEvent {
        FilmEvent {
            title: title.to_string(),
            year,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_publishes() {
        let (service, _store, log) = service().await;
        let body = codec::decode(br#"{"title":"Blade Runner","year":"1982-06-25"}"#).unwrap();

        let film = service.create(body).await.unwrap();

        assert!(Uuid::parse_str(&film.uuid).is_ok());
        assert_eq!(film.year, 1982);
        assert!(film.row_id.is_some());

        let messages = log.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, film.uuid.as_bytes());
        let published = codec::decode(&messages[0].value).unwrap();
        assert_eq!(published.uuid, film.uuid);
        assert_eq!(published.title, "Blade Runner");
    }

    #[tokio::test]
    async fn test_create_ignores_client_identity() {
        let (service, _store, _log) = service().await;
        let mut body = input("Alien", 1979);
        body.uuid = "client-chosen".to_string();

        let film = service.create(body).await.unwrap();

        assert_ne!(film.uuid, "client-chosen");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (service, store, log) = service().await;

        let result = service.read("nonexistent-uuid").await;

        assert!(matches!(result, Err(SyncError::NotFound(_))));
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_update_overwrites_and_republishes() {
        let (service, store, log) = service().await;
        let created = service.create(input("Alien", 1979)).await.unwrap();

        let updated = service
            .update(&created.uuid, input("Aliens", 1986))
            .await
            .unwrap();

        assert_eq!(updated.uuid, created.uuid);
        assert_eq!(updated.business_fields(), ("Aliens", 1986));
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found_and_publishes_nothing() {
        let (service, _store, log) = service().await;

        let result = service.update("nonexistent-uuid", input("Alien", 1979)).await;

        assert!(matches!(result, Err(SyncError::NotFound(_))));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_missing_title_is_malformed() {
        let (service, store, _log) = service().await;

        let result = service.create(input("  ", 1979)).await;

        assert!(matches!(result, Err(SyncError::Malformed(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_reports_partial_write() {
        let (service, store, log) = service().await;
        log.fail_next_writes(1);

        let result = service.create(input("Heat", 1995)).await;

        let uuid = match result {
            Err(SyncError::PublishAfterWrite { uuid, .. }) => uuid,
            other => panic!("expected publish failure, got {other:?}"),
        };
        // The row stays written
        assert!(store.find_by_identity(&uuid).await.unwrap().is_some());
        assert!(log.is_empty());
    }
}
