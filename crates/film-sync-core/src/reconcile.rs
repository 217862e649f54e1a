//! Insert-or-update decision for inbound film events.
//!
//! The identity lookup that precedes every write is what makes repeated
//! delivery of one event safe: the second delivery resolves to the update
//! branch and converges on the same title and year. `last_update` is
//! touched on every update, so only business fields are idempotent.

use crate::{FilmEvent, SyncError, SyncResult};
use chrono::Utc;
use film_store::FilmStore;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Where the identity of a newly inserted film comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityPolicy {
    /// The event must carry the identity.
    Carried,
    /// Keep a carried identity, mint one for events that have none. Such
    /// events must carry an external id so redelivery finds the minted row.
    CarriedOrMinted,
}

/// Which branch a reconciliation took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Inserted { uuid: String },
    /// `uuid` is empty when the event matched on `external_id` alone.
    Updated {
        uuid: String,
        external_id: Option<i64>,
        row_id: i64,
    },
}

/// Applies film events to one store.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn FilmStore>,
    policy: IdentityPolicy,
}

impl Reconciler {
    pub fn new(store: Arc<dyn FilmStore>, policy: IdentityPolicy) -> Self {
        Self { store, policy }
    }

    /// Insert the film if no row matches its identity, otherwise overwrite
    /// the matching row's title and year.
    pub async fn insert_or_update(&self, event: FilmEvent) -> SyncResult<Reconciled> {
        self.check_identity(&event)?;

        let existing = self
            .store
            .find_identity(&event.uuid, event.external_id)
            .await?;

        let mut film = event.into_film();
        match existing {
            None => {
                if film.uuid.is_empty() {
                    film.uuid = Uuid::new_v4().to_string();
                    debug!(uuid = %film.uuid, external_id = ?film.external_id, "Minted identity");
                }
                if film.last_update.is_none() {
                    film.last_update = Some(Utc::now());
                }
                self.store.insert(&film).await?;
                info!(uuid = %film.uuid, external_id = ?film.external_id, "Inserted film");
                Ok(Reconciled::Inserted { uuid: film.uuid })
            }
            Some(row_id) => {
                film.last_update = Some(Utc::now());
                self.store.update(row_id, &film).await?;
                info!(uuid = %film.uuid, external_id = ?film.external_id, row_id, "Updated film");
                Ok(Reconciled::Updated {
                    uuid: film.uuid,
                    external_id: film.external_id,
                    row_id,
                })
            }
        }
    }

    fn check_identity(&self, event: &FilmEvent) -> SyncResult<()> {
        match self.policy {
            IdentityPolicy::Carried if event.uuid.is_empty() => Err(SyncError::Malformed(
                "event carries no film identity".to_string(),
            )),
            IdentityPolicy::CarriedOrMinted
                if event.uuid.is_empty() && event.external_id.is_none() =>
            {
                Err(SyncError::Malformed(
                    "event carries neither an identity nor an external id".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use film_store::{FilmTable, SqliteFilmStore, StoreError};
    use film_sync_config::StoreConfig;

    async fn reconciler(table: FilmTable, policy: IdentityPolicy) -> (Reconciler, SqliteFilmStore) {
        let config = StoreConfig {
            dsn: ":memory:".to_string(),
            ..Default::default()
        };
        let store = SqliteFilmStore::open(&config, table).await.unwrap();
        (Reconciler::new(Arc::new(store.clone()), policy), store)
    }

    fn event(uuid: &str, title: &str, year: i32) -> FilmEvent {
        FilmEvent {
            uuid: uuid.to_string(),
            title: title.to_string(),
            year,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_absent_identity_inserts() {
        let (reconciler, store) = reconciler(FilmTable::Legacy, IdentityPolicy::Carried).await;

        let outcome = reconciler
            .insert_or_update(event("u-1", "Alien", 1979))
            .await
            .unwrap();

        assert_eq!(outcome, Reconciled::Inserted { uuid: "u-1".to_string() });
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_present_identity_updates_without_new_row() {
        let (reconciler, store) = reconciler(FilmTable::Legacy, IdentityPolicy::Carried).await;
        reconciler
            .insert_or_update(event("u-1", "Alien", 1979))
            .await
            .unwrap();

        let outcome = reconciler
            .insert_or_update(event("u-1", "Aliens", 1986))
            .await
            .unwrap();

        assert!(matches!(outcome, Reconciled::Updated { .. }));
        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.find_by_identity("u-1").await.unwrap().unwrap();
        assert_eq!(stored.business_fields(), ("Aliens", 1986));
    }

    #[tokio::test]
    async fn test_repeated_application_converges() {
        let (reconciler, store) = reconciler(FilmTable::Legacy, IdentityPolicy::Carried).await;
        let heat = event("u-heat", "Heat", 1995);

        for _ in 0..3 {
            reconciler.insert_or_update(heat.clone()).await.unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.find_by_identity("u-heat").await.unwrap().unwrap();
        assert_eq!(stored.business_fields(), ("Heat", 1995));
    }

    #[tokio::test]
    async fn test_carried_identity_is_required() {
        let (reconciler, store) = reconciler(FilmTable::Legacy, IdentityPolicy::Carried).await;

        let result = reconciler.insert_or_update(event("", "Ran", 1985)).await;

        assert!(matches!(result, Err(SyncError::Malformed(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_minted_identity_is_stable_across_redelivery() {
        let (reconciler, store) =
            reconciler(FilmTable::Catalogue, IdentityPolicy::CarriedOrMinted).await;
        let mut legacy_row = event("", "Ran", 1985);
        legacy_row.external_id = Some(7);

        let first = reconciler.insert_or_update(legacy_row.clone()).await.unwrap();
        let Reconciled::Inserted { uuid } = first else {
            panic!("first delivery should insert");
        };
        assert!(!uuid.is_empty());

        let second = reconciler.insert_or_update(legacy_row).await.unwrap();
        assert!(matches!(
            second,
            Reconciled::Updated {
                external_id: Some(7),
                ..
            }
        ));

        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.find_by_identity(&uuid).await.unwrap().unwrap();
        assert_eq!(stored.external_id, Some(7));
    }

    #[tokio::test]
    async fn test_carried_identity_is_kept_on_catalogue_side() {
        let (reconciler, store) =
            reconciler(FilmTable::Catalogue, IdentityPolicy::CarriedOrMinted).await;
        let mut known = event("u-known", "Heat", 1995);
        known.external_id = Some(3);

        reconciler.insert_or_update(known).await.unwrap();

        assert!(store.find_by_identity("u-known").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_event_without_any_identity_is_malformed() {
        let (reconciler, _store) =
            reconciler(FilmTable::Catalogue, IdentityPolicy::CarriedOrMinted).await;

        let result = reconciler.insert_or_update(event("", "Nameless", 2000)).await;

        assert!(matches!(result, Err(SyncError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_store_failure_is_propagated() {
        let (reconciler, store) = reconciler(FilmTable::Legacy, IdentityPolicy::Carried).await;
        store.database().clone().close().await.unwrap();

        let result = reconciler.insert_or_update(event("u-1", "Alien", 1979)).await;

        assert!(matches!(
            result,
            Err(SyncError::Store(StoreError::Connection(_)))
        ));
    }
}
