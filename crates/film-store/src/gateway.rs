//! Store gateway: identity lookup and row-count-checked writes.

use crate::{AsyncDatabase, Film, FilmTable, StoreError, StoreResult, WriteOp};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use film_sync_config::StoreConfig;
use rusqlite::{params, OptionalExtension};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Stored timestamps written by other tools of the legacy side.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Store capabilities the reconciler and the write path depend on.
///
/// Implementations must bound every call in time and must report any write
/// that did not change exactly one row.
#[async_trait]
pub trait FilmStore: Send + Sync {
    /// Row id of the film matching `uuid`, or `external_id` when given.
    /// `Ok(None)` means no match and is not an error.
    async fn find_identity(&self, uuid: &str, external_id: Option<i64>)
        -> StoreResult<Option<i64>>;

    /// Full film for `uuid`.
    async fn find_by_identity(&self, uuid: &str) -> StoreResult<Option<Film>>;

    /// Insert `film` under `film.uuid`.
    async fn insert(&self, film: &Film) -> StoreResult<()>;

    /// Overwrite the business fields of row `row_id`, and of any other row
    /// already carrying `film.uuid`, with those of `film`.
    async fn update(&self, row_id: i64, film: &Film) -> StoreResult<()>;
}

/// SQLite-backed [`FilmStore`] for one side of the synchronization.
#[derive(Clone)]
pub struct SqliteFilmStore {
    db: AsyncDatabase,
    table: FilmTable,
    query_timeout: Duration,
}

impl SqliteFilmStore {
    /// Open the configured database and bootstrap `table`.
    pub async fn open(config: &StoreConfig, table: FilmTable) -> StoreResult<Self> {
        let db = AsyncDatabase::open(&config.dsn, table).await?;
        Ok(Self::new(db, table, config.query_timeout))
    }

    /// Wrap an already opened database. The table must exist.
    pub fn new(db: AsyncDatabase, table: FilmTable, query_timeout: Duration) -> Self {
        Self {
            db,
            table,
            query_timeout,
        }
    }

    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }

    /// Number of rows in the table.
    pub async fn count(&self) -> StoreResult<i64> {
        let sql = self.table.count_sql();
        self.bounded(self.db.call(move |conn| {
            conn.query_row(sql, [], |row| row.get(0))
                .map_err(StoreError::from)
        }))
        .await
    }

    /// Close the underlying connection.
    pub async fn close(self) -> StoreResult<()> {
        self.db.close().await
    }

    /// Each call gets its own execution window; dropping the timed-out
    /// future releases the caller even if the executor is still busy.
    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.query_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.query_timeout))?
    }

    /// Run one write statement inside the call's execution window.
    ///
    /// The statement runs in its own transaction on the executor thread and
    /// commits only if it changed exactly one row before the deadline. A
    /// write still queued when the caller gave up never touches the table.
    async fn bounded_write<F>(&self, op: WriteOp, uuid: &str, write: F) -> StoreResult<()>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<usize> + Send + 'static,
    {
        let window = self.query_timeout;
        let deadline = Instant::now() + window;
        let uuid = uuid.to_string();

        self.bounded(self.db.call(move |conn| {
            if Instant::now() >= deadline {
                return Err(StoreError::Timeout(window));
            }

            // Dropping the transaction without commit rolls it back
            let tx = conn.unchecked_transaction()?;
            let affected = write(&tx)?;
            check_single_row(affected, op, &uuid)?;

            if Instant::now() >= deadline {
                return Err(StoreError::Timeout(window));
            }
            tx.commit()?;
            Ok(())
        }))
        .await
    }
}

/// Exactly one row must change.
fn check_single_row(affected: usize, op: WriteOp, uuid: &str) -> StoreResult<()> {
    match affected {
        1 => Ok(()),
        0 => Err(StoreError::WriteLost {
            op,
            uuid: uuid.to_string(),
        }),
        n => Err(StoreError::Integrity {
            op,
            uuid: uuid.to_string(),
            affected: n,
        }),
    }
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.unwrap_or_else(Utc::now).to_rfc3339()
}

/// RFC 3339, or the legacy `YYYY-MM-DD HH:MM:SS` read as UTC. Empty is unset.
fn parse_timestamp(value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    let Some(value) = value.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&value) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&value, LEGACY_TIMESTAMP_FORMAT)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| StoreError::InvalidData(format!("unreadable last_update {value:?}")))
}

/// Columns of `select_by_uuid_sql`, in order.
type FilmRow = (i64, Option<String>, Option<i64>, String, i32, Option<String>);

fn film_from_row(row: FilmRow) -> StoreResult<Film> {
    let (row_id, uuid, external_id, title, year, last_update) = row;
    Ok(Film {
        row_id: Some(row_id),
        uuid: uuid.unwrap_or_default(),
        external_id,
        title,
        year,
        last_update: parse_timestamp(last_update)?,
    })
}

#[async_trait]
impl FilmStore for SqliteFilmStore {
    async fn find_identity(
        &self,
        uuid: &str,
        external_id: Option<i64>,
    ) -> StoreResult<Option<i64>> {
        let sql = self.table.find_identity_sql();
        let uuid = uuid.to_string();

        self.bounded(self.db.call(move |conn| {
            conn.query_row(sql, params![uuid, external_id], |row| row.get(0))
                .optional()
                .map_err(StoreError::from)
        }))
        .await
    }

    async fn find_by_identity(&self, uuid: &str) -> StoreResult<Option<Film>> {
        let sql = self.table.select_by_uuid_sql();
        let uuid = uuid.to_string();

        self.bounded(self.db.call(move |conn| {
            let row: Option<FilmRow> = conn
                .query_row(sql, params![uuid], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })
                .optional()?;
            row.map(film_from_row).transpose()
        }))
        .await
    }

    async fn insert(&self, film: &Film) -> StoreResult<()> {
        let sql = self.table.insert_sql();
        let uuid = film.uuid.clone();
        let external_id = film.external_id;
        let title = film.title.clone();
        let year = film.year;
        let last_update = format_timestamp(film.last_update);

        self.bounded_write(WriteOp::Insert, &film.uuid, move |conn| {
            conn.execute(sql, params![uuid, external_id, title, year, last_update])
        })
        .await?;

        debug!(table = self.table.name(), uuid = %film.uuid, "Inserted film");
        Ok(())
    }

    async fn update(&self, row_id: i64, film: &Film) -> StoreResult<()> {
        let sql = self.table.update_sql();
        let uuid = film.uuid.clone();
        let external_id = film.external_id;
        let title = film.title.clone();
        let year = film.year;
        let last_update = format_timestamp(film.last_update);

        self.bounded_write(WriteOp::Update, &film.uuid, move |conn| {
            conn.execute(
                sql,
                params![uuid, external_id, title, year, last_update, row_id],
            )
        })
        .await?;

        debug!(table = self.table.name(), uuid = %film.uuid, row_id, "Updated film");
        Ok(())
    }
}
