//! Table layouts for the two sides of the synchronization.
//!
//! Versioned migrations are out of scope; a store only makes sure its own
//! table exists before first use.

use crate::StoreResult;
use rusqlite::Connection;
use tracing::debug;

/// Which table a store reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilmTable {
    /// `films`: the catalogue side, written by the write API and by the
    /// catalogue synchronizer.
    Catalogue,
    /// `film`: the legacy side, written by the legacy synchronizer.
    Legacy,
}

impl FilmTable {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Catalogue => "films",
            Self::Legacy => "film",
        }
    }

    pub(crate) fn create_sql(&self) -> &'static str {
        match self {
            Self::Catalogue => {
                "
                CREATE TABLE IF NOT EXISTS films (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL,
                    external_id INTEGER,
                    title TEXT NOT NULL,
                    year INTEGER NOT NULL DEFAULT 0,
                    last_update TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_films_uuid ON films(uuid);
                CREATE INDEX IF NOT EXISTS idx_films_external_id ON films(external_id);
                "
            }
            Self::Legacy => {
                "
                CREATE TABLE IF NOT EXISTS film (
                    film_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT,
                    language_id INTEGER NOT NULL DEFAULT 1,
                    title TEXT NOT NULL,
                    release_year INTEGER NOT NULL DEFAULT 0,
                    last_update TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_film_uuid ON film(uuid);
                "
            }
        }
    }

    /// Row id matching either the identity or the alternate identity.
    pub(crate) fn find_identity_sql(&self) -> &'static str {
        match self {
            Self::Catalogue => {
                "SELECT id FROM films
                 WHERE uuid = ?1 OR (?2 IS NOT NULL AND external_id = ?2)
                 ORDER BY id LIMIT 1"
            }
            Self::Legacy => {
                "SELECT film_id FROM film
                 WHERE uuid = ?1 OR (?2 IS NOT NULL AND film_id = ?2)
                 ORDER BY film_id LIMIT 1"
            }
        }
    }

    /// Columns: row id, uuid, external id, title, year, last update.
    pub(crate) fn select_by_uuid_sql(&self) -> &'static str {
        match self {
            Self::Catalogue => {
                "SELECT id, uuid, external_id, title, year, last_update
                 FROM films WHERE uuid = ?1 ORDER BY id LIMIT 1"
            }
            Self::Legacy => {
                "SELECT film_id, uuid, NULL, title, release_year, last_update
                 FROM film WHERE uuid = ?1 ORDER BY film_id LIMIT 1"
            }
        }
    }

    /// Params: uuid, external id, title, year, last update. The legacy table
    /// has no external id column and leaves `?2` unused.
    ///
    /// The insert is guarded on `uuid`, so a row written concurrently under
    /// the same identity turns this into a zero-row write.
    pub(crate) fn insert_sql(&self) -> &'static str {
        match self {
            Self::Catalogue => {
                "INSERT INTO films (uuid, external_id, title, year, last_update)
                 SELECT ?1, ?2, ?3, ?4, ?5
                 WHERE (SELECT COUNT(id) FROM films WHERE uuid = ?1) = 0"
            }
            Self::Legacy => {
                "INSERT INTO film (uuid, language_id, title, release_year, last_update)
                 SELECT ?1, 1, ?3, ?4, ?5
                 WHERE (SELECT COUNT(film_id) FROM film WHERE uuid = ?1) = 0"
            }
        }
    }

    /// Params: uuid, external id, title, year, last update, row id.
    ///
    /// An identity already on the row is never replaced; the legacy table
    /// only adopts `?1` for rows that predate it. Rows already carrying `?1`
    /// are matched as well, so a duplicated identity shows in the row count.
    pub(crate) fn update_sql(&self) -> &'static str {
        match self {
            Self::Catalogue => {
                "UPDATE films
                 SET external_id = COALESCE(?2, external_id),
                     title = ?3, year = ?4, last_update = ?5
                 WHERE id = ?6 OR (?1 <> '' AND uuid = ?1)"
            }
            Self::Legacy => {
                "UPDATE film
                 SET uuid = COALESCE(NULLIF(uuid, ''), NULLIF(?1, '')),
                     title = ?3, release_year = ?4, last_update = ?5
                 WHERE film_id = ?6 OR (NULLIF(?1, '') IS NOT NULL AND uuid = ?1)"
            }
        }
    }

    pub(crate) fn count_sql(&self) -> &'static str {
        match self {
            Self::Catalogue => "SELECT COUNT(*) FROM films",
            Self::Legacy => "SELECT COUNT(*) FROM film",
        }
    }
}

/// Create the table for `table` if it does not exist yet.
pub fn ensure_schema(conn: &Connection, table: FilmTable) -> StoreResult<()> {
    conn.execute_batch(table.create_sql())?;
    debug!(table = table.name(), "Film table ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        for table in [FilmTable::Catalogue, FilmTable::Legacy] {
            ensure_schema(&conn, table).unwrap();
            ensure_schema(&conn, table).unwrap();

            let count: i64 = conn
                .query_row(table.count_sql(), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn test_table_names() {
        assert_eq!(FilmTable::Catalogue.name(), "films");
        assert_eq!(FilmTable::Legacy.name(), "film");
    }
}
