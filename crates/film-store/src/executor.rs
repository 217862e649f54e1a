//! Async SQLite executor using a dedicated background thread.
//!
//! All statements for one database go through a single `tokio_rusqlite`
//! connection. Clones share that connection, so every caller in a process
//! uses the same handle and statements run in FIFO order.
//!
//! Only SQL and light row mapping belong inside [`AsyncDatabase::call`].

use crate::{ensure_schema, FilmTable, StoreError, StoreResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

/// DSN that opens a private in-memory database.
pub(crate) const IN_MEMORY_DSN: &str = ":memory:";

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> StoreError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => StoreError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => StoreError::Connection("Connection closed".to_string()),
        other => StoreError::Connection(other.to_string()),
    }
}

/// Async SQLite database with a dedicated executor thread.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Open the database named by `dsn` and make sure `table` exists.
    ///
    /// `:memory:` opens a private in-memory database; anything else is a
    /// file path whose parent directory is created if missing.
    pub async fn open(dsn: &str, table: FilmTable) -> StoreResult<Self> {
        let conn = if dsn == IN_MEMORY_DSN {
            Connection::open_in_memory()
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?
        } else {
            let path = Path::new(dsn);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?
        };

        info!(path = %dsn, table = table.name(), "Opening film database");

        conn.call(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
            Ok(())
        })
        .await
        .map_err(from_tokio_rusqlite)?;

        let db = Self {
            conn,
            path: dsn.to_string(),
        };
        db.call(move |conn| ensure_schema(conn, table)).await?;

        Ok(db)
    }

    /// Run a closure on the executor thread. The caller's task is parked,
    /// not blocked, until the result is ready.
    pub async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // Our result rides inside tokio_rusqlite's Ok so StoreError survives
        // the trip back unchanged.
        let outer_result = self.conn.call(move |conn| Ok(f(conn))).await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// Check if the database is healthy by executing a simple query.
    pub async fn health_check(&self) -> StoreResult<()> {
        self.call(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await?;
        debug!("Database health check passed");
        Ok(())
    }

    /// Close the connection, waiting for queued statements first. Other
    /// clones of this handle fail with a connection error afterwards.
    pub async fn close(self) -> StoreResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_file_database_creates_parent_dir() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("legacy.db");

        let db = AsyncDatabase::open(db_path.to_str().unwrap(), FilmTable::Legacy)
            .await
            .unwrap();

        assert!(db_path.exists());
        assert!(db.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_open_in_memory_bootstraps_table() {
        let db = AsyncDatabase::open(IN_MEMORY_DSN, FilmTable::Catalogue)
            .await
            .unwrap();

        let count: i64 = db
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM films", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .await
            .unwrap();

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_clones_share_one_connection() {
        let db = AsyncDatabase::open(IN_MEMORY_DSN, FilmTable::Catalogue)
            .await
            .unwrap();

        let mut handles = vec![];
        for i in 0..10 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.call(move |conn| {
                    conn.execute(
                        "INSERT INTO films (uuid, title, year, last_update) VALUES (?1, 't', 0, '')",
                        [format!("uuid-{i}")],
                    )?;
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let count: i64 = db
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM films", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .await
            .unwrap();
        assert_eq!(count, 10);
    }

    #[tokio::test]
    async fn test_close_then_call_fails() {
        let db = AsyncDatabase::open(IN_MEMORY_DSN, FilmTable::Legacy)
            .await
            .unwrap();
        let other = db.clone();

        db.close().await.unwrap();

        let result = other.health_check().await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }
}
