//! SQLite store gateway for film catalogue rows.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread ([`AsyncDatabase`])
//! - Table bootstrap for both sides of the synchronization
//! - The [`FilmStore`] capability trait and its SQLite implementation
//!
//! # Row-count discipline
//!
//! Every insert and update must change exactly one row. Zero rows is a
//! [`StoreError::WriteLost`], more than one is a [`StoreError::Integrity`]
//! violation. Neither is retried here.
//!
//! ```ignore
//! let store = SqliteFilmStore::open(&config.store, FilmTable::Legacy).await?;
//! match store.find_identity(&film.uuid, film.external_id).await? {
//!     Some(row_id) => store.update(row_id, &film).await?,
//!     None => store.insert(&film).await?,
//! }
//! ```

mod error;
mod executor;
mod gateway;
mod models;
mod schema;

pub use error::{StoreError, StoreResult, WriteOp};
pub use executor::AsyncDatabase;
pub use gateway::{FilmStore, SqliteFilmStore};
pub use models::Film;
pub use schema::{ensure_schema, FilmTable};
