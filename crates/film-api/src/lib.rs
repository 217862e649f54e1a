//! HTTP write API for the film catalogue.
//!
//! Thin marshalling over [`film_sync_core::CatalogueService`]: not-found
//! maps to 404, malformed bodies to 400 and everything else to 500.

mod error;
mod routes;
mod server;

pub use error::{ApiError, ApiErrorBody, ApiResult};
pub use routes::FilmResponse;
pub use server::{router, serve, AppState};
