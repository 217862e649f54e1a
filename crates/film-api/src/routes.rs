//! Catalogue routes.
//!
//! - `POST /catalogue`        - Create a film
//! - `GET  /catalogue/:uuid`  - Get a film by identity
//! - `PUT  /catalogue/:uuid`  - Update a film's title and year
//!
//! Bodies are decoded with the event codec, so `year` may be an integer or
//! a `YYYY-MM-DD` date.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use film_store::Film;
use film_sync_core::codec;
use serde::Serialize;

use crate::error::ApiResult;
use crate::server::AppState;

/// Film response body.
#[derive(Debug, Serialize)]
pub struct FilmResponse {
    pub uuid: String,
    pub title: String,
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl From<Film> for FilmResponse {
    fn from(film: Film) -> Self {
        Self {
            uuid: film.uuid,
            title: film.title,
            year: film.year,
            last_update: film.last_update,
        }
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/catalogue", post(create_film))
        .route("/catalogue/:uuid", get(get_film).put(update_film))
}

/// POST /api/v1/catalogue
async fn create_film(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let input = codec::decode(&body)?;
    let film = state.service.create(input).await?;
    Ok((StatusCode::CREATED, Json(FilmResponse::from(film))))
}

/// GET /api/v1/catalogue/:uuid
async fn get_film(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> ApiResult<Json<FilmResponse>> {
    let film = state.service.read(&uuid).await?;
    Ok(Json(film.into()))
}

/// PUT /api/v1/catalogue/:uuid
async fn update_film(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    body: Bytes,
) -> ApiResult<Json<FilmResponse>> {
    let input = codec::decode(&body)?;
    let film = state.service.update(&uuid, input).await?;
    Ok(Json(film.into()))
}
