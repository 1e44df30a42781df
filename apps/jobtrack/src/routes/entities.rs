use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::{AppState, StoreFor};
use crate::views::{list_page, ListParams, Page};

/// GET /api/v1/{table}
/// Refreshes the store, then returns one filtered page of it.
pub async fn handle_list<E: StoreFor>(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<E>>, AppError> {
    let items = E::store(&state.tracker).fetch().await?;
    Ok(Json(list_page(items, &params)))
}

/// POST /api/v1/{table}
pub async fn handle_create<E: StoreFor>(
    State(state): State<AppState>,
    Json(input): Json<E::New>,
) -> Result<(StatusCode, Json<E>), AppError> {
    let created = E::store(&state.tracker).create(&input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PATCH /api/v1/{table}/:id
pub async fn handle_update<E: StoreFor>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<E::Patch>,
) -> Result<Json<E>, AppError> {
    let updated = E::store(&state.tracker).update(id, &patch).await?;
    Ok(Json(updated))
}

/// DELETE /api/v1/{table}/:id
pub async fn handle_delete<E: StoreFor>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    E::store(&state.tracker).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mounts list/create at `path` and update/delete at `path/:id`.
pub fn mount<E: StoreFor>(router: Router<AppState>, path: &str) -> Router<AppState> {
    router
        .route(path, get(handle_list::<E>).post(handle_create::<E>))
        .route(
            &format!("{path}/:id"),
            patch(handle_update::<E>).delete(handle_delete::<E>),
        )
}
