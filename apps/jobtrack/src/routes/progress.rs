use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{ProgressUpdate, UserQuestionProgress};
use crate::state::AppState;

/// GET /api/v1/progress
pub async fn handle_list_progress(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserQuestionProgress>>, AppError> {
    Ok(Json(state.tracker.progress.fetch().await?))
}

/// PUT /api/v1/progress/:question_id
pub async fn handle_put_progress(
    State(state): State<AppState>,
    Path(question_id): Path<Uuid>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<UserQuestionProgress>, AppError> {
    let row = state
        .tracker
        .progress
        .update_progress(question_id, update)
        .await?;
    Ok(Json(row))
}

/// POST /api/v1/progress/:question_id/reset
pub async fn handle_reset_progress(
    State(state): State<AppState>,
    Path(question_id): Path<Uuid>,
) -> Result<Json<UserQuestionProgress>, AppError> {
    Ok(Json(state.tracker.progress.reset_progress(question_id).await?))
}

/// POST /api/v1/progress/:question_id/solve
pub async fn handle_record_solve(
    State(state): State<AppState>,
    Path(question_id): Path<Uuid>,
) -> Result<Json<UserQuestionProgress>, AppError> {
    Ok(Json(state.tracker.progress.record_solve(question_id).await?))
}
