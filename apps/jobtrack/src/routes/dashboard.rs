use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::notify::Notification;
use crate::state::AppState;
use crate::views::DashboardSummary;

/// GET /api/v1/dashboard
pub async fn handle_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardSummary>, AppError> {
    Ok(Json(state.tracker.summary().await?))
}

/// GET /api/v1/notifications
/// Hands over every queued toast; each is returned once.
pub async fn handle_notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.notifications.lock().await.drain())
}
