pub mod auth;
pub mod dashboard;
pub mod entities;
pub mod health;
pub mod progress;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::models::{Document, Interview, Job, JobApplication, Question, QuestionCategory, Task};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/v1/auth/sign-up", post(auth::handle_sign_up))
        .route("/api/v1/auth/sign-in", post(auth::handle_sign_in))
        .route("/api/v1/auth/sign-out", post(auth::handle_sign_out))
        .route(
            "/api/v1/auth/reset-password",
            post(auth::handle_reset_password),
        )
        .route(
            "/api/v1/auth/oauth/callback",
            post(auth::handle_oauth_callback),
        )
        .route("/api/v1/auth/oauth/:provider", get(auth::handle_oauth_url))
        .route("/api/v1/auth/session", get(auth::handle_session))
        // Progress
        .route("/api/v1/progress", get(progress::handle_list_progress))
        .route(
            "/api/v1/progress/:question_id",
            put(progress::handle_put_progress),
        )
        .route(
            "/api/v1/progress/:question_id/reset",
            post(progress::handle_reset_progress),
        )
        .route(
            "/api/v1/progress/:question_id/solve",
            post(progress::handle_record_solve),
        )
        // Dashboard
        .route("/api/v1/dashboard", get(dashboard::handle_dashboard))
        .route(
            "/api/v1/notifications",
            get(dashboard::handle_notifications),
        );

    // Entity tables
    let router = entities::mount::<Job>(router, "/api/v1/jobs");
    let router = entities::mount::<JobApplication>(router, "/api/v1/applications");
    let router = entities::mount::<Interview>(router, "/api/v1/interviews");
    let router = entities::mount::<Task>(router, "/api/v1/tasks");
    let router = entities::mount::<Question>(router, "/api/v1/questions");
    let router = entities::mount::<QuestionCategory>(router, "/api/v1/categories");
    let router = entities::mount::<Document>(router, "/api/v1/documents");

    router.with_state(state)
}
