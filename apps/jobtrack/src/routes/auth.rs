use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthPhase, OAuthProvider, Session, SignUpOutcome, User};
use crate::errors::{AppError, TrackerError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ResetRequest {
    pub email: String,
    pub redirect_to: Option<String>,
}

#[derive(Deserialize)]
pub struct RedirectQuery {
    pub redirect_to: String,
}

#[derive(Deserialize)]
pub struct CallbackRequest {
    /// Full redirect URL, fragment included.
    pub url: String,
}

/// Session as exposed locally. Tokens stay inside the process.
#[derive(Serialize)]
pub struct SessionView {
    pub user: User,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            user: session.user,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Serialize)]
pub struct SignUpResponse {
    pub confirmation_required: bool,
    pub user: User,
}

#[derive(Serialize)]
pub struct AuthStateView {
    pub phase: AuthPhase,
    pub has_session: bool,
    pub user: Option<User>,
}

#[derive(Serialize)]
pub struct AuthorizeUrl {
    pub url: String,
}

/// POST /api/v1/auth/sign-up
pub async fn handle_sign_up(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<(StatusCode, Json<SignUpResponse>), AppError> {
    let outcome = state.tracker.auth.sign_up(&req.email, &req.password).await?;
    let response = match outcome {
        SignUpOutcome::SignedIn(session) => SignUpResponse {
            confirmation_required: false,
            user: session.user,
        },
        SignUpOutcome::ConfirmationRequired(user) => SignUpResponse {
            confirmation_required: true,
            user,
        },
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/sign-in
pub async fn handle_sign_in(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.tracker.auth.sign_in(&req.email, &req.password).await?;
    Ok(Json(session.into()))
}

/// POST /api/v1/auth/sign-out
pub async fn handle_sign_out(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.tracker.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/reset-password
pub async fn handle_reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Result<StatusCode, AppError> {
    state
        .tracker
        .auth
        .reset_password(&req.email, req.redirect_to.as_deref())
        .await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/v1/auth/oauth/:provider?redirect_to=...
pub async fn handle_oauth_url(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<RedirectQuery>,
) -> Result<Json<AuthorizeUrl>, AppError> {
    let provider: OAuthProvider = provider.parse().map_err(TrackerError::from)?;
    Ok(Json(AuthorizeUrl {
        url: state.tracker.auth.oauth_url(provider, &query.redirect_to),
    }))
}

/// POST /api/v1/auth/oauth/callback
pub async fn handle_oauth_callback(
    State(state): State<AppState>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.tracker.auth.complete_oauth_redirect(&req.url).await?;
    Ok(Json(session.into()))
}

/// GET /api/v1/auth/session
pub async fn handle_session(State(state): State<AppState>) -> Json<AuthStateView> {
    let current = state.tracker.auth.current();
    Json(AuthStateView {
        phase: current.phase,
        has_session: current.has_session(),
        user: current.user().cloned(),
    })
}
