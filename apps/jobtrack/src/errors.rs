use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::auth::AuthError;
use crate::notify::Notifier;
use crate::query::QueryError;
use crate::remote::RemoteError;

/// Error returned by every store and auth operation.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Invalid input: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid query: {0}")]
    Query(#[from] QueryError),

    #[error("{0} is already in progress")]
    InFlight(String),

    #[error("Unexpected row shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No row returned for {0}")]
    NoRowReturned(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Authentication,
    Authorization,
    NotFound,
    Validation,
    ServerConfig,
    Unknown,
}

impl ErrorKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Authentication => "UNAUTHENTICATED",
            ErrorKind::Authorization => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::ServerConfig => "SERVER_CONFIG_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Network error. Check your connection and try again.",
            ErrorKind::Authentication => "Your session has expired. Please sign in again.",
            ErrorKind::Authorization => "You don't have permission to perform this action.",
            ErrorKind::NotFound => "The requested record was not found.",
            ErrorKind::Validation => "The submitted data is invalid.",
            ErrorKind::ServerConfig => "The service is misconfigured. Please contact support.",
            ErrorKind::Unknown => "An unexpected error occurred.",
        }
    }
}

/// An error mapped onto the taxonomy, with the message shown to the user.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Classified {
    pub kind: ErrorKind,
    pub message: String,
}

impl Classified {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn of(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }
}

/// Maps any tracker error to the taxonomy. Unrecognised errors are `Unknown`.
pub fn classify(err: &TrackerError) -> Classified {
    match err {
        TrackerError::NotAuthenticated => Classified::new(
            ErrorKind::Authentication,
            "You must be signed in to do that.",
        ),
        TrackerError::Auth(e) => Classified::new(ErrorKind::Validation, e.to_string()),
        TrackerError::Query(e) => Classified::new(ErrorKind::Validation, e.to_string()),
        TrackerError::InFlight(what) => Classified::new(
            ErrorKind::Validation,
            format!("{what} is already in progress."),
        ),
        TrackerError::NoRowReturned(_) => Classified::of(ErrorKind::NotFound),
        TrackerError::Invalid(what) => Classified::new(ErrorKind::Validation, what.clone()),
        TrackerError::Decode(_) => Classified::of(ErrorKind::Unknown),
        TrackerError::Remote(remote) => classify_remote(remote),
    }
}

fn classify_remote(err: &RemoteError) -> Classified {
    match err {
        RemoteError::Http(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
            Classified::of(ErrorKind::Network)
        }
        RemoteError::Unavailable(_) => Classified::of(ErrorKind::Network),
        RemoteError::Parse(_) => Classified::of(ErrorKind::Unknown),
        _ => {
            if let Some(classified) = err.code().and_then(classify_code) {
                return classified;
            }
            match err.status() {
                Some(401) => Classified::of(ErrorKind::Authentication),
                Some(403) => Classified::of(ErrorKind::Authorization),
                Some(404) => Classified::of(ErrorKind::NotFound),
                Some(400) | Some(409) | Some(422) => match err {
                    RemoteError::Api { message, .. } if !message.is_empty() => {
                        Classified::new(ErrorKind::Validation, message.clone())
                    }
                    _ => Classified::of(ErrorKind::Validation),
                },
                _ => Classified::of(ErrorKind::Unknown),
            }
        }
    }
}

/// Backend codes: PostgREST (`PGRST*`), Postgres SQLSTATE, auth service.
fn classify_code(code: &str) -> Option<Classified> {
    let classified = match code {
        "PGRST301" | "PGRST302" | "bad_jwt" | "session_not_found" | "session_expired" => {
            Classified::of(ErrorKind::Authentication)
        }
        "invalid_grant" | "invalid_credentials" => {
            Classified::new(ErrorKind::Authentication, "Invalid email or password.")
        }
        "42501" => Classified::of(ErrorKind::Authorization),
        "PGRST116" => Classified::of(ErrorKind::NotFound),
        "23505" | "user_already_exists" => {
            Classified::new(ErrorKind::Validation, "This record already exists.")
        }
        "23503" => Classified::new(
            ErrorKind::Validation,
            "This record references an item that no longer exists.",
        ),
        "23502" => Classified::new(ErrorKind::Validation, "A required field is missing."),
        "22P02" | "23514" | "weak_password" | "validation_failed" => {
            Classified::of(ErrorKind::Validation)
        }
        "42P01" | "42703" | "PGRST000" | "PGRST001" | "PGRST002" | "PGRST204" | "PGRST205" => {
            Classified::of(ErrorKind::ServerConfig)
        }
        _ => return None,
    };
    Some(classified)
}

/// The single error-presentation path: classify, log, toast unless silenced.
pub fn report(err: &TrackerError, notifier: &Notifier, action: &str, silent: bool) -> Classified {
    let classified = classify(err);
    match classified.kind {
        ErrorKind::Unknown | ErrorKind::ServerConfig => {
            error!("{action} failed ({:?}): {err}", classified.kind)
        }
        _ => warn!("{action} failed ({:?}): {err}", classified.kind),
    }

    if matches!(err, TrackerError::InFlight(_)) {
        // Double submissions are dropped quietly.
        debug!("suppressing toast for duplicate submission of {action}");
    } else if !silent {
        notifier.error(classified.message.clone());
    }
    classified
}

/// Error type of the local HTTP API.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Tracker(TrackerError::InFlight(what)) => (
                StatusCode::CONFLICT,
                "IN_FLIGHT",
                format!("{what} is already in progress"),
            ),
            AppError::Tracker(e) => {
                let classified = classify(e);
                let status = match classified.kind {
                    ErrorKind::Network => StatusCode::BAD_GATEWAY,
                    ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
                    ErrorKind::Authorization => StatusCode::FORBIDDEN,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::ServerConfig => StatusCode::BAD_GATEWAY,
                    ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, classified.kind.as_code(), classified.message)
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
