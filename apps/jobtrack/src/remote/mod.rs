//! Boundary to the hosted data service.
//!
//! Every read and write the stores perform goes through [`RemoteService`].
//! Rows cross the boundary as JSON objects; typing happens in the stores.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::query::{Filter, Query};

pub mod memory;
pub mod rest;

pub use memory::MemoryRemote;
pub use rest::RestRemote;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RemoteError {
    pub fn api(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        RemoteError::Api {
            status,
            code: code.map(str::to_string),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    /// Backend error code, when the service reported one.
    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Api { status, .. } => Some(*status),
            RemoteError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Error body returned by the REST query interface.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl ApiErrorBody {
    pub(crate) fn into_error(self, status: u16, fallback: String) -> RemoteError {
        RemoteError::Api {
            status,
            code: self.code,
            message: self.message.unwrap_or(fallback),
            details: self.details,
            hint: self.hint,
        }
    }
}

/// Table-scoped CRUD against the hosted data service.
///
/// Mutations return the rows the service echoes back; callers treat that
/// echo as the source of truth.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn select(
        &self,
        table: &str,
        query: &Query,
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError>;

    async fn insert(
        &self,
        table: &str,
        rows: Vec<Value>,
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError>;

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError>;

    /// Insert-or-update keyed by the `on_conflict` columns.
    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError>;

    async fn delete(
        &self,
        table: &str,
        filters: &[Filter],
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError>;
}
