use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::query::{Filter, Query};
use crate::remote::{ApiErrorBody, RemoteError, RemoteService};

const REST_PATH: &str = "/rest/v1";
const RETURN_REPRESENTATION: &str = "return=representation";
const UPSERT_PREFERENCE: &str = "resolution=merge-duplicates,return=representation";

/// PostgREST-style client for the hosted data service.
///
/// One attempt per call: no retries, no timeout beyond the transport's own.
#[derive(Clone)]
pub struct RestRemote {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl RestRemote {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    fn request(&self, method: Method, table: &str, access_token: &str) -> RequestBuilder {
        debug!("{method} {REST_PATH}/{table}");
        self.client
            .request(method, format!("{}{REST_PATH}/{table}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
    }

    async fn rows(response: Response) -> Result<Vec<Value>, RemoteError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Data service returned {}: {}", status, body);
            let fallback = if body.is_empty() {
                status.to_string()
            } else {
                body.clone()
            };
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(parsed) => parsed.into_error(status.as_u16(), fallback),
                Err(_) => RemoteError::api(status.as_u16(), None, fallback),
            });
        }

        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&body)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row => Ok(vec![row]),
        }
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(Filter::to_param).collect()
}

#[async_trait]
impl RemoteService for RestRemote {
    async fn select(
        &self,
        table: &str,
        query: &Query,
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let response = self
            .request(Method::GET, table, access_token)
            .query(&query.to_params())
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn insert(
        &self,
        table: &str,
        rows: Vec<Value>,
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let response = self
            .request(Method::POST, table, access_token)
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&rows)
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let response = self
            .request(Method::PATCH, table, access_token)
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&filter_params(filters))
            .json(&patch)
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn upsert(
        &self,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let response = self
            .request(Method::POST, table, access_token)
            .header("Prefer", UPSERT_PREFERENCE)
            .query(&[("on_conflict", on_conflict.join(","))])
            .json(&rows)
            .send()
            .await?;
        Self::rows(response).await
    }

    async fn delete(
        &self,
        table: &str,
        filters: &[Filter],
        access_token: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let response = self
            .request(Method::DELETE, table, access_token)
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&filter_params(filters))
            .send()
            .await?;
        Self::rows(response).await
    }
}
