use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::{AuthBackend, OAuthProvider, Session, SignUpOutcome, User};
use crate::remote::RemoteError;

const AUTH_PATH: &str = "/auth/v1";

/// Client for the hosted auth endpoint (GoTrue-compatible).
#[derive(Clone)]
pub struct GoTrueAuth {
    client: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

impl GoTrueAuth {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{AUTH_PATH}{path}", self.base_url)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        debug!("POST {AUTH_PATH}{path}");
        self.client
            .post(self.endpoint(path))
            .header("apikey", &self.anon_key)
    }

    /// Returns the success body, or the service error mapped to `RemoteError`.
    async fn body(response: Response) -> Result<Value, RemoteError> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!("Auth service returned {}: {}", status, text);
            return Err(auth_error(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// The auth service reports errors as `{error, error_description}` or
/// `{code, error_code, msg}` depending on the endpoint.
fn auth_error(status: u16, body: &str) -> RemoteError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = ["error_code", "error"]
        .iter()
        .find_map(|k| parsed.get(*k).and_then(Value::as_str));
    let message = ["error_description", "msg", "message"]
        .iter()
        .find_map(|k| parsed.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    RemoteError::api(status, code, message)
}

#[async_trait]
impl AuthBackend for GoTrueAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, RemoteError> {
        let response = self
            .post("/signup")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body = Self::body(response).await?;

        if body.get("access_token").is_some() {
            let tokens: TokenResponse = serde_json::from_value(body)?;
            return Ok(SignUpOutcome::SignedIn(tokens.into_session()));
        }
        let user: User = match body.get("user") {
            Some(user) => serde_json::from_value(user.clone())?,
            None => serde_json::from_value(body)?,
        };
        Ok(SignUpOutcome::ConfirmationRequired(user))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError> {
        let response = self
            .post("/token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let tokens: TokenResponse = serde_json::from_value(Self::body(response).await?)?;
        Ok(tokens.into_session())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), RemoteError> {
        let response = self.post("/logout").bearer_auth(access_token).send().await?;
        Self::body(response).await.map(|_| ())
    }

    async fn reset_password(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), RemoteError> {
        let mut request = self.post("/recover").json(&json!({ "email": email }));
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        let response = request.send().await?;
        Self::body(response).await.map(|_| ())
    }

    async fn get_user(&self, access_token: &str) -> Result<User, RemoteError> {
        debug!("GET {AUTH_PATH}/user");
        let response = self
            .client
            .get(self.endpoint("/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(serde_json::from_value(Self::body(response).await?)?)
    }

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        let endpoint = self.endpoint("/authorize");
        match Url::parse_with_params(
            &endpoint,
            &[("provider", provider.as_str()), ("redirect_to", redirect_to)],
        ) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("Could not build authorize URL from {endpoint}: {e}");
                format!("{endpoint}?provider={provider}")
            }
        }
    }
}
