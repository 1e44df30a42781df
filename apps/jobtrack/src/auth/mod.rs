//! Auth/session gate.
//!
//! The session lives in memory only. Stores read it through a
//! `watch::Receiver`, so every data call sees the latest sign-in state.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::errors::{report, TrackerError};
use crate::notify::Notifier;
use crate::remote::RemoteError;

pub mod gotrue;

pub use gotrue::GoTrueAuth;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,

    #[error("password must be at least 6 characters")]
    WeakPassword,

    #[error("unsupported OAuth provider '{0}'")]
    UnknownProvider(String),

    #[error("redirect URL carries no session: {0}")]
    InvalidRedirect(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    SignedIn(Session),
    /// The service wants the address confirmed before issuing a session.
    ConfirmationRequired(User),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone)]
pub struct AuthState {
    pub phase: AuthPhase,
    pub session: Option<Session>,
}

impl AuthState {
    fn signed_out() -> Self {
        Self {
            phase: AuthPhase::Unauthenticated,
            session: None,
        }
    }

    /// Used by layout-level guards; independent of `phase`.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OAuthProvider {
    Github,
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Github => "github",
            OAuthProvider::Google => "google",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(OAuthProvider::Github),
            "google" => Ok(OAuthProvider::Google),
            other => Err(AuthError::UnknownProvider(other.to_string())),
        }
    }
}

/// Remote auth endpoint.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, RemoteError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, RemoteError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), RemoteError>;

    async fn reset_password(&self, email: &str, redirect_to: Option<&str>)
        -> Result<(), RemoteError>;

    async fn get_user(&self, access_token: &str) -> Result<User, RemoteError>;

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String;
}

pub struct AuthStore {
    backend: Arc<dyn AuthBackend>,
    notifier: Notifier,
    state: watch::Sender<AuthState>,
}

impl AuthStore {
    pub fn new(backend: Arc<dyn AuthBackend>, notifier: Notifier) -> Self {
        let (state, _) = watch::channel(AuthState::signed_out());
        Self {
            backend,
            notifier,
            state,
        }
    }

    /// Auth-state subscription. The receiver always holds the latest state.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    fn set_phase(&self, phase: AuthPhase) {
        self.state.send_modify(|s| s.phase = phase);
    }

    fn establish(&self, session: Session) {
        info!("Signed in as {}", session.user.id);
        self.state.send_replace(AuthState {
            phase: AuthPhase::Authenticated,
            session: Some(session),
        });
    }

    fn fail(&self, err: TrackerError, action: &str) -> TrackerError {
        self.state.send_replace(AuthState::signed_out());
        report(&err, &self.notifier, action, false);
        err
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, TrackerError> {
        if let Err(e) = validate_credentials(email, password) {
            return Err(self.fail(e.into(), "sign up"));
        }
        self.set_phase(AuthPhase::Authenticating);

        match self.backend.sign_up(email.trim(), password).await {
            Ok(SignUpOutcome::SignedIn(session)) => {
                self.establish(session.clone());
                self.notifier.success("Account created");
                Ok(SignUpOutcome::SignedIn(session))
            }
            Ok(SignUpOutcome::ConfirmationRequired(user)) => {
                self.state.send_replace(AuthState::signed_out());
                self.notifier
                    .info("Check your email to confirm your account");
                Ok(SignUpOutcome::ConfirmationRequired(user))
            }
            Err(e) => Err(self.fail(e.into(), "sign up")),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, TrackerError> {
        if let Err(e) = validate_credentials(email, password) {
            return Err(self.fail(e.into(), "sign in"));
        }
        self.set_phase(AuthPhase::Authenticating);

        match self.backend.sign_in_with_password(email.trim(), password).await {
            Ok(session) => {
                self.establish(session.clone());
                self.notifier.success("Signed in");
                Ok(session)
            }
            Err(e) => Err(self.fail(e.into(), "sign in")),
        }
    }

    /// Clears the local session even when the remote call fails.
    pub async fn sign_out(&self) -> Result<(), TrackerError> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        let outcome = self.backend.sign_out(&session.access_token).await;
        self.state.send_replace(AuthState::signed_out());
        info!("Signed out {}", session.user.id);

        match outcome {
            Ok(()) => {
                self.notifier.success("Signed out");
                Ok(())
            }
            Err(e) => {
                let err = TrackerError::from(e);
                report(&err, &self.notifier, "sign out", false);
                Err(err)
            }
        }
    }

    pub async fn reset_password(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), TrackerError> {
        if !is_plausible_email(email) {
            let err = TrackerError::from(AuthError::InvalidEmail);
            report(&err, &self.notifier, "reset password", false);
            return Err(err);
        }
        match self.backend.reset_password(email.trim(), redirect_to).await {
            Ok(()) => {
                self.notifier.info("Password reset email sent");
                Ok(())
            }
            Err(e) => {
                let err = TrackerError::from(e);
                report(&err, &self.notifier, "reset password", false);
                Err(err)
            }
        }
    }

    pub fn oauth_url(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        self.backend.authorize_url(provider, redirect_to)
    }

    /// Reads the tokens the provider redirect put in the URL fragment and
    /// resolves the user behind them.
    pub async fn complete_oauth_redirect(&self, redirect_url: &str) -> Result<Session, TrackerError> {
        let tokens = match parse_redirect_fragment(redirect_url) {
            Ok(t) => t,
            Err(e) => return Err(self.fail(e.into(), "OAuth sign in")),
        };
        self.set_phase(AuthPhase::Authenticating);

        match self.backend.get_user(&tokens.access_token).await {
            Ok(user) => {
                let session = Session {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    expires_at: tokens.expires_at,
                    user,
                };
                self.establish(session.clone());
                self.notifier.success("Signed in");
                Ok(session)
            }
            Err(e) => Err(self.fail(e.into(), "OAuth sign in")),
        }
    }

    /// Re-resolves the held session against the remote user endpoint.
    /// Returns `None` when there is nothing to restore.
    pub async fn initialize(&self) -> Result<Option<User>, TrackerError> {
        let Some(session) = self.session() else {
            self.state.send_replace(AuthState::signed_out());
            return Ok(None);
        };
        if session.expires_at.is_some_and(|at| at <= Utc::now()) {
            info!("Held session expired, signing out locally");
            self.state.send_replace(AuthState::signed_out());
            return Ok(None);
        }
        self.set_phase(AuthPhase::Authenticating);

        match self.backend.get_user(&session.access_token).await {
            Ok(user) => {
                self.establish(Session {
                    user: user.clone(),
                    ..session
                });
                Ok(Some(user))
            }
            Err(e) => {
                // Stale sessions are expected on startup; no toast.
                let err = TrackerError::from(e);
                self.state.send_replace(AuthState::signed_out());
                report(&err, &self.notifier, "restore session", true);
                Err(err)
            }
        }
    }
}

/// Deliverability is the auth service's call; locally an address only needs
/// an `@`.
fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.contains('@')
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if !is_plausible_email(email) {
        return Err(AuthError::InvalidEmail);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

struct RedirectTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

fn parse_redirect_fragment(redirect_url: &str) -> Result<RedirectTokens, AuthError> {
    let mut url =
        Url::parse(redirect_url).map_err(|e| AuthError::InvalidRedirect(e.to_string()))?;
    let fragment = url
        .fragment()
        .map(str::to_string)
        .ok_or_else(|| AuthError::InvalidRedirect("missing fragment".to_string()))?;
    // Reuse the query parser for the `a=b&c=d` fragment.
    url.set_query(Some(&fragment));

    let mut access_token = None;
    let mut refresh_token = None;
    let mut expires_at = None;
    let mut expires_in = None;
    let mut provider_error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "refresh_token" => refresh_token = Some(value.into_owned()),
            "expires_at" => {
                expires_at = value
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
            }
            "expires_in" => expires_in = value.parse::<i64>().ok(),
            "error_description" => provider_error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(description) = provider_error {
        return Err(AuthError::InvalidRedirect(description));
    }
    let access_token = access_token
        .ok_or_else(|| AuthError::InvalidRedirect("missing access_token".to_string()))?;
    let expires_at =
        expires_at.or_else(|| expires_in.map(|secs| Utc::now() + chrono::Duration::seconds(secs)));

    Ok(RedirectTokens {
        access_token,
        refresh_token,
        expires_at,
    })
}
