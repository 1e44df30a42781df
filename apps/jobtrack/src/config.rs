use anyhow::{Context, Result};

use crate::notify::ToastDurations;

/// Daemon configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted data service, e.g. `https://xyz.example.co`.
    pub api_url: String,
    /// Public (anon) key sent as the `apikey` header on every request.
    pub anon_key: String,
    pub port: u16,
    pub rust_log: String,
    pub toast_durations: ToastDurations,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = ToastDurations::default();

        Ok(Config {
            api_url: require_env("JOBTRACK_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            anon_key: require_env("JOBTRACK_ANON_KEY")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            toast_durations: ToastDurations {
                success_ms: optional_millis("JOBTRACK_TOAST_SUCCESS_MS", defaults.success_ms)?,
                error_ms: optional_millis("JOBTRACK_TOAST_ERROR_MS", defaults.error_ms)?,
                info_ms: optional_millis("JOBTRACK_TOAST_INFO_MS", defaults.info_ms)?,
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_millis(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{key} must be a duration in milliseconds")),
        Err(_) => Ok(default),
    }
}
