//! Typed configuration.
//!
//! Environment variables carry deployment facts and secrets ([`Config`]);
//! an optional TOML file carries tuning ([`Settings`]). Both load once at
//! startup and fail fast on bad values. The API key is wrapped in
//! `secrecy::SecretString` so it never reaches a log line.

pub mod settings;

use secrecy::SecretString;

use crate::error::{Error, Result};

pub use settings::{EngineSettings, GenerationSettings, NotesSettings, Settings};

pub const DEFAULT_DATABASE_PATH: &str = "synthesis_tasks.db";

#[derive(Debug)]
pub struct Config {
    pub database_path: String,
    /// Only commands that call the provider need it; see [`Config::api_key`].
    pub anthropic_api_key: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let log_level = non_empty("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        if log_level.parse::<tracing_subscriber::EnvFilter>().is_err() {
            return Err(Error::Config(format!("LOG_LEVEL is not a valid filter: {log_level}")));
        }

        Ok(Self {
            database_path: non_empty("SYNTHQ_DATABASE")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY").map(SecretString::from),
            otel_endpoint: non_empty("OTEL_ENDPOINT"),
            log_level,
        })
    }

    /// The provider key, for commands that generate.
    pub fn api_key(&self) -> Result<&SecretString> {
        self.anthropic_api_key.as_ref().ok_or_else(|| {
            Error::Config("required environment variable ANTHROPIC_API_KEY is not set".to_string())
        })
    }
}
