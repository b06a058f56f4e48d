//! Content generation collaborators.
//!
//! The engine only sees the [`Generator`] trait and its tagged
//! [`Generation`] result. Backoff for transient failures lives in
//! [`RetryingGenerator`]; the pipeline treats whatever comes out of it as
//! final. [`AnthropicGenerator`] is the production implementation over
//! rig-core.

pub mod anthropic;
pub mod prompt;
pub mod retry;

use async_trait::async_trait;
use serde::Serialize;

pub use anthropic::{AnthropicGenerator, anthropic_client};
pub use retry::{RetryPolicy, RetryingGenerator};

/// Model aliases accepted on the command line, newest last.
pub const MODEL_ALIASES: &[(&str, &str)] = &[
    ("opus", "claude-3-opus-20240229"),
    ("sonnet", "claude-3-sonnet-20240229"),
    ("haiku", "claude-3-haiku-20240307"),
    ("sonnet-3.5", "claude-3-5-sonnet-20241022"),
    ("sonnet-4.5", "claude-sonnet-4-5-20250929"),
];

pub const DEFAULT_MODEL_ALIAS: &str = "sonnet-4.5";

/// Resolve an alias to a provider model id. Full `claude-*` ids pass
/// through unchanged.
pub fn resolve_model(name: &str) -> Option<&str> {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, id)| *id)
        .or_else(|| name.starts_with("claude-").then_some(name))
}

/// Everything a generator needs for one task.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    /// Cleaned transcript text.
    pub transcript: String,
    pub item_label: String,
    pub group_label: String,
}

/// Successful generation output.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub text: String,
    /// Provider-reported usage, when available.
    pub usage: Option<u64>,
}

impl Generated {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Tagged generation result.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Success(Generated),
    /// Worth retrying after a backoff (timeouts, rate limits, overload).
    Transient(String),
    /// Retrying will not help (auth, bad request, missing model).
    Fatal(String),
}

impl Generation {
    pub fn is_transient(&self) -> bool {
        matches!(self, Generation::Transient(_))
    }
}

/// A content generator. Slow, non-deterministic, untrusted.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Generation;

    /// Short identifier used in logs and spans.
    fn name(&self) -> &str {
        "generator"
    }
}
