//! Anthropic generator via rig-core.

use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::{ExposeSecret, SecretString};
use tracing::{Instrument, debug};

use super::prompt::build_prompt;
use super::{Generated, Generation, GenerationRequest, Generator};
use crate::telemetry::{genai, metrics};

/// Create an Anthropic client from a secret API key.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn anthropic_client(
    api_key: &SecretString,
) -> Result<rig::providers::anthropic::Client, rig::http_client::Error> {
    rig::providers::anthropic::Client::new(api_key.expose_secret())
}

/// Single-turn note synthesis against an Anthropic model.
pub struct AnthropicGenerator {
    client: rig::providers::anthropic::Client,
    model: String,
    system_prompt: String,
    max_tokens: u64,
    min_length: usize,
    timeout: Duration,
}

impl AnthropicGenerator {
    pub fn new(
        client: rig::providers::anthropic::Client,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            system_prompt: system_prompt.into(),
            max_tokens: 8192,
            min_length: 1500,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Length the prompt asks for; keep in step with the gate's rubric.
    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Generation {
        let span = genai::start_chat_span(&self.model, "anthropic", &request.item_label);
        let prompt = build_prompt(request, self.min_length);
        let input_estimate = (prompt.chars().count() / 4) as u64;

        let agent = self
            .client
            .agent(self.model.as_str())
            .preamble(&self.system_prompt)
            .max_tokens(self.max_tokens)
            .build();

        let call = tokio::time::timeout(self.timeout, agent.prompt(prompt));
        let result = call.instrument(span.clone()).await;

        let generation = match result {
            Err(_) => Generation::Transient(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            )),
            Ok(Err(e)) => classify_failure(&e.to_string()),
            Ok(Ok(text)) if text.trim().is_empty() => {
                Generation::Transient("empty response".to_string())
            }
            Ok(Ok(text)) => {
                // The prompt API does not surface usage; spans carry
                // chars/4 estimates instead.
                let output_estimate = (text.chars().count() / 4) as u64;
                genai::record_token_usage(&span, input_estimate, output_estimate);
                metrics::llm_tokens().add(
                    input_estimate + output_estimate,
                    &[opentelemetry::KeyValue::new("model", self.model.clone())],
                );
                debug!(model = %self.model, chars = text.len(), "generation succeeded");
                Generation::Success(Generated { text, usage: None })
            }
        };
        genai::record_result(&span, &generation);
        generation
    }

    fn name(&self) -> &str {
        &self.model
    }
}

const TRANSIENT_HINTS: &[&str] = &[
    "timeout",
    "timed out",
    "rate limit",
    "rate_limit",
    "overloaded",
    "429",
    "500",
    "502",
    "503",
    "504",
    "529",
    "connection",
    "temporarily",
];

/// Sort a provider error message into retryable or not.
pub fn classify_failure(message: &str) -> Generation {
    let lower = message.to_lowercase();
    if TRANSIENT_HINTS.iter().any(|hint| lower.contains(hint)) {
        Generation::Transient(message.to_string())
    } else {
        Generation::Fatal(message.to_string())
    }
}
