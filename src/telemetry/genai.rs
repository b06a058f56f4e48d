//! Spans for provider calls, named after the OpenTelemetry GenAI
//! conventions (`gen_ai.*`).

use tracing::Span;

use crate::llm::Generation;

/// Span around one chat call for the lecture `item`.
///
/// Usage and the result kind are filled in by [`record_token_usage`] and
/// [`record_result`].
pub fn start_chat_span(model: &str, provider: &str, item: &str) -> Span {
    tracing::info_span!(
        "gen_ai.chat",
        "gen_ai.operation.name" = "chat",
        "gen_ai.provider.name" = provider,
        "gen_ai.request.model" = model,
        "synthq.item" = item,
        "gen_ai.usage.input_tokens" = tracing::field::Empty,
        "gen_ai.usage.output_tokens" = tracing::field::Empty,
        "synthq.generation.result" = tracing::field::Empty,
    )
}

pub fn record_token_usage(span: &Span, input: u64, output: u64) {
    span.record("gen_ai.usage.input_tokens", input);
    span.record("gen_ai.usage.output_tokens", output);
}

/// `success`, `transient` or `fatal`.
pub fn record_result(span: &Span, result: &Generation) {
    let kind = match result {
        Generation::Success(_) => "success",
        Generation::Transient(_) => "transient",
        Generation::Fatal(_) => "fatal",
    };
    span.record("synthq.generation.result", kind);
}
