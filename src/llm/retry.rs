//! Retry policy: backoff for transient generation failures.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{Generation, GenerationRequest, Generator};
use crate::telemetry::metrics;

/// Exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total calls allowed, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempts`-th failed call (1-indexed):
    /// `base_delay * multiplier^(attempts - 1)`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs)
    }
}

/// Wraps a generator and retries `Transient` results with backoff.
/// `Success` and `Fatal` pass through immediately.
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: Generator> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<G: Generator> Generator for RetryingGenerator<G> {
    async fn generate(&self, request: &GenerationRequest) -> Generation {
        let mut attempt = 1;
        loop {
            let result = self.inner.generate(request).await;
            let label = match &result {
                Generation::Success(_) => "success",
                Generation::Transient(_) => "transient",
                Generation::Fatal(_) => "fatal",
            };
            metrics::generation_attempts().add(1, &[opentelemetry::KeyValue::new("result", label)]);

            let Generation::Transient(ref reason) = result else {
                return result;
            };
            if attempt >= self.policy.max_attempts {
                warn!(
                    item = %request.item_label,
                    attempts = attempt,
                    %reason,
                    "generation retries exhausted"
                );
                return result;
            }

            let delay = self.policy.next_delay(attempt);
            warn!(
                item = %request.item_label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                %reason,
                "transient generation failure, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
