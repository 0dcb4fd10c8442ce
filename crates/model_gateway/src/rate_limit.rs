//! Request-rate limiting for planner calls.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

use shellpilot_core::{
    traits::{LlmClient, LlmResponse},
    Result,
};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Waits for a requests-per-minute quota before delegating each call.
pub struct RateLimitedClient {
    inner: Arc<dyn LlmClient>,
    limiter: DirectLimiter,
}

impl RateLimitedClient {
    /// Wrap `inner`. A zero rate is treated as one request per minute.
    pub fn new(inner: Arc<dyn LlmClient>, requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
        }
    }
}

#[async_trait]
impl LlmClient for RateLimitedClient {
    async fn complete(&self, prompt: &str) -> Result<LlmResponse> {
        if self.limiter.check().is_err() {
            tracing::debug!("Planner rate limit reached, waiting for quota");
            self.limiter.until_ready().await;
        }
        self.inner.complete(prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellpilot_core::mocks::MockLlm;

    #[tokio::test]
    async fn test_passes_through_within_quota() {
        let inner = Arc::new(MockLlm::constant("ok"));
        let client = RateLimitedClient::new(inner.clone(), 60);

        assert_eq!(client.complete("a").await.unwrap().content, "ok");
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_rate_still_allows_first_call() {
        let client = RateLimitedClient::new(Arc::new(MockLlm::constant("ok")), 0);
        assert!(client.complete("a").await.is_ok());
    }
}
