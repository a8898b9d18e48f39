//! Bounded retry with exponential backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use super::{HubRequest, HubResponse, HubStream, Transport, TransportError};
use crate::events::{EventSink, HubEvent, NullSink};

/// Default retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default ceiling for a single backoff delay
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// How many times and how patiently a failed call is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry
    pub base_delay: Duration,
    /// Cap for the doubled delay (jitter is added on top)
    pub max_delay: Duration,
    /// Add up to a quarter of the delay at random to spread reconnects
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (0-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff plus jitter in `[0, backoff / 4)`.
    ///
    /// Doubling outgrows the jitter, so delays stay strictly increasing until
    /// the cap is reached.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let backoff = self.backoff(retry);
        if !self.jitter {
            return backoff;
        }
        let spread = backoff.as_millis() as u64 / 4;
        if spread == 0 {
            return backoff;
        }
        let extra = rand::thread_rng().gen_range(0..spread);
        backoff + Duration::from_millis(extra)
    }
}

/// Wraps another transport and retries transient failures.
///
/// 4xx answers (including auth rejections) are returned after one attempt.
pub struct RetryTransport<T> {
    inner: T,
    policy: RetryPolicy,
    events: Arc<dyn EventSink>,
}

impl<T: Transport> RetryTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            events: Arc::new(NullSink),
        }
    }

    /// Report retry progress to `events`.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> RetryTransport<T> {
    /// Run `attempt` until it succeeds, fails permanently, or the budget is spent.
    async fn run<R, F, Fut>(&self, request: &HubRequest, mut attempt: F) -> Result<R, TransportError>
    where
        F: FnMut(HubRequest) -> Fut,
        Fut: Future<Output = Result<R, TransportError>>,
    {
        let mut retry = 0u32;
        loop {
            let err = match attempt(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if retry >= self.policy.max_retries {
                tracing::error!(
                    "All {} attempts failed for {} {}: {}",
                    retry + 1,
                    request.method,
                    request.path(),
                    err
                );
                self.events.emit(HubEvent::RetryExhausted {
                    path: request.path().to_string(),
                    attempts: retry + 1,
                    reason: err.to_string(),
                });
                return Err(err);
            }

            let delay = self.policy.delay_for(retry);
            tracing::warn!(
                "Retry {}/{} for {} {} in {:?}: {}",
                retry + 1,
                self.policy.max_retries,
                request.method,
                request.path(),
                delay,
                err
            );
            self.events.emit(HubEvent::RetryScheduled {
                path: request.path().to_string(),
                attempt: retry + 1,
                max_retries: self.policy.max_retries,
                delay_ms: delay.as_millis() as u64,
                reason: err.to_string(),
            });

            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryTransport<T> {
    async fn execute(&self, request: HubRequest) -> Result<HubResponse, TransportError> {
        self.run(&request, |r| self.inner.execute(r)).await
    }

    /// Only opening the stream is retried; a body that breaks mid-way is
    /// reported to the reader.
    async fn execute_stream(&self, request: HubRequest) -> Result<HubStream, TransportError> {
        self.run(&request, |r| self.inner.execute_stream(r)).await
    }
}
