use super::client::HttpClient;
use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::{Response, StatusCode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

/// An [`HttpClient`] wrapper that retries transient failures with exponential
/// backoff.
///
/// Connect errors, timeouts, `429` and `5xx` responses are retried until
/// `max_attempts` requests have been sent; the last response or error is
/// then returned as is. Requests whose body cannot be cloned are sent once.
pub struct Retrying<C> {
    pub inner: C,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

/// Why an attempt did not produce the final answer.
enum Attempt {
    Response(Response),
    Failed(reqwest::Error),
    Unclonable,
}

impl<C> Retrying<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }

    /// Sends every request exactly once.
    pub fn once(inner: C) -> Self {
        Self {
            max_attempts: 1,
            ..Self::new(inner)
        }
    }

    /// Doubling delays starting at `base_delay`, no jitter. The attempt cap
    /// bounds the retries, not elapsed time.
    fn policy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl<C: HttpClient> HttpClient for Retrying<C> {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let inner = &self.inner;
        let max_attempts = self.max_attempts.max(1);
        let sent = AtomicU32::new(0);
        let url = req.url().clone();

        let operation = || {
            let attempt = sent.fetch_add(1, Ordering::Relaxed) + 1;
            let attempt_req = req.try_clone();
            let url = url.clone();
            async move {
                let Some(attempt_req) = attempt_req else {
                    return Err(backoff::Error::permanent(Attempt::Unclonable));
                };
                let last = attempt >= max_attempts;

                match inner.execute(attempt_req).await {
                    Ok(resp) if is_retryable_status(resp.status()) && !last => {
                        warn!(attempt, status = %resp.status(), url = %url, "Transient HTTP status, retrying");
                        Err(backoff::Error::transient(Attempt::Response(resp)))
                    }
                    Ok(resp) => Ok(resp),
                    Err(e) if (e.is_timeout() || e.is_connect()) && !last => {
                        warn!(attempt, error = %e, url = %url, "Transient HTTP error, retrying");
                        Err(backoff::Error::transient(Attempt::Failed(e)))
                    }
                    Err(e) => Err(backoff::Error::permanent(Attempt::Failed(e))),
                }
            }
        };

        match backoff::future::retry(self.policy(), operation).await {
            Ok(resp) | Err(Attempt::Response(resp)) => Ok(resp),
            Err(Attempt::Failed(e)) => Err(e),
            Err(Attempt::Unclonable) => self.inner.execute(req).await,
        }
    }
}
