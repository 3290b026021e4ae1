//! Exponential backoff with additive jitter.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
  /// Retries after the first attempt.
  pub max_retries: u32,
  /// Delay before the first retry; doubles on each subsequent one.
  pub base_delay: Duration,
  /// Upper bound of the random extra delay, as a fraction of the computed delay.
  pub max_jitter: f64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_millis(200),
      max_jitter: 0.25,
    }
  }
}

impl RetryConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_max_retries(mut self, retries: u32) -> Self {
    self.max_retries = retries;
    self
  }

  pub fn with_base_delay(mut self, delay: Duration) -> Self {
    self.base_delay = delay;
    self
  }

  pub fn with_jitter(mut self, max_jitter: f64) -> Self {
    self.max_jitter = max_jitter.max(0.0);
    self
  }

  pub fn max_attempts(&self) -> u32 {
    self.max_retries + 1
  }

  /// Delay before retry number `retry` (0-indexed): `base * 2^retry`, plus up to
  /// `max_jitter` of that again at random.
  pub fn calculate_delay(&self, retry: u32) -> Duration {
    let delay = self.base_delay.saturating_mul(2u32.saturating_pow(retry));
    if self.max_jitter <= 0.0 {
      return delay;
    }
    let factor = rand::rng().random_range(0.0..=self.max_jitter);
    delay + delay.mul_f64(factor)
  }
}

/// What happened across all attempts of a retried operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
  pub attempts: u32,
  pub total_delay: Duration,
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or the retry budget is spent.
pub async fn retry_async<F, Fut, T, E>(
  config: &RetryConfig,
  mut operation: F,
  should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
{
  let mut stats = RetryStats::default();
  let mut retry = 0;

  loop {
    stats.attempts += 1;

    let error = match operation().await {
      Ok(value) => {
        if stats.attempts > 1 {
          debug!(attempts = stats.attempts, "Succeeded after retrying");
        }
        return (Ok(value), stats);
      }
      Err(e) => e,
    };

    if !should_retry(&error) {
      debug!(error = %error, "Not retryable");
      return (Err(error), stats);
    }

    if retry >= config.max_retries {
      warn!(
        attempts = stats.attempts,
        error = %error,
        "Retry budget exhausted"
      );
      return (Err(error), stats);
    }

    let delay = config.calculate_delay(retry);
    stats.total_delay += delay;
    warn!(
      attempt = stats.attempts,
      max_attempts = config.max_attempts(),
      error = %error,
      ?delay,
      "Attempt failed, retrying"
    );
    tokio::time::sleep(delay).await;
    retry += 1;
  }
}
