//! Cancellable background eviction task.

use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Shortest period a sweeper will run at.
const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Sweep period used by every cache in the crate: half the TTL.
pub fn sweep_period(ttl: Duration) -> Duration {
  (ttl / 2).max(MIN_SWEEP_PERIOD)
}

/// Owns a background task that runs a sweep closure on a fixed period.
///
/// The task stops when [`Sweeper::stop`] is called or the sweeper is dropped.
/// Outside a tokio runtime no task is spawned and expiry stays purely lazy.
pub struct Sweeper {
  handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
  pub fn spawn<F>(name: &'static str, period: Duration, sweep: F) -> Self
  where
    F: Fn() -> usize + Send + 'static,
  {
    let handle = match tokio::runtime::Handle::try_current() {
      Ok(runtime) => Some(runtime.spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
          interval.tick().await;
          let removed = sweep();
          if removed > 0 {
            debug!(cache = name, removed, "Swept expired cache entries");
          }
        }
      })),
      Err(_) => {
        debug!(cache = name, "No async runtime, cache sweeper not started");
        None
      }
    };

    Self {
      handle: Mutex::new(handle),
    }
  }

  /// Whether the background task is still alive.
  pub fn is_running(&self) -> bool {
    self
      .handle
      .lock()
      .map(|h| h.as_ref().is_some_and(|h| !h.is_finished()))
      .unwrap_or(false)
  }

  /// Cancel the background task. Idempotent.
  pub fn stop(&self) {
    if let Ok(mut handle) = self.handle.lock() {
      if let Some(handle) = handle.take() {
        handle.abort();
      }
    }
  }
}

impl Drop for Sweeper {
  fn drop(&mut self) {
    self.stop();
  }
}

impl std::fmt::Debug for Sweeper {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Sweeper")
      .field("running", &self.is_running())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::TtlCache;

  #[test]
  fn test_sweep_period_is_half_ttl() {
    assert_eq!(
      sweep_period(Duration::from_secs(300)),
      Duration::from_secs(150)
    );
    assert_eq!(sweep_period(Duration::from_millis(10)), MIN_SWEEP_PERIOD);
  }

  #[test]
  fn test_no_runtime_means_no_task() {
    let sweeper = Sweeper::spawn("test", Duration::from_secs(1), || 0);
    assert!(!sweeper.is_running());
  }

  #[tokio::test(start_paused = true)]
  async fn test_sweeper_evicts_in_background() {
    let cache = TtlCache::new(Duration::from_secs(4));
    cache.set("a", 1);

    let handle = cache.clone();
    let sweeper = Sweeper::spawn("test", sweep_period(cache.ttl()), move || {
      handle.remove_expired()
    });
    assert!(sweeper.is_running());

    // Ticks at 2s (entry live) and 4s (entry expired)
    tokio::time::sleep(Duration::from_millis(4_100)).await;
    assert_eq!(cache.len(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stop_cancels_task() {
    let cache = TtlCache::new(Duration::from_secs(4));
    cache.set("a", 1);

    let handle = cache.clone();
    let sweeper = Sweeper::spawn("test", Duration::from_secs(2), move || {
      handle.remove_expired()
    });
    sweeper.stop();
    sweeper.stop();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!sweeper.is_running());
    // Nothing swept the expired entry
    assert_eq!(cache.len(), 1);
  }
}
