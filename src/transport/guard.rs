//! Sliding-window guard against hammering a host that is down.
//!
//! Every session connects to the same configured host. Once `max_failures`
//! connect attempts have failed inside `window`, further attempts are
//! refused with [`ConnectError::Throttled`] until the oldest failure ages
//! out. A successful connect clears the window.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ConnectError;

/// Guard configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Whether the guard refuses attempts at all.
    pub enabled: bool,
    /// Failures tolerated inside the window before refusing.
    pub max_failures: u32,
    /// Sliding window length.
    pub window: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failures: 5,
            window: Duration::from_secs(120),
        }
    }
}

impl GuardConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Shared connect-failure window.
#[derive(Debug)]
pub struct ReconnectGuard {
    config: GuardConfig,
    failures: Mutex<VecDeque<Instant>>,
}

impl ReconnectGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(GuardConfig::disabled())
    }

    /// Check whether a connect attempt may proceed.
    ///
    /// Returns `Err(Throttled { retry_after })` when the window is full.
    pub fn check(&self) -> Result<(), ConnectError> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut failures = self.lock();
        Self::prune(&mut failures, now, self.config.window);

        if failures.len() < self.config.max_failures as usize {
            return Ok(());
        }

        let retry_after = failures
            .front()
            .map(|oldest| (*oldest + self.config.window).saturating_duration_since(now))
            .unwrap_or_default();
        Err(ConnectError::Throttled { retry_after })
    }

    /// Record a failed connect attempt.
    pub fn record_failure(&self) {
        if !self.config.enabled {
            return;
        }
        let now = Instant::now();
        let mut failures = self.lock();
        Self::prune(&mut failures, now, self.config.window);
        failures.push_back(now);
    }

    /// Record a successful connect; the host is reachable again.
    pub fn record_success(&self) {
        self.lock().clear();
    }

    /// Failures currently inside the window.
    pub fn failure_count(&self) -> usize {
        let mut failures = self.lock();
        Self::prune(&mut failures, Instant::now(), self.config.window);
        failures.len()
    }

    fn prune(failures: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = failures.front() {
            if now.saturating_duration_since(*oldest) >= window {
                failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        self.failures
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for ReconnectGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(max_failures: u32, window_secs: u64) -> ReconnectGuard {
        ReconnectGuard::new(GuardConfig {
            enabled: true,
            max_failures,
            window: Duration::from_secs(window_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_allows_until_limit() {
        let guard = guard(2, 60);
        assert!(guard.check().is_ok());
        guard.record_failure();
        assert!(guard.check().is_ok());
        guard.record_failure();

        match guard.check() {
            Err(ConnectError::Throttled { retry_after }) => {
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            other => panic!("expected throttle, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let guard = guard(1, 30);
        guard.record_failure();
        assert!(guard.check().is_err());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(guard.check().is_ok());
        assert_eq!(guard.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_clears() {
        let guard = guard(1, 30);
        guard.record_failure();
        guard.record_success();
        assert!(guard.check().is_ok());
    }

    #[test]
    fn test_disabled_never_throttles() {
        let guard = ReconnectGuard::disabled();
        for _ in 0..100 {
            guard.record_failure();
        }
        assert!(guard.check().is_ok());
        assert_eq!(guard.failure_count(), 0);
    }
}
