//! Recurring idle reminders for active sessions.
//!
//! One timer task per user. The task holds only a weak reference to the
//! registry and re-reads the session on every tick, so it winds down on its
//! own once the session is gone; [`IdleMonitor::cancel`] stops it at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::session::{SessionInfo, SessionRegistry, UserId};

/// Default time between reminders.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(600);

/// Payload of one reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleReminder {
    pub duration: Duration,
    pub command_count: u64,
    pub idle_seconds: u64,
}

impl IdleReminder {
    /// `None` when the snapshot is not of a live session.
    pub fn from_info(info: &SessionInfo) -> Option<Self> {
        if !info.active {
            return None;
        }
        Some(Self {
            duration: info.duration.unwrap_or_default(),
            command_count: info.command_count.unwrap_or_default(),
            idle_seconds: info.idle_seconds.unwrap_or_default(),
        })
    }
}

/// Delivers reminders to the user, typically through the chat front-end.
#[async_trait]
pub trait IdleNotifier: Send + Sync {
    async fn remind(&self, user: UserId, reminder: IdleReminder);
}

/// Notifier that drops every reminder.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl IdleNotifier for NoopNotifier {
    async fn remind(&self, _user: UserId, _reminder: IdleReminder) {}
}

/// Schedules per-user reminder timers.
pub struct IdleMonitor {
    interval: Duration,
    notifier: Arc<dyn IdleNotifier>,
    timers: Mutex<HashMap<UserId, JoinHandle<()>>>,
}

impl IdleMonitor {
    pub fn new(notifier: Arc<dyn IdleNotifier>) -> Self {
        Self {
            interval: DEFAULT_IDLE_INTERVAL,
            notifier,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start reminding `user` every interval while their session is live.
    ///
    /// A timer already scheduled for the user is aborted first.
    pub fn arm(&self, user: UserId, registry: Weak<SessionRegistry>) {
        let notifier = Arc::clone(&self.notifier);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let info = registry.get_session_info(user).await;
                drop(registry);

                match IdleReminder::from_info(&info) {
                    Some(reminder) => {
                        debug!(user = %user, idle_secs = reminder.idle_seconds, "idle reminder");
                        notifier.remind(user, reminder).await;
                    }
                    None => break,
                }
            }
            debug!(user = %user, "idle timer finished");
        });

        if let Some(previous) = self.timers().insert(user, handle) {
            previous.abort();
        }
    }

    /// Stop the user's timer and wait until it is gone.
    ///
    /// Returns whether a timer was registered.
    pub async fn cancel(&self, user: UserId) -> bool {
        let Some(handle) = self.timers().remove(&user) else {
            return false;
        };
        handle.abort();
        // JoinError::Cancelled is the expected outcome
        let _ = handle.await;
        true
    }

    /// Whether a timer is registered for `user`.
    pub fn is_armed(&self, user: UserId) -> bool {
        self.timers().contains_key(&user)
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<UserId, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        for (_, handle) in self.timers().drain() {
            handle.abort();
        }
    }
}
