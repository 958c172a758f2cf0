//! Session lifecycle tests against the scripted shell.
//!
//! All tests run on paused time, so settle windows and reminder intervals
//! cost nothing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use teleshell::error::ConnectError;
use teleshell::transport::TRUNCATION_MARKER;
use teleshell::{
    AuthPolicy, IdleMonitor, IdleNotifier, IdleReminder, NoopNotifier, RemoteShellConnector,
    ScriptedDialer, SessionError, SessionRegistry, ShellDialer, ShellTransport, SshTarget, UserId,
};

const WORKING_DIR: &str = "/srv/app";

fn registry_with(dialer: &ScriptedDialer, notifier: Arc<dyn IdleNotifier>) -> Arc<SessionRegistry> {
    let connector =
        RemoteShellConnector::new(Arc::new(dialer.clone()), ScriptedDialer::target(WORKING_DIR));
    SessionRegistry::new(connector, IdleMonitor::new(notifier))
}

fn registry() -> (Arc<SessionRegistry>, ScriptedDialer) {
    let dialer = ScriptedDialer::new();
    (registry_with(&dialer, Arc::new(NoopNotifier)), dialer)
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, IdleReminder)>>,
}

impl RecordingNotifier {
    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl IdleNotifier for RecordingNotifier {
    async fn remind(&self, user: UserId, reminder: IdleReminder) {
        self.sent.lock().unwrap().push((user, reminder));
    }
}

/// Notes how many scripted shells were still open at each dial.
struct OverlapDialer {
    inner: ScriptedDialer,
    open_at_dial: Mutex<Vec<usize>>,
}

#[async_trait]
impl ShellDialer for OverlapDialer {
    async fn dial(&self, target: &SshTarget) -> Result<Box<dyn ShellTransport>, ConnectError> {
        self.open_at_dial
            .lock()
            .unwrap()
            .push(self.inner.open_count());
        self.inner.dial(target).await
    }
}

// ============================================================================
// Create / Stop
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_finishes_before_next_create_dials() {
    let dialer = Arc::new(OverlapDialer {
        inner: ScriptedDialer::new(),
        open_at_dial: Mutex::new(Vec::new()),
    });
    let connector = RemoteShellConnector::new(dialer.clone(), ScriptedDialer::target(WORKING_DIR));
    let registry = SessionRegistry::new(connector, IdleMonitor::new(Arc::new(NoopNotifier)));
    let user = UserId::new(30);
    assert_ok!(registry.create_session(user).await);

    let (stopped, created) = tokio::join!(registry.stop_session(user), registry.create_session(user));

    assert!(stopped.is_some());
    assert_ok!(created);
    // the second dial saw the first shell already closed
    assert_eq!(*dialer.open_at_dial.lock().unwrap(), vec![0, 0]);
    assert_eq!(dialer.inner.open_count(), 1);
    assert!(registry.is_active(user).await);
}

#[tokio::test(start_paused = true)]
async fn test_second_create_is_rejected() {
    let (registry, dialer) = registry();
    let user = UserId::new(1);

    assert_ok!(registry.create_session(user).await);
    let err = assert_err!(registry.create_session(user).await);

    assert!(matches!(err, SessionError::AlreadyActive));
    assert_eq!(dialer.open_count(), 1);
    assert_eq!(dialer.dial_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_creates_open_one_transport() {
    let (registry, dialer) = registry();
    dialer.set_dial_delay(Duration::from_millis(300));
    let user = UserId::new(2);

    let (a, b) = tokio::join!(registry.create_session(user), registry.create_session(user));

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(dialer.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_exactly_one_transport() {
    let (registry, dialer) = registry();
    let user = UserId::new(3);

    assert_ok!(registry.create_session(user).await);
    assert!(registry.stop_session(user).await.is_some());

    assert_eq!(dialer.close_count(), 1);
    assert_eq!(dialer.open_count(), 0);
    assert!(!registry.get_session_info(user).await.active);
    assert_eq!(registry.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_leaves_nothing() {
    let (registry, dialer) = registry();
    dialer.fail_next_dials(1, ConnectError::Auth { user: "tester".into() });
    let user = UserId::new(4);

    let err = assert_err!(registry.create_session(user).await);
    assert!(matches!(err, SessionError::Connect(ConnectError::Auth { .. })));
    assert!(!registry.is_active(user).await);

    // the slot is free for a retry
    assert_ok!(registry.create_session(user).await);
}

// ============================================================================
// Execute
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_execute_without_session() {
    let (registry, dialer) = registry();
    let user = UserId::new(5);

    for command in ["", "ls", "pwd", "   "] {
        let err = assert_err!(registry.execute(user, command).await);
        assert!(matches!(err, SessionError::NotActive), "{:?}", command);
    }
    assert_eq!(dialer.dial_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_output_is_cut_to_budget() {
    let (registry, _dialer) = registry();
    let user = UserId::new(6);
    assert_ok!(registry.create_session(user).await);

    let output = assert_ok!(registry.execute(user, "bytes 5000").await);
    let text = output.as_str();

    assert_eq!(text.len(), 4000 + TRUNCATION_MARKER.len());
    assert_eq!(text.matches(TRUNCATION_MARKER).count(), 1);
    assert!(output.is_truncated());
}

#[tokio::test(start_paused = true)]
async fn test_fault_then_successful_reconnect() {
    let (registry, dialer) = registry();
    let user = UserId::new(7);
    assert_ok!(registry.create_session(user).await);

    dialer.fail_next_read();
    let output = assert_ok!(registry.execute(user, "echo hello").await);

    assert_eq!(output.as_str(), "hello\n");
    assert_eq!(dialer.dial_count(), 2);
    assert_eq!(dialer.open_count(), 1);
    assert!(registry.is_active(user).await);
}

#[tokio::test(start_paused = true)]
async fn test_fault_then_failed_reconnect() {
    let (registry, dialer) = registry();
    let user = UserId::new(8);
    assert_ok!(registry.create_session(user).await);

    dialer.fail_next_read();
    dialer.fail_next_dials(1, ConnectError::Network("connection refused".into()));
    let err = assert_err!(registry.execute(user, "uptime").await);

    assert!(matches!(err, SessionError::Unavailable(_)));
    assert_eq!(dialer.dial_count(), 2);
    assert_eq!(dialer.open_count(), 0);
    assert!(!registry.is_active(user).await);
    assert!(registry.stop_session(user).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_fault_again_after_reconnect_evicts() {
    let (registry, dialer) = registry();
    let user = UserId::new(9);
    assert_ok!(registry.create_session(user).await);

    dialer.fail_next_read();
    dialer.fail_after_setup_on_next_dials(1);
    let err = assert_err!(registry.execute(user, "echo again").await);

    match err {
        SessionError::Unavailable(reason) => assert!(reason.contains("after reconnect")),
        other => panic!("unexpected error: {:?}", other),
    }
    // exactly one reconnect
    assert_eq!(dialer.dial_count(), 2);
    assert_eq!(dialer.open_count(), 0);
    assert!(!registry.is_active(user).await);
}

#[tokio::test(start_paused = true)]
async fn test_write_timeout_reconnects() {
    let (registry, dialer) = registry();
    let user = UserId::new(13);
    assert_ok!(registry.create_session(user).await);

    dialer.stall_next_write();
    let started = Instant::now();
    let output = assert_ok!(registry.execute(user, "echo late").await);

    assert_eq!(output.as_str(), "late\n");
    // the stalled write ran into the 10s I/O timeout first
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(dialer.dial_count(), 2);
    assert_eq!(dialer.close_count(), 1);
    assert_eq!(dialer.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exit_then_next_command_reconnects() {
    let (registry, dialer) = registry();
    let user = UserId::new(14);
    assert_ok!(registry.create_session(user).await);
    assert_ok!(registry.execute(user, "cd /tmp").await);

    let output = assert_ok!(registry.execute(user, "exit").await);
    assert_eq!(output.as_str(), "logout\n");

    let output = assert_ok!(registry.execute(user, "pwd").await);
    assert_eq!(output.as_str(), "/srv/app\n");
    assert_eq!(dialer.dial_count(), 2);
    assert_eq!(
        registry.get_session_info(user).await.current_dir.as_deref(),
        Some(WORKING_DIR)
    );
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_end_to_end() {
    let (registry, _dialer) = registry();
    let user = UserId::new(1);

    assert_ok!(registry.create_session(user).await);
    let output = assert_ok!(registry.execute(user, "pwd").await);
    assert!(output.as_str().contains(WORKING_DIR));

    let summary = registry.stop_session(user).await.unwrap();
    assert_eq!(summary.commands_count, 1);
    assert!(summary.duration >= Duration::ZERO);

    assert!(registry.stop_session(user).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_users_are_independent() {
    let (registry, dialer) = registry();
    dialer.set_dial_delay(Duration::from_secs(1));
    let users = [UserId::new(10), UserId::new(11), UserId::new(12)];

    let started = Instant::now();
    let (a, b, c) = tokio::join!(
        registry.create_session(users[0]),
        registry.create_session(users[1]),
        registry.create_session(users[2]),
    );
    assert_ok!(a);
    assert_ok!(b);
    assert_ok!(c);
    // connects overlap instead of queueing
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(registry.active_count(), 3);

    assert_ok!(registry.execute(users[0], "cd /tmp").await);
    let other = assert_ok!(registry.execute(users[1], "pwd").await);
    assert_eq!(other.as_str(), "/srv/app\n");

    assert_eq!(registry.stop_all().await, 3);
    assert_eq!(dialer.open_count(), 0);
}

// ============================================================================
// Idle reminders
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_reminder_fires_and_stops() {
    let dialer = ScriptedDialer::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let registry = registry_with(&dialer, notifier.clone());
    let user = UserId::new(20);

    assert_ok!(registry.create_session(user).await);
    assert_ok!(registry.execute(user, "true").await);

    tokio::time::sleep(Duration::from_secs(599)).await;
    assert_eq!(notifier.count(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(notifier.count(), 1);
    {
        let sent = notifier.sent.lock().unwrap();
        let (to, reminder) = &sent[0];
        assert_eq!(*to, user);
        assert_eq!(reminder.command_count, 1);
        assert!(reminder.idle_seconds >= 599);
    }

    assert!(registry.stop_session(user).await.is_some());
    tokio::time::sleep(Duration::from_secs(1800)).await;
    assert_eq!(notifier.count(), 1);
}

// ============================================================================
// Authorization
// ============================================================================

#[test]
fn test_allow_list_membership() {
    let policy = AuthPolicy::from_entries(["42"]);
    assert!(policy.is_authorized(UserId::new(42)));
    assert!(!policy.is_authorized(UserId::new(7)));

    let open = AuthPolicy::from_entries(Vec::<String>::new());
    assert!(open.is_authorized(UserId::new(7)));
    assert!(open.is_open());
}
