//! Per-user session registry.
//!
//! Each user id maps to a slot guarded by its own async mutex, so every
//! lifecycle transition for one user is serialized while distinct users
//! proceed in parallel. The outer map lock is only held to look up, insert,
//! or remove a slot, never across I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{format_duration, SessionContext, SessionInfo, SessionState, SessionSummary, UserId};
use crate::error::{Result, SessionError, TransportError};
use crate::monitor::IdleMonitor;
use crate::security::sanitize_for_display;
use crate::transport::{CommandOutput, RemoteShellConnector, ShellTransport};

/// One user's remote shell conversation.
pub struct Session {
    user_id: UserId,
    state: SessionState,
    started_at: Instant,
    last_activity: Instant,
    command_count: u64,
    context: SessionContext,
    transport: Option<Box<dyn ShellTransport>>,
}

impl Session {
    fn new(user_id: UserId, working_dir: &str) -> Self {
        let now = Instant::now();
        Self {
            user_id,
            state: SessionState::Created,
            started_at: now,
            last_activity: now,
            command_count: 0,
            context: SessionContext::new(working_dir),
            transport: None,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn command_count(&self) -> u64 {
        self.command_count
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Update the last activity timestamp.
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Take ownership of a freshly connected transport and go Active.
    fn attach(&mut self, transport: Box<dyn ShellTransport>) -> Result<()> {
        self.transport = Some(transport);
        self.state.transition_to(SessionState::Active)?;
        Ok(())
    }

    /// Close the transport if one is held. Safe to call twice.
    async fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            active: true,
            state: Some(self.state),
            duration: Some(self.started_at.elapsed()),
            command_count: Some(self.command_count),
            idle_seconds: Some(self.last_activity.elapsed().as_secs()),
            current_dir: Some(self.context.current_dir().to_string()),
        }
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            duration: self.started_at.elapsed(),
            commands_count: self.command_count,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("state", &self.state)
            .field("command_count", &self.command_count)
            .field("current_dir", &self.context.current_dir())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

type Slot = Arc<AsyncMutex<Option<Session>>>;
type SlotGuard = OwnedMutexGuard<Option<Session>>;

/// Owns every live session, keyed by user id.
pub struct SessionRegistry {
    me: Weak<SessionRegistry>,
    slots: Mutex<HashMap<UserId, Slot>>,
    connector: RemoteShellConnector,
    monitor: IdleMonitor,
}

impl SessionRegistry {
    pub fn new(connector: RemoteShellConnector, monitor: IdleMonitor) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            slots: Mutex::new(HashMap::new()),
            connector,
            monitor,
        })
    }

    /// How often idle sessions are reminded.
    pub fn idle_interval(&self) -> std::time::Duration {
        self.monitor.interval()
    }

    /// Open a shell for `user` and register the session.
    ///
    /// Fails with `AlreadyActive` if the user has a live session. On connect
    /// failure nothing is left registered.
    pub async fn create_session(&self, user: UserId) -> Result<()> {
        let (slot, mut guard) = self.lock_or_insert(user).await;
        if guard.as_ref().is_some_and(|s| !s.state().is_terminal()) {
            return Err(SessionError::AlreadyActive);
        }

        let mut session = Session::new(user, self.connector.working_dir());
        match self.connector.connect().await {
            Ok(transport) => {
                session.attach(transport)?;
                info!(user = %user, dir = %session.context.current_dir(), "session created");
                *guard = Some(session);
                self.monitor.arm(user, self.me.clone());
                Ok(())
            }
            Err(e) => {
                // Created -> Stopped; the partial session is discarded
                let _ = session.state.transition_to(SessionState::Stopped);
                *guard = None;
                self.release(user, &slot);
                warn!(user = %user, error = %e, "session create failed");
                Err(e.into())
            }
        }
    }

    /// Run one command in the user's shell and capture its output.
    ///
    /// A transport fault triggers exactly one reconnect and a single resend.
    /// If the reconnect fails, or the resend faults again, the session is
    /// stopped, evicted, and `Unavailable` is returned.
    pub async fn execute(&self, user: UserId, command: &str) -> Result<CommandOutput> {
        let Some((slot, mut guard)) = self.lock_existing(user).await else {
            return Err(SessionError::NotActive);
        };
        let Some(session) = guard.as_mut().filter(|s| s.state().can_execute()) else {
            return Err(SessionError::NotActive);
        };

        session.command_count += 1;
        session.touch();
        debug!(
            user = %user,
            command = %sanitize_for_display(command),
            count = session.command_count,
            "executing"
        );

        match self.run_with_reconnect(session, command).await {
            Ok(output) => {
                session.context.observe(command, &output);
                Ok(output)
            }
            Err(reason) => {
                if let Some(mut session) = guard.take() {
                    self.monitor.cancel(user).await;
                    let _ = session.state.transition_to(SessionState::Stopped);
                    session.close_transport().await;
                    warn!(
                        user = %user,
                        commands = session.command_count,
                        reason = %reason,
                        "session evicted"
                    );
                }
                self.release(user, &slot);
                Err(SessionError::Unavailable(reason))
            }
        }
    }

    /// Send and capture, with at most one reconnect in between.
    ///
    /// The error is the eviction reason.
    async fn run_with_reconnect(
        &self,
        session: &mut Session,
        command: &str,
    ) -> std::result::Result<CommandOutput, String> {
        let mut reconnected = false;
        loop {
            let fault = match session.transport.as_mut() {
                Some(transport) => match self.connector.run(transport.as_mut(), command).await {
                    Ok(output) => return Ok(output),
                    Err(e) => e,
                },
                None => TransportError::BrokenPipe,
            };

            if reconnected {
                return Err(format!("shell failed again after reconnect: {}", fault));
            }
            reconnected = true;

            warn!(user = %session.user_id, error = %fault, "transport fault, reconnecting");
            session
                .state
                .transition_to(SessionState::Reconnecting)
                .map_err(|e| e.to_string())?;
            session.close_transport().await;

            let transport = self
                .connector
                .connect()
                .await
                .map_err(|e| format!("reconnect failed: {}", e))?;
            session.attach(transport).map_err(|e| e.to_string())?;
            session.context.reset();
            info!(user = %session.user_id, "reconnected");
        }
    }

    /// Stop the user's session and report its totals.
    ///
    /// Returns `None` when there is nothing to stop, so a second call is a
    /// no-op.
    pub async fn stop_session(&self, user: UserId) -> Option<SessionSummary> {
        let (slot, mut guard) = self.lock_existing(user).await?;
        let Some(mut session) = guard.take() else {
            self.release(user, &slot);
            return None;
        };

        // slot stays locked and mapped until the transport is gone
        self.monitor.cancel(user).await;
        if let Err(e) = session.state.transition_to(SessionState::Stopped) {
            warn!(user = %user, error = %e, "unexpected state at stop");
        }
        session.close_transport().await;
        self.release(user, &slot);
        drop(guard);

        let summary = session.summary();
        info!(
            user = %user,
            commands = summary.commands_count,
            duration = %format_duration(summary.duration),
            "session stopped"
        );
        Some(summary)
    }

    /// Snapshot of the user's session; inactive when there is none.
    pub async fn get_session_info(&self, user: UserId) -> SessionInfo {
        match self.lock_existing(user).await {
            Some((_, guard)) => guard
                .as_ref()
                .map(Session::info)
                .unwrap_or_else(SessionInfo::inactive),
            None => SessionInfo::inactive(),
        }
    }

    pub async fn is_active(&self, user: UserId) -> bool {
        self.get_session_info(user).await.active
    }

    /// Users with a slot, including ones mid-create.
    pub fn active_count(&self) -> usize {
        self.slots().len()
    }

    /// Stop every session. Used at shutdown.
    pub async fn stop_all(&self) -> usize {
        let users: Vec<UserId> = self.slots().keys().copied().collect();
        let mut stopped = 0;
        for user in users {
            if self.stop_session(user).await.is_some() {
                stopped += 1;
            }
        }
        stopped
    }

    /// Lock the user's slot, inserting an empty one if needed.
    async fn lock_or_insert(&self, user: UserId) -> (Slot, SlotGuard) {
        loop {
            let slot = Arc::clone(self.slots().entry(user).or_default());
            let guard = Arc::clone(&slot).lock_owned().await;
            if self.is_current(user, &slot) {
                return (slot, guard);
            }
        }
    }

    /// Lock the user's slot only if one exists.
    async fn lock_existing(&self, user: UserId) -> Option<(Slot, SlotGuard)> {
        loop {
            let slot = self.slots().get(&user).cloned()?;
            let guard = Arc::clone(&slot).lock_owned().await;
            // released while we waited; look again
            if self.is_current(user, &slot) {
                return Some((slot, guard));
            }
        }
    }

    fn is_current(&self, user: UserId, slot: &Slot) -> bool {
        self.slots()
            .get(&user)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Drop the map entry, if it is still this slot. Call with the slot locked.
    fn release(&self, user: UserId, slot: &Slot) {
        let mut slots = self.slots();
        if slots.get(&user).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(&user);
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<UserId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
