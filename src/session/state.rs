//! Session state machine.

use thiserror::Error;

/// Lifecycle state of a remote shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Constructed, transport not yet open.
    #[default]
    Created,
    /// Transport open; commands are accepted.
    Active,
    /// A transport fault was seen; one reconnect attempt is in flight.
    Reconnecting,
    /// Terminal. The transport is closed and the entry is gone.
    Stopped,
}

/// An attempted transition the state machine does not allow.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid state transition from {from:?} to {to:?}")]
pub struct StateTransitionError {
    pub from: SessionState,
    pub to: SessionState,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Created -> Active (connect ok)
    /// - Created -> Stopped (connect failed, never registered)
    /// - Active -> Reconnecting (transport fault)
    /// - Active -> Stopped (explicit stop)
    /// - Reconnecting -> Active (reconnect ok)
    /// - Reconnecting -> Stopped (reconnect failed, evicted)
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Created, Active)
                | (Created, Stopped)
                | (Active, Reconnecting)
                | (Active, Stopped)
                | (Reconnecting, Active)
                | (Reconnecting, Stopped)
        )
    }

    /// Attempt to transition to a new state. The state is unchanged on error.
    pub fn transition_to(&mut self, target: SessionState) -> Result<(), StateTransitionError> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(StateTransitionError {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped)
    }

    /// Check if the session can accept commands.
    pub fn can_execute(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Reconnecting)
    }
}
