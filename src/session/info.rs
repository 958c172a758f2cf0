//! Read-only views of a session handed to the gateway.

use std::time::Duration;

use super::SessionState;

/// Snapshot returned by `get_session_info`.
///
/// When `active` is false every other field is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub active: bool,
    pub state: Option<SessionState>,
    pub duration: Option<Duration>,
    pub command_count: Option<u64>,
    pub idle_seconds: Option<u64>,
    pub current_dir: Option<String>,
}

impl SessionInfo {
    /// The snapshot for a user without a live session.
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Whole minutes the session has been open.
    pub fn duration_minutes(&self) -> Option<u64> {
        self.duration.map(|d| d.as_secs() / 60)
    }
}

/// Final accounting returned by `stop_session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub duration: Duration,
    pub commands_count: u64,
}

/// Render a duration as `1h 02m 03s`, dropping leading zero units.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
