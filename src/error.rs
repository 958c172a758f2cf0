//! Error types for teleshell.

use std::time::Duration;

use thiserror::Error;

use crate::session::StateTransitionError;

/// Failure to open (or re-open) a remote shell.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The remote host rejected the credentials.
    #[error("authentication rejected for user '{user}'")]
    Auth { user: String },

    /// TCP, handshake, or channel setup failed.
    #[error("network error: {0}")]
    Network(String),

    /// The connect attempt did not finish in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Too many recent failures against the host; the attempt was not made.
    #[error("connect attempts suspended, retry in {}s", .retry_after.as_secs())]
    Throttled { retry_after: Duration },
}

/// Fault on an open shell channel.
///
/// Both variants drive a session into `Reconnecting`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The channel is no longer writable or readable.
    #[error("broken pipe: shell channel is closed")]
    BrokenPipe,

    /// A write did not complete within the I/O timeout.
    #[error("shell I/O timed out")]
    Timeout,
}

/// Errors surfaced by the session registry and the gateway.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Rejected at the gateway boundary; no session was touched.
    #[error("unauthorized access")]
    Unauthorized,

    /// A live session already exists for this user.
    #[error("session already active")]
    AlreadyActive,

    /// No live session exists for this user.
    #[error("session not active")]
    NotActive,

    /// Opening the shell failed.
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    /// The single reconnect attempt failed; the session was evicted.
    #[error("session unavailable: {0}")]
    Unavailable(String),

    /// Internal state machine violation.
    #[error(transparent)]
    InvalidTransition(#[from] StateTransitionError),
}

/// Errors from the configuration provider. Always fatal at startup.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("provider returned HTTP {0}")]
    Status(u16),

    /// Local provider file could not be read.
    #[error("provider file unreadable: {0}")]
    Io(#[from] std::io::Error),

    /// Provider payload was not valid JSON.
    #[error("provider payload invalid: {0}")]
    Decode(#[from] serde_json::Error),

    /// Provider returned no bot profiles (or none matching the bot id).
    #[error("no bot profile available from {0}")]
    Empty(String),

    /// Required fields were missing or blank.
    #[error("missing required config fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// The `host:port` value had a non-numeric port.
    #[error("invalid ssh port in '{0}'")]
    InvalidPort(String),

    /// No strategy was configured at all.
    #[error("no config provider strategy configured")]
    NoStrategy,
}

/// Convenience Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
