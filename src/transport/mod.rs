//! Remote shell transport layer.
//!
//! A transport is a live duplex channel to an interactive shell. It has no
//! end-of-command marker, so output is captured by waiting a settle window
//! and draining whatever is buffered (see [`read_output`]).
//!
//! - [`ShellTransport`] / [`ShellDialer`]: the seam between session logic
//!   and the wire. [`SshDialer`] is the production implementation,
//!   `ScriptedDialer` an in-memory shell for tests (`testing` feature).
//! - [`RemoteShellConnector`]: connect (with the initial `cd`), send, read,
//!   bounded by timeouts and the [`ReconnectGuard`].

mod capture;
mod connector;
mod guard;
#[cfg(any(test, feature = "testing"))]
mod scripted;
mod ssh;

pub use capture::{
    read_output, CaptureConfig, CommandOutput, DEFAULT_BUDGET_BYTES, DEFAULT_SETTLE_WINDOW,
    NO_OUTPUT, TRUNCATION_MARKER,
};
pub use connector::{RemoteShellConnector, Timeouts};
pub use guard::{GuardConfig, ReconnectGuard};
#[cfg(any(test, feature = "testing"))]
pub use scripted::{ScriptedDialer, ScriptedTransport};
pub use ssh::SshDialer;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{ConnectError, TransportError};

/// Default SSH port when `sshHost` carries none.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// An open duplex channel to a remote shell, exclusively owned by one session.
#[async_trait]
pub trait ShellTransport: Send {
    /// Write raw bytes to the shell's stdin.
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Take the next buffered output chunk without waiting.
    ///
    /// `Ok(None)` means nothing is buffered right now. Buffered chunks are
    /// returned before a closed channel is reported as `BrokenPipe`.
    fn try_read(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Whether the last I/O showed the channel is broken.
    fn is_broken(&self) -> bool;

    /// Close the channel. Called exactly once by the owner.
    async fn close(&mut self);
}

/// Opens raw shell channels to a target.
#[async_trait]
pub trait ShellDialer: Send + Sync {
    async fn dial(&self, target: &SshTarget) -> Result<Box<dyn ShellTransport>, ConnectError>;
}

/// Where and as whom to open the shell.
#[derive(Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    /// Private key tried when no password is configured.
    pub key_path: Option<PathBuf>,
    /// Directory the shell is moved to right after connecting.
    pub working_dir: String,
}

impl SshTarget {
    /// Split `host[:port]` on the first colon; the port defaults to 22.
    ///
    /// Returns `None` when a port is present but not a number.
    pub fn split_host(value: &str) -> Option<(String, u16)> {
        match value.trim().split_once(':') {
            Some((host, port)) => port
                .trim()
                .parse::<u16>()
                .ok()
                .map(|port| (host.to_string(), port)),
            None => Some((value.trim().to_string(), DEFAULT_SSH_PORT)),
        }
    }

    /// `user@host:port`, for logs.
    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

impl std::fmt::Debug for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key_path", &self.key_path)
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_default_port() {
        assert_eq!(
            SshTarget::split_host("example.com"),
            Some(("example.com".to_string(), 22))
        );
    }

    #[test]
    fn test_split_host_with_port() {
        assert_eq!(
            SshTarget::split_host("10.0.0.5:2222"),
            Some(("10.0.0.5".to_string(), 2222))
        );
    }

    #[test]
    fn test_split_host_first_colon_only() {
        assert_eq!(SshTarget::split_host("host:22:33"), None);
        assert_eq!(SshTarget::split_host("host:ssh"), None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let target = SshTarget {
            host: "h".into(),
            port: 22,
            username: "u".into(),
            password: Some("hunter2".into()),
            key_path: None,
            working_dir: "/root".into(),
        };
        let rendered = format!("{:?}", target);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        assert_eq!(target.address(), "u@h:22");
    }
}
