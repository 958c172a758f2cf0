//! Connect, send, and capture against one configured host.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{
    read_output, CaptureConfig, CommandOutput, ReconnectGuard, ShellDialer, ShellTransport,
    SshTarget,
};
use crate::error::{ConnectError, TransportError};
use crate::security::shell_quote;

/// Upper bounds on remote I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Dial + authenticate + initial `cd`.
    pub connect: Duration,
    /// One command write.
    pub io: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            io: Duration::from_secs(10),
        }
    }
}

/// Opens shells for sessions and runs commands on them.
pub struct RemoteShellConnector {
    dialer: Arc<dyn ShellDialer>,
    target: SshTarget,
    capture: CaptureConfig,
    timeouts: Timeouts,
    guard: ReconnectGuard,
}

impl RemoteShellConnector {
    pub fn new(dialer: Arc<dyn ShellDialer>, target: SshTarget) -> Self {
        Self {
            dialer,
            target,
            capture: CaptureConfig::default(),
            timeouts: Timeouts::default(),
            guard: ReconnectGuard::default(),
        }
    }

    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_guard(mut self, guard: ReconnectGuard) -> Self {
        self.guard = guard;
        self
    }

    /// The directory every new transport is moved to.
    pub fn working_dir(&self) -> &str {
        &self.target.working_dir
    }

    /// Open a shell and move it to the working directory.
    ///
    /// The banner and the `cd` echo are drained and discarded so the first
    /// command's capture starts clean. Bounded by the connect timeout and
    /// refused outright while the guard is tripped.
    pub async fn connect(&self) -> Result<Box<dyn ShellTransport>, ConnectError> {
        if let Err(e) = self.guard.check() {
            warn!(target = %self.target.address(), error = %e, "connect refused by guard");
            return Err(e);
        }

        let attempt = async {
            let mut transport = self.dialer.dial(&self.target).await?;
            let cd = format!("cd {}", shell_quote(&self.target.working_dir));
            if let Err(e) = self.send_command(transport.as_mut(), &cd).await {
                transport.close().await;
                return Err(ConnectError::Network(format!("initial cd failed: {}", e)));
            }
            match read_output(transport.as_mut(), &self.capture).await {
                Ok(banner) => debug!(bytes = banner.as_str().len(), "discarded banner"),
                Err(e) => {
                    transport.close().await;
                    return Err(ConnectError::Network(format!("shell closed after cd: {}", e)));
                }
            }
            Ok::<_, ConnectError>(transport)
        };

        match tokio::time::timeout(self.timeouts.connect, attempt).await {
            Ok(Ok(transport)) => {
                self.guard.record_success();
                info!(target = %self.target.address(), dir = %self.target.working_dir, "shell connected");
                Ok(transport)
            }
            Ok(Err(e)) => {
                self.guard.record_failure();
                warn!(target = %self.target.address(), error = %e, "connect failed");
                Err(e)
            }
            Err(_) => {
                self.guard.record_failure();
                warn!(target = %self.target.address(), "connect timed out");
                Err(ConnectError::Timeout(self.timeouts.connect))
            }
        }
    }

    /// Write one command line, terminated by a newline.
    pub async fn send_command(
        &self,
        transport: &mut dyn ShellTransport,
        text: &str,
    ) -> Result<(), TransportError> {
        if transport.is_broken() {
            return Err(TransportError::BrokenPipe);
        }
        let line = format!("{}\n", text);
        match tokio::time::timeout(self.timeouts.io, transport.write(line.as_bytes())).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Capture the output buffered after a command.
    pub async fn read_output(
        &self,
        transport: &mut dyn ShellTransport,
    ) -> Result<CommandOutput, TransportError> {
        read_output(transport, &self.capture).await
    }

    /// Send then capture.
    pub async fn run(
        &self,
        transport: &mut dyn ShellTransport,
        text: &str,
    ) -> Result<CommandOutput, TransportError> {
        self.send_command(transport, text).await?;
        self.read_output(transport).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{GuardConfig, ScriptedDialer};

    fn connector(dialer: &ScriptedDialer) -> RemoteShellConnector {
        RemoteShellConnector::new(Arc::new(dialer.clone()), ScriptedDialer::target("/srv/app"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_moves_to_working_dir() {
        let dialer = ScriptedDialer::new();
        let connector = connector(&dialer);

        let mut transport = connector.connect().await.unwrap();
        let output = connector.run(transport.as_mut(), "pwd").await.unwrap();

        assert_eq!(output.as_str(), "/srv/app\n");
        assert_eq!(dialer.dial_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_feeds_guard() {
        let dialer = ScriptedDialer::new();
        dialer.fail_next_dials(3, ConnectError::Network("refused".into()));
        let connector = connector(&dialer).with_guard(ReconnectGuard::new(GuardConfig {
            enabled: true,
            max_failures: 2,
            window: Duration::from_secs(60),
        }));

        assert!(matches!(connector.connect().await, Err(ConnectError::Network(_))));
        assert!(matches!(connector.connect().await, Err(ConnectError::Network(_))));
        assert!(matches!(
            connector.connect().await,
            Err(ConnectError::Throttled { .. })
        ));
        // the throttled attempt never reached the dialer
        assert_eq!(dialer.dial_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let dialer = ScriptedDialer::new();
        dialer.set_dial_delay(Duration::from_secs(60));
        let connector = connector(&dialer).with_timeouts(Timeouts {
            connect: Duration::from_secs(5),
            io: Duration::from_secs(5),
        });

        assert_eq!(
            connector.connect().await.err(),
            Some(ConnectError::Timeout(Duration::from_secs(5)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_initial_cd_closes_shell() {
        let dialer = ScriptedDialer::new();
        dialer.dead_on_next_dials(1);
        let connector = connector(&dialer);

        match connector.connect().await {
            Err(ConnectError::Network(reason)) => assert!(reason.contains("initial cd failed")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert_eq!(dialer.dial_count(), 1);
        assert_eq!(dialer.close_count(), 1);
        assert_eq!(dialer.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_on_broken_transport() {
        let dialer = ScriptedDialer::new();
        let connector = connector(&dialer);
        let mut transport = connector.connect().await.unwrap();

        dialer.break_live_transports();
        assert_eq!(
            connector.send_command(transport.as_mut(), "ls").await,
            Err(TransportError::BrokenPipe)
        );
    }
}
