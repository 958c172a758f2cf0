//! # teleshell
//!
//! Persistent remote shell sessions driven from a Telegram chat.
//!
//! Each authorized chat user gets at most one interactive SSH shell. Text
//! they send is written to that shell and whatever it prints within a short
//! settle window comes back as a reply. The shell keeps its state (working
//! directory, environment) between messages until the user stops it.
//!
//! ## Layout
//!
//! - [`session`]: the [`SessionRegistry`] and the per-session bookkeeping
//! - [`transport`]: the shell transport seam and the SSH dialer
//! - [`monitor`]: recurring idle reminders
//! - [`provider`]: where the bot token and SSH target come from
//! - [`gateway`]: chat commands, buttons and the Telegram adapter
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use teleshell::{IdleMonitor, NoopNotifier, RemoteShellConnector, SessionRegistry, SshDialer, SshTarget, UserId};
//!
//! #[tokio::main]
//! async fn main() -> teleshell::Result<()> {
//!     let target = SshTarget {
//!         host: "build.example.com".into(),
//!         port: 22,
//!         username: "deploy".into(),
//!         password: None,
//!         key_path: None,
//!         working_dir: "/srv".into(),
//!     };
//!     let connector = RemoteShellConnector::new(Arc::new(SshDialer::new()), target);
//!     let registry = SessionRegistry::new(connector, IdleMonitor::new(Arc::new(NoopNotifier)));
//!
//!     let user = UserId::new(42);
//!     registry.create_session(user).await?;
//!     let output = registry.execute(user, "pwd").await?;
//!     println!("{}", output.as_str());
//!     registry.stop_session(user).await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod monitor;
pub mod output;
pub mod provider;
pub mod security;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use error::{ConnectError, ProviderError, Result, SessionError, TransportError};
pub use gateway::{CommandGateway, GatewayAction, Reply, TelegramGateway, TelegramNotifier};
pub use monitor::{IdleMonitor, IdleNotifier, IdleReminder, NoopNotifier};
pub use output::OutputSanitizer;
pub use provider::{BotProfile, ConfigProvider, ProviderStrategy, ResolvedProfile};
pub use security::AuthPolicy;
pub use session::{SessionInfo, SessionRegistry, SessionState, SessionSummary, UserId};
pub use transport::{
    CaptureConfig, CommandOutput, RemoteShellConnector, ShellDialer, ShellTransport, SshDialer,
    SshTarget,
};

#[cfg(any(test, feature = "testing"))]
pub use transport::ScriptedDialer;
