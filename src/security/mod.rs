//! Authorization and command-line quoting.
//!
//! - **Allow-list**: [`AuthPolicy`] decides which chat users may open a
//!   shell. With nothing configured it is open, and says so loudly.
//! - **Quoting**: helpers for text that is spliced into remote command lines.
//!
//! ## Example
//!
//! ```rust
//! use teleshell::security::{assistant_command, AuthPolicy};
//! use teleshell::session::UserId;
//!
//! let policy = AuthPolicy::from_entries(["42"]);
//! assert!(policy.is_authorized(UserId::new(42)));
//!
//! let cmd = assistant_command("claude", "what is $HOME").unwrap();
//! assert_eq!(cmd, r#"claude "what is \$HOME""#);
//! ```

pub mod auth;
pub mod validation;

pub use auth::AuthPolicy;
pub use validation::{assistant_command, escape_double_quoted, sanitize_for_display, shell_quote};
