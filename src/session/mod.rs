//! Session management module.
//!
//! Types for per-user remote shell sessions: identity, the lifecycle state
//! machine, working-directory tracking, read-only snapshots, and the
//! [`SessionRegistry`] that owns them all.

mod context;
mod id;
mod info;
mod registry;
mod state;

pub use context::{DirResolver, SessionContext};
pub use id::{InvalidUserId, UserId};
pub use info::{format_duration, SessionInfo, SessionSummary};
pub use registry::{Session, SessionRegistry};
pub use state::{SessionState, StateTransitionError};
