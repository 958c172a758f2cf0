//! Chat user identity.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Identity of a chat user, and the key of their session.
///
/// Telegram user ids are positive 64-bit integers. Displayed as the bare
/// number so it round-trips through allow-list entries like `"42"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(u64);

impl UserId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for UserId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An allow-list or provider entry that is not a user id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid user id: '{0}'")]
pub struct InvalidUserId(pub String);

impl FromStr for UserId {
    type Err = InvalidUserId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(UserId)
            .map_err(|_| InvalidUserId(s.to_string()))
    }
}
