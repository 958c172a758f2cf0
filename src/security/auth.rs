//! Allow-list authorization of chat users.

use std::collections::HashSet;

use tracing::warn;

use crate::session::UserId;

/// Who may drive a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Only the listed users. An empty set admits nobody.
    AllowList(HashSet<UserId>),
    /// Every user is admitted. Only reached when no list was configured.
    Open,
}

impl AuthPolicy {
    /// Build a policy from configured entries.
    ///
    /// No entries at all yields [`AuthPolicy::Open`]. Entries that fail to
    /// parse are skipped with a warning; if none parse, the list is empty and
    /// denies everyone rather than falling back to open.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen_any = false;
        let mut users = HashSet::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            seen_any = true;
            match entry.parse::<UserId>() {
                Ok(user) => {
                    users.insert(user);
                }
                Err(e) => warn!(entry, error = %e, "ignoring allow-list entry"),
            }
        }
        if seen_any {
            AuthPolicy::AllowList(users)
        } else {
            AuthPolicy::Open
        }
    }

    pub fn is_authorized(&self, user: UserId) -> bool {
        match self {
            AuthPolicy::AllowList(users) => users.contains(&user),
            AuthPolicy::Open => true,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, AuthPolicy::Open)
    }

    /// Log the effective policy once at startup.
    pub fn announce(&self) {
        match self {
            AuthPolicy::Open => warn!(
                "no allow-list configured: ANY chat user can open a shell on the remote host"
            ),
            AuthPolicy::AllowList(users) if users.is_empty() => {
                warn!("allow-list has no valid entries: every user will be rejected")
            }
            AuthPolicy::AllowList(users) => {
                tracing::info!(users = users.len(), "authorization restricted to allow-list")
            }
        }
    }
}

impl Default for AuthPolicy {
    fn default() -> Self {
        AuthPolicy::Open
    }
}
