//! Working-directory tracking for a session.
//!
//! The remote side is a raw interactive shell, so the directory is never
//! queried; it is inferred from `cd` commands whose output shows no error.

use crate::transport::CommandOutput;

/// Shell error fragments that mean a `cd` did not happen.
const CD_FAILURES: &[&str] = &[
    "No such file",
    "Not a directory",
    "Permission denied",
    "can't cd",
    "too many arguments",
    "not found",
];

/// Execution context tracked alongside a session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Directory the shell is believed to be in.
    current_dir: String,
    /// Directory every fresh transport starts in.
    initial_dir: String,
    /// Last command sent, for reminders and diagnostics.
    last_command: Option<String>,
}

impl SessionContext {
    /// Create a context rooted at the configured working directory.
    pub fn new(working_dir: impl Into<String>) -> Self {
        let dir = working_dir.into();
        Self {
            current_dir: dir.clone(),
            initial_dir: dir,
            last_command: None,
        }
    }

    pub fn current_dir(&self) -> &str {
        &self.current_dir
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    /// A new transport starts in the configured directory again.
    pub fn reset(&mut self) {
        self.current_dir = self.initial_dir.clone();
    }

    /// Record a completed command and follow it if it was a clean `cd`.
    pub fn observe(&mut self, command: &str, output: &CommandOutput) {
        self.last_command = Some(command.to_string());

        let Some(target) = DirResolver::cd_target(command) else {
            return;
        };
        if let CommandOutput::Text(text) = output {
            if DirResolver::reports_failure(text) {
                return;
            }
        }
        if let Some(dir) = DirResolver::resolve(&self.current_dir, target) {
            self.current_dir = dir;
        }
    }
}

/// Parsing helpers for `cd`-style commands.
pub struct DirResolver;

impl DirResolver {
    /// Extract the single literal argument of a plain `cd` command.
    ///
    /// Compound commands, substitutions, `cd -`, and home-relative paths
    /// return `None` because their target cannot be known locally.
    pub fn cd_target(command: &str) -> Option<&str> {
        let trimmed = command.trim();
        let rest = trimmed.strip_prefix("cd")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        if rest.contains([';', '&', '|', '<', '>', '`', '$']) {
            return None;
        }

        let mut args = rest.split_whitespace();
        let arg = args.next()?;
        if args.next().is_some() {
            return None;
        }

        let arg = Self::unquote(arg);
        if arg.is_empty() || arg == "-" || arg.starts_with('~') {
            return None;
        }
        Some(arg)
    }

    /// Check captured output for a shell error about the directory change.
    pub fn reports_failure(output: &str) -> bool {
        CD_FAILURES.iter().any(|needle| output.contains(needle))
    }

    /// Resolve `target` against `current`, normalizing `.` and `..`.
    pub fn resolve(current: &str, target: &str) -> Option<String> {
        let joined = if target.starts_with('/') {
            target.to_string()
        } else if current.starts_with('/') {
            format!("{}/{}", current, target)
        } else {
            return None;
        };

        let mut parts: Vec<&str> = Vec::new();
        for part in joined.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }
        Some(format!("/{}", parts.join("/")))
    }

    fn unquote(arg: &str) -> &str {
        for quote in ['\'', '"'] {
            if let Some(inner) = arg
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
            {
                return inner;
            }
        }
        arg
    }
}
