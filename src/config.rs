//! Configuration management for teleshell.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values
//!
//! The bot token and SSH target are not part of this file; they come from
//! the [`provider`](crate::provider).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Args;
use crate::provider::{ConfigProvider, ProviderStrategy};
use crate::security::AuthPolicy;
use crate::transport::{CaptureConfig, GuardConfig, Timeouts};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderSection,
    pub session: SessionSection,
    pub auth: AuthSection,
    pub guard: GuardSection,
    pub assistant: AssistantSection,
    pub logging: LoggingSection,
}

/// Where the bot profile comes from.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Web provider base URL.
    pub url: Option<String>,
    /// Web provider password.
    pub password: Option<String>,
    /// Profile id to select.
    pub bot_id: Option<String>,
    /// Local profile file.
    pub file: Option<PathBuf>,
    pub cache_ttl_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            url: None,
            password: None,
            bot_id: None,
            file: None,
            cache_ttl_secs: 60,
            timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for ProviderSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSection")
            .field("url", &self.url)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("bot_id", &self.bot_id)
            .field("file", &self.file)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Command capture and session timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub settle_ms: u64,
    pub budget_bytes: usize,
    pub strip_ansi: bool,
    pub connect_timeout_secs: u64,
    pub io_timeout_secs: u64,
    pub idle_interval_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            settle_ms: 500,
            budget_bytes: 4000,
            strip_ansi: true,
            connect_timeout_secs: 15,
            io_timeout_secs: 10,
            idle_interval_secs: 600,
        }
    }
}

/// Authorization configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Allowed Telegram user ids. Empty means the profile's chat id, or open.
    pub allowed_users: Vec<String>,
}

/// Reconnect guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSection {
    pub enabled: bool,
    pub max_failures: u32,
    pub window_secs: u64,
}

impl Default for GuardSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failures: 5,
            window_secs: 120,
        }
    }
}

/// The `/claude` command target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSection {
    pub program: String,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            program: "/usr/local/bin/claude".to_string(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = env("TELESHELL_PROVIDER_URL") {
            self.provider.url = Some(url);
        }
        if let Some(password) = env("TELESHELL_PROVIDER_PASSWORD") {
            self.provider.password = Some(password);
        }
        if let Some(bot_id) = env("TELESHELL_BOT_ID") {
            self.provider.bot_id = Some(bot_id);
        }

        if let Some(users) = env("TELESHELL_ALLOWED_USERS") {
            self.auth.allowed_users = users
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(ms) = env("TELESHELL_SETTLE_MS").and_then(|v| v.parse().ok()) {
            self.session.settle_ms = ms;
        }
        if let Some(bytes) = env("TELESHELL_BUDGET_BYTES").and_then(|v| v.parse().ok()) {
            self.session.budget_bytes = bytes;
        }

        if let Some(program) = env("TELESHELL_ASSISTANT") {
            self.assistant.program = program;
        }

        if let Some(level) = env("TELESHELL_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = env("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref url) = args.provider_url {
            self.provider.url = Some(url.clone());
        }
        if let Some(ref password) = args.provider_password {
            self.provider.password = Some(password.clone());
        }
        if let Some(ref file) = args.provider_file {
            self.provider.file = Some(file.clone());
        }
        if let Some(ref bot_id) = args.bot_id {
            self.provider.bot_id = Some(bot_id.clone());
        }
        if let Some(ms) = args.settle_ms {
            self.session.settle_ms = ms;
        }
        if let Some(bytes) = args.budget {
            self.session.budget_bytes = bytes;
        }
        if !args.allow.is_empty() {
            self.auth.allowed_users = args.allow.clone();
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Reject values that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.budget_bytes == 0 {
            return Err(ConfigError::Invalid("session.budget_bytes must be positive"));
        }
        if self.session.idle_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "session.idle_interval_secs must be positive",
            ));
        }
        if self.guard.enabled && self.guard.max_failures == 0 {
            return Err(ConfigError::Invalid("guard.max_failures must be positive"));
        }
        Ok(())
    }

    /// Provider strategies in fallback order: web, file, then environment.
    pub fn provider_strategies(&self) -> Vec<ProviderStrategy> {
        let mut strategies = Vec::new();
        if let Some(url) = self.provider.url.as_deref().filter(|u| !u.trim().is_empty()) {
            strategies.push(ProviderStrategy::Web {
                url: url.to_string(),
                password: self.provider.password.clone().unwrap_or_default(),
            });
        }
        if let Some(ref path) = self.provider.file {
            strategies.push(ProviderStrategy::File { path: path.clone() });
        }
        strategies.push(ProviderStrategy::Env);
        strategies
    }

    pub fn provider(&self) -> ConfigProvider {
        ConfigProvider::new(self.provider_strategies())
            .with_bot_id(self.provider.bot_id.clone())
            .with_cache_ttl(Duration::from_secs(self.provider.cache_ttl_secs))
            .with_timeout(Duration::from_secs(self.provider.timeout_secs))
    }

    /// The allow-list, falling back to the profile's chat id when unset.
    pub fn auth_policy(&self, profile_chat_id: Option<&str>) -> AuthPolicy {
        if self.auth.allowed_users.is_empty() {
            AuthPolicy::from_entries(profile_chat_id)
        } else {
            AuthPolicy::from_entries(&self.auth.allowed_users)
        }
    }

    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            settle_window: Duration::from_millis(self.session.settle_ms),
            budget_bytes: self.session.budget_bytes,
            strip_ansi: self.session.strip_ansi,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.session.connect_timeout_secs),
            io: Duration::from_secs(self.session.io_timeout_secs),
        }
    }

    pub fn guard(&self) -> GuardConfig {
        GuardConfig {
            enabled: self.guard.enabled,
            max_failures: self.guard.max_failures,
            window: Duration::from_secs(self.guard.window_secs),
        }
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.session.idle_interval_secs)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error.
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    /// A value outside its valid range.
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.settle_ms, 500);
        assert_eq!(config.session.budget_bytes, 4000);
        assert_eq!(config.session.idle_interval_secs, 600);
        assert_eq!(config.guard.max_failures, 5);
        assert_eq!(config.provider.cache_ttl_secs, 60);
        assert_eq!(config.assistant.program, "/usr/local/bin/claude");
        assert!(config.auth.allowed_users.is_empty());
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{
            "session": { "budget_bytes": 2000 },
            "auth": { "allowed_users": ["42"] }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.session.budget_bytes, 2000);
        assert_eq!(config.session.settle_ms, 500); // Default
        assert_eq!(config.auth.allowed_users, vec!["42"]);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_from(env_of(&[
            ("TELESHELL_PROVIDER_URL", "https://cfg"),
            ("TELESHELL_ALLOWED_USERS", "42, 7,,"),
            ("TELESHELL_SETTLE_MS", "900"),
            ("TELESHELL_BUDGET_BYTES", "not-a-number"),
            ("TELESHELL_LOG_LEVEL", "debug"),
        ]));

        assert_eq!(config.provider.url.as_deref(), Some("https://cfg"));
        assert_eq!(config.auth.allowed_users, vec!["42", "7"]);
        assert_eq!(config.session.settle_ms, 900);
        assert_eq!(config.session.budget_bytes, 4000);
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_args_override_env() {
        let mut config = Config::default();
        config.apply_env_from(env_of(&[("TELESHELL_ALLOWED_USERS", "1")]));
        config.apply_args(&Args {
            allow: vec!["2".into()],
            budget: Some(100),
            ..Args::default()
        });

        assert_eq!(config.auth.allowed_users, vec!["2"]);
        assert_eq!(config.capture().budget_bytes, 100);
    }

    #[test]
    fn test_strategies_order() {
        let mut config = Config::default();
        assert_eq!(config.provider_strategies(), vec![ProviderStrategy::Env]);

        config.provider.url = Some("https://cfg".into());
        config.provider.file = Some(PathBuf::from("/etc/bots.json"));
        let names: Vec<_> = config
            .provider_strategies()
            .iter()
            .map(ProviderStrategy::name)
            .collect();
        assert_eq!(names, vec!["web", "file", "env"]);
    }

    #[test]
    fn test_auth_policy_falls_back_to_chat_id() {
        let config = Config::default();
        let policy = config.auth_policy(Some("42"));
        assert!(policy.is_authorized(42.into()));
        assert!(!policy.is_authorized(7.into()));

        assert!(config.auth_policy(None).is_open());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.session.budget_bytes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_debug_hides_provider_password() {
        let mut config = Config::default();
        config.provider.password = Some("pw-secret".into());
        assert!(!format!("{:?}", config).contains("pw-secret"));
    }
}
