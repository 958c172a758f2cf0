//! Bot and host configuration provider.
//!
//! The bot token, the allowed chat, and the SSH target come from an external
//! provider rather than from the local config file. Several strategies are
//! tried in order until one yields a valid profile:
//!
//! 1. **Web**: a JSON array from `{url}/api.php?password=…`
//! 2. **File**: a local JSON file holding an array or a single profile
//! 3. **Env**: `TELEGRAM_BOT_TOKEN`, `SSH_HOST`, … in the environment
//!
//! A successful result is cached for a short TTL.

mod profile;
mod web;

pub use profile::{BotProfile, ResolvedProfile, DEFAULT_WORKING_DIR};
pub use web::api_url;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ProviderError;

/// Default lifetime of a cached profile.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default timeout of the web request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable lookup, injectable for tests.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// One way of obtaining bot profiles.
#[derive(Clone, PartialEq, Eq)]
pub enum ProviderStrategy {
    Web { url: String, password: String },
    File { path: PathBuf },
    Env,
}

impl ProviderStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderStrategy::Web { .. } => "web",
            ProviderStrategy::File { .. } => "file",
            ProviderStrategy::Env => "env",
        }
    }
}

impl fmt::Debug for ProviderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderStrategy::Web { url, .. } => f
                .debug_struct("Web")
                .field("url", url)
                .field("password", &"<redacted>")
                .finish(),
            ProviderStrategy::File { path } => f.debug_struct("File").field("path", path).finish(),
            ProviderStrategy::Env => f.write_str("Env"),
        }
    }
}

/// Fetches, validates, and caches the bot profile.
pub struct ConfigProvider {
    strategies: Vec<ProviderStrategy>,
    bot_id: Option<String>,
    cache_ttl: Duration,
    timeout: Duration,
    client: reqwest::Client,
    env: EnvLookup,
    cache: Mutex<Option<(Instant, ResolvedProfile)>>,
}

impl ConfigProvider {
    pub fn new(strategies: Vec<ProviderStrategy>) -> Self {
        Self {
            strategies,
            bot_id: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            timeout: DEFAULT_FETCH_TIMEOUT,
            client: reqwest::Client::new(),
            env: Arc::new(|key| std::env::var(key).ok()),
            cache: Mutex::new(None),
        }
    }

    /// Pick the profile whose `id` matches instead of the first one.
    pub fn with_bot_id(mut self, bot_id: Option<String>) -> Self {
        self.bot_id = bot_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    pub fn strategies(&self) -> &[ProviderStrategy] {
        &self.strategies
    }

    /// The cached profile if still fresh, else the first strategy that works.
    pub async fn fetch(&self) -> Result<ResolvedProfile, ProviderError> {
        let mut cache = self.cache.lock().await;
        if let Some((loaded_at, profile)) = cache.as_ref() {
            if loaded_at.elapsed() < self.cache_ttl {
                debug!("serving cached bot profile");
                return Ok(profile.clone());
            }
        }

        let mut last_error = None;
        for strategy in &self.strategies {
            match self.fetch_from(strategy).await {
                Ok(profile) => {
                    info!(
                        strategy = strategy.name(),
                        project = profile.display_name(),
                        target = %profile.target.address(),
                        "bot profile loaded"
                    );
                    *cache = Some((Instant::now(), profile.clone()));
                    return Ok(profile);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "provider strategy failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(ProviderError::NoStrategy))
    }

    async fn fetch_from(&self, strategy: &ProviderStrategy) -> Result<ResolvedProfile, ProviderError> {
        let profiles = match strategy {
            ProviderStrategy::Web { url, password } => {
                web::fetch_profiles(&self.client, url, password, self.timeout).await?
            }
            ProviderStrategy::File { path } => read_profiles(path)?,
            ProviderStrategy::Env => vec![profile_from_env(self.env.as_ref())],
        };
        select(profiles, self.bot_id.as_deref(), strategy.name())?.validate()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<BotProfile>),
    One(BotProfile),
}

/// Parse a JSON array of profiles, or a single profile object.
pub fn parse_profiles(json: &str) -> Result<Vec<BotProfile>, ProviderError> {
    match serde_json::from_str(json)? {
        OneOrMany::Many(profiles) => Ok(profiles),
        OneOrMany::One(profile) => Ok(vec![profile]),
    }
}

fn read_profiles(path: &Path) -> Result<Vec<BotProfile>, ProviderError> {
    let content = std::fs::read_to_string(path)?;
    parse_profiles(&content)
}

/// Build a profile from the flat environment variables.
pub fn profile_from_env(env: &(dyn Fn(&str) -> Option<String> + Send + Sync)) -> BotProfile {
    let ssh_host = env("SSH_HOST").map(|host| match env("SSH_PORT") {
        Some(port) if !port.trim().is_empty() && !host.contains(':') => {
            format!("{}:{}", host, port.trim())
        }
        _ => host,
    });
    BotProfile {
        id: None,
        project_name: Some("environment".to_string()),
        bot_token: env("TELEGRAM_BOT_TOKEN"),
        chat_id: env("TELEGRAM_CHAT_ID"),
        ssh_host,
        ssh_username: env("SSH_USERNAME"),
        ssh_password: env("SSH_PASSWORD"),
        working_dir: env("WORKING_DIR"),
    }
}

/// The profile with a matching id, or the first one without a bot id.
fn select(
    profiles: Vec<BotProfile>,
    bot_id: Option<&str>,
    source: &str,
) -> Result<BotProfile, ProviderError> {
    let found = match bot_id {
        Some(id) => profiles
            .into_iter()
            .find(|p| p.id.as_deref().map(str::trim) == Some(id.trim())),
        None => profiles.into_iter().next(),
    };
    found.ok_or_else(|| match bot_id {
        Some(id) => ProviderError::Empty(format!("{} (bot id {})", source, id)),
        None => ProviderError::Empty(source.to_string()),
    })
}
