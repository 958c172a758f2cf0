//! Bot profile records as served by the provider.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProviderError;
use crate::logging::redact;
use crate::transport::SshTarget;

/// Working directory used when the profile names none.
pub const DEFAULT_WORKING_DIR: &str = "/root";

/// One bot configuration, exactly as the provider sends it.
///
/// Every field is optional at this stage; [`BotProfile::validate`] decides
/// what is required. Ids and chat ids may arrive as JSON numbers.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotProfile {
    #[serde(deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub project_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub bot_token: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub chat_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub ssh_host: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub ssh_username: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub ssh_password: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub working_dir: Option<String>,
}

/// A validated profile, ready to wire the bot and the connector.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub project_name: Option<String>,
    pub bot_token: String,
    pub chat_id: String,
    pub target: SshTarget,
}

impl BotProfile {
    /// Check required fields and split `sshHost` into host and port.
    ///
    /// Every missing or blank required field is reported at once.
    pub fn validate(&self) -> Result<ResolvedProfile, ProviderError> {
        let required = [
            ("botToken", &self.bot_token),
            ("chatId", &self.chat_id),
            ("sshHost", &self.ssh_host),
            ("sshUsername", &self.ssh_username),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| non_blank(value).is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ProviderError::MissingFields(missing));
        }

        let ssh_host = non_blank(&self.ssh_host).unwrap_or_default();
        let (host, port) = SshTarget::split_host(ssh_host)
            .ok_or_else(|| ProviderError::InvalidPort(ssh_host.to_string()))?;

        Ok(ResolvedProfile {
            project_name: non_blank(&self.project_name).map(str::to_string),
            bot_token: non_blank(&self.bot_token).unwrap_or_default().to_string(),
            chat_id: non_blank(&self.chat_id).unwrap_or_default().to_string(),
            target: SshTarget {
                host,
                port,
                username: non_blank(&self.ssh_username).unwrap_or_default().to_string(),
                password: non_blank(&self.ssh_password).map(str::to_string),
                key_path: None,
                working_dir: non_blank(&self.working_dir)
                    .unwrap_or(DEFAULT_WORKING_DIR)
                    .to_string(),
            },
        })
    }
}

impl ResolvedProfile {
    /// Name for logs.
    pub fn display_name(&self) -> &str {
        self.project_name.as_deref().unwrap_or("Unknown")
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Accept a string, a number, or null.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

impl std::fmt::Debug for BotProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotProfile")
            .field("id", &self.id)
            .field("project_name", &self.project_name)
            .field("bot_token", &self.bot_token.as_deref().map(redact))
            .field("chat_id", &self.chat_id)
            .field("ssh_host", &self.ssh_host)
            .field("ssh_username", &self.ssh_username)
            .field("ssh_password", &self.ssh_password.as_ref().map(|_| "<redacted>"))
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

impl std::fmt::Debug for ResolvedProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProfile")
            .field("project_name", &self.project_name)
            .field("bot_token", &redact(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .field("target", &self.target)
            .finish()
    }
}
