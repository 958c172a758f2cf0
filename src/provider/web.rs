//! HTTP strategy: GET `{url}/api.php?password=…`.

use std::time::Duration;

use tracing::debug;

use super::{parse_profiles, BotProfile};
use crate::error::ProviderError;

/// The endpoint for a configured base URL.
///
/// A URL already naming a `.php` script is used as is.
pub fn api_url(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.ends_with(".php") {
        base.to_string()
    } else {
        format!("{}/api.php", base)
    }
}

pub(crate) async fn fetch_profiles(
    client: &reqwest::Client,
    base: &str,
    password: &str,
    timeout: Duration,
) -> Result<Vec<BotProfile>, ProviderError> {
    let url = api_url(base);
    debug!(url = %url, "fetching bot profiles");

    let response = client
        .get(&url)
        .query(&[("password", password)])
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status(status.as_u16()));
    }

    let body = response.text().await?;
    parse_profiles(&body)
}
