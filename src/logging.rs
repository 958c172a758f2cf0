//! Logging initialization and configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the event filter.
///
/// `RUST_LOG` wins when set. Otherwise `level` is applied to this crate
/// only, so russh and teloxide stay at their own defaults.
fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = if level.contains('=') {
            level.to_string()
        } else {
            format!("teleshell={}", level)
        };
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("teleshell=info"))
    })
}

/// Initialize the logging system.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init(level: &str) {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// Try to initialize the logging system.
///
/// Returns `Err` if logging has already been initialized.
pub fn try_init(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

/// Shorten a secret for log output: first four characters, then an ellipsis.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    if secret.chars().count() > 4 {
        format!("{}...", prefix)
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_idempotent() {
        let _ = try_init("debug");
        let _ = try_init("debug");
    }

    #[test]
    fn test_logging_works() {
        let _ = try_init("info");

        tracing::info!("test info message");
        tracing::debug!(user = 7, "test debug message");
        tracing::warn!("test warn message");
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("123456:ABCDEF"), "1234...");
        assert_eq!(redact("abc"), "****");
        assert_eq!(redact(""), "****");
    }
}
