//! CLI integration tests.
//!
//! These tests verify the CLI argument parsing and configuration loading.

use std::ffi::OsString;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

use teleshell::cli::{parse_args_from, Args};
use teleshell::config::Config;
use teleshell::provider::ProviderStrategy;
use teleshell::UserId;

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("teleshell")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_defaults() {
    let result = parse_args_from(args(&[])).unwrap();

    assert!(result.config.is_none());
    assert!(result.provider_url.is_none());
    assert!(result.provider_file.is_none());
    assert!(result.budget.is_none());
    assert!(result.allow.is_empty());
}

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "-u",
        "https://cfg.example.com",
        "-P",
        "pw",
        "--bot-id",
        "3",
        "--settle-ms",
        "250",
        "--budget",
        "1000",
        "-a",
        "42",
        "-l",
        "debug",
    ]))
    .unwrap();

    assert_eq!(result.provider_url.as_deref(), Some("https://cfg.example.com"));
    assert_eq!(result.provider_password.as_deref(), Some("pw"));
    assert_eq!(result.bot_id.as_deref(), Some("3"));
    assert_eq!(result.settle_ms, Some(250));
    assert_eq!(result.budget, Some(1000));
    assert_eq!(result.allow, vec!["42"]);
    assert_eq!(result.log_level, Some("debug".to_string()));
}

#[test]
fn test_cli_invalid_budget() {
    assert!(parse_args_from(args(&["--budget", "lots"])).is_err());
    assert!(parse_args_from(args(&["--budget", "0"])).is_err());
}

#[test]
fn test_cli_invalid_settle() {
    assert!(parse_args_from(args(&["--settle-ms", "-5"])).is_err());
}

// ============================================================================
// Configuration Loading Tests
// ============================================================================

#[test]
fn test_config_from_json_file() {
    let json = r#"{
        "provider": {
            "url": "https://cfg.example.com",
            "bot_id": "2",
            "cache_ttl_secs": 30
        },
        "session": {
            "settle_ms": 800,
            "budget_bytes": 2000,
            "idle_interval_secs": 120
        },
        "auth": {
            "allowed_users": ["42", "7"]
        },
        "guard": {
            "max_failures": 3
        },
        "assistant": {
            "program": "aider"
        },
        "logging": {
            "level": "debug"
        }
    }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.provider.url.as_deref(), Some("https://cfg.example.com"));
    assert_eq!(config.provider.cache_ttl_secs, 30);
    assert_eq!(config.session.settle_ms, 800);
    assert_eq!(config.capture().budget_bytes, 2000);
    assert_eq!(config.idle_interval(), Duration::from_secs(120));
    assert_eq!(config.guard().max_failures, 3);
    assert_eq!(config.assistant.program, "aider");
    assert_eq!(config.logging.level, "debug");

    let auth = config.auth_policy(Some("99"));
    assert!(auth.is_authorized(UserId::new(42)));
    assert!(!auth.is_authorized(UserId::new(99)));
}

#[test]
fn test_config_priority_cli_over_file() {
    let json = r#"{
        "session": { "settle_ms": 900, "budget_bytes": 3000 },
        "auth": { "allowed_users": ["1"] }
    }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let args = Args {
        config: Some(file.path().to_path_buf()),
        settle_ms: Some(100),
        allow: vec!["5".to_string()],
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();

    assert_eq!(config.session.settle_ms, 100);
    assert_eq!(config.session.budget_bytes, 3000);
    assert_eq!(config.auth.allowed_users, vec!["5"]);
}

#[test]
fn test_config_rejects_zero_idle_interval() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(br#"{"session": {"idle_interval_secs": 0}}"#)
        .unwrap();

    let args = Args {
        config: Some(file.path().to_path_buf()),
        ..Args::default()
    };
    assert!(Config::load(&args).is_err());
}

#[test]
fn test_config_strategy_order() {
    let args = Args {
        provider_url: Some("https://cfg.example.com".to_string()),
        provider_file: Some("/etc/teleshell/bots.json".into()),
        ..Args::default()
    };
    let mut config = Config::default();
    config.apply_args(&args);

    let names: Vec<&str> = config
        .provider_strategies()
        .iter()
        .map(ProviderStrategy::name)
        .collect();
    assert_eq!(names, vec!["web", "file", "env"]);
}

#[test]
fn test_config_allow_list_falls_back_to_chat_id() {
    let config = Config::default();
    let auth = config.auth_policy(Some("42"));

    assert!(auth.is_authorized(UserId::new(42)));
    assert!(!auth.is_authorized(UserId::new(43)));
}

// ============================================================================
// Configuration Serialization Tests
// ============================================================================

#[test]
fn test_config_partial_deserialization() {
    // Only specify some fields, others should use defaults
    let json = r#"{"session": {"budget_bytes": 1234}}"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.session.budget_bytes, 1234);
    assert_eq!(config.session.settle_ms, 500);
    assert_eq!(config.session.idle_interval_secs, 600);
    assert!(config.guard.enabled);
}
