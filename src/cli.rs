//! Command-line interface for teleshell.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Base URL of the web config provider.
    pub provider_url: Option<String>,
    /// Password for the web config provider.
    pub provider_password: Option<String>,
    /// Local JSON file with bot profiles.
    pub provider_file: Option<PathBuf>,
    /// Which profile to use when the provider serves several.
    pub bot_id: Option<String>,
    /// Settle window before draining output, in milliseconds.
    pub settle_ms: Option<u64>,
    /// Output budget per command, in bytes.
    pub budget: Option<usize>,
    /// Allowed chat user ids (repeatable).
    pub allow: Vec<String>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('u') | Long("provider-url") => {
                result.provider_url = Some(parser.value()?.parse()?);
            }
            Short('P') | Long("provider-password") => {
                result.provider_password = Some(parser.value()?.parse()?);
            }
            Short('f') | Long("provider-file") => {
                result.provider_file = Some(parser.value()?.parse()?);
            }
            Long("bot-id") => {
                result.bot_id = Some(parser.value()?.parse()?);
            }
            Long("settle-ms") => {
                let value: String = parser.value()?.parse()?;
                result.settle_ms = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("settle-ms", value))?,
                );
            }
            Long("budget") => {
                let value: String = parser.value()?.parse()?;
                let budget: usize = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("budget", value.clone()))?;
                if budget == 0 {
                    return Err(ArgsError::InvalidValue("budget", value));
                }
                result.budget = Some(budget);
            }
            Short('a') | Long("allow") => {
                let value: String = parser.value()?.parse()?;
                if value.trim().parse::<u64>().is_err() {
                    return Err(ArgsError::InvalidValue("allow", value));
                }
                result.allow.push(value.trim().to_string());
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"teleshell {version}
Persistent remote shell sessions driven from a Telegram chat

USAGE:
    teleshell [OPTIONS]

OPTIONS:
    -c, --config <FILE>              Path to configuration file (JSON)
    -u, --provider-url <URL>         Web config provider base URL
    -P, --provider-password <PW>     Web config provider password
    -f, --provider-file <FILE>       Local JSON file with bot profiles
        --bot-id <ID>                Profile id to use [default: first]
        --settle-ms <MS>             Wait before reading output [default: 500]
        --budget <BYTES>             Output budget per command [default: 4000]
    -a, --allow <USER_ID>            Allowed Telegram user id (repeatable)
    -l, --log-level <LVL>            Log level (error, warn, info, debug, trace)
    -h, --help                       Print help
    -V, --version                    Print version

ENVIRONMENT VARIABLES:
    TELESHELL_PROVIDER_URL       Web config provider URL
    TELESHELL_PROVIDER_PASSWORD  Web config provider password
    TELESHELL_BOT_ID             Profile id
    TELESHELL_ALLOWED_USERS      Comma-separated allowed user ids
    TELESHELL_SETTLE_MS          Settle window in milliseconds
    TELESHELL_BUDGET_BYTES       Output budget in bytes
    TELESHELL_ASSISTANT          Assistant program for /claude
    TELESHELL_LOG_LEVEL          Log level (overrides config)
    RUST_LOG                     Alternative log level setting

    Without a provider URL or file, the bot profile is read from
    TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, SSH_HOST, SSH_PORT,
    SSH_USERNAME, SSH_PASSWORD and WORKING_DIR.

EXAMPLES:
    # Profile from the environment, only user 42 allowed
    teleshell -a 42

    # Profile from a web provider
    teleshell -u https://config.example.com -P s3cret --bot-id 2

    # Start with config file
    teleshell -c /etc/teleshell/config.json
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("teleshell {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
