//! teleshell binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use teleshell::cli::{parse_args, print_help, print_version};
use teleshell::gateway::{CommandGateway, TelegramGateway, TelegramNotifier};
use teleshell::transport::ReconnectGuard;
use teleshell::{logging, Config, IdleMonitor, RemoteShellConnector, SessionRegistry, SshDialer};
use teloxide::Bot;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Try 'teleshell --help' for more information.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(config.log_filter());

    info!("teleshell v{}", env!("CARGO_PKG_VERSION"));

    let profile = match config.provider().fetch().await {
        Ok(profile) => profile,
        Err(e) => {
            error!(error = %e, "no usable bot profile");
            return ExitCode::FAILURE;
        }
    };
    info!(
        project = profile.project_name.as_deref().unwrap_or("-"),
        target = %profile.target.address(),
        working_dir = %profile.target.working_dir,
        "bot profile loaded"
    );

    let auth = config.auth_policy(Some(&profile.chat_id));
    auth.announce();

    let bot = Bot::new(&profile.bot_token);

    let connector = RemoteShellConnector::new(Arc::new(SshDialer::new()), profile.target.clone())
        .with_capture(config.capture())
        .with_timeouts(config.timeouts())
        .with_guard(ReconnectGuard::new(config.guard()));
    let monitor = IdleMonitor::new(Arc::new(TelegramNotifier::new(bot.clone())))
        .with_interval(config.idle_interval());
    let registry = SessionRegistry::new(connector, monitor);

    let gateway = CommandGateway::new(
        Arc::clone(&registry),
        auth,
        config.assistant.program.clone(),
    );
    Arc::new(TelegramGateway::new(bot, gateway)).run().await;

    let stopped = registry.stop_all().await;
    info!(stopped, "shutdown complete");

    ExitCode::SUCCESS
}
