//! Chat front-end glue.
//!
//! [`CommandGateway`] turns chat events into registry calls and renders the
//! results as [`Reply`] values (HTML text plus an optional keyboard). It knows
//! nothing about Telegram; [`telegram`] adapts it to teloxide.

pub mod format;
pub mod telegram;

pub use format::{escape_html, pre_blocks, split_message, MESSAGE_LIMIT};
pub use telegram::{TelegramGateway, TelegramNotifier};

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::SessionError;
use crate::monitor::IdleReminder;
use crate::security::{assistant_command, AuthPolicy};
use crate::session::{format_duration, SessionInfo, SessionRegistry, UserId};

/// A canned command offered as a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuickCommand {
    ListFiles,
    GitStatus,
    Processes,
    DiskUsage,
}

impl QuickCommand {
    pub const ALL: [QuickCommand; 4] = [
        QuickCommand::ListFiles,
        QuickCommand::GitStatus,
        QuickCommand::Processes,
        QuickCommand::DiskUsage,
    ];

    /// The shell command line.
    pub fn command(&self) -> &'static str {
        match self {
            QuickCommand::ListFiles => "ls -la",
            QuickCommand::GitStatus => "git status",
            QuickCommand::Processes => "ps aux | head -20",
            QuickCommand::DiskUsage => "df -h",
        }
    }

    fn key(&self) -> &'static str {
        match self {
            QuickCommand::ListFiles => "ls",
            QuickCommand::GitStatus => "git_status",
            QuickCommand::Processes => "ps",
            QuickCommand::DiskUsage => "df",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            QuickCommand::ListFiles => "📁 List Files",
            QuickCommand::GitStatus => "🔄 Git Status",
            QuickCommand::Processes => "📊 Process List",
            QuickCommand::DiskUsage => "💾 Disk Usage",
        }
    }
}

/// Every button the bot can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayAction {
    SessionInfo,
    QuickCommands,
    AssistantMenu,
    StopSession,
    Continue,
    Back,
    Quick(QuickCommand),
}

impl GatewayAction {
    /// Payload carried by the inline button.
    pub fn callback_data(&self) -> String {
        match self {
            GatewayAction::SessionInfo => "session_info".to_string(),
            GatewayAction::QuickCommands => "quick_commands".to_string(),
            GatewayAction::AssistantMenu => "claude_menu".to_string(),
            GatewayAction::StopSession => "stop_session".to_string(),
            GatewayAction::Continue => "continue".to_string(),
            GatewayAction::Back => "back_main".to_string(),
            GatewayAction::Quick(cmd) => format!("cmd_{}", cmd.key()),
        }
    }

    /// Inverse of [`GatewayAction::callback_data`]. Unknown payloads are `None`.
    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "session_info" => GatewayAction::SessionInfo,
            "quick_commands" => GatewayAction::QuickCommands,
            "claude_menu" => GatewayAction::AssistantMenu,
            "stop_session" => GatewayAction::StopSession,
            "continue" => GatewayAction::Continue,
            "back_main" => GatewayAction::Back,
            other => {
                let key = other.strip_prefix("cmd_")?;
                let cmd = QuickCommand::ALL.into_iter().find(|c| c.key() == key)?;
                GatewayAction::Quick(cmd)
            }
        };
        Some(action)
    }

    pub fn label(&self) -> &'static str {
        match self {
            GatewayAction::SessionInfo => "📟 Session Info",
            GatewayAction::QuickCommands => "🚀 Quick Commands",
            GatewayAction::AssistantMenu => "🤖 Claude Code",
            GatewayAction::StopSession => "🛑 Stop Session",
            GatewayAction::Continue => "🚀 Continue Working",
            GatewayAction::Back => "🔙 Back",
            GatewayAction::Quick(cmd) => cmd.label(),
        }
    }
}

/// Rows of buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyboard(pub Vec<Vec<GatewayAction>>);

impl Keyboard {
    /// One button per row.
    fn column(actions: impl IntoIterator<Item = GatewayAction>) -> Self {
        Keyboard(actions.into_iter().map(|a| vec![a]).collect())
    }

    pub fn main_menu() -> Self {
        Self::column([
            GatewayAction::SessionInfo,
            GatewayAction::QuickCommands,
            GatewayAction::AssistantMenu,
            GatewayAction::StopSession,
        ])
    }

    pub fn quick_commands() -> Self {
        Self::column(
            QuickCommand::ALL
                .into_iter()
                .map(GatewayAction::Quick)
                .chain([GatewayAction::Back]),
        )
    }

    pub fn assistant_menu() -> Self {
        Self::column([GatewayAction::Back])
    }

    pub fn reminder() -> Self {
        Self::column([
            GatewayAction::SessionInfo,
            GatewayAction::Continue,
            GatewayAction::StopSession,
        ])
    }
}

/// One outgoing message, HTML formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<Keyboard>,
    /// Replace the message the button was on instead of sending a new one.
    pub replace: bool,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            replace: false,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }
}

/// Reply to anyone outside the allow-list.
pub const UNAUTHORIZED: &str = "Unauthorized access";

const NO_SESSION: &str = "No active session. Use /start to begin a new session.";

/// A parsed incoming text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    Start,
    Stop,
    Info,
    Assistant(&'a str),
    /// Anything else goes to the shell verbatim.
    Shell(&'a str),
}

impl<'a> ChatCommand<'a> {
    /// Recognize bot commands, tolerating a `@botname` suffix.
    ///
    /// Unknown slash words are shell input, so `/usr/bin/env` runs.
    pub fn parse(text: &'a str) -> Self {
        let trimmed = text.trim();
        let (word, rest) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        let name = word.split('@').next().unwrap_or(word);
        match name {
            "/start" => ChatCommand::Start,
            "/stop" => ChatCommand::Stop,
            "/info" => ChatCommand::Info,
            "/claude" => ChatCommand::Assistant(rest.trim()),
            _ => ChatCommand::Shell(text),
        }
    }
}

/// Maps chat events to session operations.
pub struct CommandGateway {
    registry: Arc<SessionRegistry>,
    auth: AuthPolicy,
    assistant_program: String,
}

impl CommandGateway {
    pub fn new(registry: Arc<SessionRegistry>, auth: AuthPolicy, assistant_program: String) -> Self {
        Self {
            registry,
            auth,
            assistant_program,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn is_authorized(&self, user: UserId) -> bool {
        self.auth.is_authorized(user)
    }

    /// Handle a text message.
    pub async fn handle_text(&self, user: UserId, text: &str) -> Vec<Reply> {
        if !self.is_authorized(user) {
            warn!(user = %user, "unauthorized message");
            return vec![error_reply(user, &SessionError::Unauthorized)];
        }
        match ChatCommand::parse(text) {
            ChatCommand::Start => vec![self.start(user).await],
            ChatCommand::Stop => vec![self.stop(user).await],
            ChatCommand::Info => vec![self.info(user).await],
            ChatCommand::Assistant(query) => self.ask_assistant(user, query).await,
            ChatCommand::Shell(command) => self.run(user, command).await,
        }
    }

    /// Handle a button press.
    pub async fn handle_action(&self, user: UserId, action: GatewayAction) -> Vec<Reply> {
        if !self.is_authorized(user) {
            warn!(user = %user, "unauthorized button press");
            return vec![error_reply(user, &SessionError::Unauthorized)];
        }
        match action {
            GatewayAction::SessionInfo => vec![self.info(user).await],
            GatewayAction::StopSession => vec![self.stop(user).await],
            GatewayAction::Continue => vec![Reply::text(
                "👍 Session continues running.\nSend any command to execute.",
            )],
            GatewayAction::QuickCommands => vec![Reply::text("Select a command:")
                .with_keyboard(Keyboard::quick_commands())
                .replacing()],
            GatewayAction::AssistantMenu => vec![Reply::text(
                "Send <code>/claude &lt;query&gt;</code> to ask Claude Code.\n\
                 Example: <code>/claude explain this code</code>",
            )
            .with_keyboard(Keyboard::assistant_menu())
            .replacing()],
            GatewayAction::Back => vec![Reply::text("Choose an action:")
                .with_keyboard(Keyboard::main_menu())
                .replacing()],
            GatewayAction::Quick(cmd) => self.run(user, cmd.command()).await,
        }
    }

    async fn start(&self, user: UserId) -> Reply {
        match self.registry.create_session(user).await {
            Ok(()) => {
                let minutes = self.registry_idle_minutes();
                Reply::text(format!(
                    "🖥️ <b>Persistent Terminal Session Started</b>\n\n\
                     ✅ Your session is now active and will remain open.\n\
                     📝 Send any command to execute.\n\
                     🛑 Use /stop to end the session.\n\n\
                     ⏰ You'll receive activity reminders every {} minutes.",
                    minutes
                ))
                .with_keyboard(Keyboard::main_menu())
            }
            Err(SessionError::AlreadyActive) => Reply::text(
                "A session is already active. Send a command, or /stop it first.",
            ),
            Err(e) => Reply::text(format!(
                "Failed to create session: {}\nPlease try again.",
                escape_html(&e.to_string())
            )),
        }
    }

    fn registry_idle_minutes(&self) -> u64 {
        (self.registry.idle_interval().as_secs() / 60).max(1)
    }

    async fn stop(&self, user: UserId) -> Reply {
        match self.registry.stop_session(user).await {
            Some(summary) => Reply::text(format!(
                "🛑 <b>Session Ended</b>\n\n\
                 ⏱️ Duration: {}\n\
                 📊 Commands executed: {}\n\n\
                 Use /start to begin a new session.",
                format_duration(summary.duration),
                summary.commands_count
            )),
            None => Reply::text("No active session found."),
        }
    }

    async fn info(&self, user: UserId) -> Reply {
        let info = self.registry.get_session_info(user).await;
        if !info.active {
            return Reply::text("No active session.");
        }
        Reply::text(render_info(&info))
    }

    async fn ask_assistant(&self, user: UserId, query: &str) -> Vec<Reply> {
        let Some(command) = assistant_command(&self.assistant_program, query) else {
            return vec![Reply::text("Please provide a query for Claude Code")];
        };
        match self.registry.execute(user, &command).await {
            Ok(output) => pre_blocks("🤖 <b>Claude Code Response:</b>\n", output.as_str())
                .into_iter()
                .map(Reply::text)
                .collect(),
            Err(e) => vec![error_reply(user, &e)],
        }
    }

    async fn run(&self, user: UserId, command: &str) -> Vec<Reply> {
        match self.registry.execute(user, command).await {
            Ok(output) => {
                let header = format!("<b>$ {}</b>\n", escape_html(command.trim()));
                pre_blocks(&header, output.as_str())
                    .into_iter()
                    .map(Reply::text)
                    .collect()
            }
            Err(e) => vec![error_reply(user, &e)],
        }
    }
}

fn error_reply(user: UserId, error: &SessionError) -> Reply {
    match error {
        SessionError::Unauthorized => Reply::text(UNAUTHORIZED),
        SessionError::NotActive => Reply::text(NO_SESSION),
        SessionError::Unavailable(reason) => {
            info!(user = %user, "reporting lost session");
            Reply::text(format!(
                "⚠️ Session lost: {}\nUse /start to open a new one.",
                escape_html(reason)
            ))
        }
        other => Reply::text(format!("Error: {}", escape_html(&other.to_string()))),
    }
}

fn render_info(info: &SessionInfo) -> String {
    format!(
        "📊 <b>Session Information</b>\n\n\
         ✅ Status: Active\n\
         ⏱️ Duration: {} minutes\n\
         📝 Commands: {}\n\
         💤 Last activity: {}s ago\n\
         📁 Current dir: <code>{}</code>",
        info.duration_minutes().unwrap_or_default(),
        info.command_count.unwrap_or_default(),
        info.idle_seconds.unwrap_or_default(),
        escape_html(info.current_dir.as_deref().unwrap_or("?")),
    )
}

/// The periodic "still open" message.
pub fn reminder_reply(reminder: &IdleReminder) -> Reply {
    Reply::text(format!(
        "⏰ <b>Session Activity Reminder</b>\n\n\
         Your session is still active!\n\
         ⏱️ Duration: {} minutes\n\
         📊 Commands: {}\n\
         💤 Idle for: {} seconds\n\n\
         Session will remain open until you use /stop",
        reminder.duration.as_secs() / 60,
        reminder.command_count,
        reminder.idle_seconds
    ))
    .with_keyboard(Keyboard::reminder())
}
