//! teloxide adapter for [`CommandGateway`].

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatAction, InlineKeyboardButton, InlineKeyboardMarkup, MaybeInaccessibleMessage, ParseMode,
};
use tracing::{debug, info, warn};

use super::{reminder_reply, split_message, CommandGateway, GatewayAction, Keyboard, Reply};
use crate::monitor::{IdleNotifier, IdleReminder};
use crate::session::UserId;

fn markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.0.iter().map(|row| {
        row.iter()
            .map(|action| InlineKeyboardButton::callback(action.label(), action.callback_data()))
            .collect::<Vec<_>>()
    }))
}

/// Send `reply` as one or more messages. The keyboard rides on the last one.
async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &Reply) {
    let chunks = split_message(&reply.text);
    let last = chunks.len().saturating_sub(1);
    for (i, chunk) in chunks.into_iter().enumerate() {
        let request = bot.send_message(chat_id, chunk).parse_mode(ParseMode::Html);
        let result = match (&reply.keyboard, i == last) {
            (Some(keyboard), true) => request.reply_markup(markup(keyboard)).await,
            _ => request.await,
        };
        if let Err(e) = result {
            warn!(chat_id = chat_id.0, error = %e, "failed to send message");
            return;
        }
    }
}

/// Long-polls Telegram and routes updates through the gateway.
pub struct TelegramGateway {
    bot: Bot,
    gateway: CommandGateway,
}

impl TelegramGateway {
    pub fn new(bot: Bot, gateway: CommandGateway) -> Self {
        Self { bot, gateway }
    }

    /// Dispatch updates until Ctrl-C.
    pub async fn run(self: Arc<Self>) {
        info!("starting Telegram dispatcher");

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint({
                let this = Arc::clone(&self);
                move |msg: Message, bot: Bot| {
                    let this = Arc::clone(&this);
                    async move {
                        this.handle_message(msg, bot).await;
                        respond(())
                    }
                }
            }))
            .branch(Update::filter_callback_query().endpoint({
                let this = Arc::clone(&self);
                move |q: CallbackQuery, bot: Bot| {
                    let this = Arc::clone(&this);
                    async move {
                        this.handle_callback(q, bot).await;
                        respond(())
                    }
                }
            }));

        Dispatcher::builder(self.bot.clone(), handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        info!("Telegram dispatcher stopped");
    }

    async fn handle_message(&self, msg: Message, bot: Bot) {
        let Some(user) = msg.from.as_ref().map(|u| UserId::new(u.id.0)) else {
            return;
        };
        let Some(text) = msg.text() else {
            debug!(user = %user, "ignoring non-text message");
            return;
        };

        if self.gateway.is_authorized(user) {
            let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;
        }
        for reply in self.gateway.handle_text(user, text).await {
            send_reply(&bot, msg.chat.id, &reply).await;
        }
    }

    async fn handle_callback(&self, q: CallbackQuery, bot: Bot) {
        let user = UserId::new(q.from.id.0);
        let _ = bot.answer_callback_query(q.id.clone()).await;

        let Some(action) = q.data.as_deref().and_then(GatewayAction::parse) else {
            debug!(user = %user, data = ?q.data, "unknown callback data");
            return;
        };
        let Some(MaybeInaccessibleMessage::Regular(message)) = q.message else {
            return;
        };

        for reply in self.gateway.handle_action(user, action).await {
            if reply.replace {
                let mut request = bot
                    .edit_message_text(message.chat.id, message.id, reply.text.clone())
                    .parse_mode(ParseMode::Html);
                if let Some(keyboard) = &reply.keyboard {
                    request = request.reply_markup(markup(keyboard));
                }
                if let Err(e) = request.await {
                    warn!(user = %user, error = %e, "failed to edit message");
                }
            } else {
                send_reply(&bot, message.chat.id, &reply).await;
            }
        }
    }
}

/// Posts idle reminders into the user's private chat.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl IdleNotifier for TelegramNotifier {
    async fn remind(&self, user: UserId, reminder: IdleReminder) {
        // private chat ids equal the user id
        let chat_id = ChatId(user.as_u64() as i64);
        send_reply(&self.bot, chat_id, &reminder_reply(&reminder)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_layout() {
        let keyboard = markup(&Keyboard::reminder());
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert_eq!(keyboard.inline_keyboard[0][0].text, "📟 Session Info");
    }
}
