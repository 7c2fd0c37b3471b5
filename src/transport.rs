//! Outbound chat operations the moderation core depends on.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::{
    ChatPermissions, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, LinkPreviewOptions, MessageId,
    ParseMode, ReplyParameters,
};
use teloxide::{ApiError, RequestError};

/// An inline callback button under a message.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackButton {
    pub label: String,
    pub data: String,
}

/// An HTML message, optionally a photo with caption.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub text: String,
    pub reply_to: Option<MessageId>,
    pub button: Option<CallbackButton>,
    /// Telegram file id; when set a photo is sent with `text` as caption.
    pub picture: Option<String>,
    pub link_preview: bool,
}

/// Permission sets applied to members going through the welcome flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRights {
    /// Nothing may be sent until the welcome is acknowledged.
    ReadOnly,
    /// Text and media.
    Guest,
}

impl MemberRights {
    pub fn permissions(self) -> ChatPermissions {
        match self {
            MemberRights::ReadOnly => ChatPermissions::empty(),
            MemberRights::Guest => ChatPermissions::SEND_MESSAGES | ChatPermissions::SEND_MEDIA_MESSAGES,
        }
    }
}

/// The seven operations the bot performs against the chat. Deleting an
/// already-deleted message and unbanning a user who is not banned succeed.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: ChatId, message: OutgoingMessage) -> Result<MessageId>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    async fn delete_messages(&self, chat_id: ChatId, message_ids: Vec<MessageId>) -> Result<()>;

    async fn restrict_member(&self, chat_id: ChatId, user_id: UserId, rights: MemberRights) -> Result<()>;

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> Result<()>;

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;

    async fn answer_callback(&self, query_id: &str, text: &str) -> Result<()>;
}

/// [`ChatTransport`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn no_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

fn ignore_missing(result: Result<(), RequestError>) -> Result<()> {
    match result {
        Err(RequestError::Api(ApiError::MessageToDeleteNotFound)) => Ok(()),
        other => Ok(other?),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(&self, chat_id: ChatId, message: OutgoingMessage) -> Result<MessageId> {
        let keyboard = message
            .button
            .map(|b| InlineKeyboardMarkup::new([[InlineKeyboardButton::callback(b.label, b.data)]]));

        let sent = match message.picture {
            Some(picture) => {
                let mut request = self
                    .bot
                    .send_photo(chat_id, InputFile::file_id(picture))
                    .caption(message.text)
                    .parse_mode(ParseMode::Html);
                if let Some(reply_to) = message.reply_to {
                    request = request.reply_parameters(ReplyParameters::new(reply_to));
                }
                if let Some(keyboard) = keyboard {
                    request = request.reply_markup(keyboard);
                }
                request.await?
            }
            None => {
                let mut request = self.bot.send_message(chat_id, message.text).parse_mode(ParseMode::Html);
                if let Some(reply_to) = message.reply_to {
                    request = request.reply_parameters(ReplyParameters::new(reply_to));
                }
                if let Some(keyboard) = keyboard {
                    request = request.reply_markup(keyboard);
                }
                if !message.link_preview {
                    request = request.link_preview_options(no_preview());
                }
                request.await?
            }
        };
        Ok(sent.id)
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        ignore_missing(self.bot.delete_message(chat_id, message_id).await.map(|_| ()))
    }

    async fn delete_messages(&self, chat_id: ChatId, message_ids: Vec<MessageId>) -> Result<()> {
        ignore_missing(self.bot.delete_messages(chat_id, message_ids).await.map(|_| ()))
    }

    async fn restrict_member(&self, chat_id: ChatId, user_id: UserId, rights: MemberRights) -> Result<()> {
        self.bot
            .restrict_chat_member(chat_id, user_id, rights.permissions())
            .use_independent_chat_permissions(true)
            .await?;
        Ok(())
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> Result<()> {
        self.bot.ban_chat_member(chat_id, user_id).until_date(until).await?;
        log::info!("User banned: {} in {} until {}", user_id, chat_id, until.timestamp());
        Ok(())
    }

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.bot.unban_chat_member(chat_id, user_id).only_if_banned(true).await?;
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: &str) -> Result<()> {
        self.bot.answer_callback_query(query_id.to_owned()).text(text).await?;
        Ok(())
    }
}

/// Logs every operation instead of performing it (`dry_run: true`).
#[derive(Debug, Clone, Default)]
pub struct DryRunTransport;

#[async_trait]
impl ChatTransport for DryRunTransport {
    async fn send_message(&self, chat_id: ChatId, message: OutgoingMessage) -> Result<MessageId> {
        log::info!("Emulate: send to {}: {}", chat_id, message.text);
        Ok(MessageId(0))
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        log::info!("Emulate: delete {} in {}", message_id.0, chat_id);
        Ok(())
    }

    async fn delete_messages(&self, chat_id: ChatId, message_ids: Vec<MessageId>) -> Result<()> {
        log::info!("Emulate: delete {} messages in {}", message_ids.len(), chat_id);
        Ok(())
    }

    async fn restrict_member(&self, chat_id: ChatId, user_id: UserId, rights: MemberRights) -> Result<()> {
        log::info!("Emulate: restrict {} in {} to {:?}", user_id, chat_id, rights);
        Ok(())
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> Result<()> {
        log::info!("Emulate: ban {} in {} until {}", user_id, chat_id, until);
        Ok(())
    }

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        log::info!("Emulate: unban {} in {}", user_id, chat_id);
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: &str) -> Result<()> {
        log::info!("Emulate: answer callback {}: {}", query_id, text);
        Ok(())
    }
}
