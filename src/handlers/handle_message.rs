use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::MessageEntityKind;

use crate::handlers::profile;
use crate::moderator::{IncomingMessage, Moderator, SenderChat};

fn starts_with_custom_emoji(message: &Message) -> bool {
    message
        .entities()
        .and_then(|entities| entities.first())
        .is_some_and(|e| e.offset == 0 && matches!(e.kind, MessageEntityKind::CustomEmoji { .. }))
}

pub fn incoming_message(message: &Message) -> IncomingMessage {
    // Anonymous admins post on behalf of the group itself.
    let sender_chat = message
        .sender_chat
        .as_ref()
        .filter(|chat| chat.id != message.chat.id)
        .map(|chat| SenderChat {
            id: chat.id.0,
            username: chat.username().map(str::to_string),
        });

    IncomingMessage {
        chat_id: message.chat.id.0,
        message_id: message.id,
        from: message.from.as_ref().map(profile),
        text: message.text().or(message.caption()).unwrap_or_default().to_string(),
        is_private: message.chat.is_private(),
        via_bot: message.via_bot.as_ref().and_then(|bot| bot.username.clone()),
        sender_chat,
        starts_with_custom_emoji: starts_with_custom_emoji(message),
        date: message.date,
    }
}

/// Non-command messages: joins announced as service messages, then the
/// content filters and triggers.
pub async fn handle_message(moderator: Arc<Moderator>, message: Message) -> ResponseResult<()> {
    let now = Utc::now();
    if let Some(users) = message.new_chat_members() {
        for user in users.iter().filter(|u| !u.is_bot) {
            let outcome = moderator.on_member_joined(message.chat.id.0, &profile(user), now).await;
            log::info!("New member {} in {}: {:?}", user.id, message.chat.id, outcome);
        }
        return Ok(());
    }
    if let Some(user) = message.left_chat_member() {
        log::info!("Member left: {} {:?}", user.id, user.username);
        return Ok(());
    }

    let incoming = incoming_message(&message);
    let outcome = moderator.on_message(&incoming, now).await;
    log::debug!("Message {} in {}: {:?}", message.id.0, message.chat.id, outcome);
    Ok(())
}
