use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, ChatMemberUpdated};

use crate::handlers::profile;
use crate::moderator::Moderator;

fn is_in_chat(kind: &ChatMemberKind) -> bool {
    match kind {
        ChatMemberKind::Restricted(restricted) => restricted.is_member,
        other => !(other.is_left() || other.is_banned()),
    }
}

/// A transition from outside the chat to inside it.
pub fn is_join(update: &ChatMemberUpdated) -> bool {
    !is_in_chat(&update.old_chat_member.kind) && is_in_chat(&update.new_chat_member.kind)
}

pub async fn handle_chat_member(moderator: Arc<Moderator>, update: ChatMemberUpdated) -> ResponseResult<()> {
    let user = &update.new_chat_member.user;
    if !is_join(&update) || user.is_bot {
        log::debug!(
            "Member update for {}: {:?} -> {:?}",
            user.id,
            update.old_chat_member.kind,
            update.new_chat_member.kind
        );
        return Ok(());
    }
    let outcome = moderator.on_member_joined(update.chat.id.0, &profile(user), Utc::now()).await;
    log::info!("Join of {} in {}: {:?}", user.id, update.chat.id, outcome);
    Ok(())
}
