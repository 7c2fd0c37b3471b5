use std::sync::Arc;

use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::Me;
use teloxide::utils::command::BotCommands;

use crate::admin_handlers::{handle_admin_command, AdminCommand};
use crate::handlers::{handle_callback, handle_chat_member, handle_message};
use crate::moderator::Moderator;

/// Commands go to the operator handler, everything else to moderation.
pub async fn message_handler(bot: Bot, me: Me, moderator: Arc<Moderator>, msg: Message) -> ResponseResult<()> {
    let Some(text) = msg.text().filter(|t| t.starts_with('/')) else {
        return handle_message(moderator, msg).await;
    };
    match AdminCommand::parse(text, me.username()) {
        Ok(cmd) => handle_admin_command(bot, moderator, msg, cmd).await,
        Err(e) => {
            log::debug!("Not a command {:?}: {}", text, e);
            if !msg.chat.is_private() {
                if let Err(e) = moderator.transport().delete_message(msg.chat.id, msg.id).await {
                    log::warn!("Failed to delete command in {}: {:#}", msg.chat.id, e);
                }
            }
            Ok(())
        }
    }
}

/// Messages, member updates and button presses, with long polling.
pub async fn run_dispatcher(bot: Bot, me: Me, moderator: Arc<Moderator>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_chat_member().endpoint(handle_chat_member))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![me, moderator])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
