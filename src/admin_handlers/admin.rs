use std::sync::Arc;

use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;

use crate::admin_handlers::AdminCommand;
use crate::moderator::{toggle_debug_logging, Moderator};

/// Text sent back for an operator command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub text: String,
    pub html: bool,
}

impl CommandReply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            html: false,
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Runs `cmd` for `sender` and returns the reply.
pub async fn run_command(moderator: &Moderator, sender: u64, cmd: AdminCommand, now: DateTime<Utc>) -> CommandReply {
    if !cmd.is_public() && !moderator.is_admin(sender).await {
        log::info!("User {} tried {:?} without admin rights", sender, cmd);
        return CommandReply::plain("You are not admin");
    }
    match cmd {
        AdminCommand::Help => CommandReply::plain(AdminCommand::descriptions().to_string()),
        AdminCommand::Uptime => CommandReply::plain(format!("Uptime: {}", moderator.uptime(now))),
        AdminCommand::Triggers => {
            let listing = moderator.triggers_listing().await;
            if listing.is_empty() {
                CommandReply::plain("No triggers configured")
            } else {
                CommandReply { text: listing, html: true }
            }
        }
        AdminCommand::Reload => match moderator.reload().await {
            Ok(()) => CommandReply::plain("Reloaded"),
            Err(e) => {
                log::error!("Reload failed: {:#}", e);
                CommandReply::plain(format!("Reload failed: {:#}", e))
            }
        },
        AdminCommand::DeleteQueue => CommandReply::plain(moderator.welcome_queue_text().await),
        AdminCommand::CheckQueue => {
            let banned = moderator.check_queue(now).await;
            CommandReply::plain(format!("Cleaned {} messages", banned))
        }
        AdminCommand::WelcomeQueue => {
            let cleared = moderator.clear_members().await;
            CommandReply::plain(format!("Welcome queue cleaned ({} members)", cleared))
        }
        AdminCommand::Cleanup => {
            let swept = moderator.cleanup(now).await;
            CommandReply::plain(format!("Cleaned {} messages", swept))
        }
        AdminCommand::DebugMode => CommandReply::plain(format!("Debug mode {}", on_off(toggle_debug_logging()))),
        AdminCommand::ForceMode => CommandReply::plain(format!(
            "ForceProtection mode {}",
            on_off(moderator.toggle_force_protection())
        )),
        AdminCommand::Unban { user_id } => match moderator.unban(user_id).await {
            Ok(()) => CommandReply::plain(format!("User {} unbanned", user_id)),
            Err(e) => CommandReply::plain(format!("Unban failed: {:#}", e)),
        },
    }
}

/// Commands only work in private chats; elsewhere they are deleted.
pub async fn handle_admin_command(bot: Bot, moderator: Arc<Moderator>, msg: Message, cmd: AdminCommand) -> ResponseResult<()> {
    if !msg.chat.is_private() {
        if let Err(e) = moderator.transport().delete_message(msg.chat.id, msg.id).await {
            log::warn!("Failed to delete command in {}: {:#}", msg.chat.id, e);
        }
        return Ok(());
    }
    let Some(sender) = msg.from.as_ref().map(|u| u.id.0) else {
        return Ok(());
    };

    let reply = run_command(&moderator, sender, cmd, Utc::now()).await;
    let mut request = bot.send_message(msg.chat.id, reply.text);
    if reply.html {
        request = request.parse_mode(ParseMode::Html);
    }
    request.await?;
    Ok(())
}
