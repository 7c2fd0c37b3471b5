use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "These commands work in a private chat:")]
pub enum AdminCommand {
    #[command(description = "show help.")]
    Help,
    #[command(description = "show bot uptime.")]
    Uptime,
    #[command(description = "list configured triggers.")]
    Triggers,
    #[command(description = "reload config.yaml and triggers.yaml.")]
    Reload,
    #[command(description = "show the welcome queue.")]
    DeleteQueue,
    #[command(description = "re-check queued users against ban lists.")]
    CheckQueue,
    #[command(description = "forget all cached members.")]
    WelcomeQueue,
    #[command(description = "expire due queue entries now.")]
    Cleanup,
    #[command(rename = "debug_mode", description = "toggle debug logging.")]
    DebugMode,
    #[command(rename = "force_mode", description = "toggle reputation checks on join.")]
    ForceMode,
    #[command(description = "unban a user id in the main chat.")]
    Unban { user_id: u64 },
}

impl AdminCommand {
    /// Commands anyone may run in a private chat.
    pub fn is_public(&self) -> bool {
        matches!(self, AdminCommand::Help | AdminCommand::Uptime | AdminCommand::Triggers)
    }
}
