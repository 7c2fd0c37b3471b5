//! Ties membership, callback and message events to the reputation gate, the
//! cache and the chat transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use teloxide::types::{ChatId, MessageId, UserId};
use tokio::sync::RwLock;

use crate::cache::{Claim, PendingDeletion, QueueKind, Store};
use crate::config::{answer, callback, ttl};
use crate::filters::{contains_denied, display_name, is_denied, render_welcome};
use crate::reputation::ReputationGate;
use crate::settings::{ConfigPaths, Rules};
use crate::sweeper::{self, Punishment};
use crate::transport::{CallbackButton, ChatTransport, MemberRights, OutgoingMessage};

/// The parts of a Telegram user the moderation rules look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: u64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

/// A chat a message was sent on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderChat {
    pub id: i64,
    pub username: Option<String>,
}

/// A chat message reduced to what the filters and triggers need.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: MessageId,
    pub from: Option<UserProfile>,
    pub text: String,
    pub is_private: bool,
    /// Username of the inline bot the message was sent via.
    pub via_bot: Option<String>,
    /// Set for messages posted on behalf of another chat (channels).
    pub sender_chat: Option<SenderChat>,
    pub starts_with_custom_emoji: bool,
    pub date: DateTime<Utc>,
}

impl IncomingMessage {
    fn sender_id(&self) -> u64 {
        self.from.as_ref().map(|u| u.id).unwrap_or_default()
    }
}

/// A press of an inline button.
#[derive(Debug, Clone)]
pub struct ButtonPress {
    pub query_id: String,
    pub clicker: u64,
    pub chat_id: i64,
    /// The message carrying the button, if Telegram still delivers it.
    pub message_id: Option<MessageId>,
    pub data: String,
}

/// JSON payload of inline buttons: `{"command": "...", "data": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub command: String,
    #[serde(default)]
    pub data: String,
}

impl CallbackPayload {
    pub fn upgrade_rights(user_id: u64) -> Self {
        Self {
            command: callback::UPGRADE_RIGHTS.to_string(),
            data: user_id.to_string(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).with_context(|| format!("bad callback payload: {}", raw))
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The user is already in the cache; nothing was done.
    AlreadyKnown,
    Banned,
    /// Restricted, welcomed and queued for expiry.
    Pending(MessageId),
    /// The welcome could not be sent; the restriction was lifted and the
    /// user forgotten so the next join event retries.
    WelcomeFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Not a welcome button, or an unreadable payload.
    Ignored,
    /// Someone other than the welcomed user (and not an admin) pressed it.
    WrongUser,
    Banned,
    Upgraded,
    /// A sweep already resolved this welcome.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    DeniedBot,
    Forbidden,
    CustomEmoji,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Deleted(DeleteReason),
    /// Number of trigger replies sent.
    Triggered(usize),
    Ignored,
}

/// Flips the global log level between `Debug` and `Info`; returns whether
/// debug logging is now on.
pub fn toggle_debug_logging() -> bool {
    let enable = log::max_level() < log::LevelFilter::Debug;
    log::set_max_level(if enable {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    log::info!("Debug mode {}", if enable { "on" } else { "off" });
    enable
}

pub struct Moderator {
    store: Store,
    gate: ReputationGate,
    transport: Arc<dyn ChatTransport>,
    rules: RwLock<Arc<Rules>>,
    paths: ConfigPaths,
    force_protection: AtomicBool,
    started_at: DateTime<Utc>,
    bot_id: u64,
}

impl Moderator {
    pub fn new(
        store: Store,
        gate: ReputationGate,
        transport: Arc<dyn ChatTransport>,
        rules: Rules,
        paths: ConfigPaths,
    ) -> Self {
        let force_protection = AtomicBool::new(rules.settings.force_protection);
        Self {
            store,
            gate,
            transport,
            rules: RwLock::new(Arc::new(rules)),
            paths,
            force_protection,
            started_at: Utc::now(),
            bot_id: 0,
        }
    }

    /// User id recorded for the bot's own queued replies.
    pub fn with_bot_id(mut self, bot_id: u64) -> Self {
        self.bot_id = bot_id;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn transport(&self) -> &dyn ChatTransport {
        self.transport.as_ref()
    }

    pub async fn rules(&self) -> Arc<Rules> {
        Arc::clone(&*self.rules.read().await)
    }

    pub async fn is_admin(&self, user_id: u64) -> bool {
        self.rules().await.settings.is_admin(user_id)
    }

    pub fn force_protection(&self) -> bool {
        self.force_protection.load(Ordering::Relaxed)
    }

    /// Entry point for both `chat_member` updates and `new_chat_members`
    /// service messages.
    pub async fn on_member_joined(&self, chat_id: i64, user: &UserProfile, now: DateTime<Utc>) -> JoinOutcome {
        if self.store.lookup(user.id).await.is_some() {
            log::debug!("User {} already known, skipping welcome", user.id);
            return JoinOutcome::AlreadyKnown;
        }
        let rules = self.rules().await;
        let chat = ChatId(chat_id);
        let user_id = UserId(user.id);

        log::info!("Setting rights for user: {} {}", user.id, display_name(user));
        if let Err(e) = self.transport.restrict_member(chat, user_id, MemberRights::ReadOnly).await {
            log::warn!("Failed to restrict user {} in {}: {:#}", user.id, chat_id, e);
        }

        let name_denied = contains_denied(&display_name(user), &rules.settings.deny_names);
        if name_denied {
            log::info!("User {} has a denied name", user.id);
        }
        let banned = name_denied || (self.force_protection() && self.gate.is_banned(user.id).await);
        if banned {
            if let Err(e) = self.transport.ban_member(chat, user_id, Punishment::Ban.until(now)).await {
                log::warn!("Failed to ban user {} in {}: {:#}", user.id, chat_id, e);
            }
            return JoinOutcome::Banned;
        }

        if !self.store.upsert_on_first_seen(user.id, chat_id).await {
            return JoinOutcome::AlreadyKnown;
        }

        let welcome = OutgoingMessage {
            text: render_welcome(&rules.settings.welcome_message, user),
            button: Some(CallbackButton {
                label: rules.settings.welcome_button_message.clone(),
                data: CallbackPayload::upgrade_rights(user.id).encode(),
            }),
            ..Default::default()
        };
        match self.transport.send_message(chat, welcome).await {
            Ok(message_id) => {
                self.store
                    .schedule_welcome(message_id.0, user.id, chat_id, now, Duration::seconds(ttl::WELCOME_SECS))
                    .await;
                log::info!("Welcomed user {} in {} with message {}", user.id, chat_id, message_id.0);
                JoinOutcome::Pending(message_id)
            }
            Err(e) => {
                log::warn!("Failed to welcome user {} in {}: {:#}", user.id, chat_id, e);
                self.store.remove(user.id).await;
                if let Err(e) = self.transport.restrict_member(chat, user_id, MemberRights::Guest).await {
                    log::warn!("Failed to lift restriction of {} in {}: {:#}", user.id, chat_id, e);
                }
                JoinOutcome::WelcomeFailed
            }
        }
    }

    /// Handles a press of the welcome button.
    pub async fn on_button_press(&self, press: &ButtonPress, now: DateTime<Utc>) -> AckOutcome {
        let payload = match CallbackPayload::parse(&press.data) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Callback error: {:#}", e);
                return AckOutcome::Ignored;
            }
        };
        if payload.command != callback::UPGRADE_RIGHTS {
            log::debug!("Unhandled callback command {}", payload.command);
            return AckOutcome::Ignored;
        }
        let Ok(user) = payload.data.parse::<u64>() else {
            log::warn!("Callback error: bad user id {:?}", payload.data);
            return AckOutcome::Ignored;
        };

        if user != press.clicker && !self.is_admin(press.clicker).await {
            log::info!("User {} clicked the button of {}", press.clicker, user);
            return AckOutcome::WrongUser;
        }
        log::info!("User {} acknowledged the welcome of {}", press.clicker, user);

        // Claimed before the gate runs, so a sweep during the check finds nothing.
        let taken = match self.store.acknowledge(user).await {
            Claim::Pending(taken) => taken,
            Claim::Expired => {
                log::info!("Welcome of {} already expired", user);
                self.answer(&press.query_id, answer::EXPIRED).await;
                return AckOutcome::Expired;
            }
            Claim::Unknown => {
                log::info!("No pending welcome for {}, upgrading from the button", user);
                Vec::new()
            }
        };

        let chat = ChatId(press.chat_id);
        if self.gate.is_banned(user).await {
            self.answer(&press.query_id, answer::API_BANNED).await;
            if taken.is_empty() {
                if let Err(e) = self.transport.ban_member(chat, UserId(user), Punishment::Ban.until(now)).await {
                    log::warn!("Failed to ban user {} in {}: {:#}", user, press.chat_id, e);
                }
            } else {
                sweeper::expire_welcome(self.transport(), &taken, Punishment::Ban, now).await;
            }
            let already_deleted = taken.iter().any(|e| Some(MessageId(e.message_id)) == press.message_id);
            if !already_deleted {
                self.delete_button_message(press).await;
            }
            self.persist().await;
            return AckOutcome::Banned;
        }

        if let Err(e) = self.transport.restrict_member(chat, UserId(user), MemberRights::Guest).await {
            log::warn!("Failed to upgrade rights of {} in {}: {:#}", user, press.chat_id, e);
        }
        self.answer(&press.query_id, answer::RIGHTS_UPGRADED).await;
        self.delete_button_message(press).await;
        self.delete_other_welcomes(press, &taken).await;
        self.persist().await;
        AckOutcome::Upgraded
    }

    /// Runs the content filters and triggers over a non-command message.
    pub async fn on_message(&self, message: &IncomingMessage, now: DateTime<Utc>) -> MessageOutcome {
        let rules = self.rules().await;
        let settings = &rules.settings;

        if let Some(via) = message.via_bot.as_deref() {
            if is_denied(via, &settings.deny_bots) {
                log::info!("Deleted message via denied bot {}", via);
                self.delete(message).await;
                return MessageOutcome::Deleted(DeleteReason::DeniedBot);
            }
        }

        if !settings.is_admin(message.sender_id()) {
            if let Some(pattern) = rules.forbidden.find_match(&message.text) {
                log::info!("TriggeredBad: {}", pattern.as_str());
                self.delete(message).await;
                sweeper::sweep_welcome(&self.store, self.transport(), now).await;
                return MessageOutcome::Deleted(DeleteReason::Forbidden);
            }
            if message.starts_with_custom_emoji && message.text.len() > 4 {
                log::info!("Deleted message starting with custom emoji from {}", message.sender_id());
                self.delete(message).await;
                return MessageOutcome::Deleted(DeleteReason::CustomEmoji);
            }
            if let Some(sender) = &message.sender_chat {
                let denied_chat = sender
                    .username
                    .as_deref()
                    .is_some_and(|name| is_denied(name, &settings.deny_chats));
                if settings.delete_channel_messages || denied_chat {
                    log::info!("Deleted message from channel {}", sender.id);
                    self.delete(message).await;
                    return MessageOutcome::Deleted(DeleteReason::Channel);
                }
            }
        }

        let fired = self.fire_triggers(&rules, message, now).await;
        if fired > 0 {
            MessageOutcome::Triggered(fired)
        } else {
            MessageOutcome::Ignored
        }
    }

    async fn fire_triggers(&self, rules: &Rules, message: &IncomingMessage, now: DateTime<Utc>) -> usize {
        if message.text.is_empty() {
            return 0;
        }
        if now - message.date > Duration::seconds(ttl::STALE_MESSAGE_SECS) {
            log::warn!("Old message took too long: {}", message.date);
            return 0;
        }

        let chat = ChatId(message.chat_id);
        let mut fired = 0;
        for trigger in rules.triggers.matching(&message.text) {
            let reply = OutgoingMessage {
                text: trigger.config.action_text.clone(),
                reply_to: Some(message.message_id),
                picture: trigger.picture().map(str::to_string),
                link_preview: trigger.config.show_preview,
                ..Default::default()
            };
            let reply_id = match self.transport.send_message(chat, reply).await {
                Ok(id) => id,
                Err(e) => {
                    log::warn!("TriggeredBad: {}: {:#}", trigger.name(), e);
                    continue;
                }
            };
            fired += 1;
            log::info!("TriggeredGood: {} on message {}", trigger.name(), message.message_id.0);

            if message.is_private {
                continue;
            }
            let grace = Duration::seconds(ttl::TRIGGER_SECS);
            self.store
                .schedule_trigger(reply_id.0, self.bot_id, message.chat_id, now, grace)
                .await;
            self.store
                .schedule_trigger(message.message_id.0, message.sender_id(), message.chat_id, now, grace)
                .await;
        }
        if fired > 0 && !message.is_private {
            sweeper::sweep_triggers(&self.store, self.transport(), now).await;
        }
        fired
    }

    /// Swaps in freshly loaded rules; on failure the old ones stay.
    pub async fn reload(&self) -> Result<()> {
        let rules = Rules::load(&self.paths)?;
        log::info!(
            "Reloaded: {} triggers, {} forbidden patterns",
            rules.triggers.len(),
            rules.forbidden.len()
        );
        *self.rules.write().await = Arc::new(rules);
        Ok(())
    }

    pub async fn triggers_listing(&self) -> String {
        self.rules().await.triggers.listing()
    }

    pub async fn welcome_queue_text(&self) -> String {
        let queue = self.store.queue(QueueKind::Welcome).await;
        if queue.is_empty() {
            return "Welcome queue is empty".to_string();
        }
        queue.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n")
    }

    /// Re-checks every queued user against the gate. Banned users have their
    /// welcome expired at once with a long ban, then the welcome queue is
    /// swept. Returns the number of banned users.
    pub async fn check_queue(&self, now: DateTime<Utc>) -> usize {
        let mut users: Vec<u64> = self
            .store
            .queue(QueueKind::Welcome)
            .await
            .iter()
            .map(|e| e.user_id)
            .collect();
        users.sort_unstable();
        users.dedup();

        let mut banned = Vec::new();
        for user in users {
            if self.gate.is_banned(user).await {
                banned.push(user);
            }
        }
        if !banned.is_empty() {
            let taken = self.store.take_welcome_for(&banned).await;
            sweeper::expire_welcome(self.transport(), &taken, Punishment::Ban, now).await;
            self.persist().await;
        }
        sweeper::sweep_welcome(&self.store, self.transport(), now).await;
        banned.len()
    }

    pub async fn clear_members(&self) -> usize {
        let cleared = self.store.clear_members().await;
        self.persist().await;
        cleared
    }

    pub async fn cleanup(&self, now: DateTime<Utc>) -> usize {
        sweeper::sweep_expired(&self.store, self.transport(), now).await
    }

    pub fn toggle_force_protection(&self) -> bool {
        let enabled = !self.force_protection.fetch_xor(true, Ordering::Relaxed);
        log::info!("ForceProtection mode {}", if enabled { "on" } else { "off" });
        enabled
    }

    /// Lifts a ban in the primary chat.
    pub async fn unban(&self, user_id: u64) -> Result<()> {
        let chat = ChatId(self.rules().await.settings.primary_chat_id);
        self.transport
            .unban_member(chat, UserId(user_id))
            .await
            .map_err(|e| anyhow!("unban {} failed: {:#}", user_id, e))
    }

    pub fn uptime(&self, now: DateTime<Utc>) -> String {
        let secs = (now - self.started_at).num_seconds().max(0);
        format!("{}h{}m{}s", secs / 3600, secs % 3600 / 60, secs % 60)
    }

    async fn answer(&self, query_id: &str, text: &str) {
        if let Err(e) = self.transport.answer_callback(query_id, text).await {
            log::warn!("Failed to answer callback {}: {:#}", query_id, e);
        }
    }

    async fn delete(&self, message: &IncomingMessage) {
        if let Err(e) = self
            .transport
            .delete_message(ChatId(message.chat_id), message.message_id)
            .await
        {
            log::warn!("Failed to delete message {} in {}: {:#}", message.message_id.0, message.chat_id, e);
        }
    }

    async fn delete_button_message(&self, press: &ButtonPress) {
        let Some(message_id) = press.message_id else {
            return;
        };
        if let Err(e) = self.transport.delete_message(ChatId(press.chat_id), message_id).await {
            log::warn!("Failed to delete welcome {} in {}: {:#}", message_id.0, press.chat_id, e);
        }
    }

    /// Welcome messages of the user other than the one that was pressed.
    async fn delete_other_welcomes(&self, press: &ButtonPress, taken: &[PendingDeletion]) {
        let others = taken
            .iter()
            .filter(|e| Some(MessageId(e.message_id)) != press.message_id);
        for entry in others {
            if let Err(e) = self
                .transport
                .delete_message(ChatId(entry.chat_id), MessageId(entry.message_id))
                .await
            {
                log::warn!("Failed to delete welcome ({}): {:#}", entry, e);
            }
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.store.save().await {
            log::warn!("Failed to save cache: {:#}", e);
        }
    }
}
