//! Promotes expired queue entries into moderation actions.
//!
//! Entries are dequeued under the store lock first and the side effects run
//! afterwards. A failed delete or ban is logged and never retried.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use teloxide::types::{ChatId, MessageId, UserId};

use crate::cache::{PendingDeletion, QueueKind, Store};
use crate::config::punishment::{BAN_SECS, KICK_SECS};
use crate::transport::ChatTransport;

/// What happens to the user behind an expired welcome entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punishment {
    /// Short ban; the user may rejoin afterwards.
    Kick,
    /// Long ban for users flagged by the reputation gate.
    Ban,
}

impl Punishment {
    pub fn until(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Punishment::Kick => now + Duration::seconds(KICK_SECS),
            Punishment::Ban => now + Duration::seconds(BAN_SECS),
        }
    }
}

/// One pass over both queues. Returns the number of entries processed.
pub async fn sweep_expired(store: &Store, transport: &dyn ChatTransport, now: DateTime<Utc>) -> usize {
    let expired = store.take_expired(now).await;
    if expired.is_empty() {
        return 0;
    }
    let count = expired.len();
    log::info!(
        "Sweep: {} welcome, {} trigger entries expired",
        expired.welcome.len(),
        expired.trigger.len()
    );

    expire_welcome(transport, &expired.welcome, Punishment::Kick, now).await;
    delete_trigger_messages(transport, &expired.trigger).await;
    persist(store).await;
    count
}

/// Sweeps only the welcome queue.
pub async fn sweep_welcome(store: &Store, transport: &dyn ChatTransport, now: DateTime<Utc>) -> usize {
    let expired = store.take_expired_from(QueueKind::Welcome, now).await;
    if expired.is_empty() {
        return 0;
    }
    expire_welcome(transport, &expired, Punishment::Kick, now).await;
    persist(store).await;
    expired.len()
}

/// Sweeps only the trigger queue.
pub async fn sweep_triggers(store: &Store, transport: &dyn ChatTransport, now: DateTime<Utc>) -> usize {
    let expired = store.take_expired_from(QueueKind::Trigger, now).await;
    if expired.is_empty() {
        return 0;
    }
    delete_trigger_messages(transport, &expired).await;
    persist(store).await;
    expired.len()
}

/// Deletes each welcome message and punishes its user. The entries must
/// already be out of the queue and their members out of the cache.
pub async fn expire_welcome(
    transport: &dyn ChatTransport,
    entries: &[PendingDeletion],
    punishment: Punishment,
    now: DateTime<Utc>,
) {
    for entry in entries {
        let chat_id = ChatId(entry.chat_id);
        if let Err(e) = transport.delete_message(chat_id, MessageId(entry.message_id)).await {
            log::warn!("Failed to delete welcome message ({}): {:#}", entry, e);
        }
        if let Err(e) = transport
            .ban_member(chat_id, UserId(entry.user_id), punishment.until(now))
            .await
        {
            log::warn!("Failed to {:?} user {} in {}: {:#}", punishment, entry.user_id, entry.chat_id, e);
        }
    }
}

/// One batched delete per chat.
async fn delete_trigger_messages(transport: &dyn ChatTransport, entries: &[PendingDeletion]) {
    let mut by_chat: BTreeMap<i64, Vec<MessageId>> = BTreeMap::new();
    for entry in entries {
        by_chat.entry(entry.chat_id).or_default().push(MessageId(entry.message_id));
    }
    for (chat_id, message_ids) in by_chat {
        let total = message_ids.len();
        if let Err(e) = transport.delete_messages(ChatId(chat_id), message_ids).await {
            log::warn!("Failed to delete {} trigger messages in {}: {:#}", total, chat_id, e);
        }
    }
}

async fn persist(store: &Store) {
    if let Err(e) = store.save().await {
        log::warn!("Failed to save cache to {}: {:#}", store.path().display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kick_is_shorter_than_ban() {
        let now = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(Punishment::Kick.until(now).timestamp(), 6 * 3600);
        assert_eq!(Punishment::Ban.until(now).timestamp(), 330 * 86400);
    }
}
