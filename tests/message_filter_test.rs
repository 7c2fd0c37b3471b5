mod common;

use chrono::Duration;
use common::*;
use gatekeeper_telegram_bot::cache::QueueKind;
use gatekeeper_telegram_bot::moderator::{DeleteReason, MessageOutcome, SenderChat};

#[tokio::test]
async fn test_forbidden_regex_and_literal_are_deleted() {
    let h = Harness::new("forbidden");
    let now = at(0);

    let outcome = h.moderator.on_message(&group_message(10, 5, "spamalot", now), now).await;
    assert_eq!(outcome, MessageOutcome::Deleted(DeleteReason::Forbidden));

    let outcome = h.moderator.on_message(&group_message(11, 5, "I love spam", now), now).await;
    assert_eq!(outcome, MessageOutcome::Deleted(DeleteReason::Forbidden));

    assert_eq!(
        h.transport.calls(),
        vec![
            Call::Delete { chat: CHAT, message: 10 },
            Call::Delete { chat: CHAT, message: 11 },
        ]
    );
}

#[tokio::test]
async fn test_admin_messages_skip_forbidden_filter() {
    let h = Harness::new("forbidden-admin");
    let now = at(0);
    let outcome = h.moderator.on_message(&group_message(10, ADMIN, "spam is fine here", now), now).await;
    assert_eq!(outcome, MessageOutcome::Ignored);
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_forbidden_message_sweeps_welcome_queue() {
    let h = Harness::new("forbidden-sweep");
    h.moderator.on_member_joined(CHAT, &user(42, "Ann"), at(0)).await;
    h.transport.clear();

    let now = at(3 * 3600);
    h.moderator.on_message(&group_message(10, 5, "spam", now), now).await;
    let calls = h.transport.calls();
    assert_eq!(calls[0], Call::Delete { chat: CHAT, message: 10 });
    assert!(calls.contains(&Call::Delete { chat: CHAT, message: 1000 }));
    assert!(h.moderator.store().lookup(42).await.is_none());
}

#[tokio::test]
async fn test_denied_inline_bot_is_deleted() {
    let h = Harness::new("deny-bot");
    let now = at(0);
    let mut msg = group_message(10, ADMIN, "look at this", now);
    msg.via_bot = Some("BadBot".to_string());
    let outcome = h.moderator.on_message(&msg, now).await;
    assert_eq!(outcome, MessageOutcome::Deleted(DeleteReason::DeniedBot));
}

#[tokio::test]
async fn test_custom_emoji_spam_is_deleted() {
    let h = Harness::new("emoji");
    let now = at(0);
    let mut msg = group_message(10, 5, "🔥 earn money fast", now);
    msg.starts_with_custom_emoji = true;
    assert_eq!(
        h.moderator.on_message(&msg, now).await,
        MessageOutcome::Deleted(DeleteReason::CustomEmoji)
    );

    let mut short = group_message(11, 5, "🔥", now);
    short.starts_with_custom_emoji = true;
    assert_eq!(h.moderator.on_message(&short, now).await, MessageOutcome::Ignored);
}

#[tokio::test]
async fn test_channel_messages_follow_deny_list() {
    let h = Harness::new("channel");
    let now = at(0);
    let mut msg = group_message(10, 5, "news", now);
    msg.sender_chat = Some(SenderChat {
        id: -100500,
        username: Some("SpamChannel".to_string()),
    });
    assert_eq!(
        h.moderator.on_message(&msg, now).await,
        MessageOutcome::Deleted(DeleteReason::Channel)
    );

    msg.sender_chat = Some(SenderChat {
        id: -100501,
        username: Some("friends".to_string()),
    });
    assert_eq!(h.moderator.on_message(&msg, now).await, MessageOutcome::Ignored);
}

#[tokio::test]
async fn test_channel_messages_deleted_when_enabled() {
    let config = CONFIG_YAML.replace("delete_channel_messages: false", "delete_channel_messages: true");
    let h = Harness::with_config("channel-all", &config);
    let now = at(0);
    let mut msg = group_message(10, 5, "news", now);
    msg.sender_chat = Some(SenderChat {
        id: -100501,
        username: None,
    });
    assert_eq!(
        h.moderator.on_message(&msg, now).await,
        MessageOutcome::Deleted(DeleteReason::Channel)
    );
}

#[tokio::test]
async fn test_public_trigger_replies_and_queues_both_messages() {
    let h = Harness::new("trigger-public");
    let now = at(0);

    let outcome = h.moderator.on_message(&group_message(10, 5, "Where do I get a visa?", now), now).await;
    assert_eq!(outcome, MessageOutcome::Triggered(1));
    assert_eq!(
        h.transport.calls(),
        vec![Call::Send {
            chat: CHAT,
            text: "See the <b>visa</b> guide".to_string(),
            reply_to: Some(10),
            picture: None,
            button: None,
            preview: false,
        }]
    );

    let queue = h.moderator.store().queue(QueueKind::Trigger).await;
    let mut ids: Vec<(i32, u64)> = queue.iter().map(|e| (e.message_id, e.user_id)).collect();
    ids.sort();
    assert_eq!(ids, vec![(10, 5), (1000, 999)]);
    assert!(queue.iter().all(|e| e.expires_at == now + Duration::hours(44)));
}

#[tokio::test]
async fn test_private_trigger_is_not_queued() {
    let h = Harness::new("trigger-private");
    let now = at(0);
    let mut msg = group_message(10, 5, "visa", now);
    msg.is_private = true;

    assert_eq!(h.moderator.on_message(&msg, now).await, MessageOutcome::Triggered(1));
    assert!(h.moderator.store().queue(QueueKind::Trigger).await.is_empty());
}

#[tokio::test]
async fn test_trigger_with_picture_sends_photo() {
    let h = Harness::new("trigger-photo");
    let now = at(0);
    h.moderator.on_message(&group_message(10, 5, "MAP", now), now).await;
    match &h.transport.sends()[0] {
        Call::Send { picture, text, .. } => {
            assert_eq!(picture.as_deref(), Some("AgACAgIAAxkBAAIB"));
            assert_eq!(text, "City map");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_statement_containing_phrase_does_not_trigger() {
    let h = Harness::new("trigger-statement");
    let now = at(0);
    let outcome = h.moderator.on_message(&group_message(10, 5, "I already have a visa", now), now).await;
    assert_eq!(outcome, MessageOutcome::Ignored);
}

#[tokio::test]
async fn test_stale_message_does_not_trigger() {
    let h = Harness::new("trigger-stale");
    let sent = at(0);
    let now = sent + Duration::minutes(6);
    let outcome = h.moderator.on_message(&group_message(10, 5, "visa", sent), now).await;
    assert_eq!(outcome, MessageOutcome::Ignored);
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_public_trigger_sweeps_expired_triggers() {
    let h = Harness::new("trigger-sweep");
    let first = at(0);
    h.moderator.on_message(&group_message(10, 5, "visa", first), first).await;
    h.transport.clear();

    let later = first + Duration::hours(45);
    h.moderator.on_message(&group_message(20, 6, "visa", later), later).await;
    let calls = h.transport.calls();
    assert!(calls.contains(&Call::DeleteMany {
        chat: CHAT,
        messages: vec![10, 1000]
    }));
    assert_eq!(h.moderator.store().queue(QueueKind::Trigger).await.len(), 2);
}
