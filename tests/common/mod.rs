#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::types::{ChatId, MessageId, UserId};

use gatekeeper_telegram_bot::cache::{Cache, Store};
use gatekeeper_telegram_bot::moderator::{IncomingMessage, Moderator, UserProfile};
use gatekeeper_telegram_bot::reputation::{ReputationGate, ReputationService};
use gatekeeper_telegram_bot::settings::{ConfigPaths, Rules, Settings};
use gatekeeper_telegram_bot::transport::{ChatTransport, MemberRights, OutgoingMessage};
use gatekeeper_telegram_bot::triggers::TriggerSet;

pub const CHAT: i64 = 7;
pub const ADMIN: u64 = 1;

pub const CONFIG_YAML: &str = r#"
bot_token: "1:test"
primary_chat_id: 7
admins: [1]
forbidden_text:
  - "r:^spam.*"
  - spam
welcome_message: "Welcome, {namelink}!"
welcome_button_message: "I am human"
deny_bots: [badbot]
deny_chats: [spamchannel]
deny_names: [crypto]
delete_channel_messages: false
"#;

pub const TRIGGERS_YAML: &str = r#"
triggers:
  - name: visa
    condition:
      - word: visa
    substringSearch: true
    actiontext: "See the <b>visa</b> guide"
    section: docs
  - name: map
    condition:
      - word: map
    actiontext: "City map"
    picture: "AgACAgIAAxkBAAIB"
    section: docs
sections:
  - id: docs
    name: Documents
"#;

/// Every outbound operation, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send {
        chat: i64,
        text: String,
        reply_to: Option<i32>,
        picture: Option<String>,
        button: Option<String>,
        preview: bool,
    },
    Delete { chat: i64, message: i32 },
    DeleteMany { chat: i64, messages: Vec<i32> },
    Restrict { chat: i64, user: u64, rights: MemberRights },
    Ban { chat: i64, user: u64, until: DateTime<Utc> },
    Unban { chat: i64, user: u64 },
    Answer { query: String, text: String },
}

/// Records calls and hands out increasing message ids starting at 1000.
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI32,
    pub fail_sends: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(1000),
            fail_sends: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn sends(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Send { .. }))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, chat_id: ChatId, message: OutgoingMessage) -> Result<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(anyhow!("send refused"));
        }
        self.record(Call::Send {
            chat: chat_id.0,
            text: message.text,
            reply_to: message.reply_to.map(|m| m.0),
            picture: message.picture,
            button: message.button.map(|b| b.data),
            preview: message.link_preview,
        });
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.record(Call::Delete {
            chat: chat_id.0,
            message: message_id.0,
        });
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(anyhow!("message can't be deleted"));
        }
        Ok(())
    }

    async fn delete_messages(&self, chat_id: ChatId, message_ids: Vec<MessageId>) -> Result<()> {
        let mut messages: Vec<i32> = message_ids.iter().map(|m| m.0).collect();
        messages.sort();
        self.record(Call::DeleteMany {
            chat: chat_id.0,
            messages,
        });
        Ok(())
    }

    async fn restrict_member(&self, chat_id: ChatId, user_id: UserId, rights: MemberRights) -> Result<()> {
        self.record(Call::Restrict {
            chat: chat_id.0,
            user: user_id.0,
            rights,
        });
        Ok(())
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> Result<()> {
        self.record(Call::Ban {
            chat: chat_id.0,
            user: user_id.0,
            until,
        });
        Ok(())
    }

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.record(Call::Unban {
            chat: chat_id.0,
            user: user_id.0,
        });
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: &str) -> Result<()> {
        self.record(Call::Answer {
            query: query_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

/// A ban list whose contents tests can change while the gate holds it.
#[derive(Clone, Default)]
pub struct BanList {
    banned: Arc<Mutex<HashSet<u64>>>,
}

impl BanList {
    pub fn ban(&self, user_id: u64) {
        self.banned.lock().unwrap().insert(user_id);
    }

    pub fn gate(&self) -> ReputationGate {
        ReputationGate::new(vec![Box::new(self.clone())])
    }
}

#[async_trait]
impl ReputationService for BanList {
    fn name(&self) -> &str {
        "test"
    }

    async fn check(&self, user_id: u64) -> Result<bool> {
        Ok(self.banned.lock().unwrap().contains(&user_id))
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("gatekeeper-{}-{}", std::process::id(), name))
}

pub fn rules_from(config: &str, triggers: &str) -> Rules {
    let settings: Settings = serde_yaml::from_str(config).unwrap();
    let triggers = TriggerSet::compile(serde_yaml::from_str(triggers).unwrap()).unwrap();
    Rules::new(settings, triggers).unwrap()
}

pub struct Harness {
    pub moderator: Moderator,
    pub transport: Arc<RecordingTransport>,
    pub bans: BanList,
}

impl Harness {
    pub fn new(name: &str) -> Self {
        Self::with_config(name, CONFIG_YAML)
    }

    pub fn with_config(name: &str, config: &str) -> Self {
        let _ = std::fs::remove_file(temp_path(name));
        let store = Store::new(Cache::default(), temp_path(name));
        let transport = RecordingTransport::new();
        let bans = BanList::default();
        let paths = ConfigPaths {
            config: temp_path(&format!("{}-config.yaml", name)),
            triggers: temp_path(&format!("{}-triggers.yaml", name)),
        };
        let moderator = Moderator::new(
            store,
            bans.gate(),
            transport.clone(),
            rules_from(config, TRIGGERS_YAML),
            paths,
        )
        .with_bot_id(999);
        Self {
            moderator,
            transport,
            bans,
        }
    }
}

pub fn user(id: u64, first_name: &str) -> UserProfile {
    UserProfile {
        id,
        first_name: first_name.to_string(),
        last_name: None,
        username: None,
    }
}

pub fn group_message(id: i32, from: u64, text: &str, now: DateTime<Utc>) -> IncomingMessage {
    IncomingMessage {
        chat_id: CHAT,
        message_id: MessageId(id),
        from: Some(user(from, "Sender")),
        text: text.to_string(),
        is_private: false,
        via_bot: None,
        sender_chat: None,
        starts_with_custom_emoji: false,
        date: now,
    }
}
