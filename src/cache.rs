//! Membership cache and the two pending-deletion queues, with their on-disk snapshot.
//!
//! [`Cache`] is the plain data structure; [`Store`] owns it behind a single
//! mutex and is the only way the rest of the bot touches it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::punishment::KICK_SECS;
use crate::config::snapshot::TEMP_SUFFIX;

/// A chat participant going through (or past) the welcome flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    /// `0` when unknown; resolved to the primary chat on load.
    #[serde(default)]
    pub chat_id: i64,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub rank: i32,
    #[serde(default)]
    pub message_count: u32,
}

impl Member {
    pub fn new(id: u64, chat_id: i64) -> Self {
        Self {
            id,
            chat_id,
            acknowledged: false,
            rank: 0,
            message_count: 0,
        }
    }
}

/// A message scheduled for deletion once `expires_at` has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDeletion {
    pub message_id: i32,
    pub user_id: u64,
    pub chat_id: i64,
    pub expires_at: DateTime<Utc>,
}

impl PendingDeletion {
    pub fn new(message_id: i32, user_id: u64, chat_id: i64, expires_at: DateTime<Utc>) -> Self {
        Self {
            message_id,
            user_id,
            chat_id,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Display for PendingDeletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "msg {} user {} chat {} expires {}",
            self.message_id,
            self.user_id,
            self.chat_id,
            self.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Which queue an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Welcome message + kick of the user if still unacknowledged.
    Welcome,
    /// Trigger reply or triggering message, deleted after a grace period.
    Trigger,
}

/// Entries taken out of the queues by a sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expired {
    pub welcome: Vec<PendingDeletion>,
    pub trigger: Vec<PendingDeletion>,
}

impl Expired {
    pub fn len(&self) -> usize {
        self.welcome.len() + self.trigger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.welcome.is_empty() && self.trigger.is_empty()
    }
}

/// What a button press found for the welcomed user.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The user was pending; these welcome entries are now out of the queue.
    Pending(Vec<PendingDeletion>),
    /// A sweep kicked the user recently.
    Expired,
    /// Nothing is known about the user, e.g. after the snapshot was lost.
    Unknown,
}

/// Durable form of the cache, written wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub welcome_queue: Vec<PendingDeletion>,
    #[serde(default)]
    pub trigger_queue: Vec<PendingDeletion>,
    #[serde(default)]
    pub last_changed: i64,
}

/// In-memory state. Lists are small, so every lookup is a linear scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cache {
    members: Vec<Member>,
    welcome_queue: Vec<PendingDeletion>,
    trigger_queue: Vec<PendingDeletion>,
    last_changed: i64,
    /// Users kicked by a welcome expiry, with the kick time. Not persisted.
    expired_users: Vec<(u64, DateTime<Utc>)>,
}

impl Cache {
    pub fn from_snapshot(snapshot: Snapshot, primary_chat_id: i64) -> Self {
        let mut members = snapshot.members;
        for member in members.iter_mut().filter(|m| m.chat_id == 0) {
            member.chat_id = primary_chat_id;
        }
        Self {
            members,
            welcome_queue: snapshot.welcome_queue,
            trigger_queue: snapshot.trigger_queue,
            last_changed: snapshot.last_changed,
            expired_users: Vec::new(),
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            members: self.members.clone(),
            welcome_queue: self.welcome_queue.clone(),
            trigger_queue: self.trigger_queue.clone(),
            last_changed: self.last_changed,
        }
    }

    /// Inserts an unacknowledged member unless the user id is already known.
    /// Returns `true` only for the insertion.
    pub fn upsert_on_first_seen(&mut self, user_id: u64, chat_id: i64) -> bool {
        if self.lookup(user_id).is_some() {
            return false;
        }
        self.expired_users.retain(|(id, _)| *id != user_id);
        self.members.push(Member::new(user_id, chat_id));
        true
    }

    pub fn lookup(&self, user_id: u64) -> Option<&Member> {
        self.members.iter().find(|m| m.id == user_id)
    }

    /// Removes the member if present; returns whether anything was removed.
    pub fn remove(&mut self, user_id: u64) -> bool {
        match self.members.iter().position(|m| m.id == user_id) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn clear_members(&mut self) -> usize {
        std::mem::take(&mut self.members).len()
    }

    pub fn enqueue(&mut self, kind: QueueKind, entry: PendingDeletion) {
        self.queue_mut(kind).push(entry);
    }

    pub fn queue(&self, kind: QueueKind) -> &[PendingDeletion] {
        match kind {
            QueueKind::Welcome => &self.welcome_queue,
            QueueKind::Trigger => &self.trigger_queue,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut Vec<PendingDeletion> {
        match kind {
            QueueKind::Welcome => &mut self.welcome_queue,
            QueueKind::Trigger => &mut self.trigger_queue,
        }
    }

    /// Splits a queue into expired and retained entries, keeping the retained
    /// ones in their previous order.
    pub fn take_expired_from(&mut self, kind: QueueKind, now: DateTime<Utc>) -> Vec<PendingDeletion> {
        let queue = std::mem::take(self.queue_mut(kind));
        let (expired, retained): (Vec<_>, Vec<_>) = queue.into_iter().partition(|e| e.is_expired(now));
        *self.queue_mut(kind) = retained;
        expired
    }

    pub fn take_expired(&mut self, now: DateTime<Utc>) -> Expired {
        Expired {
            welcome: self.take_expired_from(QueueKind::Welcome, now),
            trigger: self.take_expired_from(QueueKind::Trigger, now),
        }
    }

    /// Removes every welcome entry belonging to one of `user_ids`.
    pub fn take_welcome_for(&mut self, user_ids: &[u64]) -> Vec<PendingDeletion> {
        let queue = std::mem::take(&mut self.welcome_queue);
        let (taken, retained): (Vec<_>, Vec<_>) =
            queue.into_iter().partition(|e| user_ids.contains(&e.user_id));
        self.welcome_queue = retained;
        taken
    }

    /// Drops the members behind expired welcome entries and remembers them
    /// for the length of a kick.
    pub fn expire_members(&mut self, entries: &[PendingDeletion], now: DateTime<Utc>) {
        let horizon = now - Duration::seconds(KICK_SECS);
        self.expired_users.retain(|(_, at)| *at > horizon);
        for entry in entries {
            self.remove(entry.user_id);
            if !self.expired_users.iter().any(|(id, _)| *id == entry.user_id) {
                self.expired_users.push((entry.user_id, now));
            }
        }
    }

    pub fn was_expired(&self, user_id: u64) -> bool {
        self.expired_users.iter().any(|(id, _)| *id == user_id)
    }

    /// Resolves a pending welcome: takes the user's welcome entries and drops
    /// the member record.
    pub fn acknowledge(&mut self, user_id: u64) -> Claim {
        let taken = self.take_welcome_for(&[user_id]);
        let had_member = self.remove(user_id);
        if !taken.is_empty() || had_member {
            Claim::Pending(taken)
        } else if self.was_expired(user_id) {
            Claim::Expired
        } else {
            Claim::Unknown
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_changed = now.timestamp();
    }
}

/// Reads a snapshot file; a missing file is an empty snapshot.
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No cache file at {}, starting empty", path.display());
            return Ok(Snapshot::default());
        }
        Err(e) => return Err(e).with_context(|| format!("read snapshot: {}", path.display())),
    };
    serde_json::from_str(&text).with_context(|| format!("parse snapshot: {}", path.display()))
}

/// Writes to a temporary file next to `path`, then renames it into place.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = PathBuf::from(format!("{}{}", path.display(), TEMP_SUFFIX));
    std::fs::write(&tmp, bytes).with_context(|| format!("write snapshot: {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename snapshot: {}", path.display()))?;
    Ok(())
}

/// The process-wide cache handle. Cloning shares the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<Cache>>,
    path: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    pub fn new(cache: Cache, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
            path: Arc::new(path.into()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Loads the snapshot at `path` (empty if absent).
    pub fn load(path: impl Into<PathBuf>, primary_chat_id: i64) -> Result<Self> {
        let path = path.into();
        let snapshot = read_snapshot(&path)?;
        log::info!(
            "Cache loaded: {} members, {} welcome, {} trigger entries, last changed {}",
            snapshot.members.len(),
            snapshot.welcome_queue.len(),
            snapshot.trigger_queue.len(),
            snapshot.last_changed
        );
        Ok(Self::new(Cache::from_snapshot(snapshot, primary_chat_id), path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current state to disk, stamping `last_changed`.
    pub async fn save(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let mut cache = self.inner.lock().await;
            cache.touch(Utc::now());
            cache.to_snapshot()
        };
        let path = Arc::clone(&self.path);
        tokio::task::spawn_blocking(move || write_snapshot(&path, &snapshot)).await??;
        Ok(())
    }

    pub async fn upsert_on_first_seen(&self, user_id: u64, chat_id: i64) -> bool {
        self.inner.lock().await.upsert_on_first_seen(user_id, chat_id)
    }

    pub async fn lookup(&self, user_id: u64) -> Option<Member> {
        self.inner.lock().await.lookup(user_id).cloned()
    }

    pub async fn remove(&self, user_id: u64) -> bool {
        self.inner.lock().await.remove(user_id)
    }

    pub async fn clear_members(&self) -> usize {
        self.inner.lock().await.clear_members()
    }

    pub async fn members(&self) -> Vec<Member> {
        self.inner.lock().await.members().to_vec()
    }

    /// Schedules a welcome message for deletion `ttl` after `now`.
    pub async fn schedule_welcome(&self, message_id: i32, user_id: u64, chat_id: i64, now: DateTime<Utc>, ttl: Duration) {
        let entry = PendingDeletion::new(message_id, user_id, chat_id, now + ttl);
        self.inner.lock().await.enqueue(QueueKind::Welcome, entry);
    }

    /// Schedules a trigger reply (or triggering message) for deletion.
    pub async fn schedule_trigger(&self, message_id: i32, user_id: u64, chat_id: i64, now: DateTime<Utc>, ttl: Duration) {
        let entry = PendingDeletion::new(message_id, user_id, chat_id, now + ttl);
        self.inner.lock().await.enqueue(QueueKind::Trigger, entry);
    }

    pub async fn queue(&self, kind: QueueKind) -> Vec<PendingDeletion> {
        self.inner.lock().await.queue(kind).to_vec()
    }

    /// Dequeues every expired entry. Members whose welcome expired are
    /// dropped under the same lock, so a later acknowledgment sees `Expired`.
    pub async fn take_expired(&self, now: DateTime<Utc>) -> Expired {
        let mut cache = self.inner.lock().await;
        let expired = cache.take_expired(now);
        cache.expire_members(&expired.welcome, now);
        expired
    }

    pub async fn take_expired_from(&self, kind: QueueKind, now: DateTime<Utc>) -> Vec<PendingDeletion> {
        let mut cache = self.inner.lock().await;
        let expired = cache.take_expired_from(kind, now);
        if kind == QueueKind::Welcome {
            cache.expire_members(&expired, now);
        }
        expired
    }

    /// Takes the users' welcome entries and drops their member records.
    pub async fn take_welcome_for(&self, user_ids: &[u64]) -> Vec<PendingDeletion> {
        let mut cache = self.inner.lock().await;
        let taken = cache.take_welcome_for(user_ids);
        for user_id in user_ids {
            cache.remove(*user_id);
        }
        taken
    }

    pub async fn acknowledge(&self, user_id: u64) -> Claim {
        self.inner.lock().await.acknowledge(user_id)
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.lock().await.to_snapshot()
    }
}
