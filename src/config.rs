//! Centralized static constants: timeouts, queue lifetimes, file names and callback commands.

/// **Queue lifetimes:** how long pending deletions stay queued, in seconds.
pub mod ttl {
    /// A welcome message (and its unacknowledged user) expires after 2 hours.
    pub const WELCOME_SECS: i64 = 2 * 60 * 60;
    /// Trigger replies and the messages that fired them are cleaned after 44 hours.
    pub const TRIGGER_SECS: i64 = 44 * 60 * 60;
    /// Messages older than this (at processing time) never fire triggers.
    pub const STALE_MESSAGE_SECS: i64 = 5 * 60;
}

/// **Punishment lengths:** how long `ban_chat_member` restrictions last, in seconds.
pub mod punishment {
    /// A kick is a short ban so the user may come back later.
    pub const KICK_SECS: i64 = 6 * 60 * 60;
    /// A ban lasts 11 months (330 days).
    pub const BAN_SECS: i64 = 330 * 24 * 60 * 60;
}

/// **Reputation services:** public ban-list endpoints keyed by user id.
pub mod reputation {
    /// Combot Anti-Spam check, `?user_id=<id>` is appended.
    pub const CAS_URL: &str = "https://api.cas.chat/check";
    /// lols.bot account check, `?id=<id>` is appended.
    pub const LOLS_URL: &str = "https://api.lols.bot/account";
    /// Per-request timeout for every sub-check.
    pub const TIMEOUT_SECS: u64 = 10;
}

/// **Persistence:** snapshot file and background cadence.
pub mod snapshot {
    /// Default snapshot file, relative to the working directory.
    pub const DEFAULT_PATH: &str = "cache.json";
    /// Suffix of the temporary file written before the atomic rename.
    pub const TEMP_SUFFIX: &str = ".tmp";
    /// Interval between background sweep + snapshot cycles.
    pub const INTERVAL_SECS: u64 = 60;
}

/// **Callback commands:** the `command` field of inline button payloads.
pub mod callback {
    /// The welcome button: `{"command": "upgrade_rights", "data": "<user_id>"}`.
    pub const UPGRADE_RIGHTS: &str = "upgrade_rights";
}

/// **Callback answers** shown to the user who pressed the welcome button.
pub mod answer {
    pub const RIGHTS_UPGRADED: &str = "Rights upgraded!";
    pub const API_BANNED: &str = "Sorry, Api Ban";
    pub const EXPIRED: &str = "This welcome has already expired.";
}

/// Placeholder replaced with an HTML mention of the joining user.
pub const NAME_LINK_PLACEHOLDER: &str = "{namelink}";

/// Default configuration files, overridable with `BOT_CONFIG` / `BOT_TRIGGERS`.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_TRIGGERS_PATH: &str = "triggers.yaml";
