//! YAML configuration (`config.yaml`) and the compiled moderation rules.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::config;
use crate::filters::ForbiddenList;
use crate::triggers::TriggerSet;

#[derive(Debug, Clone, Deserialize)]
pub struct ReputationSettings {
    #[serde(default = "default_cas_url")]
    pub cas_url: String,
    #[serde(default = "default_lols_url")]
    pub lols_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ReputationSettings {
    fn default() -> Self {
        Self {
            cas_url: default_cas_url(),
            lols_url: default_lols_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_cas_url() -> String {
    config::reputation::CAS_URL.to_string()
}

fn default_lols_url() -> String {
    config::reputation::LOLS_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    config::reputation::TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_snapshot_path() -> String {
    config::snapshot::DEFAULT_PATH.to_string()
}

/// Contents of `config.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub bot_token: String,
    /// Chat assumed for members whose chat is unknown.
    pub primary_chat_id: i64,
    #[serde(default)]
    pub admins: Vec<u64>,
    #[serde(default)]
    pub forbidden_text: Vec<String>,
    #[serde(default)]
    pub welcome_message: String,
    #[serde(default)]
    pub welcome_button_message: String,
    #[serde(default)]
    pub deny_bots: Vec<String>,
    #[serde(default)]
    pub deny_chats: Vec<String>,
    #[serde(default)]
    pub deny_names: Vec<String>,
    #[serde(default = "default_true")]
    pub delete_channel_messages: bool,
    #[serde(default = "default_true")]
    pub force_protection: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default)]
    pub reputation: ReputationSettings,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let settings: Settings = serde_yaml::from_str(&text)
            .with_context(|| format!("parse config: {}", path.display()))?;
        Ok(settings)
    }

    /// `BOT_TOKEN` from the environment wins over the file.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            if !token.is_empty() {
                self.bot_token = token;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            return Err(anyhow!("bot_token is empty and BOT_TOKEN is not set"));
        }
        if self.primary_chat_id == 0 {
            return Err(anyhow!("primary_chat_id must be set"));
        }
        if self.welcome_message.is_empty() || self.welcome_button_message.is_empty() {
            return Err(anyhow!("welcome_message and welcome_button_message must be set"));
        }
        if self.reputation.timeout_secs == 0 {
            return Err(anyhow!("reputation.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admins.contains(&user_id)
    }
}

/// Locations of the two configuration files, kept for `/reload`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config: PathBuf,
    pub triggers: PathBuf,
}

impl ConfigPaths {
    pub fn from_env() -> Self {
        let config = std::env::var("BOT_CONFIG").unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_string());
        let triggers =
            std::env::var("BOT_TRIGGERS").unwrap_or_else(|_| config::DEFAULT_TRIGGERS_PATH.to_string());
        Self {
            config: PathBuf::from(config),
            triggers: PathBuf::from(triggers),
        }
    }
}

/// Settings plus everything compiled from them; swapped wholesale on reload.
#[derive(Debug, Clone)]
pub struct Rules {
    pub settings: Settings,
    pub forbidden: ForbiddenList,
    pub triggers: TriggerSet,
}

impl Rules {
    pub fn new(settings: Settings, triggers: TriggerSet) -> Result<Self> {
        let forbidden = ForbiddenList::compile(&settings.forbidden_text)?;
        Ok(Self {
            settings,
            forbidden,
            triggers,
        })
    }

    /// Reads, overrides and validates both files.
    pub fn load(paths: &ConfigPaths) -> Result<Self> {
        let mut settings = Settings::load(&paths.config)?;
        settings.apply_env();
        settings.validate()?;
        let triggers = TriggerSet::load(&paths.triggers)?;
        Self::new(settings, triggers)
    }
}
