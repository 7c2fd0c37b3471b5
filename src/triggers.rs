//! Auto-response triggers loaded from `triggers.yaml`.

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

/// One phrase of a trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    #[serde(rename = "word")]
    pub value: String,
}

/// Grouping used by the `/triggers` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
}

/// A trigger exactly as written in `triggers.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    #[serde(rename = "condition", default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "substringSearch", default)]
    pub substring_search: bool,
    #[serde(rename = "regexpSearch", default)]
    pub regexp_search: bool,
    #[serde(rename = "actiontext", default)]
    pub action_text: String,
    #[serde(rename = "showpreview", default)]
    pub show_preview: bool,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub section: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggersFile {
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

/// A trigger with its regular expressions compiled.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub config: TriggerConfig,
    regexes: Vec<Option<Regex>>,
}

/// Messages containing a question mark are questions.
pub fn is_question(text: &str) -> bool {
    text.contains('?')
}

impl Trigger {
    pub fn compile(config: TriggerConfig) -> Result<Self> {
        let regexes = config
            .conditions
            .iter()
            .map(|condition| {
                if !config.regexp_search {
                    return Ok(None);
                }
                Regex::new(&condition.value)
                    .map(Some)
                    .with_context(|| format!("bad regex '{}' in trigger '{}'", condition.value, config.name))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { config, regexes })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn picture(&self) -> Option<&str> {
        Some(self.config.picture.as_str()).filter(|p| !p.is_empty())
    }

    /// An exact (case-insensitive) phrase always matches. Substring and regex
    /// searches only apply to questions and only when enabled on the trigger.
    pub fn matches(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        let question = is_question(text);

        self.config
            .conditions
            .iter()
            .zip(&self.regexes)
            .any(|(condition, regex)| {
                let phrase = condition.value.to_lowercase();
                if lowered == phrase {
                    return true;
                }
                if !question {
                    return false;
                }
                if self.config.substring_search && lowered.contains(&phrase) {
                    return true;
                }
                matches!(regex, Some(regex) if regex.is_match(text))
            })
    }
}

/// All triggers, sorted by name, plus their sections.
#[derive(Debug, Clone, Default)]
pub struct TriggerSet {
    triggers: Vec<Trigger>,
    sections: Vec<Section>,
}

impl TriggerSet {
    pub fn compile(file: TriggersFile) -> Result<Self> {
        let mut triggers = file
            .triggers
            .into_iter()
            .map(Trigger::compile)
            .collect::<Result<Vec<_>>>()?;
        triggers.sort_by(|a, b| a.config.name.cmp(&b.config.name));
        Ok(Self {
            triggers,
            sections: file.sections,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read triggers: {}", path.display()))?;
        let file: TriggersFile = serde_yaml::from_str(&text)
            .with_context(|| format!("parse triggers: {}", path.display()))?;
        let set = Self::compile(file)?;
        log::info!("Triggers loaded: {}", set.triggers.len());
        log::info!("Sections loaded: {}", set.sections.len());
        Ok(set)
    }

    /// Every trigger matching `text`, in name order.
    pub fn matching<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a Trigger> + 'a {
        self.triggers.iter().filter(move |trigger| trigger.matches(text))
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// HTML listing grouped by section; triggers without a known section are skipped.
    pub fn listing(&self) -> String {
        let mut message = String::new();
        for section in &self.sections {
            let lines: Vec<String> = self
                .triggers
                .iter()
                .filter(|t| t.config.section == section.id && !t.config.conditions.is_empty())
                .map(|t| {
                    let words: Vec<&str> = t.config.conditions.iter().map(|c| c.value.as_str()).collect();
                    format!("{}: {}", t.config.name, words.join("|"))
                })
                .collect();
            if lines.is_empty() {
                continue;
            }
            message.push_str(&format!("<b>{}</b>\n{}\n\n", section.name, lines.join("\n")));
        }
        message
    }
}
