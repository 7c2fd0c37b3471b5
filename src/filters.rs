//! Content filters: forbidden text, deny-lists and welcome rendering.

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::NAME_LINK_PLACEHOLDER;
use crate::moderator::UserProfile;

/// Prefix marking a `forbidden_text` entry as a regular expression.
const REGEX_PREFIX: &str = "r:";

/// A single forbidden-text rule.
#[derive(Debug, Clone)]
pub enum ForbiddenPattern {
    /// Case-sensitive substring.
    Literal(String),
    /// Regular expression matched anywhere in the text.
    Regex(Regex),
}

impl ForbiddenPattern {
    /// Parse a config entry: `r:<regex>` or a literal substring.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.strip_prefix(REGEX_PREFIX) {
            Some(pattern) => {
                let regex = Regex::new(pattern)
                    .with_context(|| format!("bad forbidden regex '{}'", pattern))?;
                Ok(ForbiddenPattern::Regex(regex))
            }
            None => Ok(ForbiddenPattern::Literal(raw.to_string())),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            ForbiddenPattern::Literal(word) => text.contains(word.as_str()),
            ForbiddenPattern::Regex(regex) => regex.is_match(text),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ForbiddenPattern::Literal(word) => word,
            ForbiddenPattern::Regex(regex) => regex.as_str(),
        }
    }
}

/// The compiled `forbidden_text` list.
#[derive(Debug, Clone, Default)]
pub struct ForbiddenList {
    patterns: Vec<ForbiddenPattern>,
}

impl ForbiddenList {
    pub fn compile(raw: &[String]) -> Result<Self> {
        let patterns = raw
            .iter()
            .filter(|entry| !entry.is_empty())
            .map(|entry| ForbiddenPattern::parse(entry))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Returns the first pattern matching `text`, if any.
    pub fn find_match(&self, text: &str) -> Option<&ForbiddenPattern> {
        self.patterns.iter().find(|pattern| pattern.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Case-insensitive membership of `name` in a deny-list.
pub fn is_denied(name: &str, deny_list: &[String]) -> bool {
    let name = name.to_lowercase();
    deny_list.iter().any(|entry| entry.to_lowercase() == name)
}

/// Case-insensitive substring search of every deny-list entry inside `name`.
pub fn contains_denied(name: &str, deny_list: &[String]) -> bool {
    let name = name.to_lowercase();
    deny_list
        .iter()
        .filter(|entry| !entry.is_empty())
        .any(|entry| name.contains(&entry.to_lowercase()))
}

/// Display name: first and last name, then `(username)` when present.
pub fn display_name(user: &UserProfile) -> String {
    let mut name = user.first_name.clone();
    if let Some(last) = user.last_name.as_deref().filter(|s| !s.is_empty()) {
        name.push(' ');
        name.push_str(last);
    }
    if let Some(username) = user.username.as_deref().filter(|s| !s.is_empty()) {
        name.push_str(&format!("({})", username));
    }
    name
}

/// HTML mention of a user that works without a public username.
pub fn name_link(user: &UserProfile) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user.id,
        escape_html(&display_name(user))
    )
}

/// Fills the welcome template's `{namelink}` placeholder.
pub fn render_welcome(template: &str, user: &UserProfile) -> String {
    template.replace(NAME_LINK_PLACEHOLDER, &name_link(user))
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            id: 42,
            first_name: "Ann".into(),
            last_name: Some("Lee".into()),
            username: Some("annlee".into()),
        }
    }

    #[test]
    fn regex_and_literal_patterns() {
        let list = ForbiddenList::compile(&["r:^spam.*".to_string(), "spam".to_string()]).unwrap();

        let hit = list.find_match("spamalot").unwrap();
        assert!(matches!(hit, ForbiddenPattern::Regex(_)));

        let hit = list.find_match("I love spam").unwrap();
        assert!(matches!(hit, ForbiddenPattern::Literal(_)));

        assert!(list.find_match("ham and eggs").is_none());
    }

    #[test]
    fn only_the_r_colon_prefix_means_regex() {
        let list = ForbiddenList::compile(&["rust".to_string()]).unwrap();
        assert!(matches!(list.find_match("I like rust"), Some(ForbiddenPattern::Literal(_))));
    }

    #[test]
    fn literal_match_is_case_sensitive() {
        let list = ForbiddenList::compile(&["Casino".to_string()]).unwrap();
        assert!(list.find_match("casino night").is_none());
        assert!(list.find_match("Casino night").is_some());
    }

    #[test]
    fn invalid_regex_is_rejected() {
        assert!(ForbiddenList::compile(&["r:(unclosed".to_string()]).is_err());
    }

    #[test]
    fn deny_lists_ignore_case() {
        let deny = vec!["SpamBot".to_string()];
        assert!(is_denied("spambot", &deny));
        assert!(!is_denied("spambot2", &deny));
        assert!(contains_denied("Crypto SPAMBOT signals", &deny));
    }

    #[test]
    fn welcome_template_gets_mention() {
        let text = render_welcome("Hi {namelink}!", &profile());
        assert_eq!(text, "Hi <a href=\"tg://user?id=42\">Ann Lee(annlee)</a>!");
    }

    #[test]
    fn mention_escapes_markup() {
        let mut user = profile();
        user.first_name = "<b>x</b>".into();
        user.last_name = None;
        user.username = None;
        assert_eq!(name_link(&user), "<a href=\"tg://user?id=42\">&lt;b&gt;x&lt;/b&gt;</a>");
    }
}
