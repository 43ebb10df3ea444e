//! Heuristic tier: trigger phrases in free prose
//!
//! Last resort when the model ignored the structured format. A trigger phrase
//! alone is enough to flag a redirect; the name next to it is only used when
//! it looks like one.

use regex::Regex;

use super::{IntentExtractor, RedirectIntent, TierVerdict};
use crate::config::HeuristicConfig;
use crate::error::{RedirectError, Result};

pub struct HeuristicExtractor {
    /// trigger followed by a name: "transfer this to Patrick"
    leading: Option<Regex>,
    /// name followed by a trigger: "Omar would be better suited"
    trailing: Option<Regex>,
    any_trigger: Option<Regex>,
    non_name_words: Vec<String>,
}

fn alternation(triggers: &[String]) -> Option<String> {
    let parts: Vec<String> = triggers
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| format!("(?:{})", t))
        .collect();
    (!parts.is_empty()).then(|| parts.join("|"))
}

fn compile(pattern: String) -> Result<Regex> {
    Regex::new(&pattern)
        .map_err(|e| RedirectError::configuration(format!("invalid heuristic trigger: {}", e)))
}

impl HeuristicExtractor {
    pub fn new(config: &HeuristicConfig) -> Result<Self> {
        let leading = alternation(&config.leading_triggers);
        let trailing = alternation(&config.trailing_triggers);
        let all: Vec<String> = config
            .leading_triggers
            .iter()
            .chain(&config.trailing_triggers)
            .cloned()
            .collect();

        Ok(Self {
            leading: leading
                .map(|alt| compile(format!(r"(?i:\b(?:{}))\s+(\S+)", alt)))
                .transpose()?,
            trailing: trailing
                .map(|alt| compile(format!(r"(\S+)\s+(?i:(?:{})\b)", alt)))
                .transpose()?,
            any_trigger: alternation(&all)
                .map(|alt| compile(format!(r"(?i)\b(?:{})\b", alt)))
                .transpose()?,
            non_name_words: config.non_name_words.clone(),
        })
    }

    /// Clean a token and accept it only if it reads like a person's name
    fn as_name(&self, token: &str) -> Option<String> {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        let token = token
            .strip_suffix("'s")
            .or_else(|| token.strip_suffix("\u{2019}s"))
            .unwrap_or(token);

        let first = token.chars().next()?;
        if !first.is_uppercase() {
            return None;
        }
        if !token
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '.' || c == '_')
        {
            return None;
        }
        let letters = token.chars().filter(|c| c.is_alphabetic()).count();
        if letters * 2 < token.chars().count() {
            return None;
        }
        if self
            .non_name_words
            .iter()
            .any(|w| w.eq_ignore_ascii_case(token))
        {
            return None;
        }
        Some(token.to_string())
    }

    fn named_target(&self, pattern: &Option<Regex>, text: &str) -> Option<String> {
        pattern
            .as_ref()?
            .captures_iter(text)
            .find_map(|caps| self.as_name(caps.get(1)?.as_str()))
    }
}

impl IntentExtractor for HeuristicExtractor {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn extract(&self, text: &str) -> Option<TierVerdict> {
        if let Some(name) = self
            .named_target(&self.leading, text)
            .or_else(|| self.named_target(&self.trailing, text))
        {
            return Some(TierVerdict::Redirect(RedirectIntent::heuristic(Some(name))));
        }
        self.any_trigger
            .as_ref()
            .filter(|re| re.is_match(text))
            .map(|_| TierVerdict::Redirect(RedirectIntent::heuristic(None)))
    }
}
