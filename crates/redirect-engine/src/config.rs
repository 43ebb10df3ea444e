//! Redirect engine configuration
//!
//! Every section implements `Default` and deserializes with `#[serde(default)]`,
//! so a TOML file only needs to name what it overrides:
//!
//! ```
//! use deskcall_redirect_engine::config::RedirectEngineConfig;
//!
//! let config = RedirectEngineConfig::from_toml_str(r#"
//!     [redirect]
//!     default_max_redirects = 5
//!
//!     [parser.vocabulary]
//!     truthy_values = ["yes", "true", "1", "oui"]
//! "#).unwrap();
//!
//! assert_eq!(config.redirect.default_max_redirects, 5);
//! assert_eq!(config.matching.weights.username, 0.5);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RedirectError, Result};

/// Top-level configuration for the redirect engine
///
/// # Configuration Sections
///
/// - [`parser`](Self::parser): marker vocabulary and heuristic trigger phrases
/// - [`matching`](Self::matching): scoring weights for the employee matcher
/// - [`redirect`](Self::redirect): redirect budget and retry policy
/// - [`logging`](Self::logging): log level and output format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectEngineConfig {
    pub parser: ParserConfig,
    pub matching: MatchingConfig,
    pub redirect: RedirectPolicyConfig,
    pub logging: LoggingSection,
}

/// Conversation parser configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub vocabulary: MarkerVocabulary,
    pub heuristic: HeuristicConfig,
}

/// Accepted spellings for the `KEY: VALUE` markers the language model emits
///
/// The variants are whatever has been observed in real model output, which is
/// why they live in configuration. Keys are compared case-insensitively after
/// markdown emphasis is stripped. A key spelling that is not listed here is
/// simply not a marker, and the text falls through to the heuristic tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerVocabulary {
    /// Boolean key announcing that a redirect is requested
    pub redirect_flag_keys: Vec<String>,
    /// Key carrying the username of the handoff target
    pub username_keys: Vec<String>,
    /// Key carrying the role of the handoff target
    pub role_keys: Vec<String>,
    /// Key carrying the responsibilities the target should cover
    pub responsibility_keys: Vec<String>,
    /// Values meaning "yes" for the flag key
    pub truthy_values: Vec<String>,
    /// Values meaning "no" for the flag key
    pub falsy_values: Vec<String>,
    /// Values the model writes for "no value" in a hint key
    pub null_values: Vec<String>,
}

impl Default for MarkerVocabulary {
    fn default() -> Self {
        Self {
            redirect_flag_keys: strings(&["REDIRECT_REQUESTED", "REDIRECT_REQUEST"]),
            username_keys: strings(&[
                "USERNAME_TO_REDIRECT",
                "REDIRECT_TO_USERNAME",
                "REDIRECT_USERNAME",
            ]),
            role_keys: strings(&["ROLE_OF_THE_REDIRECT_TO", "ROLE_TO_REDIRECT", "REDIRECT_ROLE"]),
            responsibility_keys: strings(&[
                "RESPONSIBILITIES",
                "RESPONSABILTIES",
                "RESPONSABILITIES",
            ]),
            truthy_values: strings(&["yes", "true", "1", "y"]),
            falsy_values: strings(&["no", "false", "0", "n"]),
            null_values: strings(&["none", "n/a", "na", "null", "nil", "-", "unknown"]),
        }
    }
}

/// Trigger phrases for the low-confidence heuristic tier
///
/// Triggers are regular expression fragments matched case-insensitively.
/// A leading trigger is followed by the candidate name ("transfer this to
/// Patrick"), a trailing trigger follows it ("Patrick would be better suited").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    pub leading_triggers: Vec<String>,
    pub trailing_triggers: Vec<String>,
    /// Capitalized words that are never taken as a name
    pub non_name_words: Vec<String>,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            leading_triggers: strings(&[
                r"(?:redirect|transfer|forward|reassign|escalate)\s+(?:(?:this|it|the\s+(?:ticket|call|issue|request))\s+)?to",
                r"hand\s+(?:(?:this|it)\s+)?off\s+to",
                r"hand\s+(?:this|it)\s+over\s+to",
                r"pass\s+(?:this|it)\s+(?:on\s+)?to",
                r"better\s+handled\s+by",
            ]),
            trailing_triggers: strings(&[
                r"(?:would|might|could)\s+be\s+(?:better|best|more)\s+suited",
                r"is\s+(?:better|best)\s+suited",
                r"should\s+(?:handle|take)\s+(?:this|it)",
            ]),
            non_name_words: strings(&[
                "I", "The", "This", "That", "It", "He", "She", "They", "We", "You", "Someone",
                "Somebody", "Anyone", "Our", "Your", "My", "Their", "His", "Her", "Maybe",
                "Perhaps", "Probably", "Honestly", "Another", "A", "An", "Team",
            ]),
        }
    }
}

/// Matcher configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub weights: ScoringWeights,
}

/// Scoring weights for candidate ranking
///
/// The four weights sum to 1.0. When an intent carries no username hint the
/// username weight is redistributed proportionally over the other three.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Weight for exact username identity
    pub username: f64,
    /// Weight for role token overlap
    pub role: f64,
    /// Weight for responsibility / expertise keyword overlap
    pub expertise: f64,
    /// Weight for current availability
    pub availability: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            username: 0.5,
            role: 0.25,
            expertise: 0.2,
            availability: 0.05,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.username + self.role + self.expertise + self.availability
    }

    /// Weights with the username share spread over the remaining factors
    pub fn without_username(&self) -> Self {
        let rest = self.role + self.expertise + self.availability;
        if rest <= f64::EPSILON {
            return *self;
        }
        let scale = self.total() / rest;
        Self {
            username: 0.0,
            role: self.role * scale,
            expertise: self.expertise * scale,
            availability: self.availability * scale,
        }
    }
}

/// Redirect budget and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectPolicyConfig {
    /// Budget given to tickets created through the engine
    pub default_max_redirects: u32,
    /// Keep employees who already held the ticket out of the search
    pub exclude_previous_assignees: bool,
    /// Pause before the single retry after a directory failure
    pub directory_retry_backoff_ms: u64,
}

impl Default for RedirectPolicyConfig {
    fn default() -> Self {
        Self {
            default_max_redirects: 3,
            exclude_previous_assignees: true,
            directory_retry_backoff_ms: 250,
        }
    }
}

/// Logging settings as they appear in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}

impl RedirectEngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            RedirectError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        let w = &self.matching.weights;
        for (name, value) in [
            ("username", w.username),
            ("role", w.role),
            ("expertise", w.expertise),
            ("availability", w.availability),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RedirectError::configuration(format!(
                    "scoring weight '{}' must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if (w.total() - 1.0).abs() > 1e-6 {
            return Err(RedirectError::configuration(format!(
                "scoring weights must sum to 1.0, got {:.4}",
                w.total()
            )));
        }

        if self.redirect.default_max_redirects == 0 {
            return Err(RedirectError::configuration(
                "default_max_redirects must be greater than 0",
            ));
        }

        let vocab = &self.parser.vocabulary;
        for (name, list) in [
            ("redirect_flag_keys", &vocab.redirect_flag_keys),
            ("username_keys", &vocab.username_keys),
            ("role_keys", &vocab.role_keys),
            ("responsibility_keys", &vocab.responsibility_keys),
            ("truthy_values", &vocab.truthy_values),
        ] {
            if list.iter().all(|entry| entry.trim().is_empty()) {
                return Err(RedirectError::configuration(format!(
                    "parser vocabulary '{}' cannot be empty",
                    name
                )));
            }
        }

        let heuristic = &self.parser.heuristic;
        for trigger in heuristic
            .leading_triggers
            .iter()
            .chain(heuristic.trailing_triggers.iter())
        {
            regex::Regex::new(trigger).map_err(|e| {
                RedirectError::configuration(format!(
                    "invalid heuristic trigger '{}': {}",
                    trigger, e
                ))
            })?;
        }

        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RedirectEngineConfig::default();
        config.validate().expect("default configuration should validate");
        assert_eq!(config.redirect.default_max_redirects, 3);
        assert!((config.matching.weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn redistributed_weights_still_sum_to_one() {
        let weights = ScoringWeights::default().without_username();
        assert_eq!(weights.username, 0.0);
        assert!((weights.total() - 1.0).abs() < 1e-9);
        assert!((weights.role - 0.5).abs() < 1e-9);
        assert!((weights.expertise - 0.4).abs() < 1e-9);
        assert!((weights.availability - 0.1).abs() < 1e-9);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RedirectEngineConfig::from_toml_str(
            r#"
            [redirect]
            exclude_previous_assignees = false

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert!(!config.redirect.exclude_previous_assignees);
        assert_eq!(config.redirect.default_max_redirects, 3);
        assert_eq!(config.logging.level, "debug");
        assert!(config
            .parser
            .vocabulary
            .responsibility_keys
            .contains(&"RESPONSABILTIES".to_string()));
    }

    #[test]
    fn rejects_weights_that_do_not_sum_to_one() {
        let err = RedirectEngineConfig::from_toml_str(
            r#"
            [matching.weights]
            username = 0.9
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RedirectError::Configuration(_)));
    }

    #[test]
    fn rejects_zero_budget_and_bad_triggers() {
        let mut config = RedirectEngineConfig::default();
        config.redirect.default_max_redirects = 0;
        assert!(config.validate().is_err());

        let mut config = RedirectEngineConfig::default();
        config.parser.heuristic.leading_triggers.push("transfer (to".to_string());
        assert!(config.validate().is_err());

        let mut config = RedirectEngineConfig::default();
        config.parser.vocabulary.username_keys.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = RedirectEngineConfig::from_file("/nonexistent/deskcall.toml").unwrap_err();
        assert!(matches!(err, RedirectError::Configuration(_)));
    }
}
