//! # Conversation Parser
//!
//! Turns the free text a language model produced for a call into a verdict:
//! either a handoff intent ([`RedirectIntent`]) or a [`SolutionSummary`] used to
//! close the ticket.
//!
//! Detection is an ordered pipeline of [`IntentExtractor`] tiers. The first tier
//! that reaches a verdict wins:
//!
//! ```text
//!   raw text
//!      │
//!      ▼
//! ┌──────────────┐  KEY: VALUE lines (REDIRECT_REQUESTED, USERNAME_TO_REDIRECT, ...)
//! │ markers      │──────────────────────────────────────────────► confidence = marker
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  ```json { "redirect_requested": true, ... } ```
//! │ fenced JSON  │──────────────────────────────────────────────► confidence = marker
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  "transfer this to Patrick", "Omar would be better suited"
//! │ heuristic    │──────────────────────────────────────────────► confidence = heuristic
//! └──────┬───────┘
//!        ▼
//!   no redirect: first prose block becomes the solution
//! ```
//!
//! A tier can also flag a redirect without naming a target (`REDIRECT_REQUEST: YES`
//! and nothing else). Later tiers then get a chance to supply the target; if none
//! does, the intent is emitted at heuristic confidence with no hints.
//!
//! Parsing never fails. Malformed input degrades to "no redirect, no solution".
//!
//! ```
//! use deskcall_redirect_engine::parser::{ConversationParser, Confidence};
//!
//! let parser = ConversationParser::default();
//! let outcome = parser.parse("REDIRECT_REQUESTED: ** TRUE\nUSERNAME_TO_REDIRECT: ** Patrick");
//!
//! let intent = outcome.intent();
//! assert!(intent.requested);
//! assert_eq!(intent.username_hint.as_deref(), Some("Patrick"));
//! assert_eq!(intent.confidence, Confidence::Marker);
//! ```

pub mod fenced;
pub mod heuristic;
pub mod markers;
pub mod solution;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ParserConfig;
use crate::error::{RedirectError, Result};
use crate::transcript::Transcript;

pub use fenced::FencedJsonExtractor;
pub use heuristic::HeuristicExtractor;
pub use markers::{normalize_marker_value, MarkerExtractor};

/// How a redirect intent was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Explicit structured output (marker lines or a JSON payload)
    Marker,
    /// Trigger phrase detection
    Heuristic,
    /// Nothing detected
    None,
}

/// Parsed handoff request
///
/// When `requested` is true at least one of `username_hint` / `role_hint` is
/// set, unless the confidence is [`Confidence::Heuristic`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedirectIntent {
    pub requested: bool,
    pub username_hint: Option<String>,
    pub role_hint: Option<String>,
    pub responsibility_hint: Option<String>,
    pub confidence: Confidence,
}

impl RedirectIntent {
    /// No redirect detected
    pub fn none() -> Self {
        Self {
            requested: false,
            username_hint: None,
            role_hint: None,
            responsibility_hint: None,
            confidence: Confidence::None,
        }
    }

    /// Structured redirect naming a target
    pub fn marker(
        username_hint: Option<String>,
        role_hint: Option<String>,
        responsibility_hint: Option<String>,
    ) -> Self {
        Self {
            requested: true,
            username_hint,
            role_hint,
            responsibility_hint,
            confidence: Confidence::Marker,
        }
    }

    /// Low-confidence redirect, possibly without any hint
    pub fn heuristic(username_hint: Option<String>) -> Self {
        Self {
            requested: true,
            username_hint,
            role_hint: None,
            responsibility_hint: None,
            confidence: Confidence::Heuristic,
        }
    }

    pub fn has_target(&self) -> bool {
        self.username_hint.is_some() || self.role_hint.is_some()
    }

    pub fn has_hints(&self) -> bool {
        self.has_target() || self.responsibility_hint.is_some()
    }

    /// Whether the intent respects the hint/confidence invariant
    pub fn is_well_formed(&self) -> bool {
        if !self.requested {
            return self.confidence == Confidence::None;
        }
        match self.confidence {
            Confidence::Marker => self.has_target(),
            Confidence::Heuristic => true,
            Confidence::None => false,
        }
    }

    /// Short human-readable reason recorded in the redirect history
    pub fn summary(&self) -> String {
        if let Some(responsibilities) = &self.responsibility_hint {
            return responsibilities.clone();
        }
        let mut parts = Vec::new();
        if let Some(username) = &self.username_hint {
            parts.push(format!("requested {}", username));
        }
        if let Some(role) = &self.role_hint {
            parts.push(format!("needs a {}", role));
        }
        if parts.is_empty() {
            "specialized expertise needed".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Default for RedirectIntent {
    fn default() -> Self {
        Self::none()
    }
}

/// Structured data lifted out of a fenced JSON block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredBlock {
    pub score: Option<f64>,
    pub explanation: Option<String>,
    pub fields: Map<String, Value>,
}

/// What the parser found when no redirect was requested
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionSummary {
    /// First prose block of the text; `None` when there is no content at all
    pub solution: Option<String>,
    /// First fenced JSON object in the text, if any
    pub structured: Option<StructuredBlock>,
}

/// Parser verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseOutcome {
    Redirect(RedirectIntent),
    Resolution(SolutionSummary),
}

impl ParseOutcome {
    /// The redirect intent; a non-request for resolutions
    pub fn intent(&self) -> RedirectIntent {
        match self {
            ParseOutcome::Redirect(intent) => intent.clone(),
            ParseOutcome::Resolution(_) => RedirectIntent::none(),
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, ParseOutcome::Redirect(intent) if intent.requested)
    }

    pub fn solution(&self) -> Option<&str> {
        match self {
            ParseOutcome::Resolution(summary) => summary.solution.as_deref(),
            ParseOutcome::Redirect(_) => None,
        }
    }

    pub fn structured(&self) -> Option<&StructuredBlock> {
        match self {
            ParseOutcome::Resolution(summary) => summary.structured.as_ref(),
            ParseOutcome::Redirect(_) => None,
        }
    }
}

/// What a single tier concluded
#[derive(Debug, Clone, PartialEq)]
pub enum TierVerdict {
    /// Redirect with a usable target
    Redirect(RedirectIntent),
    /// Redirect announced but no username or role given
    FlaggedWithoutTarget { responsibility_hint: Option<String> },
    /// Explicitly no redirect
    NoRedirect,
}

/// One strategy in the parsing pipeline
///
/// Returns `None` when the tier found nothing it recognizes, letting the next
/// tier try.
pub trait IntentExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, text: &str) -> Option<TierVerdict>;
}

/// Tiered-fallback parser over language-model output
pub struct ConversationParser {
    tiers: Vec<Box<dyn IntentExtractor>>,
    markers: MarkerExtractor,
}

impl ConversationParser {
    /// Build the standard marker → fenced JSON → heuristic pipeline
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let markers = MarkerExtractor::new(&config.vocabulary)?;
        let tiers: Vec<Box<dyn IntentExtractor>> = vec![
            Box::new(markers.clone()),
            Box::new(FencedJsonExtractor::new(markers.clone())),
            Box::new(HeuristicExtractor::new(&config.heuristic)?),
        ];
        Ok(Self { tiers, markers })
    }

    /// Build with a custom tier list
    pub fn with_tiers(config: &ParserConfig, tiers: Vec<Box<dyn IntentExtractor>>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(RedirectError::configuration("parser needs at least one tier"));
        }
        Ok(Self {
            tiers,
            markers: MarkerExtractor::new(&config.vocabulary)?,
        })
    }

    /// Parse a normalized transcript
    pub fn parse_transcript(&self, transcript: &Transcript) -> ParseOutcome {
        self.parse(transcript.raw_text())
    }

    /// Parse raw conversational text
    pub fn parse(&self, raw_text: &str) -> ParseOutcome {
        let mut flagged: Option<(&'static str, Option<String>)> = None;

        for tier in &self.tiers {
            let Some(verdict) = tier.extract(raw_text) else {
                continue;
            };
            match verdict {
                TierVerdict::Redirect(mut intent) => {
                    if intent.responsibility_hint.is_none() {
                        if let Some((_, hint)) = &flagged {
                            intent.responsibility_hint = hint.clone();
                        }
                    }
                    debug!(tier = tier.name(), ?intent, "redirect detected");
                    return ParseOutcome::Redirect(intent);
                }
                TierVerdict::FlaggedWithoutTarget { responsibility_hint } => {
                    if flagged.is_none() {
                        debug!(
                            tier = tier.name(),
                            "redirect flagged without a target, trying later tiers"
                        );
                        flagged = Some((tier.name(), responsibility_hint));
                    }
                }
                TierVerdict::NoRedirect => {
                    // an earlier tier already flagged the redirect
                    if flagged.is_some() {
                        continue;
                    }
                    debug!(tier = tier.name(), "explicitly no redirect");
                    return ParseOutcome::Resolution(self.summarize(raw_text));
                }
            }
        }

        if let Some((tier, responsibility_hint)) = flagged {
            debug!(tier, "no tier supplied a target, emitting heuristic intent");
            let mut intent = RedirectIntent::heuristic(None);
            intent.responsibility_hint = responsibility_hint;
            return ParseOutcome::Redirect(intent);
        }

        ParseOutcome::Resolution(self.summarize(raw_text))
    }

    fn summarize(&self, raw_text: &str) -> SolutionSummary {
        SolutionSummary {
            solution: solution::extract_solution(raw_text, &self.markers),
            structured: fenced::first_structured_block(raw_text),
        }
    }
}

impl Default for ConversationParser {
    fn default() -> Self {
        Self::new(&ParserConfig::default()).expect("default parser configuration is valid")
    }
}
