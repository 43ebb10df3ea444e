//! Conversation transcripts
//!
//! The voice/chat layer hands conversations over in several shapes: a single
//! concatenated string, a list of speaker-tagged turns, or a JSON payload whose
//! text sits under one of a handful of keys. Everything is normalized into
//! [`Transcript`] here, before the parser or anything else sees it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who spoke an utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The person who opened the ticket
    Requester,
    /// The employee currently assigned to the ticket
    Employee,
    /// The AI assistant mediating the call
    Assistant,
    System,
    /// Any other label found in the source
    Other(String),
}

impl Speaker {
    /// Map a free-form speaker label to a speaker, if it is one we recognize
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "requester" | "customer" | "user" | "caller" | "client" => Some(Speaker::Requester),
            "employee" | "agent" | "assignee" | "staff" => Some(Speaker::Employee),
            "assistant" | "ai" | "bot" | "model" => Some(Speaker::Assistant),
            "system" => Some(Speaker::System),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Speaker::Requester => "Requester",
            Speaker::Employee => "Employee",
            Speaker::Assistant => "Assistant",
            Speaker::System => "System",
            Speaker::Other(label) => label,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One turn of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
}

impl Utterance {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }
}

/// Ordered utterances plus the raw concatenated text of a call leg
///
/// Immutable once built; the parser only ever reads [`Transcript::raw_text`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    utterances: Vec<Utterance>,
    raw: String,
}

impl Transcript {
    /// Build from a single concatenated string
    ///
    /// Lines starting with a recognized speaker label (`Employee: ...`) open a
    /// new utterance; other lines continue the previous one. The raw text is
    /// kept exactly as given.
    pub fn from_text(text: impl Into<String>) -> Self {
        let raw = text.into();
        let mut utterances: Vec<Utterance> = Vec::new();

        for line in raw.lines() {
            if let Some((label, rest)) = line.split_once(':') {
                if let Some(speaker) = Speaker::from_label(label) {
                    utterances.push(Utterance::new(speaker, rest.trim()));
                    continue;
                }
            }
            match utterances.last_mut() {
                Some(last) => {
                    last.text.push('\n');
                    last.text.push_str(line);
                }
                None if line.trim().is_empty() => {}
                None => utterances.push(Utterance::new(Speaker::Other("unlabeled".into()), line)),
            }
        }

        Self { utterances, raw }
    }

    /// Build from speaker-tagged turns
    pub fn from_utterances(utterances: Vec<Utterance>) -> Self {
        let raw = utterances
            .iter()
            .map(|u| format!("{}: {}", u.speaker, u.text))
            .collect::<Vec<_>>()
            .join("\n");
        Self { utterances, raw }
    }

    /// Build from whatever JSON shape the call layer produced
    ///
    /// Accepts a string, an array of turns, or an object carrying either text
    /// (`conversation_summary`, `response`, `conversation`, `result`, first
    /// non-empty wins) or turns (`utterances`, `messages`). Anything else yields
    /// an empty transcript.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(text) => Self::from_text(text.clone()),
            Value::Array(items) => {
                Self::from_utterances(items.iter().filter_map(utterance_from_json).collect())
            }
            Value::Object(map) => {
                for key in ["conversation_summary", "response", "conversation", "result"] {
                    match map.get(key) {
                        Some(Value::String(text)) if !text.trim().is_empty() => {
                            return Self::from_text(text.clone());
                        }
                        Some(nested @ (Value::Array(_) | Value::Object(_))) => {
                            let transcript = Self::from_json(nested);
                            if !transcript.is_empty() {
                                return transcript;
                            }
                        }
                        _ => {}
                    }
                }
                for key in ["utterances", "messages", "turns"] {
                    if let Some(Value::Array(items)) = map.get(key) {
                        return Self::from_utterances(
                            items.iter().filter_map(utterance_from_json).collect(),
                        );
                    }
                }
                Self::default()
            }
            _ => Self::default(),
        }
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }
}

impl From<&str> for Transcript {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

impl From<String> for Transcript {
    fn from(text: String) -> Self {
        Self::from_text(text)
    }
}

fn utterance_from_json(item: &Value) -> Option<Utterance> {
    match item {
        Value::String(text) => Some(Utterance::new(
            Speaker::Other("unlabeled".into()),
            text.clone(),
        )),
        Value::Object(map) => {
            let text = ["text", "content", "utterance", "message"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))?;
            let label = ["speaker", "role", "from"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .unwrap_or("unlabeled");
            let speaker =
                Speaker::from_label(label).unwrap_or_else(|| Speaker::Other(label.to_string()));
            Some(Utterance::new(speaker, text))
        }
        _ => None,
    }
}
