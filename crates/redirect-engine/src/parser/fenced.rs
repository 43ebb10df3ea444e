//! Fenced JSON tier
//!
//! Picks up code-fenced JSON objects anywhere in the text, with or without a
//! language tag on the fence. Bodies that do not parse are skipped silently.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::markers::{FlagValue, MarkerExtractor, MarkerKey};
use super::{IntentExtractor, RedirectIntent, StructuredBlock, TierVerdict};

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*(.*?)```").expect("fenced block pattern is valid")
});

/// Every fenced block body that parses as a JSON object, in order
pub fn fenced_objects(text: &str) -> impl Iterator<Item = Map<String, Value>> + '_ {
    FENCED_BLOCK.captures_iter(text).filter_map(|caps| {
        let body = caps.get(1)?.as_str().trim();
        if !body.starts_with('{') {
            return None;
        }
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    })
}

/// The first fenced JSON object, with `score` / `explanation` lifted out
pub fn first_structured_block(text: &str) -> Option<StructuredBlock> {
    let fields = fenced_objects(text).next()?;
    let score = fields.get("score").and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    });
    let explanation = fields
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(StructuredBlock {
        score,
        explanation,
        fields,
    })
}

pub struct FencedJsonExtractor {
    markers: MarkerExtractor,
}

impl FencedJsonExtractor {
    /// Uses the same vocabulary as the marker tier for keys and values
    pub fn new(markers: MarkerExtractor) -> Self {
        Self { markers }
    }

    fn flag(&self, value: &Value) -> FlagValue {
        match value {
            Value::Bool(true) => FlagValue::Yes,
            Value::Bool(false) => FlagValue::No,
            Value::Number(n) => match n.as_i64() {
                Some(1) => FlagValue::Yes,
                Some(0) => FlagValue::No,
                _ => FlagValue::Unclear,
            },
            Value::String(s) => self.markers.flag_value(s),
            _ => FlagValue::Unclear,
        }
    }

    fn hint(&self, value: &Value) -> Option<String> {
        match value {
            Value::String(s) => self.markers.hint_value(s),
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| self.markers.hint_value(s))
                    .collect::<Vec<_>>()
                    .join(", ");
                (!joined.is_empty()).then_some(joined)
            }
            _ => None,
        }
    }

    fn verdict(&self, object: &Map<String, Value>) -> Option<TierVerdict> {
        let mut recognized = false;
        let mut flag = None;
        let mut username = None;
        let mut role = None;
        let mut responsibilities = None;

        for (key, value) in object {
            let key = key.trim().replace(['-', ' '], "_");
            let Some(kind) = self.markers.classify_key(&key) else {
                continue;
            };
            recognized = true;
            match kind {
                MarkerKey::RedirectFlag => flag = flag.or(Some(self.flag(value))),
                MarkerKey::Username => username = username.or_else(|| self.hint(value)),
                MarkerKey::Role => role = role.or_else(|| self.hint(value)),
                MarkerKey::Responsibilities => {
                    responsibilities = responsibilities.or_else(|| self.hint(value))
                }
            }
        }

        if !recognized {
            return None;
        }
        let has_target = username.is_some() || role.is_some();
        match flag {
            Some(FlagValue::No) => Some(TierVerdict::NoRedirect),
            Some(FlagValue::Yes) if !has_target => Some(TierVerdict::FlaggedWithoutTarget {
                responsibility_hint: responsibilities,
            }),
            _ if has_target => Some(TierVerdict::Redirect(RedirectIntent::marker(
                username,
                role,
                responsibilities,
            ))),
            _ => None,
        }
    }
}

impl IntentExtractor for FencedJsonExtractor {
    fn name(&self) -> &'static str {
        "fenced_json"
    }

    fn extract(&self, text: &str) -> Option<TierVerdict> {
        fenced_objects(text).find_map(|object| self.verdict(&object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarkerVocabulary;

    fn extractor() -> FencedJsonExtractor {
        FencedJsonExtractor::new(MarkerExtractor::new(&MarkerVocabulary::default()).unwrap())
    }

    #[test]
    fn score_block_with_and_without_language_tag() {
        let tagged =
            first_structured_block("```json\n{\"score\": 8, \"explanation\": \"Good\"}\n```")
                .unwrap();
        assert_eq!(tagged.score, Some(8.0));
        assert_eq!(tagged.explanation.as_deref(), Some("Good"));

        let bare = first_structured_block(
            "The reviewer said:\n```\n\
             {\"score\": \"7.5\",\n \"explanation\": \"Clear steps\"}\n```\nend",
        )
        .unwrap();
        assert_eq!(bare.score, Some(7.5));
        assert_eq!(bare.fields.len(), 2);
    }

    #[test]
    fn skips_unparseable_blocks() {
        let text = "```\nnot json at all\n```\n```json\n{\"score\": 3}\n```";
        assert_eq!(first_structured_block(text).unwrap().score, Some(3.0));
        assert!(first_structured_block("```json\n[1, 2, 3]\n```").is_none());
        assert!(first_structured_block("no fences").is_none());
    }

    #[test]
    fn redirect_payload() {
        let text = r#"Summary below.
```json
{
  "redirect_requested": true,
  "username_to_redirect": "omar",
  "responsibilities": ["deployments", "monitoring"]
}
```"#;
        match extractor().extract(text) {
            Some(TierVerdict::Redirect(intent)) => {
                assert_eq!(intent.username_hint.as_deref(), Some("omar"));
                assert_eq!(intent.responsibility_hint.as_deref(), Some("deployments, monitoring"));
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }

    #[test]
    fn evaluation_payload_is_not_a_verdict() {
        let text = "```json\n{\"score\": 8, \"explanation\": \"Good\"}\n```";
        assert_eq!(extractor().extract(text), None);
    }

    #[test]
    fn explicit_false_payload() {
        assert_eq!(
            extractor().extract("```\n{\"redirect-requested\": 0}\n```"),
            Some(TierVerdict::NoRedirect)
        );
    }
}
