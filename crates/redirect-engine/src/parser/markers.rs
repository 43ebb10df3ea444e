//! Marker tier: tolerant `KEY: VALUE` line scanner
//!
//! The model is prompted to emit lines such as
//!
//! ```text
//! REDIRECT_REQUESTED: ** TRUE
//! USERNAME_TO_REDIRECT: ** Patrick
//! ROLE_OF_THE_REDIRECT_TO: Product Development Lead
//! RESPONSABILTIES: roadmap, feature requests
//! ```
//!
//! and in practice decorates them with markdown emphasis, stray asterisks and
//! odd spacing, or appends them to the end of a prose sentence. Keys and values
//! are both normalized before interpretation.

use regex::Regex;

use super::{IntentExtractor, RedirectIntent, TierVerdict};
use crate::config::MarkerVocabulary;
use crate::error::{RedirectError, Result};

const DECORATION: &[char] = &['*', '_', '`', '~', '"', '\'', '.', ',', ';', ':'];
const LEADING_DECORATION: &[char] = &['*', '_', '#', '>', '-', '`', '~', ' ', '\t'];

/// Which field a marker key feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKey {
    RedirectFlag,
    Username,
    Role,
    Responsibilities,
}

/// Interpretation of the flag value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagValue {
    Yes,
    No,
    Unclear,
}

/// Strip markdown emphasis, quotes and surrounding whitespace from a marker
/// value and collapse inner whitespace
///
/// Applying it twice gives the same result as applying it once.
///
/// ```
/// use deskcall_redirect_engine::parser::normalize_marker_value;
///
/// assert_eq!(normalize_marker_value(" ** Patrick  "), "Patrick");
/// assert_eq!(normalize_marker_value("**Product   Development Lead**"), "Product Development Lead");
/// ```
pub fn normalize_marker_value(value: &str) -> String {
    value
        .trim_matches(|c: char| c.is_whitespace() || DECORATION.contains(&c))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct MarkerExtractor {
    pattern: Regex,
    flag_keys: Vec<String>,
    username_keys: Vec<String>,
    role_keys: Vec<String>,
    responsibility_keys: Vec<String>,
    truthy: Vec<String>,
    falsy: Vec<String>,
    nulls: Vec<String>,
}

impl MarkerExtractor {
    pub fn new(vocabulary: &MarkerVocabulary) -> Result<Self> {
        let upper = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|k| k.trim().to_ascii_uppercase())
                .filter(|k| !k.is_empty())
                .collect()
        };
        let lower = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .collect()
        };

        let flag_keys = upper(&vocabulary.redirect_flag_keys);
        let username_keys = upper(&vocabulary.username_keys);
        let role_keys = upper(&vocabulary.role_keys);
        let responsibility_keys = upper(&vocabulary.responsibility_keys);

        let mut all_keys: Vec<&String> = flag_keys
            .iter()
            .chain(&username_keys)
            .chain(&role_keys)
            .chain(&responsibility_keys)
            .collect();
        if all_keys.is_empty() {
            return Err(RedirectError::configuration("marker vocabulary has no keys"));
        }
        // longest first so REDIRECT_REQUESTED is preferred over REDIRECT_REQUEST
        all_keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = all_keys
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"(?i)(?:^|[^A-Za-z0-9_])({})[\s*_`~]*:", alternation))
            .map_err(|e| RedirectError::configuration(format!("invalid marker key: {}", e)))?;

        Ok(Self {
            pattern,
            flag_keys,
            username_keys,
            role_keys,
            responsibility_keys,
            truthy: lower(&vocabulary.truthy_values),
            falsy: lower(&vocabulary.falsy_values),
            nulls: lower(&vocabulary.null_values),
        })
    }

    pub(crate) fn classify_key(&self, key: &str) -> Option<MarkerKey> {
        let key = key.to_ascii_uppercase();
        if self.flag_keys.contains(&key) {
            Some(MarkerKey::RedirectFlag)
        } else if self.username_keys.contains(&key) {
            Some(MarkerKey::Username)
        } else if self.role_keys.contains(&key) {
            Some(MarkerKey::Role)
        } else if self.responsibility_keys.contains(&key) {
            Some(MarkerKey::Responsibilities)
        } else {
            None
        }
    }

    /// All `(key, raw value)` markers on one line, in order
    pub fn scan_line<'a>(&self, line: &'a str) -> Vec<(MarkerKey, &'a str)> {
        let line = line.trim_start_matches(LEADING_DECORATION);
        let hits: Vec<(MarkerKey, usize, usize)> = self
            .pattern
            .captures_iter(line)
            .filter_map(|caps| {
                let key = caps.get(1)?;
                let whole = caps.get(0)?;
                Some((self.classify_key(key.as_str())?, key.start(), whole.end()))
            })
            .collect();

        hits.iter()
            .enumerate()
            .map(|(i, &(key, _, value_start))| {
                let value_end = hits.get(i + 1).map(|&(_, next, _)| next).unwrap_or(line.len());
                (key, &line[value_start..value_end])
            })
            .collect()
    }

    /// Prose that precedes the first marker on a line
    ///
    /// `None` when the line carries no marker at all.
    pub fn prose_before_marker<'a>(&self, line: &'a str) -> Option<&'a str> {
        let stripped = line.trim_start_matches(LEADING_DECORATION);
        let caps = self.pattern.captures(stripped)?;
        let key = caps.get(1)?;
        self.classify_key(key.as_str())?;
        Some(stripped[..key.start()].trim())
    }

    /// Value of a hint key, `None` when empty or a null-like placeholder
    pub fn hint_value(&self, raw: &str) -> Option<String> {
        let value = normalize_marker_value(raw);
        if value.is_empty() || self.nulls.contains(&value.to_lowercase()) {
            None
        } else {
            Some(value)
        }
    }

    /// Interpret a flag value: `yes`, `TRUE`, `** 1`, `Yes - please` ...
    pub fn flag_value(&self, raw: &str) -> FlagValue {
        let value = normalize_marker_value(raw).to_lowercase();
        let first = value
            .split(|c: char| c.is_whitespace() || c == '-' || c == ',')
            .find(|token| !token.is_empty())
            .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
            .unwrap_or("");
        if self.truthy.iter().any(|t| t == first || *t == value) {
            FlagValue::Yes
        } else if self.falsy.iter().any(|f| f == first || *f == value) {
            FlagValue::No
        } else {
            FlagValue::Unclear
        }
    }
}

impl IntentExtractor for MarkerExtractor {
    fn name(&self) -> &'static str {
        "markers"
    }

    fn extract(&self, text: &str) -> Option<TierVerdict> {
        let mut seen_any = false;
        let mut flag: Option<FlagValue> = None;
        let mut username: Option<String> = None;
        let mut role: Option<String> = None;
        let mut responsibilities: Option<String> = None;

        for line in text.lines() {
            for (key, raw) in self.scan_line(line) {
                seen_any = true;
                match key {
                    MarkerKey::RedirectFlag => {
                        if flag.is_none() {
                            flag = Some(self.flag_value(raw));
                        }
                    }
                    MarkerKey::Username => {
                        if username.is_none() {
                            username = self.hint_value(raw);
                        }
                    }
                    MarkerKey::Role => {
                        if role.is_none() {
                            role = self.hint_value(raw);
                        }
                    }
                    MarkerKey::Responsibilities => {
                        if responsibilities.is_none() {
                            responsibilities = self.hint_value(raw);
                        }
                    }
                }
            }
        }

        if !seen_any {
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
            // keys present but nothing decisive
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> MarkerExtractor {
        MarkerExtractor::new(&MarkerVocabulary::default()).unwrap()
    }

    #[test]
    fn normalization_strips_decoration() {
        assert_eq!(normalize_marker_value("** TRUE"), "TRUE");
        assert_eq!(normalize_marker_value("`omar`"), "omar");
        assert_eq!(normalize_marker_value("  __DevOps   Engineer__ "), "DevOps Engineer");
        assert_eq!(normalize_marker_value("***"), "");
    }

    #[test]
    fn flag_values() {
        let m = extractor();
        assert_eq!(m.flag_value("** TRUE"), FlagValue::Yes);
        assert_eq!(m.flag_value("Yes - the DBA team"), FlagValue::Yes);
        assert_eq!(m.flag_value(" 1 "), FlagValue::Yes);
        assert_eq!(m.flag_value("**false**"), FlagValue::No);
        assert_eq!(m.flag_value("maybe later"), FlagValue::Unclear);
    }

    #[test]
    fn emphasized_keys_and_inline_markers() {
        let m = extractor();
        let hits = m.scan_line("**REDIRECT_REQUEST**: YES");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, MarkerKey::RedirectFlag);

        let hits = m.scan_line("Employee: better for DevOps. redirect_requested: True");
        assert_eq!(hits.len(), 1);
        assert_eq!(m.flag_value(hits[0].1), FlagValue::Yes);

        let hits = m.scan_line("REDIRECT_REQUEST: YES USERNAME_TO_REDIRECT: omar");
        assert_eq!(hits.len(), 2);
        assert_eq!(m.flag_value(hits[0].1), FlagValue::Yes);
        assert_eq!(m.hint_value(hits[1].1).as_deref(), Some("omar"));
    }

    #[test]
    fn unknown_key_spellings_are_not_markers() {
        let m = extractor();
        assert!(m.scan_line("REDIRECTION_WANTED: yes").is_empty());
        assert!(m.extract("REDIRECTION_WANTED: yes\nUSER: omar").is_none());
    }

    #[test]
    fn null_like_hints_are_absent() {
        let m = extractor();
        let verdict = m.extract("REDIRECT_REQUESTED: FALSE\nUSERNAME_TO_REDIRECT: None");
        assert_eq!(verdict, Some(TierVerdict::NoRedirect));

        let verdict = m.extract("REDIRECT_REQUESTED: TRUE\nUSERNAME_TO_REDIRECT: N/A");
        assert_eq!(
            verdict,
            Some(TierVerdict::FlaggedWithoutTarget { responsibility_hint: None })
        );
    }

    #[test]
    fn hints_without_flag_still_redirect() {
        let m = extractor();
        match m.extract("ROLE_OF_THE_REDIRECT_TO: ** Network Engineer **") {
            Some(TierVerdict::Redirect(intent)) => {
                assert_eq!(intent.role_hint.as_deref(), Some("Network Engineer"));
                assert_eq!(intent.username_hint, None);
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }

    #[test]
    fn prose_before_marker() {
        let m = extractor();
        assert_eq!(
            m.prose_before_marker("Employee: I think DevOps fits. REDIRECT_REQUESTED: True"),
            Some("Employee: I think DevOps fits.")
        );
        assert_eq!(m.prose_before_marker("**USERNAME_TO_REDIRECT**: bob"), Some(""));
        assert_eq!(m.prose_before_marker("Just prose here"), None);
    }
}
