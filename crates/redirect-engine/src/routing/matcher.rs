//! # Employee Matching
//!
//! Weighted scoring of directory employees against a [`RedirectIntent`].
//! Pure and deterministic: the same intent and snapshot always produce the
//! same ranking.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::ScoringWeights;
use crate::directory::EmployeeRecord;
use crate::parser::RedirectIntent;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "of",
    "on", "or", "our", "the", "their", "this", "to", "with", "who", "that", "any", "all",
];

/// One ranked employee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub employee: EmployeeRecord,
    /// Weighted score in `[0, 1]`
    pub score: f64,
    /// Hint tokens found in the employee's role, expertise or responsibilities
    pub matching_terms: BTreeSet<String>,
    /// Human-readable breakdown of the score
    pub reasoning: String,
}

/// Ranks employees for a redirect intent
#[derive(Debug, Clone)]
pub struct EmployeeMatcher {
    weights: ScoringWeights,
}

/// Lowercased alphanumeric tokens without stopwords or single characters
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Share of `wanted` found in `offered`, with the overlapping tokens
fn overlap(wanted: &BTreeSet<String>, offered: &BTreeSet<String>) -> (f64, BTreeSet<String>) {
    if wanted.is_empty() {
        return (0.0, BTreeSet::new());
    }
    let common: BTreeSet<String> = wanted.intersection(offered).cloned().collect();
    (common.len() as f64 / wanted.len() as f64, common)
}

fn username_matches(hint: &str, employee: &EmployeeRecord) -> bool {
    let hint = hint.trim();
    !hint.is_empty()
        && (hint.eq_ignore_ascii_case(employee.username.trim())
            || hint.eq_ignore_ascii_case(employee.full_name.trim()))
}

impl EmployeeMatcher {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Rank every employee in the snapshot
    pub fn search(
        &self,
        intent: &RedirectIntent,
        directory: &[EmployeeRecord],
    ) -> Vec<CandidateScore> {
        self.search_with_exclusions(intent, directory, &HashSet::new())
    }

    /// Rank employees, leaving out the usernames in `excluded` (case-insensitive)
    ///
    /// Returns an empty list when the intent carries no hint at all.
    pub fn search_with_exclusions(
        &self,
        intent: &RedirectIntent,
        directory: &[EmployeeRecord],
        excluded: &HashSet<String>,
    ) -> Vec<CandidateScore> {
        if !intent.has_hints() {
            debug!("intent has no hints, nothing to match");
            return Vec::new();
        }

        let excluded: HashSet<String> = excluded.iter().map(|u| u.to_lowercase()).collect();
        let weights = if intent.username_hint.is_some() {
            self.weights
        } else {
            self.weights.without_username()
        };
        let role_tokens = intent.role_hint.as_deref().map(tokenize).unwrap_or_default();
        let responsibility_tokens = intent
            .responsibility_hint
            .as_deref()
            .map(tokenize)
            .unwrap_or_default();

        let mut ranked: Vec<CandidateScore> = directory
            .iter()
            .filter(|employee| !excluded.contains(&employee.key()))
            .filter_map(|employee| {
                self.score_employee(
                    intent,
                    employee,
                    &weights,
                    &role_tokens,
                    &responsibility_tokens,
                )
            })
            .collect();

        ranked.sort_by_key(|c| {
            (
                Reverse((c.score * 1e9).round() as i64),
                c.employee.availability_status.rank(),
                c.employee.current_workload,
                c.employee.key(),
            )
        });

        debug!(
            candidates = ranked.len(),
            top = ranked.first().map(|c| c.employee.username.as_str()).unwrap_or("-"),
            "employee search complete"
        );
        ranked
    }

    fn score_employee(
        &self,
        intent: &RedirectIntent,
        employee: &EmployeeRecord,
        weights: &ScoringWeights,
        role_tokens: &BTreeSet<String>,
        responsibility_tokens: &BTreeSet<String>,
    ) -> Option<CandidateScore> {
        if let Some(hint) = &intent.username_hint {
            if username_matches(hint, employee) {
                return Some(CandidateScore {
                    employee: employee.clone(),
                    score: 1.0,
                    matching_terms: BTreeSet::from([employee.key()]),
                    reasoning: format!("exact username match for '{}'", hint),
                });
            }
        }

        let (role_score, role_terms) = overlap(role_tokens, &tokenize(&employee.role));
        let mut offered = tokenize(&employee.expertise_text);
        offered.extend(tokenize(&employee.responsibilities_text));
        let (expertise_score, expertise_terms) = overlap(responsibility_tokens, &offered);

        if role_score <= 0.0 && expertise_score <= 0.0 {
            trace!(username = %employee.username, "no relevance signal");
            return None;
        }

        let availability = employee.availability_status.score_factor();
        let score = (weights.role * role_score
            + weights.expertise * expertise_score
            + weights.availability * availability)
            .clamp(0.0, 1.0);

        let mut reasons = Vec::new();
        if role_score > 0.0 {
            reasons.push(format!(
                "role match {:.2} ({})",
                role_score,
                role_terms.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if expertise_score > 0.0 {
            reasons.push(format!(
                "expertise match {:.2} ({})",
                expertise_score,
                expertise_terms.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        reasons.push(format!("{}", employee.availability_status));

        let mut matching_terms = role_terms;
        matching_terms.extend(expertise_terms);

        Some(CandidateScore {
            employee: employee.clone(),
            score,
            matching_terms,
            reasoning: reasons.join("; "),
        })
    }
}

impl Default for EmployeeMatcher {
    fn default() -> Self {
        Self::new(ScoringWeights::default())
    }
}
