//! # Redirect Routing
//!
//! Decides who a ticket should move to once the parser found a handoff
//! request. The matcher ranks every employee in a directory snapshot against
//! the intent's hints; the coordinator then takes the best reachable one.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RedirectIntent                           │
//! │  (username hint, role hint, responsibility hint)            │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────────────┐
//! │                  EmployeeMatcher                            │
//! │  - Exact username identity                                  │
//! │  - Role token overlap                                       │
//! │  - Responsibility / expertise keyword overlap               │
//! │  - Availability bonus                                       │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                 ranked CandidateScore list
//!       (score desc, availability, workload, username)
//! ```
//!
//! ## Scoring
//!
//! | factor        | default weight | value                                      |
//! |---------------|----------------|--------------------------------------------|
//! | username      | 0.50           | 1.0 on exact case-insensitive match        |
//! | role          | 0.25           | share of role-hint tokens found in role    |
//! | expertise     | 0.20           | share of responsibility tokens found       |
//! | availability  | 0.05           | available 1.0, busy 0.5, offline 0.0       |
//!
//! An exact username match short-circuits to a score of 1.0. Without a
//! username hint the username weight is spread proportionally over the other
//! three factors. Availability alone never qualifies an employee: someone
//! with no role or keyword overlap is left out of the list.
//!
//! ## Quick Start
//!
//! ```rust
//! use deskcall_redirect_engine::config::ScoringWeights;
//! use deskcall_redirect_engine::directory::EmployeeRecord;
//! use deskcall_redirect_engine::parser::RedirectIntent;
//! use deskcall_redirect_engine::routing::EmployeeMatcher;
//!
//! let directory = vec![
//!     EmployeeRecord::new("omar", "DevOps Engineer").with_expertise("deployment, monitoring"),
//!     EmployeeRecord::new("carla", "Billing Specialist").with_expertise("invoices, refunds"),
//! ];
//!
//! let matcher = EmployeeMatcher::new(ScoringWeights::default());
//! let intent = RedirectIntent::marker(None, Some("DevOps Engineer".into()), None);
//!
//! let ranked = matcher.search(&intent, &directory);
//! assert_eq!(ranked[0].employee.username, "omar");
//! ```

pub mod matcher;

pub use matcher::{CandidateScore, EmployeeMatcher};
