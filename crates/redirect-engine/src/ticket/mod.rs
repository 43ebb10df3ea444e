//! # Ticket Redirect State
//!
//! Per-ticket redirect bookkeeping: the bounded redirect budget, the
//! append-only history of handoffs, the call status and the human-review
//! flag. State is persisted through a [`TicketStateStore`] with optimistic
//! versioning, so two writers racing on the same ticket cannot both win.
//!
//! ## Lifecycle
//!
//! ```text
//!  NotInitiated ──► Initiated ──► InProgress ──► Ended ──────► (ticket stays open)
//!                      ▲              │
//!                      │              └────────► Completed ──► (ticket closed)
//!                      │
//!                      └── redirect commits a new call leg
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{RedirectError, Result};

/// Ticket identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub String);

impl TicketId {
    /// Fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TicketId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// State of the call leg attached to a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    NotInitiated,
    Initiated,
    InProgress,
    Ended,
    Completed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::NotInitiated => "not_initiated",
            CallStatus::Initiated => "initiated",
            CallStatus::InProgress => "in_progress",
            CallStatus::Ended => "ended",
            CallStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "not_initiated" => Ok(CallStatus::NotInitiated),
            "initiated" => Ok(CallStatus::Initiated),
            "in_progress" => Ok(CallStatus::InProgress),
            "ended" => Ok(CallStatus::Ended),
            "completed" => Ok(CallStatus::Completed),
            other => Err(RedirectError::storage(format!("unknown call status: {}", other))),
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed handoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHistoryEntry {
    pub from_employee: String,
    pub to_employee: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Redirect bookkeeping for one ticket
///
/// `redirect_count` always equals `redirect_history.len()` and never exceeds
/// `max_redirects`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRedirectState {
    pub ticket_id: TicketId,
    pub redirect_count: u32,
    pub max_redirects: u32,
    pub redirect_history: Vec<RedirectHistoryEntry>,
    pub call_status: CallStatus,
    pub current_assignee: String,
    pub requires_human_review: bool,
    /// Optimistic concurrency token, bumped on every successful save
    pub version: u64,
}

impl TicketRedirectState {
    pub fn new(ticket_id: TicketId, assignee: impl Into<String>, max_redirects: u32) -> Self {
        Self {
            ticket_id,
            redirect_count: 0,
            max_redirects,
            redirect_history: Vec::new(),
            call_status: CallStatus::NotInitiated,
            current_assignee: assignee.into(),
            requires_human_review: false,
            version: 0,
        }
    }

    pub fn can_redirect(&self) -> bool {
        self.redirect_count < self.max_redirects
    }

    pub fn remaining_redirects(&self) -> u32 {
        self.max_redirects.saturating_sub(self.redirect_count)
    }

    /// Everyone who held the ticket before the current assignee, lowercased
    pub fn previous_assignees(&self) -> HashSet<String> {
        self.redirect_history
            .iter()
            .map(|entry| entry.from_employee.to_lowercase())
            .collect()
    }

    /// Append a handoff to the current assignee's successor
    ///
    /// Moves `current_assignee` and increments the count. Fails when the
    /// budget is spent.
    pub fn record_redirect(
        &mut self,
        to_employee: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<()> {
        if !self.can_redirect() {
            return Err(RedirectError::RedirectLimitExceeded(format!(
                "ticket {} already used {}/{} redirects",
                self.ticket_id, self.redirect_count, self.max_redirects
            )));
        }
        let to_employee = to_employee.into();
        self.redirect_history.push(RedirectHistoryEntry {
            from_employee: self.current_assignee.clone(),
            to_employee: to_employee.clone(),
            reason: reason.into(),
            timestamp: Utc::now(),
        });
        self.redirect_count += 1;
        self.current_assignee = to_employee;
        Ok(())
    }

    /// `redirect_count` matches the history and stays within budget
    pub fn is_consistent(&self) -> bool {
        self.redirect_count as usize == self.redirect_history.len()
            && self.redirect_count <= self.max_redirects
    }
}

/// Ticket status written back to the ticketing system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    InProgress,
    Reassigned,
    Completed,
}

/// Change set produced for a ticket at the end of a call leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdate {
    pub ticket_id: TicketId,
    pub status: TicketStatus,
    pub call_status: CallStatus,
    pub assigned_to: String,
    pub resolution_text: Option<String>,
    pub requires_human_review: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TicketUpdate {
    /// Update mirroring the given state, with no resolution
    pub fn from_state(state: &TicketRedirectState, status: TicketStatus) -> Self {
        Self {
            ticket_id: state.ticket_id.clone(),
            status,
            call_status: state.call_status,
            assigned_to: state.current_assignee.clone(),
            resolution_text: None,
            requires_human_review: state.requires_human_review,
            completed_at: None,
        }
    }
}

/// Persistence for ticket redirect state
#[async_trait]
pub trait TicketStateStore: Send + Sync {
    /// Store a new ticket; fails with a state conflict if it already exists
    async fn insert(&self, state: TicketRedirectState) -> Result<TicketRedirectState>;

    /// Current state; [`RedirectError::NotFound`] for unknown tickets
    async fn load(&self, ticket_id: &TicketId) -> Result<TicketRedirectState>;

    /// Conditional write
    ///
    /// Succeeds only when the stored version equals `state.version`, and
    /// returns the state with its version bumped. A mismatch is a
    /// [`RedirectError::StateConflict`].
    async fn save(&self, state: &TicketRedirectState) -> Result<TicketRedirectState>;
}

/// Ticket store held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTicketStore {
    tickets: Arc<DashMap<TicketId, TicketRedirectState>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

#[async_trait]
impl TicketStateStore for InMemoryTicketStore {
    async fn insert(&self, state: TicketRedirectState) -> Result<TicketRedirectState> {
        use dashmap::mapref::entry::Entry;

        match self.tickets.entry(state.ticket_id.clone()) {
            Entry::Occupied(_) => Err(RedirectError::state_conflict(format!(
                "ticket {} already exists",
                state.ticket_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(state.clone());
                Ok(state)
            }
        }
    }

    async fn load(&self, ticket_id: &TicketId) -> Result<TicketRedirectState> {
        self.tickets
            .get(ticket_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RedirectError::not_found(format!("ticket {}", ticket_id)))
    }

    async fn save(&self, state: &TicketRedirectState) -> Result<TicketRedirectState> {
        let mut stored = self
            .tickets
            .get_mut(&state.ticket_id)
            .ok_or_else(|| RedirectError::not_found(format!("ticket {}", state.ticket_id)))?;

        if stored.version != state.version {
            return Err(RedirectError::state_conflict(format!(
                "ticket {} is at version {}, write was based on {}",
                state.ticket_id, stored.version, state.version
            )));
        }

        let mut next = state.clone();
        next.version += 1;
        *stored = next.clone();
        debug!(ticket = %state.ticket_id, version = next.version, "ticket state saved");
        Ok(next)
    }
}
