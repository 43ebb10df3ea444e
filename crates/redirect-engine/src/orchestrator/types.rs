//! Types shared by the redirect coordinator and the completion handler

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RedirectError;
use crate::routing::CandidateScore;
use crate::ticket::{TicketId, TicketRedirectState, TicketUpdate};

/// States of one redirect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedirectPhase {
    Active,
    RedirectPending,
    CandidateFound,
    Transferred,
    NoCandidate,
    LimitExceeded,
    Completed,
}

impl RedirectPhase {
    /// Whether the redirect attempt stops here
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RedirectPhase::Transferred
                | RedirectPhase::NoCandidate
                | RedirectPhase::LimitExceeded
                | RedirectPhase::Completed
        )
    }
}

impl fmt::Display for RedirectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RedirectPhase::Active => "ACTIVE",
            RedirectPhase::RedirectPending => "REDIRECT_PENDING",
            RedirectPhase::CandidateFound => "CANDIDATE_FOUND",
            RedirectPhase::Transferred => "TRANSFERRED",
            RedirectPhase::NoCandidate => "NO_CANDIDATE",
            RedirectPhase::LimitExceeded => "LIMIT_EXCEEDED",
            RedirectPhase::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// One live call leg of a ticket
///
/// Records which assignee the conversation was held with, so a redirect
/// requested on an old leg cannot move a ticket that already moved on. Clones
/// share the hang-up flag.
#[derive(Debug, Clone)]
pub struct CallHandle {
    pub ticket_id: TicketId,
    pub assignee: String,
    active: Arc<AtomicBool>,
}

impl CallHandle {
    pub fn new(ticket_id: TicketId, assignee: impl Into<String>) -> Self {
        Self {
            ticket_id,
            assignee: assignee.into(),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Mark the call as ended by the external call layer
    pub fn hang_up(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Instruction for the telephony layer to ring the new assignee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTransferCommand {
    pub ticket_id: TicketId,
    pub to_username: String,
    pub reason: String,
}

/// Result of one redirect attempt
#[derive(Debug, Clone, Serialize)]
pub struct RedirectOutcome {
    /// Terminal phase reached
    pub phase: RedirectPhase,
    /// Every phase visited, in order
    pub transitions: Vec<RedirectPhase>,
    /// Ticket state as persisted at the end of the attempt
    pub state: TicketRedirectState,
    pub update: TicketUpdate,
    /// Present only when the ticket was transferred
    pub transfer: Option<CallTransferCommand>,
    /// Ranked candidates considered, empty when the search was skipped
    pub candidates: Vec<CandidateScore>,
}

impl RedirectOutcome {
    pub fn transferred(&self) -> bool {
        self.phase == RedirectPhase::Transferred
    }

    /// Why the attempt fell back to a human, if it did
    pub fn escalation(&self) -> Option<RedirectError> {
        match self.phase {
            RedirectPhase::NoCandidate => Some(RedirectError::NoCandidateFound(format!(
                "no reachable employee for ticket {}, kept with {}",
                self.state.ticket_id, self.state.current_assignee
            ))),
            RedirectPhase::LimitExceeded => Some(RedirectError::RedirectLimitExceeded(format!(
                "ticket {} used {}/{} redirects, kept with {}",
                self.state.ticket_id,
                self.state.redirect_count,
                self.state.max_redirects,
                self.state.current_assignee
            ))),
            _ => None,
        }
    }
}

/// How a call leg was finalized
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// A redirect was requested and handed to the coordinator
    Redirected(RedirectOutcome),
    /// A solution was found and the ticket closed
    Completed(TicketUpdate),
    /// The call ended without solution or redirect
    EndedUnresolved(TicketUpdate),
}

impl CompletionOutcome {
    pub fn update(&self) -> &TicketUpdate {
        match self {
            CompletionOutcome::Redirected(outcome) => &outcome.update,
            CompletionOutcome::Completed(update) | CompletionOutcome::EndedUnresolved(update) => {
                update
            }
        }
    }

    /// Where the ticket's redirect state machine ended up for this leg
    ///
    /// An unresolved leg leaves the ticket `ACTIVE` for the next call.
    pub fn phase(&self) -> RedirectPhase {
        match self {
            CompletionOutcome::Redirected(outcome) => outcome.phase,
            CompletionOutcome::Completed(_) => RedirectPhase::Completed,
            CompletionOutcome::EndedUnresolved(_) => RedirectPhase::Active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketStatus;

    #[test]
    fn hang_up_is_shared_between_clones() {
        let call = CallHandle::new("T-1".into(), "alice");
        let seen_by_coordinator = call.clone();
        assert!(seen_by_coordinator.is_active());
        call.hang_up();
        assert!(!seen_by_coordinator.is_active());
    }

    #[test]
    fn phase_names() {
        assert_eq!(RedirectPhase::LimitExceeded.to_string(), "LIMIT_EXCEEDED");
        assert_eq!(
            serde_json::to_string(&RedirectPhase::RedirectPending).unwrap(),
            "\"REDIRECT_PENDING\""
        );
        assert!(!RedirectPhase::CandidateFound.is_terminal());
    }

    fn outcome(phase: RedirectPhase) -> RedirectOutcome {
        let mut state = TicketRedirectState::new("T-1".into(), "alice", 1);
        state.record_redirect("bob", "first").unwrap();
        RedirectOutcome {
            phase,
            transitions: vec![RedirectPhase::Active, RedirectPhase::RedirectPending, phase],
            update: TicketUpdate::from_state(&state, TicketStatus::InProgress),
            state,
            transfer: None,
            candidates: Vec::new(),
        }
    }

    #[test]
    fn escalations_carry_their_reason() {
        assert!(matches!(
            outcome(RedirectPhase::NoCandidate).escalation(),
            Some(RedirectError::NoCandidateFound(_))
        ));
        let limit = outcome(RedirectPhase::LimitExceeded).escalation().unwrap();
        assert!(matches!(limit, RedirectError::RedirectLimitExceeded(_)));
        assert!(limit.to_string().contains("1/1"));
        assert!(outcome(RedirectPhase::Transferred).escalation().is_none());
    }

    #[test]
    fn completion_phases() {
        let update = TicketUpdate::from_state(
            &TicketRedirectState::new("T-2".into(), "alice", 3),
            TicketStatus::Completed,
        );
        assert_eq!(CompletionOutcome::Completed(update.clone()).phase(), RedirectPhase::Completed);
        assert_eq!(CompletionOutcome::EndedUnresolved(update).phase(), RedirectPhase::Active);
        assert_eq!(
            CompletionOutcome::Redirected(outcome(RedirectPhase::LimitExceeded)).phase(),
            RedirectPhase::LimitExceeded
        );
    }
}
