//! Redirect state machine
//!
//! ```text
//!  ACTIVE ──redirect signal──► REDIRECT_PENDING
//!                                 │
//!            budget spent ────────┼──────────────► LIMIT_EXCEEDED
//!                                 │
//!            no candidate ────────┼──────────────► NO_CANDIDATE
//!                                 ▼
//!                           CANDIDATE_FOUND
//!                                 │
//!            call hung up /       │
//!            candidate offline ───┼──────────────► NO_CANDIDATE
//!                                 ▼
//!                            TRANSFERRED
//! ```
//!
//! `LIMIT_EXCEEDED` and `NO_CANDIDATE` leave the ticket with its current
//! assignee and flag it for human review.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::transfer::CallTransferSink;
use super::types::{CallHandle, CallTransferCommand, RedirectOutcome, RedirectPhase};
use crate::config::RedirectPolicyConfig;
use crate::directory::{EmployeeDirectory, EmployeeRecord};
use crate::error::{RedirectError, Result};
use crate::parser::RedirectIntent;
use crate::routing::{CandidateScore, EmployeeMatcher};
use crate::ticket::{
    CallStatus, TicketId, TicketRedirectState, TicketStateStore, TicketStatus, TicketUpdate,
};

/// Drives redirect attempts for any number of tickets
///
/// Attempts on the same ticket are serialized by a per-ticket lock; the store's
/// version check catches writers that bypass this coordinator.
pub struct RedirectCoordinator {
    matcher: EmployeeMatcher,
    directory: Arc<dyn EmployeeDirectory>,
    store: Arc<dyn TicketStateStore>,
    transfers: Arc<dyn CallTransferSink>,
    policy: RedirectPolicyConfig,
    ticket_locks: DashMap<TicketId, Arc<Mutex<()>>>,
}

/// First candidate that is reachable according to the snapshot
fn top_reachable(candidates: &[CandidateScore]) -> Option<&CandidateScore> {
    candidates
        .iter()
        .find(|c| c.employee.availability_status.is_reachable())
}

impl RedirectCoordinator {
    pub fn new(
        matcher: EmployeeMatcher,
        directory: Arc<dyn EmployeeDirectory>,
        store: Arc<dyn TicketStateStore>,
        transfers: Arc<dyn CallTransferSink>,
        policy: RedirectPolicyConfig,
    ) -> Self {
        Self {
            matcher,
            directory,
            store,
            transfers,
            policy,
            ticket_locks: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &RedirectPolicyConfig {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn TicketStateStore> {
        &self.store
    }

    pub(crate) fn ticket_lock(&self, ticket_id: &TicketId) -> Arc<Mutex<()>> {
        self.ticket_locks
            .entry(ticket_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry of a ticket that will see no more redirects
    pub(crate) fn release_ticket(&self, ticket_id: &TicketId) {
        self.ticket_locks
            .remove_if(ticket_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Create the redirect state for a new ticket with the default budget
    pub async fn open_ticket(
        &self,
        ticket_id: TicketId,
        assignee: &str,
    ) -> Result<TicketRedirectState> {
        let state =
            TicketRedirectState::new(ticket_id, assignee, self.policy.default_max_redirects);
        let state = self.store.insert(state).await?;
        info!(
            ticket = %state.ticket_id,
            assignee,
            max_redirects = state.max_redirects,
            "🎫 ticket opened"
        );
        Ok(state)
    }

    /// Mark the ticket's call as in progress and hand back a leg handle
    pub async fn start_call(&self, ticket_id: &TicketId) -> Result<CallHandle> {
        let lock = self.ticket_lock(ticket_id);
        let _guard = lock.lock().await;

        let mut retried = false;
        loop {
            let mut state = self.store.load(ticket_id).await?;
            state.call_status = CallStatus::InProgress;
            match self.store.save(&state).await {
                Ok(saved) => {
                    debug!(
                        ticket = %ticket_id,
                        assignee = %saved.current_assignee,
                        "call leg started"
                    );
                    return Ok(CallHandle::new(saved.ticket_id, saved.current_assignee));
                }
                Err(RedirectError::StateConflict(msg)) if !retried => {
                    warn!(ticket = %ticket_id, "conflict starting call, retrying: {}", msg);
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one redirect attempt for a call leg
    ///
    /// A state conflict is retried once against freshly loaded state, and a
    /// directory failure once after the configured backoff; a second failure
    /// of either kind is returned to the caller with the ticket left on its
    /// current assignee. A transfer the call layer refuses after the commit
    /// is returned as [`RedirectError::Transfer`] with the ticket flagged for
    /// human review.
    pub async fn handle_redirect(
        &self,
        call: &CallHandle,
        intent: &RedirectIntent,
    ) -> Result<RedirectOutcome> {
        if !intent.requested {
            return Err(RedirectError::invalid_input("intent does not request a redirect"));
        }

        let lock = self.ticket_lock(&call.ticket_id);
        let _guard = lock.lock().await;

        let mut conflict_retried = false;
        let mut directory_retried = false;
        loop {
            match self.attempt(call, intent).await {
                Ok(outcome) => return Ok(outcome),
                Err(RedirectError::StateConflict(msg)) if !conflict_retried => {
                    warn!(
                        ticket = %call.ticket_id,
                        "state conflict, retrying on fresh state: {}", msg
                    );
                    conflict_retried = true;
                }
                Err(RedirectError::DirectoryUnavailable(msg)) if !directory_retried => {
                    warn!(
                        ticket = %call.ticket_id,
                        backoff_ms = self.policy.directory_retry_backoff_ms,
                        "directory unavailable, retrying: {}", msg
                    );
                    directory_retried = true;
                    let backoff = Duration::from_millis(self.policy.directory_retry_backoff_ms);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!(ticket = %call.ticket_id, "❌ redirect attempt failed: {}", e);
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, call: &CallHandle, intent: &RedirectIntent) -> Result<RedirectOutcome> {
        let mut transitions = vec![RedirectPhase::Active, RedirectPhase::RedirectPending];
        let mut state = self.store.load(&call.ticket_id).await?;
        debug!(ticket = %state.ticket_id, intent = %intent.summary(), "REDIRECT_PENDING");

        if !state.current_assignee.eq_ignore_ascii_case(&call.assignee) {
            return Err(RedirectError::state_conflict(format!(
                "ticket {} moved from {} to {} since this call leg started",
                state.ticket_id, call.assignee, state.current_assignee
            )));
        }

        if !state.can_redirect() {
            warn!(
                ticket = %state.ticket_id,
                count = state.redirect_count,
                max = state.max_redirects,
                "redirect budget spent, keeping {}", state.current_assignee
            );
            return self
                .escalate(RedirectPhase::LimitExceeded, transitions, state, Vec::new())
                .await;
        }

        let mut excluded = self.exclusions(&state);
        let mut candidates = self.search(intent, &excluded).await?;
        let Some(mut selected) = top_reachable(&candidates).cloned() else {
            info!(ticket = %state.ticket_id, "no candidate for: {}", intent.summary());
            return self
                .escalate(RedirectPhase::NoCandidate, transitions, state, candidates)
                .await;
        };
        transitions.push(RedirectPhase::CandidateFound);
        debug!(
            ticket = %state.ticket_id,
            candidate = %selected.employee.username,
            score = selected.score,
            "CANDIDATE_FOUND"
        );

        if !self.still_reachable(&selected.employee).await? {
            warn!(
                ticket = %state.ticket_id,
                "{} went offline before commit, searching again", selected.employee.username
            );
            excluded.insert(selected.employee.key());
            candidates = self.search(intent, &excluded).await?;
            let retry = top_reachable(&candidates).cloned();
            match retry {
                Some(candidate) if self.still_reachable(&candidate.employee).await? => {
                    selected = candidate
                }
                _ => {
                    return self
                        .escalate(RedirectPhase::NoCandidate, transitions, state, candidates)
                        .await
                }
            }
        }

        if !call.is_active() {
            info!(ticket = %state.ticket_id, "call ended during search, not transferring");
            return self
                .escalate(RedirectPhase::NoCandidate, transitions, state, candidates)
                .await;
        }

        let reason = intent.summary();
        let from = state.current_assignee.clone();
        state.record_redirect(selected.employee.username.clone(), reason.clone())?;
        state.call_status = CallStatus::Initiated;
        let state = self.store.save(&state).await?;
        transitions.push(RedirectPhase::Transferred);

        let command = CallTransferCommand {
            ticket_id: state.ticket_id.clone(),
            to_username: selected.employee.username.clone(),
            reason,
        };
        if let Err(e) = self.transfers.transfer(command.clone()).await {
            error!(
                ticket = %state.ticket_id,
                to = %command.to_username,
                "❌ transfer not delivered, flagging for review: {}", e
            );
            self.flag_undelivered(state).await;
            return Err(e);
        }

        info!(
            ticket = %state.ticket_id,
            from = %from,
            to = %command.to_username,
            count = state.redirect_count,
            max = state.max_redirects,
            "🔀 ticket transferred"
        );

        Ok(RedirectOutcome {
            phase: RedirectPhase::Transferred,
            transitions,
            update: TicketUpdate::from_state(&state, TicketStatus::Reassigned),
            state,
            transfer: Some(command),
            candidates,
        })
    }

    /// Current assignee, plus everyone who held the ticket before when configured
    fn exclusions(&self, state: &TicketRedirectState) -> HashSet<String> {
        let mut excluded = HashSet::from([state.current_assignee.to_lowercase()]);
        if self.policy.exclude_previous_assignees {
            excluded.extend(state.previous_assignees());
        }
        excluded
    }

    async fn search(
        &self,
        intent: &RedirectIntent,
        excluded: &HashSet<String>,
    ) -> Result<Vec<CandidateScore>> {
        let snapshot = self.directory.snapshot().await?;
        Ok(self.matcher.search_with_exclusions(intent, &snapshot, excluded))
    }

    async fn still_reachable(&self, employee: &EmployeeRecord) -> Result<bool> {
        Ok(self
            .directory
            .lookup(&employee.username)
            .await?
            .is_some_and(|fresh| fresh.availability_status.is_reachable()))
    }

    /// Mark a committed reassignment whose transfer never reached the call layer
    ///
    /// The count is not rolled back; the ticket keeps the new assignee and is
    /// left for a human to ring.
    async fn flag_undelivered(&self, mut state: TicketRedirectState) {
        state.requires_human_review = true;
        if let Err(e) = self.store.save(&state).await {
            error!(ticket = %state.ticket_id, "could not flag undelivered transfer: {}", e);
        }
    }

    /// Keep the current assignee and flag the ticket for a human
    async fn escalate(
        &self,
        phase: RedirectPhase,
        mut transitions: Vec<RedirectPhase>,
        mut state: TicketRedirectState,
        candidates: Vec<CandidateScore>,
    ) -> Result<RedirectOutcome> {
        transitions.push(phase);
        state.requires_human_review = true;
        let state = self.store.save(&state).await?;
        warn!(
            ticket = %state.ticket_id,
            phase = %phase,
            assignee = %state.current_assignee,
            "⚠️ ticket flagged for human review"
        );

        Ok(RedirectOutcome {
            phase,
            transitions,
            update: TicketUpdate::from_state(&state, TicketStatus::InProgress),
            state,
            transfer: None,
            candidates,
        })
    }
}
