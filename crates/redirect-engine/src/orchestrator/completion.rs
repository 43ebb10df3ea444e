//! Call finalization
//!
//! Runs the parser once over the whole transcript of a finished call leg and
//! writes the terminal ticket record: completed with a resolution, handed to
//! the coordinator for a redirect, or ended without resolution.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::coordinator::RedirectCoordinator;
use super::types::{CallHandle, CompletionOutcome};
use crate::error::{RedirectError, Result};
use crate::parser::{Confidence, ConversationParser, ParseOutcome};
use crate::ticket::{CallStatus, TicketRedirectState, TicketStatus, TicketUpdate};
use crate::transcript::Transcript;

pub struct CallCompletionHandler {
    parser: Arc<ConversationParser>,
    coordinator: Arc<RedirectCoordinator>,
}

impl CallCompletionHandler {
    pub fn new(parser: Arc<ConversationParser>, coordinator: Arc<RedirectCoordinator>) -> Self {
        Self { parser, coordinator }
    }

    /// Finalize a call leg from its transcript
    ///
    /// A redirect intent is deferred to the [`RedirectCoordinator`] and the
    /// ticket stays open; when no transfer comes of it the leg is recorded as
    /// ended. Otherwise the ticket is closed with the extracted solution
    /// (`call_status = completed`), or left in progress with
    /// `call_status = ended` when the transcript holds no solution.
    pub async fn finalize(
        &self,
        call: &CallHandle,
        transcript: &Transcript,
    ) -> Result<CompletionOutcome> {
        let solution = match self.parser.parse_transcript(transcript) {
            ParseOutcome::Redirect(intent)
                if intent.requested && intent.confidence != Confidence::None =>
            {
                info!(
                    ticket = %call.ticket_id,
                    confidence = ?intent.confidence,
                    "call ended with a redirect request"
                );
                let mut outcome = self.coordinator.handle_redirect(call, &intent).await?;
                if !outcome.transferred() {
                    let state = self.record_call_status(call, CallStatus::Ended).await?;
                    info!(
                        ticket = %call.ticket_id,
                        phase = %outcome.phase,
                        "call ended without a transfer"
                    );
                    outcome.update = TicketUpdate::from_state(&state, TicketStatus::InProgress);
                    outcome.state = state;
                }
                return Ok(CompletionOutcome::Redirected(outcome));
            }
            ParseOutcome::Redirect(_) => None,
            ParseOutcome::Resolution(summary) => summary.solution,
        };

        let status = if solution.is_some() {
            CallStatus::Completed
        } else {
            CallStatus::Ended
        };
        let saved = self.record_call_status(call, status).await?;

        Ok(match solution {
            Some(text) => {
                let mut update = TicketUpdate::from_state(&saved, TicketStatus::Completed);
                update.resolution_text = Some(text);
                update.completed_at = Some(Utc::now());
                info!(
                    ticket = %call.ticket_id,
                    assignee = %saved.current_assignee,
                    "✅ ticket resolved"
                );
                self.coordinator.release_ticket(&call.ticket_id);
                CompletionOutcome::Completed(update)
            }
            None => {
                info!(ticket = %call.ticket_id, "call ended without a resolution");
                CompletionOutcome::EndedUnresolved(TicketUpdate::from_state(
                    &saved,
                    TicketStatus::InProgress,
                ))
            }
        })
    }

    /// Persist the leg's final call status under the ticket lock
    async fn record_call_status(
        &self,
        call: &CallHandle,
        status: CallStatus,
    ) -> Result<TicketRedirectState> {
        let lock = self.coordinator.ticket_lock(&call.ticket_id);
        let _guard = lock.lock().await;
        let store = self.coordinator.store();

        let mut retried = false;
        loop {
            let mut state = store.load(&call.ticket_id).await?;
            state.call_status = status;
            match store.save(&state).await {
                Ok(saved) => return Ok(saved),
                Err(RedirectError::StateConflict(msg)) if !retried => {
                    warn!(ticket = %call.ticket_id, "conflict finalizing call, retrying: {}", msg);
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
