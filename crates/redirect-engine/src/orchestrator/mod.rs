//! # Redirect Orchestration Module
//!
//! Coordinates everything that happens after the parser has read a call leg:
//! the redirect state machine, the hand-off to the telephony layer, and the
//! terminal ticket record written when a call ends.
//!
//! ## Module Organization
//!
//! - **[`coordinator`]**: [`RedirectCoordinator`], the per-ticket redirect state machine
//! - **[`completion`]**: [`CallCompletionHandler`], which finalizes a call leg
//! - **[`transfer`]**: the [`CallTransferSink`] seam and its channel/recording sinks
//! - **[`types`]**: phases, call handles, commands and outcomes
//!
//! ## Flow
//!
//! ```text
//!   transcript ──► ConversationParser
//!                        │
//!          ┌─────────────┴──────────────┐
//!          │ redirect                   │ no redirect
//!          ▼                            ▼
//!  RedirectCoordinator           CallCompletionHandler
//!    │  EmployeeMatcher            │  completed (solution)
//!    │  TicketStateStore           │  ended (nothing found)
//!    ▼                             ▼
//!  CallTransferCommand         TicketUpdate
//! ```
//!
//! ## Concurrency
//!
//! Many tickets are processed at once, but attempts on one ticket are
//! serialized by a per-ticket async lock, and every write goes through the
//! store's versioned `save`. A call leg remembers the assignee it was held
//! with; if the ticket has moved on by the time a second evaluation of the
//! same turn arrives, that evaluation fails with a state conflict instead of
//! transferring the ticket twice.
//!
//! ## Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use deskcall_redirect_engine::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let directory = InMemoryDirectory::from_records([
//!     EmployeeRecord::new("patrick", "Product Development Lead"),
//! ]);
//! let transfers = RecordingTransferSink::new();
//! let coordinator = Arc::new(RedirectCoordinator::new(
//!     EmployeeMatcher::default(),
//!     Arc::new(directory),
//!     Arc::new(InMemoryTicketStore::new()),
//!     Arc::new(transfers.clone()),
//!     RedirectPolicyConfig::default(),
//! ));
//! let completion = CallCompletionHandler::new(Arc::new(ConversationParser::default()), coordinator.clone());
//!
//! coordinator.open_ticket("T-42".into(), "alice").await.unwrap();
//! let call = coordinator.start_call(&"T-42".into()).await.unwrap();
//!
//! let transcript = Transcript::from_text("REDIRECT_REQUESTED: ** TRUE\nUSERNAME_TO_REDIRECT: ** Patrick");
//! let outcome = completion.finalize(&call, &transcript).await.unwrap();
//!
//! assert_eq!(outcome.update().assigned_to, "patrick");
//! assert_eq!(transfers.len(), 1);
//! # });
//! ```

pub mod completion;
pub mod coordinator;
pub mod transfer;
pub mod types;

pub use completion::CallCompletionHandler;
pub use coordinator::RedirectCoordinator;
pub use transfer::{CallTransferSink, ChannelTransferSink, RecordingTransferSink};
pub use types::{CallHandle, CallTransferCommand, CompletionOutcome, RedirectOutcome, RedirectPhase};
