//! # Deskcall Redirect Engine
//!
//! Mid-call ticket redirection for an AI-mediated support line. A language
//! model listens in on the call between a ticket's requester and its assigned
//! employee; when the text it produces says the employee is the wrong person,
//! this crate works out who should get the ticket instead and moves it there,
//! a bounded number of times.
//!
//! ## Overview
//!
//! - **Parsing**: [`parser::ConversationParser`] turns free model output into a
//!   handoff intent or a solution summary, tolerating decorated markers,
//!   fenced JSON and plain prose
//! - **Matching**: [`routing::EmployeeMatcher`] ranks directory employees by
//!   username identity, role overlap, expertise overlap and availability
//! - **Coordination**: [`orchestrator::RedirectCoordinator`] runs the redirect
//!   state machine with a per-ticket budget, ping-pong protection and
//!   versioned writes
//! - **Completion**: [`orchestrator::CallCompletionHandler`] writes the terminal
//!   ticket record when a call leg ends
//! - **Storage**: in-memory and SQLite ([`database::SqliteTicketStore`]) ticket
//!   state stores
//!
//! ## Architecture
//!
//! ```text
//!  Transcript ──► ConversationParser ──► RedirectCoordinator ──► CallTransferCommand
//!                        │                     │   ▲
//!                        │                     ▼   │
//!                        │              EmployeeMatcher ◄── EmployeeDirectory
//!                        ▼                     │
//!               CallCompletionHandler ──► TicketStateStore ──► TicketUpdate
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use deskcall_redirect_engine::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let directory = InMemoryDirectory::from_records([
//!     EmployeeRecord::new("omar", "DevOps Engineer").with_expertise("deployment, monitoring"),
//! ]);
//! let engine = RedirectEngine::builder()
//!     .with_directory(Arc::new(directory))
//!     .build()
//!     .await
//!     .unwrap();
//!
//! engine.open_ticket("T-1".into(), "alice").await.unwrap();
//! let call = engine.start_call(&"T-1".into()).await.unwrap();
//!
//! let transcript = Transcript::from_text(
//!     "Employee: this is a deployment problem.\n\
//!      REDIRECT_REQUEST: YES\n\
//!      USERNAME_TO_REDIRECT: omar",
//! );
//! match engine.finalize(&call, &transcript).await.unwrap() {
//!     CompletionOutcome::Redirected(outcome) => {
//!         assert_eq!(outcome.state.current_assignee, "omar");
//!     }
//!     other => panic!("unexpected: {:?}", other),
//! }
//! # });
//! ```

pub mod config;
pub mod database;
pub mod directory;
pub mod engine;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod parser;
pub mod routing;
pub mod ticket;
pub mod transcript;

pub use config::RedirectEngineConfig;
pub use engine::{RedirectEngine, RedirectEngineBuilder};
pub use error::{RedirectError, Result};

/// Commonly used types and traits
///
/// ```rust
/// use deskcall_redirect_engine::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{
        HeuristicConfig, MarkerVocabulary, MatchingConfig, ParserConfig, RedirectEngineConfig,
        RedirectPolicyConfig, ScoringWeights,
    };
    pub use crate::database::SqliteTicketStore;
    pub use crate::directory::{
        AvailabilityStatus, EmployeeDirectory, EmployeeRecord, InMemoryDirectory,
    };
    pub use crate::engine::{RedirectEngine, RedirectEngineBuilder};
    pub use crate::error::{RedirectError, Result};
    pub use crate::logging::{setup_logging, LoggingConfig};
    pub use crate::orchestrator::{
        CallCompletionHandler, CallHandle, CallTransferCommand, CallTransferSink,
        ChannelTransferSink, CompletionOutcome, RecordingTransferSink, RedirectCoordinator,
        RedirectOutcome, RedirectPhase,
    };
    pub use crate::parser::{
        Confidence, ConversationParser, IntentExtractor, ParseOutcome, RedirectIntent,
        SolutionSummary, StructuredBlock,
    };
    pub use crate::routing::{CandidateScore, EmployeeMatcher};
    pub use crate::ticket::{
        CallStatus, InMemoryTicketStore, RedirectHistoryEntry, TicketId, TicketRedirectState,
        TicketStateStore, TicketStatus, TicketUpdate,
    };
    pub use crate::transcript::{Speaker, Transcript, Utterance};

    pub use chrono::{DateTime, Utc};
}
