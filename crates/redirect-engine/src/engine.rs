//! # Redirect Engine
//!
//! Top-level entry point that wires the parser, matcher, coordinator and
//! completion handler together from one [`RedirectEngineConfig`]. Embedders
//! inject the employee directory and, optionally, a ticket store and a
//! transfer sink; everything else is built from configuration.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             RedirectEngine              │
//! ├─────────────────────────────────────────┤
//! │ ConversationParser │ EmployeeMatcher    │
//! ├─────────────────────────────────────────┤
//! │ RedirectCoordinator│ CallCompletion     │
//! ├─────────────────────────────────────────┤
//! │ Directory │ TicketStateStore │ Transfers│
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use deskcall_redirect_engine::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let directory = InMemoryDirectory::from_records([
//!     EmployeeRecord::new("carla", "Billing Specialist").with_expertise("invoices, refunds"),
//! ]);
//!
//! let engine = RedirectEngine::builder()
//!     .with_config(RedirectEngineConfig::default())
//!     .with_directory(Arc::new(directory))
//!     .with_in_memory_database()
//!     .build()
//!     .await
//!     .unwrap();
//!
//! engine.open_ticket("T-7".into(), "alice").await.unwrap();
//! let call = engine.start_call(&"T-7".into()).await.unwrap();
//!
//! let transcript = Transcript::from_text(
//!     "REDIRECT_REQUEST: YES\nROLE_OF_THE_REDIRECT_TO: Billing Specialist\nRESPONSIBILITIES: refunds",
//! );
//! let outcome = engine.finalize(&call, &transcript).await.unwrap();
//! assert_eq!(outcome.update().assigned_to, "carla");
//! # });
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::RedirectEngineConfig;
use crate::database::SqliteTicketStore;
use crate::directory::EmployeeDirectory;
use crate::error::{RedirectError, Result};
use crate::orchestrator::{
    CallCompletionHandler, CallHandle, CallTransferSink, CompletionOutcome, RecordingTransferSink,
    RedirectCoordinator, RedirectOutcome,
};
use crate::parser::{ConversationParser, ParseOutcome, RedirectIntent};
use crate::routing::EmployeeMatcher;
use crate::ticket::{InMemoryTicketStore, TicketId, TicketRedirectState, TicketStateStore};
use crate::transcript::Transcript;

/// A fully wired redirect engine
pub struct RedirectEngine {
    config: RedirectEngineConfig,
    parser: Arc<ConversationParser>,
    coordinator: Arc<RedirectCoordinator>,
    completion: CallCompletionHandler,
}

impl RedirectEngine {
    pub fn builder() -> RedirectEngineBuilder {
        RedirectEngineBuilder::new()
    }

    pub fn config(&self) -> &RedirectEngineConfig {
        &self.config
    }

    pub fn parser(&self) -> &Arc<ConversationParser> {
        &self.parser
    }

    pub fn coordinator(&self) -> &Arc<RedirectCoordinator> {
        &self.coordinator
    }

    /// Parse raw conversational text without touching any ticket
    pub fn parse(&self, raw_text: &str) -> ParseOutcome {
        self.parser.parse(raw_text)
    }

    pub async fn open_ticket(
        &self,
        ticket_id: TicketId,
        assignee: &str,
    ) -> Result<TicketRedirectState> {
        self.coordinator.open_ticket(ticket_id, assignee).await
    }

    pub async fn start_call(&self, ticket_id: &TicketId) -> Result<CallHandle> {
        self.coordinator.start_call(ticket_id).await
    }

    /// Act on a redirect detected mid-call, before the leg ends
    pub async fn handle_redirect(
        &self,
        call: &CallHandle,
        intent: &RedirectIntent,
    ) -> Result<RedirectOutcome> {
        self.coordinator.handle_redirect(call, intent).await
    }

    /// Finalize a finished call leg
    pub async fn finalize(
        &self,
        call: &CallHandle,
        transcript: &Transcript,
    ) -> Result<CompletionOutcome> {
        self.completion.finalize(call, transcript).await
    }
}

/// Builder for [`RedirectEngine`] with fluent API
pub struct RedirectEngineBuilder {
    config: Option<RedirectEngineConfig>,
    directory: Option<Arc<dyn EmployeeDirectory>>,
    store: Option<Arc<dyn TicketStateStore>>,
    db_path: Option<String>,
    transfers: Option<Arc<dyn CallTransferSink>>,
}

impl RedirectEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            directory: None,
            store: None,
            db_path: None,
            transfers: None,
        }
    }

    pub fn with_config(mut self, config: RedirectEngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Employee directory to search; required
    pub fn with_directory(mut self, directory: Arc<dyn EmployeeDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Use an existing ticket store
    pub fn with_store(mut self, store: Arc<dyn TicketStateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Persist ticket state in the SQLite database at `path`
    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Keep ticket state in memory
    pub fn with_in_memory_database(mut self) -> Self {
        self.db_path = None;
        self.store = None;
        self
    }

    /// Where transfer commands go; defaults to a [`RecordingTransferSink`]
    pub fn with_transfer_sink(mut self, transfers: Arc<dyn CallTransferSink>) -> Self {
        self.transfers = Some(transfers);
        self
    }

    /// Validate the configuration and build the engine
    pub async fn build(self) -> Result<RedirectEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let directory = self
            .directory
            .ok_or_else(|| RedirectError::configuration("employee directory not provided"))?;

        let store: Arc<dyn TicketStateStore> = match (self.store, self.db_path) {
            (Some(store), _) => store,
            (None, Some(path)) => {
                let url = if path.starts_with("sqlite:") {
                    path
                } else {
                    format!("sqlite:{}", path)
                };
                Arc::new(SqliteTicketStore::new(&url).await?)
            }
            (None, None) => Arc::new(InMemoryTicketStore::new()),
        };
        let transfers = self
            .transfers
            .unwrap_or_else(|| Arc::new(RecordingTransferSink::new()));

        let parser = Arc::new(ConversationParser::new(&config.parser)?);
        let coordinator = Arc::new(RedirectCoordinator::new(
            EmployeeMatcher::new(config.matching.weights),
            directory,
            store,
            transfers,
            config.redirect.clone(),
        ));
        let completion = CallCompletionHandler::new(parser.clone(), coordinator.clone());

        info!(
            max_redirects = config.redirect.default_max_redirects,
            exclude_previous = config.redirect.exclude_previous_assignees,
            "🚀 redirect engine ready"
        );

        Ok(RedirectEngine {
            config,
            parser,
            coordinator,
            completion,
        })
    }
}

impl Default for RedirectEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
