use thiserror::Error;

/// Error types for redirect engine operations
///
/// Parsing and scoring never produce these: [`crate::parser::ConversationParser`]
/// and [`crate::routing::EmployeeMatcher`] are infallible. Only directory and
/// storage I/O, state conflicts, and the call-transfer hand-off can fail, and the
/// [`crate::orchestrator::RedirectCoordinator`] is the one place that catches
/// them and translates them into a ticket outcome.
///
/// # Examples
///
/// ```
/// use deskcall_redirect_engine::{RedirectError, Result};
///
/// fn load_snapshot() -> Result<()> {
///     Err(RedirectError::directory_unavailable("directory service timed out"))
/// }
///
/// match load_snapshot() {
///     Ok(_) => println!("snapshot loaded"),
///     Err(e) if e.is_retryable() => println!("retry once: {}", e),
///     Err(e) => println!("giving up: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum RedirectError {
    /// The employee directory snapshot could not be fetched
    ///
    /// Fatal to the current redirect attempt. The coordinator retries the
    /// whole attempt once with backoff before surfacing this to the call
    /// layer; the ticket stays with its current assignee.
    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// Concurrent write detected on a ticket's redirect state
    ///
    /// Raised by [`crate::ticket::TicketStateStore::save`] when the stored
    /// version no longer matches, or by the coordinator when the ticket
    /// already moved on from the call leg that produced the request.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// The matcher found nobody suitable for the handoff
    ///
    /// Not returned by the coordinator, which escalates instead; see
    /// [`crate::orchestrator::RedirectOutcome::escalation`].
    #[error("No candidate found: {0}")]
    NoCandidateFound(String),

    /// The ticket already used its whole redirect budget
    ///
    /// Returned by [`crate::ticket::TicketRedirectState::record_redirect`];
    /// the coordinator reports it through
    /// [`crate::orchestrator::RedirectOutcome::escalation`].
    #[error("Redirect limit exceeded: {0}")]
    RedirectLimitExceeded(String),

    /// Ticket state persistence errors
    ///
    /// # Examples
    /// - SQLite connection failure
    /// - Migration failure
    /// - Corrupt redirect history column
    #[error("Storage error: {0}")]
    Storage(String),

    /// The call layer refused or dropped a transfer command
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Configuration validation and parsing errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller supplied input the engine cannot act on
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Ticket or employee not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for RedirectError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for RedirectError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for RedirectError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(format!("migration failed: {}", err))
    }
}

impl From<serde_json::Error> for RedirectError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization failed: {}", err))
    }
}

impl From<toml::de::Error> for RedirectError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl RedirectError {
    /// Create a new DirectoryUnavailable error with the provided message
    pub fn directory_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::DirectoryUnavailable(msg.into())
    }

    /// Create a new StateConflict error with the provided message
    pub fn state_conflict<S: Into<String>>(msg: S) -> Self {
        Self::StateConflict(msg.into())
    }

    /// Create a new Storage error with the provided message
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new Transfer error with the provided message
    pub fn transfer<S: Into<String>>(msg: S) -> Self {
        Self::Transfer(msg.into())
    }

    /// Create a new Configuration error with the provided message
    ///
    /// # Examples
    ///
    /// ```
    /// use deskcall_redirect_engine::RedirectError;
    ///
    /// let error = RedirectError::configuration("scoring weights must sum to 1.0");
    /// assert_eq!(error.to_string(), "Configuration error: scoring weights must sum to 1.0");
    /// ```
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new InvalidInput error with the provided message
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new NotFound error with the provided message
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Internal error with the provided message
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the coordinator retries the attempt once on this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DirectoryUnavailable(_) | Self::StateConflict(_))
    }
}

/// Result type for redirect engine operations
pub type Result<T> = std::result::Result<T, RedirectError>;
