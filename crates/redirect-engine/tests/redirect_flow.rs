//! Integration tests for the redirect engine
//!
//! These drive complete call legs (parser → coordinator → completion) against
//! in-memory and SQLite ticket stores, with directories that misbehave in the
//! ways a live directory service does.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use deskcall_redirect_engine::prelude::*;
use serial_test::serial;

/// Wraps an in-memory directory, failing the first `failures` snapshots and
/// reporting selected employees as offline on lookup
struct TestDirectory {
    inner: InMemoryDirectory,
    failures: AtomicUsize,
    snapshots: AtomicUsize,
    offline_on_lookup: HashSet<String>,
}

impl TestDirectory {
    fn new(records: Vec<EmployeeRecord>) -> Self {
        Self {
            inner: InMemoryDirectory::from_records(records),
            failures: AtomicUsize::new(0),
            snapshots: AtomicUsize::new(0),
            offline_on_lookup: HashSet::new(),
        }
    }

    fn failing(mut self, failures: usize) -> Self {
        self.failures = AtomicUsize::new(failures);
        self
    }

    fn offline_at_commit(mut self, username: &str) -> Self {
        self.offline_on_lookup.insert(username.to_string());
        self
    }

    fn snapshot_calls(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmployeeDirectory for TestDirectory {
    async fn snapshot(&self) -> Result<Vec<EmployeeRecord>> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RedirectError::directory_unavailable("directory service timed out"));
        }
        self.inner.snapshot().await
    }

    async fn lookup(&self, username: &str) -> Result<Option<EmployeeRecord>> {
        let record = self.inner.lookup(username).await?;
        Ok(record.map(|mut r| {
            if self.offline_on_lookup.contains(&r.username) {
                r.availability_status = AvailabilityStatus::Offline;
            }
            r
        }))
    }
}

fn staff() -> Vec<EmployeeRecord> {
    vec![
        EmployeeRecord::new("patrick", "Product Development Lead")
            .with_full_name("Patrick Moreau")
            .with_expertise("roadmap, feature requests, prioritization"),
        EmployeeRecord::new("omar", "DevOps Engineer")
            .with_expertise("kubernetes, deployment, monitoring")
            .with_responsibilities("infrastructure"),
        EmployeeRecord::new("alice", "DBA")
            .with_expertise("postgres, replication, query tuning"),
        EmployeeRecord::new("bob", "DBA")
            .with_expertise("postgres, backups")
            .with_status(AvailabilityStatus::Busy),
        EmployeeRecord::new("carla", "Billing Specialist")
            .with_expertise("invoices, refunds, billing disputes"),
    ]
}

fn test_config() -> RedirectEngineConfig {
    let mut config = RedirectEngineConfig::default();
    config.redirect.directory_retry_backoff_ms = 1;
    config
}

async fn engine_with(
    directory: Arc<dyn EmployeeDirectory>,
    config: RedirectEngineConfig,
) -> (RedirectEngine, RecordingTransferSink) {
    let transfers = RecordingTransferSink::new();
    let engine = RedirectEngine::builder()
        .with_config(config)
        .with_directory(directory)
        .with_transfer_sink(Arc::new(transfers.clone()))
        .build()
        .await
        .expect("engine builds");
    (engine, transfers)
}

async fn engine() -> (RedirectEngine, RecordingTransferSink) {
    engine_with(Arc::new(InMemoryDirectory::from_records(staff())), test_config()).await
}

#[tokio::test]
async fn decorated_marker_transfers_to_named_employee() {
    let (engine, transfers) = engine().await;
    engine.open_ticket("T-A".into(), "dana").await.unwrap();
    let call = engine.start_call(&"T-A".into()).await.unwrap();

    let transcript =
        Transcript::from_text("REDIRECT_REQUESTED: ** TRUE\nUSERNAME_TO_REDIRECT: ** Patrick");
    let outcome = match engine.finalize(&call, &transcript).await.unwrap() {
        CompletionOutcome::Redirected(outcome) => outcome,
        other => panic!("expected redirect, got {:?}", other),
    };

    assert_eq!(outcome.phase, RedirectPhase::Transferred);
    assert_eq!(outcome.candidates[0].score, 1.0);
    assert_eq!(outcome.state.redirect_count, 1);
    assert_eq!(outcome.state.redirect_history[0].from_employee, "dana");
    assert_eq!(outcome.update.status, TicketStatus::Reassigned);
    assert_eq!(outcome.update.assigned_to, "patrick");
    assert_eq!(transfers.commands()[0].ticket_id, TicketId::from("T-A"));
}

#[tokio::test]
async fn availability_breaks_role_tie() {
    let directory = vec![
        EmployeeRecord::new("alice", "DBA"),
        EmployeeRecord::new("bob", "DBA").with_status(AvailabilityStatus::Busy),
    ];
    let intent = RedirectIntent::marker(None, Some("DBA".into()), None);
    let ranked = EmployeeMatcher::default().search(&intent, &directory);

    assert_eq!(ranked[0].employee.username, "alice");
    assert_eq!(ranked[1].employee.username, "bob");
    assert!(ranked[0].score > ranked[1].score);
}

#[tokio::test]
async fn exhausted_budget_never_searches() {
    let directory = Arc::new(TestDirectory::new(staff()));
    let (engine, transfers) = engine_with(directory.clone(), test_config()).await;

    let mut state = TicketRedirectState::new("T-C".into(), "dana", 3);
    for next in ["erin", "frank", "gina"] {
        state.record_redirect(next, "earlier leg").unwrap();
    }
    engine.coordinator().store().insert(state).await.unwrap();
    let call = engine.start_call(&"T-C".into()).await.unwrap();

    let intent = RedirectIntent::marker(Some("alice".into()), None, None);
    let outcome = engine.handle_redirect(&call, &intent).await.unwrap();

    assert_eq!(outcome.phase, RedirectPhase::LimitExceeded);
    assert_eq!(directory.snapshot_calls(), 0);
    assert_eq!(outcome.state.redirect_count, 3);
    assert_eq!(outcome.state.current_assignee, "gina");
    assert!(outcome.state.requires_human_review);
    assert!(transfers.is_empty());
}

#[tokio::test]
async fn plain_prose_completes_the_ticket() {
    let (engine, transfers) = engine().await;
    engine.open_ticket("T-D".into(), "alice").await.unwrap();
    let call = engine.start_call(&"T-D".into()).await.unwrap();

    let transcript =
        Transcript::from_text("Here's the solution: restart the router and reconnect.");
    let outcome = engine.finalize(&call, &transcript).await.unwrap();

    assert!(matches!(outcome, CompletionOutcome::Completed(_)));
    let update = outcome.update();
    assert_eq!(update.call_status, CallStatus::Completed);
    assert_eq!(update.assigned_to, "alice");
    assert!(update.resolution_text.is_some());
    assert!(transfers.is_empty());
}

#[tokio::test]
async fn fenced_evaluation_block_is_structured_data() {
    let (engine, _) = engine().await;
    let outcome = engine.parse(
        "The call went fine overall.\n\
         ```json\n{\"score\": 8, \"explanation\": \"Good\"}\n```\n\
         Nothing else to add.",
    );
    assert!(!outcome.is_redirect());
    let block = outcome.structured().expect("structured block");
    assert_eq!(block.score, Some(8.0));
    assert_eq!(block.explanation.as_deref(), Some("Good"));

    let untagged = engine.parse("noise ```{\"score\": 8, \"explanation\": \"Good\"}``` more noise");
    assert_eq!(untagged.structured().and_then(|b| b.score), Some(8.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_evaluations_of_one_turn_transfer_once() {
    let (engine, transfers) = engine().await;
    let engine = Arc::new(engine);
    engine.open_ticket("T-RACE".into(), "dana").await.unwrap();
    let call = engine.start_call(&"T-RACE".into()).await.unwrap();
    let intent = RedirectIntent::marker(None, Some("DBA".into()), Some("replication".into()));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        let call = call.clone();
        let intent = intent.clone();
        handles.push(tokio::spawn(async move { engine.handle_redirect(&call, &intent).await }));
    }

    let mut transferred = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) if outcome.transferred() => transferred += 1,
            Err(RedirectError::StateConflict(_)) => conflicts += 1,
            other => panic!("unexpected result: {:?}", other.map(|o| o.phase)),
        }
    }

    assert_eq!(transferred, 1);
    assert_eq!(conflicts, 3);
    assert_eq!(transfers.len(), 1);
    let state = engine.coordinator().store().load(&"T-RACE".into()).await.unwrap();
    assert_eq!(state.redirect_count, 1);
    assert_eq!(state.current_assignee, "alice");
}

#[tokio::test]
async fn directory_outage_is_retried_once() {
    let directory = Arc::new(TestDirectory::new(staff()).failing(1));
    let (engine, _) = engine_with(directory.clone(), test_config()).await;
    engine.open_ticket("T-R1".into(), "dana").await.unwrap();
    let call = engine.start_call(&"T-R1".into()).await.unwrap();

    let intent = RedirectIntent::marker(Some("carla".into()), None, None);
    let outcome = engine.handle_redirect(&call, &intent).await.unwrap();
    assert!(outcome.transferred());
    assert_eq!(directory.snapshot_calls(), 2);
}

#[tokio::test]
async fn persistent_directory_outage_surfaces() {
    let directory = Arc::new(TestDirectory::new(staff()).failing(2));
    let (engine, transfers) = engine_with(directory, test_config()).await;
    engine.open_ticket("T-R2".into(), "dana").await.unwrap();
    let call = engine.start_call(&"T-R2".into()).await.unwrap();

    let intent = RedirectIntent::marker(Some("carla".into()), None, None);
    let err = engine.handle_redirect(&call, &intent).await.unwrap_err();
    assert!(matches!(err, RedirectError::DirectoryUnavailable(_)));

    let state = engine.coordinator().store().load(&"T-R2".into()).await.unwrap();
    assert_eq!(state.current_assignee, "dana");
    assert_eq!(state.redirect_count, 0);
    assert!(transfers.is_empty());
}

#[tokio::test]
async fn candidate_going_offline_triggers_one_more_search() {
    let directory = Arc::new(TestDirectory::new(staff()).offline_at_commit("alice"));
    let (engine, _) = engine_with(directory.clone(), test_config()).await;
    engine.open_ticket("T-OFF".into(), "dana").await.unwrap();
    let call = engine.start_call(&"T-OFF".into()).await.unwrap();

    let intent = RedirectIntent::marker(None, Some("DBA".into()), Some("replication".into()));
    let outcome = engine.handle_redirect(&call, &intent).await.unwrap();

    assert!(outcome.transferred());
    assert_eq!(outcome.state.current_assignee, "bob");
    assert_eq!(directory.snapshot_calls(), 2);
}

#[tokio::test]
async fn only_candidate_offline_at_commit_escalates() {
    let directory = Arc::new(TestDirectory::new(staff()).offline_at_commit("carla"));
    let (engine, transfers) = engine_with(directory, test_config()).await;
    engine.open_ticket("T-OFF2".into(), "dana").await.unwrap();
    let call = engine.start_call(&"T-OFF2".into()).await.unwrap();

    let intent = RedirectIntent::marker(Some("carla".into()), None, Some("refunds".into()));
    let outcome = engine.handle_redirect(&call, &intent).await.unwrap();

    assert_eq!(outcome.phase, RedirectPhase::NoCandidate);
    assert_eq!(outcome.state.current_assignee, "dana");
    assert!(outcome.update.requires_human_review);
    assert!(transfers.is_empty());
}

#[tokio::test]
async fn redirect_chain_stops_at_the_budget() {
    let (engine, transfers) = engine().await;
    engine.open_ticket("T-CHAIN".into(), "dana").await.unwrap();

    let requests = [
        "REDIRECT_REQUEST: YES\nUSERNAME_TO_REDIRECT: omar",
        "REDIRECT_REQUEST: YES\nUSERNAME_TO_REDIRECT: alice",
        "REDIRECT_REQUEST: YES\nUSERNAME_TO_REDIRECT: carla",
        "REDIRECT_REQUEST: YES\nUSERNAME_TO_REDIRECT: patrick",
    ];
    let mut counts = Vec::new();
    let mut phases = Vec::new();
    for text in requests {
        let call = engine.start_call(&"T-CHAIN".into()).await.unwrap();
        match engine.finalize(&call, &Transcript::from_text(text)).await.unwrap() {
            CompletionOutcome::Redirected(outcome) => {
                counts.push(outcome.state.redirect_count);
                phases.push(outcome.phase);
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    assert_eq!(counts, vec![1, 2, 3, 3]);
    assert_eq!(phases.last(), Some(&RedirectPhase::LimitExceeded));
    assert_eq!(transfers.len(), 3);

    let state = engine.coordinator().store().load(&"T-CHAIN".into()).await.unwrap();
    assert_eq!(state.current_assignee, "carla");
    assert!(state.requires_human_review);
    assert!(state.is_consistent());
}

#[tokio::test]
async fn ping_pong_back_to_previous_assignee_is_refused() {
    let (engine, _) = engine().await;
    engine.open_ticket("T-PP".into(), "carla").await.unwrap();

    let call = engine.start_call(&"T-PP".into()).await.unwrap();
    let first = engine
        .finalize(&call, &Transcript::from_text("Please transfer this to Omar."))
        .await
        .unwrap();
    assert_eq!(first.update().assigned_to, "omar");

    let call = engine.start_call(&"T-PP".into()).await.unwrap();
    let transcript = Transcript::from_text("REDIRECT_REQUEST: YES\nUSERNAME_TO_REDIRECT: carla");
    let back = engine.finalize(&call, &transcript).await.unwrap();
    match back {
        CompletionOutcome::Redirected(outcome) => {
            assert_eq!(outcome.phase, RedirectPhase::NoCandidate);
            assert_eq!(outcome.state.current_assignee, "omar");
        }
        other => panic!("expected redirect, got {:?}", other),
    }
}

#[tokio::test]
async fn previous_assignees_allowed_when_configured() {
    let mut config = test_config();
    config.redirect.exclude_previous_assignees = false;
    let (engine, _) = engine_with(Arc::new(InMemoryDirectory::from_records(staff())), config).await;

    let mut state = TicketRedirectState::new("T-PP2".into(), "carla", 3);
    state.record_redirect("omar", "infra").unwrap();
    engine.coordinator().store().insert(state).await.unwrap();

    let call = engine.start_call(&"T-PP2".into()).await.unwrap();
    let intent = RedirectIntent::marker(Some("carla".into()), None, None);
    let outcome = engine.handle_redirect(&call, &intent).await.unwrap();
    assert_eq!(outcome.state.current_assignee, "carla");
}

#[tokio::test]
async fn transfer_commands_reach_the_telephony_task() {
    let (sink, mut rx) = ChannelTransferSink::new(8);
    let engine = RedirectEngine::builder()
        .with_config(test_config())
        .with_directory(Arc::new(InMemoryDirectory::from_records(staff())))
        .with_transfer_sink(Arc::new(sink))
        .build()
        .await
        .unwrap();

    let telephony = tokio::spawn(async move { rx.recv().await });

    engine.open_ticket("T-CH".into(), "dana").await.unwrap();
    let call = engine.start_call(&"T-CH".into()).await.unwrap();
    let transcript = Transcript::from_text(
        "REDIRECT_REQUESTED: yes\nRESPONSIBILITIES: billing disputes\nI'd transfer this to Carla.",
    );
    engine.finalize(&call, &transcript).await.unwrap();

    let command = telephony.await.unwrap().expect("command delivered");
    assert_eq!(command.to_username, "carla");
    assert_eq!(command.reason, "billing disputes");
}

#[tokio::test]
#[serial]
async fn sqlite_store_runs_the_full_flow() {
    let store = Arc::new(SqliteTicketStore::new_in_memory().await.unwrap());
    let engine = RedirectEngine::builder()
        .with_config(test_config())
        .with_directory(Arc::new(InMemoryDirectory::from_records(staff())))
        .with_store(store.clone())
        .build()
        .await
        .unwrap();

    engine.open_ticket("T-SQL".into(), "dana").await.unwrap();
    let call = engine.start_call(&"T-SQL".into()).await.unwrap();
    let transcript = Transcript::from_text(
        "REDIRECT_REQUEST: YES\n\
         ROLE_OF_THE_REDIRECT_TO: DevOps Engineer\n\
         RESPONSABILTIES: infrastructure, deployment, monitoring",
    );
    engine.finalize(&call, &transcript).await.unwrap();

    let call = engine.start_call(&"T-SQL".into()).await.unwrap();
    assert_eq!(call.assignee, "omar");
    let outcome = engine
        .finalize(&call, &Transcript::from_text("Rolled back the deployment, all green now."))
        .await
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::Completed(_)));

    let state = store.load(&"T-SQL".into()).await.unwrap();
    assert_eq!(state.call_status, CallStatus::Completed);
    assert_eq!(state.redirect_history.len(), 1);
    assert_eq!(state.redirect_history[0].reason, "infrastructure, deployment, monitoring");
}

#[tokio::test]
async fn json_payload_transcripts_are_normalized() {
    let (engine, _) = engine().await;
    engine.open_ticket("T-JSON".into(), "dana").await.unwrap();
    let call = engine.start_call(&"T-JSON".into()).await.unwrap();

    let payload = serde_json::json!({
        "conversation_summary": "",
        "response": "**REDIRECT_REQUEST**: YES\n**USERNAME_TO_REDIRECT**: `omar`"
    });
    let outcome = engine.finalize(&call, &Transcript::from_json(&payload)).await.unwrap();
    assert_eq!(outcome.update().assigned_to, "omar");
}
