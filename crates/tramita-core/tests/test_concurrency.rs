//! Concurrency properties: unique number issuance and serialized
//! transitions on a single protocol

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tramita_core::{
    Dispatcher, LogAuditSink, LogNotifier, MemoryStore, NewProtocol, NotificationConfig,
    ProtocolFilter, ProtocolService, ProtocolStore, Result, ReturnFallback, TramitaError,
    TransitionCommit, TransitionEngine,
};
use tramita_types::{
    Actor, Priority, Protocol, ProtocolId, Role, SectorId, StageExecution, StageSpec,
    TransitionAction, UserId,
};

struct Harness {
    service: Arc<ProtocolService>,
    engine: Arc<TransitionEngine>,
    workflow_id: tramita_types::WorkflowId,
}

async fn harness(stage_count: usize, max_attempts: u32) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(
        Arc::new(LogAuditSink),
        Arc::new(LogNotifier),
        NotificationConfig {
            enabled: false,
            ..Default::default()
        },
    );

    let workflows: Arc<dyn tramita_core::WorkflowStore> = store.clone();
    let protocols: Arc<dyn tramita_core::ProtocolStore> = store.clone();
    let sequence: Arc<dyn tramita_core::SequenceCounter> = store.clone();

    let workflow = workflows
        .create_workflow("Fluxo concorrente".to_string(), None, true)
        .await
        .unwrap();
    let specs = (1..=stage_count)
        .map(|order| StageSpec {
            name: format!("Stage {}", order),
            order: order as u32,
            sector_id: SectorId::new(),
            sla_hours: 24,
            mandatory: true,
            on_sla_breach: Vec::new(),
        })
        .collect();
    workflows.replace_stages(&workflow.id, specs).await.unwrap();

    Harness {
        service: Arc::new(ProtocolService::new(
            workflows.clone(),
            protocols.clone(),
            sequence,
            dispatcher.clone(),
        )),
        engine: Arc::new(TransitionEngine::new(
            workflows,
            protocols,
            dispatcher,
            max_attempts,
            ReturnFallback::Reject,
        )),
        workflow_id: workflow.id,
    }
}

fn requester() -> Actor {
    Actor::new(UserId::new(), vec![Role::Requester], None)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_distinct_numbers() {
    let harness = harness(1, 3).await;
    let n = 32;

    let tasks: Vec<_> = (0..n)
        .map(|i| {
            let service = harness.service.clone();
            let workflow_id = harness.workflow_id.clone();
            tokio::spawn(async move {
                service
                    .create_protocol(
                        &requester(),
                        NewProtocol {
                            workflow_id,
                            subject: format!("Pedido {}", i),
                            description: None,
                            priority: Priority::Medium,
                            files: Vec::new(),
                        },
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    let protocols: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let numbers: HashSet<_> = protocols.iter().map(|p| p.number.clone()).collect();
    assert_eq!(numbers.len(), n, "every create must get its own number");

    // The issued sequences are exactly 1..=n for the current year, so no
    // gap and no duplicate slipped through the counter
    let year = chrono::Datelike::year(&chrono::Utc::now());
    for sequence in 1..=n as u64 {
        let expected = tramita_types::ProtocolNumber::new(year, sequence);
        assert!(
            numbers.contains(&expected),
            "missing number {}",
            expected
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_transitions_commit_at_most_once() {
    // Single stage and max_attempts = 1: the winner terminates the
    // protocol, so the loser must surface an error instead of quietly
    // acting on a later stage
    let harness = harness(1, 1).await;

    let protocol = harness
        .service
        .create_protocol(
            &requester(),
            NewProtocol {
                workflow_id: harness.workflow_id.clone(),
                subject: "Corrida".to_string(),
                description: None,
                priority: Priority::High,
                files: Vec::new(),
            },
        )
        .await
        .unwrap();

    let racers: Vec<_> = (0..2)
        .map(|_| {
            let engine = harness.engine.clone();
            let protocol_id = protocol.id.clone();
            tokio::spawn(async move {
                let actor = Actor::new(UserId::new(), vec![Role::Administrator], None);
                engine
                    .transition(&protocol_id, TransitionAction::Approve, &actor, None)
                    .await
            })
        })
        .collect();

    let outcomes: Vec<_> = join_all(racers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let wins = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(wins, 1, "exactly one racer commits the pending execution");

    let loss = outcomes.into_iter().find(|o| o.is_err()).unwrap();
    match loss {
        Err(TramitaError::Conflict(_)) | Err(TramitaError::InvalidState(_)) => {}
        other => panic!("loser must see Conflict or InvalidState, got {:?}", other),
    }

    // The winner completed the protocol; its single execution is closed
    let (updated, history) = harness.service.get_protocol(&protocol.id).await.unwrap();
    assert_eq!(updated.status, tramita_types::ProtocolStatus::Completed);
    assert!(updated.current_stage.is_none());
    assert_eq!(history.len(), 1);
    assert!(history.iter().all(|e| !e.is_open()));
}

/// Store wrapper that applies a stashed rival commit right before the
/// first commit it is handed, so the caller's commit is guaranteed to
/// lose the race deterministically.
struct RivalFirstStore {
    inner: Arc<MemoryStore>,
    rival: Mutex<Option<TransitionCommit>>,
}

#[async_trait]
impl ProtocolStore for RivalFirstStore {
    async fn insert_protocol(&self, protocol: Protocol, initial: StageExecution) -> Result<()> {
        self.inner.insert_protocol(protocol, initial).await
    }

    async fn get_protocol(&self, id: &ProtocolId) -> Result<Option<Protocol>> {
        self.inner.get_protocol(id).await
    }

    async fn list_protocols(&self, filter: &ProtocolFilter) -> Result<Vec<Protocol>> {
        self.inner.list_protocols(filter).await
    }

    async fn open_execution(&self, protocol_id: &ProtocolId) -> Result<Option<StageExecution>> {
        self.inner.open_execution(protocol_id).await
    }

    async fn history(&self, protocol_id: &ProtocolId) -> Result<Vec<StageExecution>> {
        self.inner.history(protocol_id).await
    }

    async fn commit_transition(&self, commit: TransitionCommit) -> Result<()> {
        let rival = self.rival.lock().unwrap().take();
        if let Some(rival) = rival {
            self.inner.commit_transition(rival).await?;
        }
        self.inner.commit_transition(commit).await
    }
}

#[tokio::test]
async fn test_defeated_transition_never_acts_on_the_next_stage() {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(
        Arc::new(LogAuditSink),
        Arc::new(LogNotifier),
        NotificationConfig {
            enabled: false,
            ..Default::default()
        },
    );

    let workflows: Arc<dyn tramita_core::WorkflowStore> = store.clone();
    let workflow = workflows
        .create_workflow("Fluxo disputado".to_string(), None, true)
        .await
        .unwrap();
    let stages = workflows
        .replace_stages(
            &workflow.id,
            (1..=2)
                .map(|order| StageSpec {
                    name: format!("Stage {}", order),
                    order,
                    sector_id: SectorId::new(),
                    sla_hours: 24,
                    mandatory: true,
                    on_sla_breach: Vec::new(),
                })
                .collect(),
        )
        .await
        .unwrap();

    let service = ProtocolService::new(
        workflows.clone(),
        store.clone() as Arc<dyn ProtocolStore>,
        store.clone() as Arc<dyn tramita_core::SequenceCounter>,
        dispatcher.clone(),
    );
    let protocol = service
        .create_protocol(
            &requester(),
            NewProtocol {
                workflow_id: workflow.id.clone(),
                subject: "Disputa".to_string(),
                description: None,
                priority: Priority::Medium,
                files: Vec::new(),
            },
        )
        .await
        .unwrap();

    // The rival approves the first stage between the loser's read and
    // its commit, moving the protocol to the second stage
    let open = store.open_execution(&protocol.id).await.unwrap().unwrap();
    let rival_user = UserId::new();
    let rival_commit = TransitionCommit {
        protocol_id: protocol.id.clone(),
        expected_execution: open.id.clone(),
        close_outcome: tramita_types::StageOutcome::Approved,
        acted_by: rival_user.clone(),
        notes: None,
        new_status: tramita_types::ProtocolStatus::Pending,
        new_current_stage: Some(stages[1].id.clone()),
        open_execution: Some(StageExecution::open(
            protocol.id.clone(),
            stages[1].id.clone(),
            stages[1].sector_id.clone(),
        )),
    };

    let interposed: Arc<dyn ProtocolStore> = Arc::new(RivalFirstStore {
        inner: store.clone(),
        rival: Mutex::new(Some(rival_commit)),
    });
    // Retries enabled: even with budget left, the loser must not carry
    // its approval over to the execution the rival opened
    let engine = TransitionEngine::new(workflows, interposed, dispatcher, 3, ReturnFallback::Reject);

    let loser = Actor::new(UserId::new(), vec![Role::Administrator], None);
    let result = engine
        .transition(&protocol.id, TransitionAction::Approve, &loser, None)
        .await;
    assert!(matches!(result, Err(TramitaError::Conflict(_))));

    // Only the rival's transition went through; the second stage is
    // still waiting for a decision
    let history = store.history(&protocol.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].outcome, tramita_types::StageOutcome::Approved);
    assert_eq!(history[0].acted_by, Some(rival_user));
    assert!(history[1].is_open());

    let updated = store.get_protocol(&protocol.id).await.unwrap().unwrap();
    assert_eq!(updated.status, tramita_types::ProtocolStatus::Pending);
    assert_eq!(updated.current_stage, Some(stages[1].id.clone()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transitions_on_distinct_protocols_are_independent() {
    let harness = harness(1, 3).await;
    let n = 16;

    let mut protocols = Vec::new();
    for i in 0..n {
        protocols.push(
            harness
                .service
                .create_protocol(
                    &requester(),
                    NewProtocol {
                        workflow_id: harness.workflow_id.clone(),
                        subject: format!("Pedido {}", i),
                        description: None,
                        priority: Priority::Medium,
                        files: Vec::new(),
                    },
                )
                .await
                .unwrap(),
        );
    }

    let tasks: Vec<_> = protocols
        .iter()
        .map(|protocol| {
            let engine = harness.engine.clone();
            let protocol_id = protocol.id.clone();
            tokio::spawn(async move {
                let actor = Actor::new(UserId::new(), vec![Role::Administrator], None);
                engine
                    .transition(&protocol_id, TransitionAction::Approve, &actor, None)
                    .await
            })
        })
        .collect();

    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // No cross-protocol interference: every single-stage protocol
    // completes
    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert!(outcomes
        .iter()
        .all(|o| o.as_ref().unwrap().status == tramita_types::ProtocolStatus::Completed));
}
