//! JSON request files accepted by the server's watch directory.
//!
//! One file per operation; the file is moved to `processed/` or
//! `failed/` after handling, so a directory listing doubles as a crude
//! processing log.

use serde::Deserialize;
use std::sync::Arc;
use tramita_core::{
    NewProtocol, ProtocolService, Result, TransitionEngine, WorkflowStore,
};
use tramita_types::{
    Actor, FileRef, Priority, ProtocolId, StageSpec, TransitionAction, WorkflowId, WorkflowUpdate,
};

fn default_active() -> bool {
    true
}

/// A single operation requested via the watch directory
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    CreateProtocol {
        actor: Actor,
        workflow_id: WorkflowId,
        subject: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        priority: Priority,
        #[serde(default)]
        files: Vec<FileRef>,
    },
    Transition {
        actor: Actor,
        protocol_id: ProtocolId,
        action: TransitionAction,
        #[serde(default)]
        notes: Option<String>,
    },
    GetProtocol {
        protocol_id: ProtocolId,
    },
    CreateWorkflow {
        name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_active")]
        active: bool,
    },
    UpdateWorkflow {
        workflow_id: WorkflowId,
        #[serde(default)]
        update: WorkflowUpdate,
    },
    ListWorkflows {
        #[serde(default)]
        active_only: bool,
    },
    DeleteWorkflow {
        workflow_id: WorkflowId,
    },
    ReplaceStages {
        workflow_id: WorkflowId,
        stages: Vec<StageSpec>,
    },
}

/// Dispatches parsed requests onto the engine
pub struct RequestProcessor {
    service: Arc<ProtocolService>,
    engine: Arc<TransitionEngine>,
    workflows: Arc<dyn WorkflowStore>,
}

impl RequestProcessor {
    pub fn new(
        service: Arc<ProtocolService>,
        engine: Arc<TransitionEngine>,
        workflows: Arc<dyn WorkflowStore>,
    ) -> Self {
        Self {
            service,
            engine,
            workflows,
        }
    }

    /// Handle one request, returning a short human-readable summary
    pub async fn handle(&self, request: Request) -> Result<String> {
        match request {
            Request::CreateProtocol {
                actor,
                workflow_id,
                subject,
                description,
                priority,
                files,
            } => {
                let protocol = self
                    .service
                    .create_protocol(
                        &actor,
                        NewProtocol {
                            workflow_id,
                            subject,
                            description,
                            priority,
                            files,
                        },
                    )
                    .await?;
                Ok(format!(
                    "created protocol {} ({})",
                    protocol.number, protocol.id
                ))
            }
            Request::Transition {
                actor,
                protocol_id,
                action,
                notes,
            } => {
                let protocol = self
                    .engine
                    .transition(&protocol_id, action, &actor, notes)
                    .await?;
                Ok(format!(
                    "protocol {} is now {} (current stage: {})",
                    protocol.number,
                    protocol.status,
                    protocol
                        .current_stage
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "none".to_string())
                ))
            }
            Request::GetProtocol { protocol_id } => {
                let (protocol, history) = self.service.get_protocol(&protocol_id).await?;
                Ok(format!(
                    "protocol {} status {} with {} stage visits",
                    protocol.number,
                    protocol.status,
                    history.len()
                ))
            }
            Request::CreateWorkflow {
                name,
                description,
                active,
            } => {
                let workflow = self
                    .workflows
                    .create_workflow(name, description, active)
                    .await?;
                Ok(format!("created workflow {} ({})", workflow.name, workflow.id))
            }
            Request::UpdateWorkflow {
                workflow_id,
                update,
            } => {
                let workflow = self.workflows.update_workflow(&workflow_id, update).await?;
                Ok(format!(
                    "updated workflow {} (active: {})",
                    workflow.id, workflow.active
                ))
            }
            Request::ListWorkflows { active_only } => {
                let workflows = self.workflows.list_workflows(active_only).await?;
                Ok(format!("{} workflows", workflows.len()))
            }
            Request::DeleteWorkflow { workflow_id } => {
                self.workflows.delete_workflow(&workflow_id).await?;
                Ok(format!("deleted workflow {}", workflow_id))
            }
            Request::ReplaceStages {
                workflow_id,
                stages,
            } => {
                let stages = self.workflows.replace_stages(&workflow_id, stages).await?;
                Ok(format!(
                    "replaced stages of workflow {} ({} stages)",
                    workflow_id,
                    stages.len()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tramita_core::{
        Dispatcher, LogAuditSink, LogNotifier, MemoryStore, NotificationConfig, ProtocolStore,
        ReturnFallback, SequenceCounter,
    };
    use tramita_types::{Role, SectorId, UserId};

    fn processor_with_store() -> (RequestProcessor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(
            Arc::new(LogAuditSink),
            Arc::new(LogNotifier),
            NotificationConfig {
                enabled: false,
                ..Default::default()
            },
        );

        let workflows: Arc<dyn WorkflowStore> = store.clone();
        let protocols: Arc<dyn ProtocolStore> = store.clone();
        let sequence: Arc<dyn SequenceCounter> = store.clone();

        let service = Arc::new(ProtocolService::new(
            workflows.clone(),
            protocols.clone(),
            sequence,
            dispatcher.clone(),
        ));
        let engine = Arc::new(TransitionEngine::new(
            workflows.clone(),
            protocols,
            dispatcher,
            3,
            ReturnFallback::Reject,
        ));

        (RequestProcessor::new(service, engine, workflows), store)
    }

    #[test]
    fn test_request_parses_from_json() {
        let json = format!(
            r#"{{
                "type": "create_protocol",
                "actor": {{ "user_id": "{}", "roles": ["requester"], "sector_id": null }},
                "workflow_id": "{}",
                "subject": "Pedido de material"
            }}"#,
            UserId::new(),
            WorkflowId::new()
        );

        let request: Request = serde_json::from_str(&json).unwrap();
        match request {
            Request::CreateProtocol {
                subject, priority, ..
            } => {
                assert_eq!(subject, "Pedido de material");
                assert_eq!(priority, Priority::Medium);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_request_type_is_rejected() {
        let json = r#"{ "type": "drop_tables" }"#;
        assert!(serde_json::from_str::<Request>(json).is_err());
    }

    #[tokio::test]
    async fn test_workflow_administration_requests() {
        let (processor, _store) = processor_with_store();

        let summary = processor
            .handle(Request::CreateWorkflow {
                name: "Fluxo temporário".to_string(),
                description: None,
                active: true,
            })
            .await
            .unwrap();
        let workflow_id = summary
            .rsplit('(')
            .next()
            .and_then(|s| s.strip_suffix(')'))
            .map(|s| WorkflowId::from_string(s).unwrap())
            .unwrap();

        let summary = processor
            .handle(Request::ListWorkflows { active_only: true })
            .await
            .unwrap();
        assert_eq!(summary, "1 workflows");

        let summary = processor
            .handle(Request::UpdateWorkflow {
                workflow_id: workflow_id.clone(),
                update: WorkflowUpdate {
                    active: Some(false),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        assert!(summary.contains("active: false"));

        let summary = processor
            .handle(Request::ListWorkflows { active_only: true })
            .await
            .unwrap();
        assert_eq!(summary, "0 workflows");

        processor
            .handle(Request::DeleteWorkflow { workflow_id })
            .await
            .unwrap();
        let summary = processor
            .handle(Request::ListWorkflows { active_only: false })
            .await
            .unwrap();
        assert_eq!(summary, "0 workflows");
    }

    #[tokio::test]
    async fn test_full_request_cycle() {
        let (processor, _store) = processor_with_store();

        let summary = processor
            .handle(Request::CreateWorkflow {
                name: "Fluxo de compras".to_string(),
                description: None,
                active: true,
            })
            .await
            .unwrap();
        assert!(summary.starts_with("created workflow"));

        // Pull the workflow id back out of the summary tail
        let workflow_id = summary
            .rsplit('(')
            .next()
            .and_then(|s| s.strip_suffix(')'))
            .map(|s| WorkflowId::from_string(s).unwrap())
            .unwrap();

        processor
            .handle(Request::ReplaceStages {
                workflow_id: workflow_id.clone(),
                stages: vec![StageSpec {
                    name: "Aprovação".to_string(),
                    order: 1,
                    sector_id: SectorId::new(),
                    sla_hours: 24,
                    mandatory: true,
                    on_sla_breach: Vec::new(),
                }],
            })
            .await
            .unwrap();

        let requester = Actor::new(UserId::new(), vec![Role::Requester], None);
        let summary = processor
            .handle(Request::CreateProtocol {
                actor: requester,
                workflow_id,
                subject: "Compra de notebooks".to_string(),
                description: None,
                priority: Priority::High,
                files: Vec::new(),
            })
            .await
            .unwrap();
        assert!(summary.starts_with("created protocol"));

        let protocol_id = summary
            .rsplit('(')
            .next()
            .and_then(|s| s.strip_suffix(')'))
            .map(|s| ProtocolId::from_string(s).unwrap())
            .unwrap();

        let admin = Actor::new(UserId::new(), vec![Role::Administrator], None);
        let summary = processor
            .handle(Request::Transition {
                actor: admin,
                protocol_id: protocol_id.clone(),
                action: TransitionAction::Approve,
                notes: None,
            })
            .await
            .unwrap();
        assert!(summary.contains("completed"));

        let summary = processor
            .handle(Request::GetProtocol { protocol_id })
            .await
            .unwrap();
        assert!(summary.contains("1 stage visits"));
    }
}
