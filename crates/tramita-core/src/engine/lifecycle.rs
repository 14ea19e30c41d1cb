//! Protocol lifecycle: creation, retrieval and listing.
//!
//! Creation seeds a protocol from its workflow template: number issued
//! from the per-year counter, first stage assigned, initial pending
//! execution opened atomically with the protocol row.

use crate::dispatch::Dispatcher;
use crate::error::{Result, TramitaError};
use crate::store::{ProtocolFilter, ProtocolStore, SequenceCounter, WorkflowStore};
use chrono::{Datelike, Utc};
use std::sync::Arc;
use tramita_types::{
    Actor, AuditEvent, FileRef, Priority, Protocol, ProtocolId, ProtocolNumber, ProtocolStatus,
    StageExecution, WorkflowId,
};

/// Input for protocol creation
#[derive(Debug, Clone)]
pub struct NewProtocol {
    pub workflow_id: WorkflowId,
    pub subject: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub files: Vec<FileRef>,
}

/// Creates protocols and serves read access to them
pub struct ProtocolService {
    workflows: Arc<dyn WorkflowStore>,
    protocols: Arc<dyn ProtocolStore>,
    sequence: Arc<dyn SequenceCounter>,
    dispatcher: Dispatcher,
}

impl ProtocolService {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        protocols: Arc<dyn ProtocolStore>,
        sequence: Arc<dyn SequenceCounter>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            workflows,
            protocols,
            sequence,
            dispatcher,
        }
    }

    /// Create a protocol on the given workflow, assigning the first
    /// stage and opening its initial pending execution
    pub async fn create_protocol(&self, requester: &Actor, new: NewProtocol) -> Result<Protocol> {
        if new.subject.trim().is_empty() {
            return Err(TramitaError::Validation(
                "subject must not be empty".to_string(),
            ));
        }

        let workflow = self
            .workflows
            .get_workflow(&new.workflow_id)
            .await?
            .ok_or_else(|| TramitaError::NotFound(format!("workflow {}", new.workflow_id)))?;
        if !workflow.active {
            return Err(TramitaError::InvalidState(format!(
                "workflow {} is inactive",
                workflow.id
            )));
        }

        let stages = self.workflows.stages_ordered(&workflow.id).await?;
        let first = stages.first().ok_or_else(|| {
            TramitaError::InvalidState(format!("workflow {} has no stages", workflow.id))
        })?;

        // The number must come from the atomic counter; counting
        // existing protocols races under concurrent creation
        let year = Utc::now().year();
        let sequence = self.sequence.next(year).await?;
        let number = ProtocolNumber::new(year, sequence);

        let now = Utc::now();
        let protocol = Protocol {
            id: ProtocolId::new(),
            number: number.clone(),
            workflow_id: workflow.id.clone(),
            current_stage: Some(first.id.clone()),
            requester_id: requester.user_id.clone(),
            subject: new.subject,
            description: new.description,
            priority: new.priority,
            status: ProtocolStatus::Pending,
            files: new.files,
            created_at: now,
            updated_at: now,
        };

        let initial = StageExecution::open(
            protocol.id.clone(),
            first.id.clone(),
            first.sector_id.clone(),
        );
        self.protocols
            .insert_protocol(protocol.clone(), initial)
            .await?;

        log::info!(
            "Created protocol {} ({}) on workflow {}, first stage '{}'",
            number,
            protocol.id,
            workflow.name,
            first.name
        );

        self.dispatcher.audit(AuditEvent::protocol_created(
            &protocol.id,
            &number,
            &requester.user_id,
        ));

        Ok(protocol)
    }

    /// Protocol together with its stage visit history, ordered by start
    /// time ascending
    pub async fn get_protocol(
        &self,
        id: &ProtocolId,
    ) -> Result<(Protocol, Vec<StageExecution>)> {
        let protocol = self
            .protocols
            .get_protocol(id)
            .await?
            .ok_or_else(|| TramitaError::NotFound(format!("protocol {}", id)))?;
        let history = self.protocols.history(id).await?;
        Ok((protocol, history))
    }

    /// List protocols the actor is allowed to see. Privileged roles see
    /// everything; everyone else only their own requests.
    pub async fn list_protocols(
        &self,
        actor: &Actor,
        status: Option<ProtocolStatus>,
    ) -> Result<Vec<Protocol>> {
        let filter = ProtocolFilter {
            requester: if actor.sees_all_protocols() {
                None
            } else {
                Some(actor.user_id.clone())
            },
            status,
        };
        self.protocols.list_protocols(&filter).await
    }
}
