//! In-memory store backing all repository traits.
//!
//! One lock guards every table, so the compound mutations
//! (`insert_protocol`, `replace_stages`, `commit_transition`) are
//! all-or-nothing by construction. Operations hold the lock only for
//! the duration of the mutation, never across an await point.

use super::{ProtocolFilter, ProtocolStore, SequenceCounter, TransitionCommit, WorkflowStore};
use crate::error::{Result, TramitaError};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tramita_types::{
    Protocol, ProtocolId, StageDefinition, StageExecution, StageId, StageSpec, WorkflowDefinition,
    WorkflowId, WorkflowUpdate,
};

#[derive(Default)]
struct Inner {
    workflows: HashMap<WorkflowId, WorkflowDefinition>,
    stages: HashMap<StageId, StageDefinition>,
    protocols: HashMap<ProtocolId, Protocol>,
    /// Append-only stage execution ledger
    executions: Vec<StageExecution>,
    /// Per-year protocol number counters
    counters: HashMap<i32, u64>,
}

/// In-memory implementation of every store seam
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_stage_specs(specs: &[StageSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(TramitaError::Validation(
            "stage list must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for spec in specs {
        if spec.name.trim().is_empty() {
            return Err(TramitaError::Validation(
                "stage name must not be empty".to_string(),
            ));
        }
        if !seen.insert(spec.order) {
            return Err(TramitaError::Validation(format!(
                "duplicate stage order {} within workflow",
                spec.order
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn create_workflow(
        &self,
        name: String,
        description: Option<String>,
        active: bool,
    ) -> Result<WorkflowDefinition> {
        if name.trim().is_empty() {
            return Err(TramitaError::Validation(
                "workflow name must not be empty".to_string(),
            ));
        }

        let workflow = WorkflowDefinition::new(name, description, active);
        let mut inner = self.inner.write().await;
        inner
            .workflows
            .insert(workflow.id.clone(), workflow.clone());

        log::info!("Created workflow {} ({})", workflow.name, workflow.id);
        Ok(workflow)
    }

    async fn update_workflow(
        &self,
        id: &WorkflowId,
        update: WorkflowUpdate,
    ) -> Result<WorkflowDefinition> {
        let mut inner = self.inner.write().await;
        let workflow = inner
            .workflows
            .get_mut(id)
            .ok_or_else(|| TramitaError::NotFound(format!("workflow {}", id)))?;

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(TramitaError::Validation(
                    "workflow name must not be empty".to_string(),
                ));
            }
            workflow.name = name;
        }
        if let Some(description) = update.description {
            workflow.description = Some(description);
        }
        if let Some(active) = update.active {
            workflow.active = active;
        }
        workflow.updated_at = Utc::now();

        Ok(workflow.clone())
    }

    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>> {
        let inner = self.inner.read().await;
        Ok(inner.workflows.get(id).cloned())
    }

    async fn list_workflows(&self, active_only: bool) -> Result<Vec<WorkflowDefinition>> {
        let inner = self.inner.read().await;
        let mut workflows: Vec<_> = inner
            .workflows
            .values()
            .filter(|w| !active_only || w.active)
            .cloned()
            .collect();
        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(workflows)
    }

    async fn stages_ordered(&self, workflow_id: &WorkflowId) -> Result<Vec<StageDefinition>> {
        let inner = self.inner.read().await;
        let mut stages: Vec<_> = inner
            .stages
            .values()
            .filter(|s| s.workflow_id == *workflow_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| s.order);
        Ok(stages)
    }

    async fn get_stage(&self, stage_id: &StageId) -> Result<Option<StageDefinition>> {
        let inner = self.inner.read().await;
        Ok(inner.stages.get(stage_id).cloned())
    }

    async fn replace_stages(
        &self,
        workflow_id: &WorkflowId,
        specs: Vec<StageSpec>,
    ) -> Result<Vec<StageDefinition>> {
        validate_stage_specs(&specs)?;

        let mut inner = self.inner.write().await;
        if !inner.workflows.contains_key(workflow_id) {
            return Err(TramitaError::NotFound(format!("workflow {}", workflow_id)));
        }

        // Discard the old list and re-create under the same lock so a
        // partially applied replacement can never be observed
        inner.stages.retain(|_, s| s.workflow_id != *workflow_id);

        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            let stage = spec.into_definition(workflow_id.clone());
            inner.stages.insert(stage.id.clone(), stage.clone());
            created.push(stage);
        }
        created.sort_by_key(|s| s.order);

        log::info!(
            "Replaced stages of workflow {} with {} new stages",
            workflow_id,
            created.len()
        );
        Ok(created)
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.workflows.contains_key(id) {
            return Err(TramitaError::NotFound(format!("workflow {}", id)));
        }

        let referenced = inner
            .protocols
            .values()
            .any(|p| p.workflow_id == *id && !p.status.is_terminal());
        if referenced {
            return Err(TramitaError::InvalidState(format!(
                "workflow {} is referenced by protocols still in progress; deactivate it instead",
                id
            )));
        }

        inner.workflows.remove(id);
        inner.stages.retain(|_, s| s.workflow_id != *id);

        log::info!("Deleted workflow {} and its stages", id);
        Ok(())
    }
}

#[async_trait]
impl ProtocolStore for MemoryStore {
    async fn insert_protocol(&self, protocol: Protocol, initial: StageExecution) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.protocols.contains_key(&protocol.id) {
            return Err(TramitaError::Conflict(format!(
                "protocol {} already exists",
                protocol.id
            )));
        }

        inner.protocols.insert(protocol.id.clone(), protocol);
        inner.executions.push(initial);
        Ok(())
    }

    async fn get_protocol(&self, id: &ProtocolId) -> Result<Option<Protocol>> {
        let inner = self.inner.read().await;
        Ok(inner.protocols.get(id).cloned())
    }

    async fn list_protocols(&self, filter: &ProtocolFilter) -> Result<Vec<Protocol>> {
        let inner = self.inner.read().await;
        let mut protocols: Vec<_> = inner
            .protocols
            .values()
            .filter(|p| {
                filter
                    .requester
                    .as_ref()
                    .map_or(true, |r| p.requester_id == *r)
            })
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        protocols.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(protocols)
    }

    async fn open_execution(&self, protocol_id: &ProtocolId) -> Result<Option<StageExecution>> {
        let inner = self.inner.read().await;
        Ok(inner
            .executions
            .iter()
            .find(|e| e.protocol_id == *protocol_id && e.is_open())
            .cloned())
    }

    async fn history(&self, protocol_id: &ProtocolId) -> Result<Vec<StageExecution>> {
        let inner = self.inner.read().await;
        let mut history: Vec<_> = inner
            .executions
            .iter()
            .filter(|e| e.protocol_id == *protocol_id)
            .cloned()
            .collect();
        history.sort_by_key(|e| e.started_at);
        Ok(history)
    }

    async fn commit_transition(&self, commit: TransitionCommit) -> Result<()> {
        let mut inner = self.inner.write().await;

        let protocol = inner
            .protocols
            .get(&commit.protocol_id)
            .ok_or_else(|| TramitaError::NotFound(format!("protocol {}", commit.protocol_id)))?;

        // Precondition: the expected execution is still the open pending
        // visit and still matches the protocol's current stage. A losing
        // racer fails here and sees Conflict.
        let position = inner.executions.iter().position(|e| {
            e.id == commit.expected_execution && e.protocol_id == commit.protocol_id && e.is_open()
        });
        let position = match position {
            Some(p) => p,
            None => {
                return Err(TramitaError::Conflict(format!(
                    "pending execution of protocol {} changed under a concurrent transition",
                    commit.protocol_id
                )))
            }
        };
        if protocol.current_stage.as_ref() != Some(&inner.executions[position].stage_id) {
            return Err(TramitaError::Conflict(format!(
                "current stage of protocol {} changed under a concurrent transition",
                commit.protocol_id
            )));
        }

        let now = Utc::now();

        // Close the current execution
        let execution = &mut inner.executions[position];
        execution.outcome = commit.close_outcome;
        execution.ended_at = Some(now);
        execution.acted_by = Some(commit.acted_by.clone());
        execution.notes = commit.notes.clone();

        // Open the next visit, if the protocol moves to another stage
        if let Some(next) = commit.open_execution {
            inner.executions.push(next);
        }

        // Advance the protocol itself
        let protocol = inner
            .protocols
            .get_mut(&commit.protocol_id)
            .ok_or_else(|| TramitaError::NotFound(format!("protocol {}", commit.protocol_id)))?;
        protocol.status = commit.new_status;
        protocol.current_stage = commit.new_current_stage;
        protocol.updated_at = now;

        Ok(())
    }
}

#[async_trait]
impl SequenceCounter for MemoryStore {
    async fn next(&self, year: i32) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let counter = inner.counters.entry(year).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
