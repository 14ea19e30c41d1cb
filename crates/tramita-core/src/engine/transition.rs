//! The transition engine: approve / return / reject against the
//! protocol's current stage.
//!
//! The compound mutation (close current execution, move or terminate
//! the protocol, open the next execution) goes through the store's
//! atomic commit. A commit defeated by a concurrent mutation comes back
//! as Conflict and is retried a bounded number of times before it
//! surfaces to the caller.

use crate::config::ReturnFallback;
use crate::dispatch::Dispatcher;
use crate::engine::policy;
use crate::error::{Result, TramitaError};
use crate::store::{ProtocolStore, TransitionCommit, WorkflowStore};
use std::sync::Arc;
use tramita_types::{
    Actor, AuditEvent, ExecutionId, Notification, Protocol, ProtocolId, ProtocolStatus,
    StageDefinition, StageExecution, TransitionAction,
};

/// Where a transition moves the protocol
enum Target {
    /// Move to another stage and open a visit there
    Stage(StageDefinition, Option<String>),
    /// Last stage approved: the protocol is done
    Complete,
    /// Terminal rejection
    Reject,
}

/// Executes approve/return/reject transitions
pub struct TransitionEngine {
    workflows: Arc<dyn WorkflowStore>,
    protocols: Arc<dyn ProtocolStore>,
    dispatcher: Dispatcher,
    max_attempts: u32,
    return_fallback: ReturnFallback,
}

impl TransitionEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        protocols: Arc<dyn ProtocolStore>,
        dispatcher: Dispatcher,
        max_attempts: u32,
        return_fallback: ReturnFallback,
    ) -> Self {
        Self {
            workflows,
            protocols,
            dispatcher,
            max_attempts: max_attempts.max(1),
            return_fallback,
        }
    }

    /// Apply a transition to the protocol's current stage.
    ///
    /// The action is bound to the pending execution observed on the
    /// first attempt: a retry only re-submits against that same
    /// execution, never against one opened by a concurrent transition.
    ///
    /// Errors: NotFound (no such protocol), InvalidState (terminal
    /// protocol or stage configuration missing), Forbidden (actor not in
    /// the responsible sector and without override), Conflict (another
    /// transition closed the pending execution first).
    pub async fn transition(
        &self,
        protocol_id: &ProtocolId,
        action: TransitionAction,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<Protocol> {
        let mut observed: Option<ExecutionId> = None;
        let mut attempt = 1;
        loop {
            match self
                .try_transition(protocol_id, action, actor, notes.clone(), &mut observed)
                .await
            {
                Err(TramitaError::Conflict(reason)) if attempt < self.max_attempts => {
                    log::warn!(
                        "Transition {} on protocol {} lost a race (attempt {}/{}): {}",
                        action,
                        protocol_id,
                        attempt,
                        self.max_attempts,
                        reason
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn try_transition(
        &self,
        protocol_id: &ProtocolId,
        action: TransitionAction,
        actor: &Actor,
        notes: Option<String>,
        observed: &mut Option<ExecutionId>,
    ) -> Result<Protocol> {
        let protocol = self
            .protocols
            .get_protocol(protocol_id)
            .await?
            .ok_or_else(|| TramitaError::NotFound(format!("protocol {}", protocol_id)))?;

        let execution = self
            .protocols
            .open_execution(protocol_id)
            .await?
            .ok_or_else(|| {
                TramitaError::InvalidState(format!(
                    "protocol {} has no pending stage execution ({})",
                    protocol_id, protocol.status
                ))
            })?;

        // The caller acted on the execution seen first; if a rival
        // closed it and opened another, applying the action there would
        // decide a stage nobody looked at
        match observed {
            Some(expected) if *expected != execution.id => {
                return Err(TramitaError::Conflict(format!(
                    "pending execution of protocol {} was closed by a concurrent transition",
                    protocol_id
                )));
            }
            Some(_) => {}
            None => *observed = Some(execution.id.clone()),
        }

        if protocol.current_stage.as_ref() != Some(&execution.stage_id) {
            return Err(TramitaError::InvalidState(format!(
                "pending execution of protocol {} does not match its current stage",
                protocol_id
            )));
        }

        // Authorization happens before any mutation, against the sector
        // captured at visit time
        if !policy::is_authorized(actor, &execution.sector_id) {
            return Err(TramitaError::Forbidden(format!(
                "user {} may not act on protocol {} in sector {}",
                actor.user_id, protocol_id, execution.sector_id
            )));
        }

        let stage = self
            .workflows
            .get_stage(&execution.stage_id)
            .await?
            .ok_or_else(|| {
                TramitaError::InvalidState(format!(
                    "stage configuration {} of protocol {} is missing",
                    execution.stage_id, protocol_id
                ))
            })?;

        let stages = self.workflows.stages_ordered(&protocol.workflow_id).await?;
        let target = self.resolve_target(action, &stage, &stages)?;

        let commit = match &target {
            Target::Stage(next, system_notes) => {
                let mut open = StageExecution::open(
                    protocol.id.clone(),
                    next.id.clone(),
                    next.sector_id.clone(),
                );
                if let Some(system_notes) = system_notes {
                    open = open.with_system_notes(system_notes.clone());
                }
                TransitionCommit {
                    protocol_id: protocol.id.clone(),
                    expected_execution: execution.id.clone(),
                    close_outcome: action.closing_outcome(),
                    acted_by: actor.user_id.clone(),
                    notes: notes.clone(),
                    new_status: ProtocolStatus::Pending,
                    new_current_stage: Some(next.id.clone()),
                    open_execution: Some(open),
                }
            }
            Target::Complete => TransitionCommit {
                protocol_id: protocol.id.clone(),
                expected_execution: execution.id.clone(),
                close_outcome: action.closing_outcome(),
                acted_by: actor.user_id.clone(),
                notes: notes.clone(),
                new_status: ProtocolStatus::Completed,
                new_current_stage: None,
                open_execution: None,
            },
            Target::Reject => TransitionCommit {
                protocol_id: protocol.id.clone(),
                expected_execution: execution.id.clone(),
                close_outcome: action.closing_outcome(),
                acted_by: actor.user_id.clone(),
                notes: notes.clone(),
                new_status: ProtocolStatus::Rejected,
                new_current_stage: None,
                open_execution: None,
            },
        };

        self.protocols.commit_transition(commit).await?;

        let updated = self
            .protocols
            .get_protocol(protocol_id)
            .await?
            .ok_or_else(|| TramitaError::NotFound(format!("protocol {}", protocol_id)))?;

        log::info!(
            "Protocol {} {}: '{}' -> {}",
            updated.number,
            action,
            stage.name,
            match &target {
                Target::Stage(next, _) => next.name.clone(),
                Target::Complete => "completed".to_string(),
                Target::Reject => "rejected".to_string(),
            }
        );

        // Post-commit side effects: recorded and enqueued best-effort,
        // never awaited for correctness
        self.dispatcher.audit(AuditEvent::protocol_transition(
            &updated.id,
            action,
            &stage.name,
            notes.as_deref(),
            &actor.user_id,
        ));
        self.dispatcher.notify(Notification::new(
            updated.requester_id.clone(),
            format!("Protocolo {} atualizado", updated.number),
            self.describe(action, &updated, &stage),
        ));

        Ok(updated)
    }

    /// Compute where the action takes the protocol, using the strict
    /// order over the workflow's stages
    fn resolve_target(
        &self,
        action: TransitionAction,
        current: &StageDefinition,
        stages: &[StageDefinition],
    ) -> Result<Target> {
        match action {
            TransitionAction::Approve => {
                // Smallest order strictly greater than the current one
                let next = stages.iter().find(|s| s.order > current.order);
                Ok(match next {
                    Some(next) => Target::Stage(next.clone(), None),
                    None => Target::Complete,
                })
            }
            TransitionAction::Return => {
                // Largest order strictly less than the current one
                let previous = stages.iter().rev().find(|s| s.order < current.order);
                match previous {
                    Some(previous) => Ok(Target::Stage(
                        previous.clone(),
                        Some(format!("Returned from {}", current.name)),
                    )),
                    None => match self.return_fallback {
                        ReturnFallback::Reject => Ok(Target::Reject),
                        ReturnFallback::Error => Err(TramitaError::InvalidState(format!(
                            "stage '{}' has no previous stage to return to",
                            current.name
                        ))),
                    },
                }
            }
            TransitionAction::Reject => Ok(Target::Reject),
        }
    }

    fn describe(
        &self,
        action: TransitionAction,
        protocol: &Protocol,
        stage: &StageDefinition,
    ) -> String {
        match (action, protocol.status) {
            (_, ProtocolStatus::Completed) => {
                format!("O protocolo {} foi concluído.", protocol.number)
            }
            (_, ProtocolStatus::Rejected) => format!(
                "O protocolo {} foi rejeitado na etapa '{}'.",
                protocol.number, stage.name
            ),
            (TransitionAction::Return, _) => format!(
                "O protocolo {} foi devolvido pela etapa '{}'.",
                protocol.number, stage.name
            ),
            (_, _) => format!(
                "O protocolo {} foi aprovado na etapa '{}'.",
                protocol.number, stage.name
            ),
        }
    }
}
