//! Repository seams for the engine.
//!
//! Stores are constructed once at process start and injected as `Arc`s;
//! there is no process-wide mutable registry. The `commit_transition`
//! contract is where atomicity lives: the backing store applies the
//! compound mutation all-or-nothing and re-checks the pending-execution
//! precondition at commit time.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use tramita_types::{
    ExecutionId, Protocol, ProtocolId, ProtocolStatus, StageDefinition, StageExecution, StageId,
    StageOutcome, StageSpec, UserId, WorkflowDefinition, WorkflowId, WorkflowUpdate,
};

/// Filter for protocol listing
#[derive(Debug, Clone, Default)]
pub struct ProtocolFilter {
    /// Restrict to protocols created by this requester
    pub requester: Option<UserId>,
    /// Restrict to protocols in this status
    pub status: Option<ProtocolStatus>,
}

/// The compound mutation of a single transition, applied atomically.
///
/// `expected_execution` is the precondition: the commit only applies if
/// that execution is still the protocol's open pending execution. A
/// defeated precondition surfaces as `Conflict` and the caller may retry.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub protocol_id: ProtocolId,
    pub expected_execution: ExecutionId,
    /// Outcome recorded on the execution being closed
    pub close_outcome: StageOutcome,
    pub acted_by: UserId,
    pub notes: Option<String>,
    /// Protocol status after the commit
    pub new_status: ProtocolStatus,
    /// Current stage after the commit; `None` on the terminal paths
    pub new_current_stage: Option<StageId>,
    /// Fresh pending execution to open, when the protocol moves to a stage
    pub open_execution: Option<StageExecution>,
}

/// Owns workflow templates and their ordered stage lists
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create_workflow(
        &self,
        name: String,
        description: Option<String>,
        active: bool,
    ) -> Result<WorkflowDefinition>;

    /// Apply the given fields; NotFound if the workflow does not exist
    async fn update_workflow(
        &self,
        id: &WorkflowId,
        update: WorkflowUpdate,
    ) -> Result<WorkflowDefinition>;

    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>>;

    async fn list_workflows(&self, active_only: bool) -> Result<Vec<WorkflowDefinition>>;

    /// Stages of a workflow ordered ascending by `order`
    async fn stages_ordered(&self, workflow_id: &WorkflowId) -> Result<Vec<StageDefinition>>;

    async fn get_stage(&self, stage_id: &StageId) -> Result<Option<StageDefinition>>;

    /// Full replacement: the entire existing stage list is discarded and
    /// the supplied list re-created as a single atomic unit. Duplicate
    /// order values or an empty list reject the whole batch.
    async fn replace_stages(
        &self,
        workflow_id: &WorkflowId,
        specs: Vec<StageSpec>,
    ) -> Result<Vec<StageDefinition>>;

    /// Remove a workflow and cascade-delete its stages. Refused with
    /// InvalidState while any non-terminal protocol references it;
    /// deactivation via `update_workflow` is the soft alternative.
    async fn delete_workflow(&self, id: &WorkflowId) -> Result<()>;
}

/// Owns protocols and their append-only chain of stage executions
#[async_trait]
pub trait ProtocolStore: Send + Sync {
    /// Insert a new protocol together with its initial pending execution,
    /// atomically
    async fn insert_protocol(&self, protocol: Protocol, initial: StageExecution) -> Result<()>;

    async fn get_protocol(&self, id: &ProtocolId) -> Result<Option<Protocol>>;

    /// Newest first
    async fn list_protocols(&self, filter: &ProtocolFilter) -> Result<Vec<Protocol>>;

    /// The protocol's single open pending execution, if any
    async fn open_execution(&self, protocol_id: &ProtocolId) -> Result<Option<StageExecution>>;

    /// Every stage visit of a protocol, ordered by start time ascending
    async fn history(&self, protocol_id: &ProtocolId) -> Result<Vec<StageExecution>>;

    /// Apply a transition commit all-or-nothing; Conflict when the
    /// precondition no longer holds
    async fn commit_transition(&self, commit: TransitionCommit) -> Result<()>;
}

/// Issues the yearly sequence backing protocol numbers.
///
/// Must be an atomic increment-and-read; counting existing rows races
/// under concurrent creation and can emit duplicate numbers.
#[async_trait]
pub trait SequenceCounter: Send + Sync {
    async fn next(&self, year: i32) -> Result<u64>;
}
