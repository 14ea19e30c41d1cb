//! Shared domain types for the protocol tramitation engine

pub mod actor;
pub mod events;
pub mod ids;
pub mod protocol;
pub mod workflow;

pub use actor::{Actor, Role};
pub use events::{AuditEvent, Notification};
pub use ids::{ExecutionId, FileRef, InvalidId, ProtocolId, SectorId, StageId, UserId, WorkflowId};
pub use protocol::{
    Priority, Protocol, ProtocolNumber, ProtocolStatus, StageExecution, StageOutcome,
    TransitionAction,
};
pub use workflow::{StageDefinition, StageSpec, WorkflowDefinition, WorkflowUpdate};
