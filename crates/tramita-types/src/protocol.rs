//! Protocol (case record) types and the stage execution ledger rows

use crate::ids::{ExecutionId, FileRef, ProtocolId, SectorId, StageId, UserId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol lifecycle status.
///
/// "In progress" is represented as `Pending` with a non-null current
/// stage; `Completed` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolStatus {
    Pending,
    Completed,
    Rejected,
}

impl ProtocolStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl fmt::Display for ProtocolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Requester-assigned priority, carried for display and sorting only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// A case record routed through a workflow.
///
/// Invariant: `current_stage` is `Some` exactly while `status` is not
/// terminal. The transition engine is the only writer after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protocol {
    pub id: ProtocolId,
    /// Human-readable sequential number, `YYYY-NNNNNN`
    pub number: ProtocolNumber,
    pub workflow_id: WorkflowId,
    pub current_stage: Option<StageId>,
    pub requester_id: UserId,
    pub subject: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: ProtocolStatus,
    #[serde(default)]
    pub files: Vec<FileRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sequential protocol number: 4-digit year, hyphen, 6-digit zero-padded
/// sequence scoped to that year
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolNumber(String);

impl ProtocolNumber {
    pub fn new(year: i32, sequence: u64) -> Self {
        Self(format!("{}-{:06}", year, sequence))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtocolNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one stage visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Pending,
    Approved,
    Rejected,
    Returned,
}

/// Action requested against the protocol's current stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Approve,
    Reject,
    Return,
}

impl TransitionAction {
    /// Outcome recorded on the execution being closed by this action
    pub fn closing_outcome(&self) -> StageOutcome {
        match self {
            Self::Approve => StageOutcome::Approved,
            Self::Reject => StageOutcome::Rejected,
            Self::Return => StageOutcome::Returned,
        }
    }
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Return => "return",
        };
        write!(f, "{}", s)
    }
}

/// One visit of one protocol to one stage.
///
/// The sector is captured at visit time and stays immutable even if the
/// stage definition's sector later changes. A closed row (end time and
/// non-pending outcome set) is never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    pub id: ExecutionId,
    pub protocol_id: ProtocolId,
    pub stage_id: StageId,
    pub sector_id: SectorId,
    pub acted_by: Option<UserId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: StageOutcome,
    pub notes: Option<String>,
    pub system_notes: Option<String>,
}

impl StageExecution {
    /// Open a fresh pending visit to a stage
    pub fn open(protocol_id: ProtocolId, stage_id: StageId, sector_id: SectorId) -> Self {
        Self {
            id: ExecutionId::new(),
            protocol_id,
            stage_id,
            sector_id,
            acted_by: None,
            started_at: Utc::now(),
            ended_at: None,
            outcome: StageOutcome::Pending,
            notes: None,
            system_notes: None,
        }
    }

    pub fn with_system_notes(mut self, notes: String) -> Self {
        self.system_notes = Some(notes);
        self
    }

    pub fn is_open(&self) -> bool {
        self.outcome == StageOutcome::Pending && self.ended_at.is_none()
    }
}
