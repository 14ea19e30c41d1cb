//! Workflow template types: a named, ordered list of stages a protocol follows

use crate::ids::{SectorId, StageId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reusable workflow template. Owns an ordered collection of stages.
///
/// Deactivation is preferred over deletion once any protocol references
/// the workflow; the store refuses to hard-delete referenced templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn new(name: String, description: Option<String>, active: bool) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            name,
            description,
            active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One step in a workflow, owned by a responsible sector.
///
/// `order` values are strictly unique within one workflow; next/previous
/// stage computation depends on this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: StageId,
    pub workflow_id: WorkflowId,
    pub name: String,
    pub order: u32,
    pub sector_id: SectorId,
    pub sla_hours: u32,
    pub mandatory: bool,
    /// Opaque breach-action labels, stored but never executed by the engine
    #[serde(default)]
    pub on_sla_breach: Vec<String>,
}

/// Input for creating or replacing a stage; IDs are assigned by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub order: u32,
    pub sector_id: SectorId,
    #[serde(default = "default_sla_hours")]
    pub sla_hours: u32,
    #[serde(default = "default_mandatory")]
    pub mandatory: bool,
    #[serde(default)]
    pub on_sla_breach: Vec<String>,
}

fn default_sla_hours() -> u32 {
    24
}

fn default_mandatory() -> bool {
    true
}

impl StageSpec {
    pub fn into_definition(self, workflow_id: WorkflowId) -> StageDefinition {
        StageDefinition {
            id: StageId::new(),
            workflow_id,
            name: self.name,
            order: self.order,
            sector_id: self.sector_id,
            sla_hours: self.sla_hours,
            mandatory: self.mandatory,
            on_sla_breach: self.on_sla_breach,
        }
    }
}

/// Fields an administrator may change on an existing workflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
}
