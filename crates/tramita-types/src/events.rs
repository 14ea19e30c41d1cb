//! Post-commit event payloads consumed by the audit and notification
//! dispatcher. Emitted strictly after a successful commit, best-effort.

use crate::ids::{ProtocolId, UserId};
use crate::protocol::{ProtocolNumber, TransitionAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audited action label, e.g. "PROTOCOL_TRANSITION_APPROVE"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub actor: Option<UserId>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn protocol_created(protocol_id: &ProtocolId, number: &ProtocolNumber, actor: &UserId) -> Self {
        Self {
            action: "PROTOCOL_CREATE".to_string(),
            resource_type: "Protocol".to_string(),
            resource_id: protocol_id.to_string(),
            actor: Some(actor.clone()),
            details: serde_json::json!({ "number": number.as_str() }),
            timestamp: Utc::now(),
        }
    }

    pub fn protocol_transition(
        protocol_id: &ProtocolId,
        action: TransitionAction,
        stage_name: &str,
        notes: Option<&str>,
        actor: &UserId,
    ) -> Self {
        Self {
            action: format!("PROTOCOL_TRANSITION_{}", action.to_string().to_uppercase()),
            resource_type: "Protocol".to_string(),
            resource_id: protocol_id.to_string(),
            actor: Some(actor.clone()),
            details: serde_json::json!({
                "stage": stage_name,
                "action": action,
                "notes": notes,
            }),
            timestamp: Utc::now(),
        }
    }
}

/// Outbound message handed to the notification boundary, fire-and-forget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: UserId,
    /// Sender label, stamped by the dispatcher from configuration
    #[serde(default)]
    pub sender: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(recipient: UserId, subject: String, body: String) -> Self {
        Self {
            recipient,
            sender: String::new(),
            subject,
            body,
        }
    }
}
