//! Strongly typed identifiers
//! No string-based IDs crossing module boundaries - everything is strongly typed

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parse failure for a typed identifier
#[derive(Debug, thiserror::Error)]
#[error("invalid {kind}: {reason}")]
pub struct InvalidId {
    pub kind: &'static str,
    pub reason: String,
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn from_string(s: &str) -> Result<Self, InvalidId> {
                // Validate UUID format
                uuid::Uuid::parse_str(s)
                    .map(|_| Self(s.to_string()))
                    .map_err(|e| InvalidId {
                        kind: stringify!($name),
                        reason: e.to_string(),
                    })
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a workflow definition
    WorkflowId
);
uuid_id!(
    /// Identifier of a stage definition within a workflow
    StageId
);
uuid_id!(
    /// Identifier of a protocol (case record)
    ProtocolId
);
uuid_id!(
    /// Identifier of one stage visit of one protocol
    ExecutionId
);
uuid_id!(
    /// Identifier of an organizational sector
    SectorId
);
uuid_id!(
    /// Identifier of a user, as supplied by the external auth layer
    UserId
);

/// Opaque reference to an attached file; the engine never interprets content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRef(String);

impl FileRef {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
