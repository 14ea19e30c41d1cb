//! Configuration management for the tramitation engine

use crate::error::{Result, TramitaError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure, loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TramitaConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many times a transition commit defeated by a concurrent
    /// mutation is retried before Conflict surfaces to the caller
    #[serde(default = "default_max_transition_attempts")]
    pub max_transition_attempts: u32,

    /// What `return` does on a stage that has no previous stage
    #[serde(default)]
    pub return_fallback: ReturnFallback,
}

/// Policy for `return` requested on the first stage of a workflow.
/// The observed legacy behavior folds this into the reject path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnFallback {
    /// Close the protocol as Rejected (legacy behavior)
    Reject,
    /// Refuse the transition with an invalid-state error
    Error,
}

impl Default for ReturnFallback {
    fn default() -> Self {
        Self::Reject
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Directory watched for incoming JSON request files
    #[serde(default = "default_requests_dir")]
    pub requests_dir: String,

    /// Append-only JSON-lines audit log
    #[serde(default = "default_audit_log")]
    pub audit_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notifications_enabled")]
    pub enabled: bool,

    /// Sender name stamped on outbound messages
    #[serde(default = "default_sender")]
    pub sender: String,
}

fn default_max_transition_attempts() -> u32 {
    3
}

fn default_requests_dir() -> String {
    "/data/requests".to_string()
}

fn default_audit_log() -> String {
    "/data/audit.log".to_string()
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_sender() -> String {
    "tramita".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_transition_attempts: default_max_transition_attempts(),
            return_fallback: ReturnFallback::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            requests_dir: default_requests_dir(),
            audit_log: default_audit_log(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_notifications_enabled(),
            sender: default_sender(),
        }
    }
}

impl Default for TramitaConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            server: ServerConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl TramitaConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TramitaError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TramitaConfig = serde_json::from_str(json)
            .map_err(|e| TramitaError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_transition_attempts == 0 {
            return Err(TramitaError::Config(
                "max_transition_attempts must be at least 1".to_string(),
            ));
        }

        if self.server.requests_dir.is_empty() {
            return Err(TramitaError::Config(
                "requests_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
