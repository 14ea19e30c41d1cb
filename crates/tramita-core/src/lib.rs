//! Tramita Core Library
//!
//! Consolidated business logic for the protocol tramitation system:
//! workflow templates, the stage execution ledger, protocol lifecycle
//! and the transition engine.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod store;

// Re-export main types for easy access
pub use config::{NotificationConfig, ReturnFallback, TramitaConfig};
pub use error::{Result, TramitaError};

pub use store::{
    MemoryStore, ProtocolFilter, ProtocolStore, SequenceCounter, TransitionCommit, WorkflowStore,
};

pub use dispatch::{AuditSink, Dispatcher, FileAuditSink, LogAuditSink, LogNotifier, Notifier};

pub use engine::{NewProtocol, ProtocolService, TransitionEngine};
