//! Audit and notification dispatch.
//!
//! Both sinks are invoked strictly after a successful commit and are
//! never awaited for correctness: the dispatcher spawns the delivery
//! and a failure is only logged, it can never roll back a transition.

use crate::config::NotificationConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tramita_types::{AuditEvent, Notification};

/// Consumes audit events at the external boundary
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;
}

/// Delivers outbound messages at the external boundary
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Fire-and-forget fan-out over the two boundary contracts
#[derive(Clone)]
pub struct Dispatcher {
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
    notifications: NotificationConfig,
}

impl Dispatcher {
    pub fn new(
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
        notifications: NotificationConfig,
    ) -> Self {
        Self {
            audit,
            notifier,
            notifications,
        }
    }

    /// Record an audit event in the background
    pub fn audit(&self, event: AuditEvent) {
        let sink = self.audit.clone();
        tokio::spawn(async move {
            let action = event.action.clone();
            if let Err(e) = sink.record(event).await {
                log::error!("Failed to record audit event {}: {}", action, e);
            }
        });
    }

    /// Enqueue a notification in the background, stamped with the
    /// configured sender
    pub fn notify(&self, mut notification: Notification) {
        if !self.notifications.enabled {
            return;
        }
        notification.sender = self.notifications.sender.clone();

        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let recipient = notification.recipient.clone();
            if let Err(e) = notifier.notify(notification).await {
                log::error!("Failed to notify {}: {}", recipient, e);
            }
        });
    }
}

/// Audit sink that only logs; useful default when no file is configured
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        log::info!(
            "audit: {} {} {} by {}",
            event.action,
            event.resource_type,
            event.resource_id,
            event
                .actor
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "system".to_string())
        );
        Ok(())
    }
}

/// Appends one JSON line per audit event to a log file
pub struct FileAuditSink {
    path: PathBuf,
}

impl FileAuditSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        let line = serde_json::to_string(&event)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Notifier that logs instead of delivering; the delivery transport is
/// out of scope for the engine
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        log::info!(
            "notify {} (from {}): {} - {}",
            notification.recipient,
            notification.sender,
            notification.subject,
            notification.body
        );
        Ok(())
    }
}
