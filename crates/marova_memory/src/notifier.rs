//! Background notification delivery.
//!
//! Operations enqueue a subject line and return immediately. A single worker
//! task drains the unbounded queue; delivery failures are logged and dropped.

use async_trait::async_trait;
use marova_core::Notifier;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str) -> anyhow::Result<()> {
        tracing::info!(subject, "Notification");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<String>,
}

impl NotificationDispatcher {
    /// Spawn the delivery worker. Must be called inside a Tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(subject) = rx.recv().await {
                if let Err(e) = notifier.send(&subject).await {
                    tracing::warn!("Notification delivery failed: {:#}", e);
                }
            }
            tracing::debug!("Notification worker stopped");
        });

        Self { tx }
    }

    /// Queue `subject` for delivery. Never fails the caller.
    pub fn enqueue(&self, subject: impl Into<String>) {
        if self.tx.send(subject.into()).is_err() {
            tracing::warn!("Notification worker gone, message dropped");
        }
    }
}
