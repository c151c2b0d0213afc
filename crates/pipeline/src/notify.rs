//! Job notifications and their delivery.
//!
//! Producers (poll monitors, the callback receiver) hand [`JobNotification`]s
//! to a cloneable [`Notifier`]. A single [`DeliveryTask`] drains the bounded
//! channel behind it and pushes each notification into the
//! [`NotificationSink`] (in production, the WebSocket connection manager).
//! Delivery failures are logged and counted inside the task; they never
//! reach the producer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use daflow_core::job_events::{
    EVENT_DOWNLOAD_RESULT, EVENT_ON_COMPLETE, KIND_DOWNLOAD, KIND_ERROR, KIND_REPORT, KIND_STATUS,
};
use daflow_core::types::{ConnectionId, WorkItemId};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::workitem::ConnectionSubscription;

// ---------------------------------------------------------------------------
// JobNotification
// ---------------------------------------------------------------------------

/// What a notification carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// A status observation, body is the status JSON.
    Status,
    /// The plain-text work-item report.
    Report,
    /// A failure while following the job.
    Error,
    /// A signed URL to the output artifact.
    DownloadResult,
}

impl NotificationKind {
    /// Event name on the wire.
    pub fn event(self) -> &'static str {
        match self {
            Self::DownloadResult => EVENT_DOWNLOAD_RESULT,
            _ => EVENT_ON_COMPLETE,
        }
    }

    /// Kind name on the wire.
    pub fn kind(self) -> &'static str {
        match self {
            Self::Status => KIND_STATUS,
            Self::Report => KIND_REPORT,
            Self::Error => KIND_ERROR,
            Self::DownloadResult => KIND_DOWNLOAD,
        }
    }
}

/// One message addressed to a client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNotification {
    pub connection_id: ConnectionId,
    pub work_item_id: Option<WorkItemId>,
    pub kind: NotificationKind,
    pub body: String,
}

/// Wire frame for a notification.
#[derive(Debug, Serialize)]
pub struct NotificationFrame<'a> {
    pub event: &'static str,
    pub kind: &'static str,
    pub data: &'a str,
}

impl JobNotification {
    pub fn frame(&self) -> NotificationFrame<'_> {
        NotificationFrame {
            event: self.kind.event(),
            kind: self.kind.kind(),
            data: &self.body,
        }
    }

    /// JSON text of [`Self::frame`].
    pub fn to_frame_json(&self) -> String {
        serde_json::to_string(&self.frame()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Why a notification could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("No connection with id '{0}'")]
    UnknownConnection(String),

    #[error("Connection '{0}' is closed")]
    Closed(String),
}

/// Destination addressed by connection id.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &JobNotification) -> Result<(), DeliveryError>;
}

// ---------------------------------------------------------------------------
// Notifier / DeliveryTask
// ---------------------------------------------------------------------------

/// The delivery task has stopped; nothing can be relayed any more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Notification channel closed")]
pub struct NotifierClosed;

/// Producer half of the notification channel.
#[derive(Clone)]
pub struct Notifier {
    sender: mpsc::Sender<JobNotification>,
}

impl Notifier {
    /// Queue a notification. Waits when the channel is full.
    pub async fn relay(&self, notification: JobNotification) -> Result<(), NotifierClosed> {
        self.sender
            .send(notification)
            .await
            .map_err(|_| NotifierClosed)
    }
}

/// Delivered / failed counters of a [`DeliveryTask`].
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl DeliveryStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Consumer half: drains the channel into the sink.
pub struct DeliveryTask {
    receiver: mpsc::Receiver<JobNotification>,
    sink: Arc<dyn NotificationSink>,
    stats: Arc<DeliveryStats>,
}

impl DeliveryTask {
    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Run until every [`Notifier`] has been dropped.
    pub async fn run(mut self) {
        while let Some(notification) = self.receiver.recv().await {
            match self.sink.deliver(&notification).await {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        error = %e,
                        connection_id = %notification.connection_id,
                        kind = notification.kind.kind(),
                        "Failed to deliver job notification"
                    );
                }
            }
        }
        tracing::info!(
            delivered = self.stats.delivered(),
            failed = self.stats.failed(),
            "Notification channel closed, delivery task exiting"
        );
    }
}

/// Create a notifier and the task that delivers its notifications.
pub fn channel(sink: Arc<dyn NotificationSink>, capacity: usize) -> (Notifier, DeliveryTask) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        Notifier { sender },
        DeliveryTask {
            receiver,
            sink,
            stats: Arc::new(DeliveryStats::default()),
        },
    )
}

// ---------------------------------------------------------------------------
// ConnectionRelay
// ---------------------------------------------------------------------------

/// A notifier bound to one job's subscribing connection.
#[derive(Clone)]
pub struct ConnectionRelay {
    notifier: Notifier,
    subscription: ConnectionSubscription,
}

impl ConnectionRelay {
    pub fn new(notifier: Notifier, subscription: ConnectionSubscription) -> Self {
        Self {
            notifier,
            subscription,
        }
    }

    pub fn subscription(&self) -> &ConnectionSubscription {
        &self.subscription
    }

    pub async fn send(
        &self,
        kind: NotificationKind,
        body: impl Into<String>,
    ) -> Result<(), NotifierClosed> {
        self.notifier
            .relay(JobNotification {
                connection_id: self.subscription.connection_id.clone(),
                work_item_id: self.subscription.work_item_id.clone(),
                kind,
                body: body.into(),
            })
            .await
    }
}
