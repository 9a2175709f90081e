//! Customer notifications triggered by lifecycle transitions.
//!
//! Dispatch is fire-and-forget: it runs on its own task after the
//! transition has committed, and its outcome is only logged and counted.
//! Tasks are tracked in [`NotificationTasks`] so a process can wait for
//! them before exiting.

pub mod mock;

pub use mock::MockNotifier;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{CustomerId, Status, WorkOrderId};
use crate::store::Store;
use crate::telemetry::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// The job has started.
    Started,
    /// The vehicle is ready for pickup.
    Ready,
}

impl NotificationKind {
    /// The notification a transition into `status` triggers, if any.
    pub fn for_status(status: Status) -> Option<Self> {
        match status {
            Status::InProgress => Some(NotificationKind::Started),
            Status::Ready => Some(NotificationKind::Ready),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Started => "STARTED",
            NotificationKind::Ready => "READY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationChannel {
    Mock,
    Whatsapp,
    Sms,
}

impl std::str::FromStr for NotificationChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(NotificationChannel::Mock),
            "whatsapp" => Ok(NotificationChannel::Whatsapp),
            "sms" => Ok(NotificationChannel::Sms),
            other => Err(Error::Config(format!("unknown notification channel: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Queued,
    Sent,
    Failed,
}

/// What the dispatcher hands to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub work_order_id: WorkOrderId,
    pub kind: NotificationKind,
    pub to_phone: String,
}

/// Delivery record kept by the provider side. The engine never reads it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: Uuid,
    pub work_order_id: WorkOrderId,
    pub kind: NotificationKind,
    pub channel: NotificationChannel,
    pub to_phone: String,
    pub payload: serde_json::Value,
    pub provider_message_id: Option<String>,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A notification provider.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, request: &NotificationRequest) -> Result<NotificationLog>;
}

/// In-flight notification tasks. Clones share the same set.
#[derive(Clone, Default)]
pub struct NotificationTasks {
    inner: Arc<TaskSet>,
}

#[derive(Default)]
struct TaskSet(Mutex<JoinSet<()>>);

impl Drop for TaskSet {
    // Tasks outlive the tracker; only the runtime shutting down stops them.
    fn drop(&mut self) {
        if let Ok(set) = self.0.get_mut() {
            set.detach_all();
        }
    }
}

impl NotificationTasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.inner.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut set = self.set();
        // Reap finished tasks so the set only holds pending ones.
        while set.try_join_next().is_some() {}
        set.spawn(task);
    }

    /// Number of tasks not yet reaped.
    pub fn pending(&self) -> usize {
        let mut set = self.set();
        while set.try_join_next().is_some() {}
        set.len()
    }

    /// Wait for every pending notification, including ones spawned while
    /// draining.
    pub async fn drain(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.set());
            if set.is_empty() {
                return;
            }
            while let Some(result) = set.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "notification task did not complete");
                }
            }
        }
    }
}

/// Send `kind` for a work order without waiting for the outcome.
///
/// The customer's phone is resolved on the spawned task, so a lookup
/// failure is handled like any other delivery failure.
pub fn dispatch(
    tasks: &NotificationTasks,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    work_order_id: WorkOrderId,
    customer_id: CustomerId,
    kind: NotificationKind,
) {
    let span = tracing::info_span!(
        "notification.dispatch",
        "work_order.id" = %work_order_id,
        "notification.kind" = kind.as_str(),
    );

    tasks.spawn(
        async move {
            let result = async {
                let customer = store.customer(customer_id).await?;
                let request = NotificationRequest {
                    work_order_id,
                    kind,
                    to_phone: customer.phone,
                };
                notifier.notify(&request).await
            }
            .await;

            let outcome = match result {
                Ok(log) => {
                    debug!(status = ?log.status, channel = ?log.channel, "notification handed off");
                    "ok"
                }
                Err(e) => {
                    warn!(error = %e, "notification failed");
                    "error"
                }
            };
            metrics::notifications().add(
                1,
                &[
                    KeyValue::new("kind", kind.as_str()),
                    KeyValue::new("result", outcome),
                ],
            );
        }
        .instrument(span),
    );
}
