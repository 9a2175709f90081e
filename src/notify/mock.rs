//! Mock channel: logs the message instead of sending it.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{
    NotificationChannel, NotificationKind, NotificationLog, NotificationRequest, NotificationStatus,
    Notifier,
};
use crate::error::Result;

/// Records every request as `SENT` and keeps the logs in memory.
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<NotificationLog>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<NotificationLog> {
        self.sent.lock().await.clone()
    }
}

fn message_for(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Started => "Your vehicle service has started.",
        NotificationKind::Ready => "Your vehicle is ready for pickup.",
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, request: &NotificationRequest) -> Result<NotificationLog> {
        let now = Utc::now();
        let log = NotificationLog {
            id: Uuid::new_v4(),
            work_order_id: request.work_order_id,
            kind: request.kind,
            channel: NotificationChannel::Mock,
            to_phone: request.to_phone.clone(),
            payload: serde_json::json!({ "text": message_for(request.kind) }),
            provider_message_id: None,
            status: NotificationStatus::Sent,
            error: None,
            created_at: now,
            updated_at: now,
        };

        info!(
            work_order_id = %request.work_order_id,
            kind = request.kind.as_str(),
            to = %request.to_phone,
            "mock notification sent"
        );

        self.sent.lock().await.push(log.clone());
        Ok(log)
    }
}
