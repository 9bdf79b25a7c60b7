use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::message_queue::{Message, MessageQueue, MessageQueueError, TOPIC_ADMIN_NOTIFICATIONS};

/// Represents a notification handed to the external notification collaborator
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminNotification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: NotificationSeverity,
    pub related_entity_id: Option<Uuid>,
    pub related_entity_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Queue error: {0}")]
    Queue(#[from] MessageQueueError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delivery seam for the external notification collaborator. Delivery is
/// fire-and-forget from the caller's perspective; a failed `deliver` must
/// never surface as an order failure.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: AdminNotification) -> Result<(), NotificationError>;
}

/// Sink that only records the notification in the structured log. Useful as
/// the default in development and tests.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn deliver(&self, notification: AdminNotification) -> Result<(), NotificationError> {
        info!(
            notification_id = %notification.id,
            title = %notification.title,
            severity = ?notification.severity,
            related_entity_id = ?notification.related_entity_id,
            "Admin notification: {}",
            notification.message
        );
        Ok(())
    }
}

/// Sink that publishes to the message queue, where the external notification
/// collaborator picks messages up.
pub struct QueueNotificationSink {
    queue: Arc<dyn MessageQueue>,
}

impl QueueNotificationSink {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl NotificationSink for QueueNotificationSink {
    async fn deliver(&self, notification: AdminNotification) -> Result<(), NotificationError> {
        let payload = serde_json::to_value(&notification)?;
        self.queue
            .publish(Message::new(TOPIC_ADMIN_NOTIFICATIONS.to_string(), payload))
            .await?;
        Ok(())
    }
}

impl AdminNotification {
    fn new(
        title: impl Into<String>,
        message: String,
        severity: NotificationSeverity,
        related_entity_id: Option<Uuid>,
        related_entity_type: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message,
            severity,
            related_entity_id,
            related_entity_type: related_entity_type.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    pub fn order_placed(
        order_id: Uuid,
        order_number: &str,
        total_amount: Decimal,
        needs_verification: bool,
    ) -> Self {
        let message = if needs_verification {
            format!(
                "Order {} placed for {} and awaiting payment verification",
                order_number, total_amount
            )
        } else {
            format!("Order {} placed for {}", order_number, total_amount)
        };
        Self::new(
            "New order",
            message,
            NotificationSeverity::Info,
            Some(order_id),
            Some("order"),
        )
    }

    pub fn payment_decided(order_id: Uuid, approved: bool) -> Self {
        let (message, severity) = if approved {
            (
                format!("Payment for order {} verified and approved", order_id),
                NotificationSeverity::Success,
            )
        } else {
            (
                format!("Payment for order {} rejected, order cancelled", order_id),
                NotificationSeverity::Warning,
            )
        };
        Self::new("Payment verification", message, severity, Some(order_id), Some("order"))
    }

    pub fn order_status_changed(order_id: Uuid, old: OrderStatus, new: OrderStatus) -> Self {
        Self::new(
            "Order status",
            format!("Order {} moved from {} to {}", order_id, old, new),
            NotificationSeverity::Info,
            Some(order_id),
            Some("order"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_queue::InMemoryMessageQueue;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn queue_sink_publishes_to_admin_topic() {
        let queue = Arc::new(InMemoryMessageQueue::new());
        let sink = QueueNotificationSink::new(queue.clone());

        let order_id = Uuid::new_v4();
        sink.deliver(AdminNotification::order_placed(
            order_id,
            "ORD-ABCD1234",
            dec!(500),
            false,
        ))
        .await
        .unwrap();

        let message = queue
            .poll(TOPIC_ADMIN_NOTIFICATIONS)
            .await
            .unwrap()
            .expect("one published notification");
        assert_eq!(message.payload["related_entity_id"], order_id.to_string());
        assert_eq!(message.payload["related_entity_type"], "order");
    }
}
