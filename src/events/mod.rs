use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::order::{OrderStatus, PaymentStatus};
use crate::notifications::{AdminNotification, NotificationSink};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderPlaced {
        order_id: Uuid,
        order_number: String,
        total_amount: Decimal,
        payment_status: PaymentStatus,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },

    // Payment events
    PaymentStatusChanged {
        order_id: Uuid,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    },
    PaymentApproved(Uuid),
    PaymentRejected(Uuid),

    // Discount events
    DiscountApplied {
        order_id: Uuid,
        code: String,
        amount: Decimal,
    },
    DiscountCodeCreated(Uuid),
    DiscountCodeDeactivated(Uuid),
}

// Process incoming events and render the ones admins care about into
// notifications. Delivery is fire-and-forget; failures are logged and the
// loop keeps draining.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, sink: Arc<dyn NotificationSink>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!("Received event: {:?}", event);

        let notification = notification_for(&event);

        if let Some(notification) = notification {
            if let Err(e) = sink.deliver(notification).await {
                error!("Failed to deliver admin notification: {}", e);
            }
        }
    }

    warn!("Event channel closed, stopping event processing loop");
}

fn notification_for(event: &Event) -> Option<AdminNotification> {
    match event {
        Event::OrderPlaced {
            order_id,
            order_number,
            total_amount,
            payment_status,
        } => Some(AdminNotification::order_placed(
            *order_id,
            order_number,
            *total_amount,
            matches!(payment_status, PaymentStatus::PendingVerification),
        )),
        Event::PaymentApproved(order_id) => {
            Some(AdminNotification::payment_decided(*order_id, true))
        }
        Event::PaymentRejected(order_id) => {
            Some(AdminNotification::payment_decided(*order_id, false))
        }
        Event::OrderStatusChanged {
            order_id,
            old_status,
            new_status,
        } => Some(AdminNotification::order_status_changed(
            *order_id,
            *old_status,
            *new_status,
        )),
        // Payment axis changes outside the verification junction and discount
        // admin events are visible in the audit trail already.
        Event::PaymentStatusChanged { .. }
        | Event::DiscountApplied { .. }
        | Event::DiscountCodeCreated(_)
        | Event::DiscountCodeDeactivated(_) => None,
    }
}
