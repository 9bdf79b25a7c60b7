use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity, OrderStatus, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::history::StatusHistoryService,
};

/// Joint view of the two state axes. Every mutation of either axis flows
/// through [`OrderState::apply`], so combinations the transition table does
/// not produce cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
}

/// Admin-triggered operations on an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TransitionAction {
    Confirm,
    Ship {
        tracking_number: String,
        estimated_delivery: Option<DateTime<Utc>>,
    },
    OutForDelivery,
    Deliver,
    Cancel {
        reason: Option<String>,
    },
    /// Evidence verified: payment -> paid and order -> confirmed, atomically.
    ApprovePayment,
    /// Evidence rejected: payment -> failed and order -> cancelled, atomically.
    RejectPayment {
        reason: Option<String>,
    },
    /// Out-of-band collection succeeded (deferred orders only).
    MarkPaid,
    /// Out-of-band collection failed (deferred orders only).
    MarkPaymentFailed {
        reason: Option<String>,
    },
}

impl TransitionAction {
    fn verb(&self) -> &'static str {
        match self {
            TransitionAction::Confirm => "confirm",
            TransitionAction::Ship { .. } => "ship",
            TransitionAction::OutForDelivery => "mark out for delivery",
            TransitionAction::Deliver => "mark delivered",
            TransitionAction::Cancel { .. } => "cancel",
            TransitionAction::ApprovePayment => "approve payment for",
            TransitionAction::RejectPayment { .. } => "reject payment for",
            TransitionAction::MarkPaid => "mark paid",
            TransitionAction::MarkPaymentFailed { .. } => "mark payment failed for",
        }
    }

    /// Audit-trail text for the history entry this transition appends.
    fn history_notes(&self) -> String {
        match self {
            TransitionAction::Confirm => "Order confirmed".to_string(),
            TransitionAction::Ship {
                tracking_number, ..
            } => format!("Order shipped, tracking {}", tracking_number),
            TransitionAction::OutForDelivery => "Order out for delivery".to_string(),
            TransitionAction::Deliver => "Order delivered".to_string(),
            TransitionAction::Cancel { reason } => match reason {
                Some(reason) => format!("Order cancelled: {}", reason),
                None => "Order cancelled".to_string(),
            },
            TransitionAction::ApprovePayment => "Payment verified and approved".to_string(),
            TransitionAction::RejectPayment { reason } => match reason {
                Some(reason) => format!("Payment rejected: {}", reason),
                None => "Payment rejected".to_string(),
            },
            TransitionAction::MarkPaid => "Payment received".to_string(),
            TransitionAction::MarkPaymentFailed { reason } => match reason {
                Some(reason) => format!("Payment failed: {}", reason),
                None => "Payment failed".to_string(),
            },
        }
    }
}

impl OrderState {
    pub fn of(order: &order::Model) -> Self {
        Self {
            order_status: order.order_status,
            payment_status: order.payment_status,
        }
    }

    /// The transition table. Returns the next joint state, or
    /// `InvalidTransition` leaving nothing to persist.
    ///
    /// Fulfillment is forward-only and single-step; `Cancel` is reachable
    /// from any non-terminal state. The payment axis only interacts with
    /// fulfillment at the verification junction: approve/reject move both
    /// axes at once, and an unverified order cannot advance fulfillment
    /// (fails closed).
    pub fn apply(self, action: &TransitionAction) -> Result<OrderState, ServiceError> {
        use OrderStatus as O;
        use PaymentStatus as P;

        let next = match action {
            TransitionAction::Confirm
                if self.order_status == O::Processing
                    && self.payment_status != P::PendingVerification =>
            {
                OrderState {
                    order_status: O::Confirmed,
                    ..self
                }
            }
            TransitionAction::Ship { .. } if self.order_status == O::Confirmed => OrderState {
                order_status: O::Shipped,
                ..self
            },
            TransitionAction::OutForDelivery if self.order_status == O::Shipped => OrderState {
                order_status: O::OutForDelivery,
                ..self
            },
            TransitionAction::Deliver if self.order_status == O::OutForDelivery => OrderState {
                order_status: O::Delivered,
                ..self
            },
            TransitionAction::Cancel { .. } if !self.order_status.is_terminal() => OrderState {
                order_status: O::Cancelled,
                ..self
            },
            TransitionAction::ApprovePayment
                if self.payment_status == P::PendingVerification
                    && self.order_status == O::Processing =>
            {
                OrderState {
                    order_status: O::Confirmed,
                    payment_status: P::Paid,
                }
            }
            TransitionAction::RejectPayment { .. }
                if self.payment_status == P::PendingVerification
                    && self.order_status == O::Processing =>
            {
                OrderState {
                    order_status: O::Cancelled,
                    payment_status: P::Failed,
                }
            }
            TransitionAction::MarkPaid if self.payment_status == P::Pending => OrderState {
                payment_status: P::Paid,
                ..self
            },
            TransitionAction::MarkPaymentFailed { .. } if self.payment_status == P::Pending => {
                OrderState {
                    payment_status: P::Failed,
                    ..self
                }
            }
            _ => {
                return Err(ServiceError::InvalidTransition(format!(
                    "cannot {} an order that is {} with payment {}",
                    action.verb(),
                    self.order_status,
                    self.payment_status
                )))
            }
        };

        Ok(next)
    }
}

/// Executes admin transitions: validates against the table, persists with an
/// optimistic version check, and appends the audit entry in the same
/// transaction.
#[derive(Clone)]
pub struct OrderLifecycleService {
    db: Arc<DatabaseConnection>,
    history: StatusHistoryService,
    event_sender: Arc<EventSender>,
}

impl OrderLifecycleService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        history: StatusHistoryService,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            history,
            event_sender,
        }
    }

    /// Applies one transition to an order.
    ///
    /// The UPDATE is conditioned on the version read, so two concurrent admin
    /// actions cannot both succeed: the loser gets `ConcurrentModification`
    /// and no state or history is written for it.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        action: TransitionAction,
    ) -> Result<order::Model, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let current = OrderState::of(&order);
        let next = current.apply(&action)?;

        let read_version = order.version;
        let txn = self.db.begin().await?;

        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::OrderStatus, Expr::value(next.order_status))
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(next.payment_status),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .col_expr(order::Column::Version, Expr::value(read_version + 1));

        if let TransitionAction::Ship {
            tracking_number,
            estimated_delivery,
        } = &action
        {
            update = update
                .col_expr(
                    order::Column::TrackingNumber,
                    Expr::value(Some(tracking_number.clone())),
                )
                .col_expr(
                    order::Column::EstimatedDelivery,
                    Expr::value(*estimated_delivery),
                );
        }

        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(read_version))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            warn!(order_id = %order_id, "Transition lost the version race");
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        self.history
            .record(
                &txn,
                order_id,
                next.order_status,
                next.payment_status,
                Some(action.history_notes()),
            )
            .await?;

        txn.commit().await?;

        info!(
            order_id = %order_id,
            old_order_status = %current.order_status,
            new_order_status = %next.order_status,
            old_payment_status = %current.payment_status,
            new_payment_status = %next.payment_status,
            "Order transitioned"
        );

        self.emit_events(order_id, &action, current, next).await;

        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn emit_events(
        &self,
        order_id: Uuid,
        action: &TransitionAction,
        current: OrderState,
        next: OrderState,
    ) {
        let mut events = Vec::new();

        if current.order_status != next.order_status {
            events.push(Event::OrderStatusChanged {
                order_id,
                old_status: current.order_status,
                new_status: next.order_status,
            });
        }
        if current.payment_status != next.payment_status {
            events.push(Event::PaymentStatusChanged {
                order_id,
                old_status: current.payment_status,
                new_status: next.payment_status,
            });
        }
        match action {
            TransitionAction::ApprovePayment => events.push(Event::PaymentApproved(order_id)),
            TransitionAction::RejectPayment { .. } => {
                events.push(Event::PaymentRejected(order_id))
            }
            _ => {}
        }

        for event in events {
            if let Err(e) = self.event_sender.send(event).await {
                warn!(order_id = %order_id, "Failed to send lifecycle event: {}", e);
            }
        }
    }
}
