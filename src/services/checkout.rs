use std::sync::Arc;

use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        order::{self, OrderStatus, PaymentMethod},
        order_item::{self, LINE_SCHEMA_VERSION},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        discounts::{DiscountService, DiscountSource, ResolvedDiscount},
        history::StatusHistoryService,
        orders::{order_to_response, OrderResponse},
        payments,
    },
};

lazy_static! {
    static ref ORDER_SUBMISSIONS: IntCounter = IntCounter::new(
        "order_submissions_total",
        "Total number of orders submitted"
    )
    .expect("metric can be created");
    static ref ORDER_SUBMISSION_FAILURES: IntCounter = IntCounter::new(
        "order_submission_failures_total",
        "Total number of failed order submissions"
    )
    .expect("metric can be created");
}

/// Monetary values are rounded to 2 decimal places, midpoint away from zero,
/// when they are persisted; raw Decimal math is used before that point.
pub(crate) fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// One line of the incoming cart.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartLineInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, message = "Product title is required"))]
    pub title: String,
    pub unit_price: Decimal,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    pub image_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CustomerInput {
    /// Supplied by the identity collaborator when the customer is signed in;
    /// absent for guest checkout.
    pub customer_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub name: String,
    #[validate(email(message = "Customer email must be valid"))]
    pub email: Option<String>,
    #[validate(length(min = 1, message = "Customer phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "Shipping address is required"))]
    pub shipping_address: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitOrderRequest {
    #[validate]
    pub lines: Vec<CartLineInput>,
    #[validate]
    pub customer: CustomerInput,
    pub discount_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub transaction_ref: Option<String>,
    /// Opaque reference returned by the blob-storage collaborator.
    pub evidence_ref: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartQuoteRequest {
    #[validate]
    pub lines: Vec<CartLineInput>,
    pub discount_code: Option<String>,
}

/// Side-effect-free pricing preview for the storefront.
#[derive(Debug, Serialize, ToSchema)]
pub struct CartQuote {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
    pub discount_code: Option<String>,
    pub discount_source: Option<DiscountSource>,
}

/// Converts a validated cart into a durable order and runs the best-effort
/// side effects behind the durability boundary.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    discounts: Arc<DiscountService>,
    history: StatusHistoryService,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        discounts: Arc<DiscountService>,
        history: StatusHistoryService,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            discounts,
            history,
            event_sender,
        }
    }

    /// Submits an order. The insert of the order and its lines is the
    /// durability boundary: the caller hears "order placed" once and only
    /// once that transaction commits. Everything after it (usage increment,
    /// history entry, notification event) is fire-and-forget.
    #[instrument(skip(self, request), fields(payment_method = %request.payment_method, line_count = request.lines.len()))]
    pub async fn submit_order(
        &self,
        request: SubmitOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        match self.submit_order_inner(request).await {
            Ok(response) => {
                ORDER_SUBMISSIONS.inc();
                Ok(response)
            }
            Err(e) => {
                ORDER_SUBMISSION_FAILURES.inc();
                Err(e)
            }
        }
    }

    async fn submit_order_inner(
        &self,
        request: SubmitOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        // Step 1: cart validation, fully recoverable, nothing persisted.
        validate_lines(&request.lines)?;
        request.validate()?;

        // Step 2: payment-method preconditions.
        payments::validate_submission(
            request.payment_method,
            request.transaction_ref.as_deref(),
            request.evidence_ref.as_deref(),
        )?;

        // Discount resolution is read-only; a failing manual code surfaces
        // its reason and the customer may retry without it.
        let subtotal = cart_subtotal(&request.lines);
        let product_ids: Vec<Uuid> = request.lines.iter().map(|l| l.product_id).collect();
        let resolved = self
            .discounts
            .resolve(&product_ids, subtotal, request.discount_code.as_deref())
            .await?;

        let discount_amount = resolved
            .as_ref()
            .map(|r| round_money(r.amount))
            .unwrap_or(Decimal::ZERO);
        let total_amount = (subtotal - discount_amount).max(Decimal::ZERO);

        // Step 3: the durability boundary.
        let (order_model, item_models) = self
            .persist_order(&request, subtotal, discount_amount, total_amount, &resolved)
            .await?;

        info!(
            order_id = %order_model.id,
            order_number = %order_model.order_number,
            total_amount = %order_model.total_amount,
            "Order placed"
        );

        // Steps 4-6 are best-effort: the order is already committed, so
        // failures are logged and never surface to the caller.
        if let Some(resolved) = &resolved {
            self.consume_discount(&order_model, resolved).await;
        }
        self.record_placement(&order_model).await;
        self.announce(&order_model, &resolved).await;

        Ok(order_to_response(order_model, item_models))
    }

    async fn persist_order(
        &self,
        request: &SubmitOrderRequest,
        subtotal: Decimal,
        discount_amount: Decimal,
        total_amount: Decimal,
        resolved: &Option<ResolvedDiscount>,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = format!("ORD-{}", order_id.to_string()[..8].to_uppercase());

        let txn = self.db.begin().await?;

        let order_active = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            customer_id: Set(request.customer.customer_id),
            customer_name: Set(request.customer.name.clone()),
            customer_email: Set(request.customer.email.clone()),
            customer_phone: Set(request.customer.phone.clone()),
            shipping_address: Set(request.customer.shipping_address.clone()),
            subtotal: Set(subtotal),
            discount_amount: Set(discount_amount),
            discount_code: Set(resolved.as_ref().map(|r| r.code.code.clone())),
            total_amount: Set(total_amount),
            payment_method: Set(request.payment_method),
            transaction_ref: Set(request.transaction_ref.clone()),
            evidence_ref: Set(request.evidence_ref.clone()),
            payment_status: Set(payments::initial_payment_status(request.payment_method)),
            order_status: Set(OrderStatus::Processing),
            tracking_number: Set(None),
            estimated_delivery: Set(None),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };

        let order_model = order_active.insert(&txn).await.map_err(|e| {
            error!(order_id = %order_id, "Failed to persist order: {}", e);
            ServiceError::from(e)
        })?;

        let mut item_models = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                product_name: Set(line.title.clone()),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity),
                image_ref: Set(line.image_ref.clone()),
                line_total: Set(round_money(
                    line.unit_price * Decimal::from(line.quantity),
                )),
                schema_version: Set(LINE_SCHEMA_VERSION),
                created_at: Set(now),
            };
            item_models.push(item.insert(&txn).await?);
        }

        txn.commit().await?;

        Ok((order_model, item_models))
    }

    /// Step 4: consume one use of the winning code. The conditional
    /// increment refuses to push `current_uses` past the cap; when that
    /// happens the order stands and the anomaly is only logged.
    async fn consume_discount(&self, order: &order::Model, resolved: &ResolvedDiscount) {
        match self.discounts.increment_usage(resolved.code.id).await {
            Ok(true) => {}
            Ok(false) => warn!(
                order_id = %order.id,
                code = %resolved.code.code,
                "Discount usage cap was reached before this order's increment"
            ),
            Err(e) => warn!(
                order_id = %order.id,
                code = %resolved.code.code,
                "Failed to increment discount usage: {}",
                e
            ),
        }
    }

    /// Step 5: first audit entry.
    async fn record_placement(&self, order: &order::Model) {
        if let Err(e) = self
            .history
            .record(
                &*self.db,
                order.id,
                order.order_status,
                order.payment_status,
                Some("Order placed".to_string()),
            )
            .await
        {
            error!(order_id = %order.id, "Failed to record placement history: {}", e);
        }
    }

    /// Step 6: notify admins through the event worker.
    async fn announce(&self, order: &order::Model, resolved: &Option<ResolvedDiscount>) {
        if let Err(e) = self
            .event_sender
            .send(Event::OrderPlaced {
                order_id: order.id,
                order_number: order.order_number.clone(),
                total_amount: order.total_amount,
                payment_status: order.payment_status,
            })
            .await
        {
            warn!(order_id = %order.id, "Failed to send order placed event: {}", e);
        }

        if let Some(resolved) = resolved {
            if let Err(e) = self
                .event_sender
                .send(Event::DiscountApplied {
                    order_id: order.id,
                    code: resolved.code.code.clone(),
                    amount: order.discount_amount,
                })
                .await
            {
                warn!(order_id = %order.id, "Failed to send discount applied event: {}", e);
            }
        }
    }

    /// Side-effect-free pricing preview; shares the resolution path with
    /// submission so the preview can never disagree with the final order.
    #[instrument(skip(self, request), fields(line_count = request.lines.len()))]
    pub async fn quote(&self, request: CartQuoteRequest) -> Result<CartQuote, ServiceError> {
        validate_lines(&request.lines)?;
        request.validate()?;

        let subtotal = cart_subtotal(&request.lines);
        let product_ids: Vec<Uuid> = request.lines.iter().map(|l| l.product_id).collect();
        let resolved = self
            .discounts
            .resolve(&product_ids, subtotal, request.discount_code.as_deref())
            .await?;

        let discount_amount = resolved
            .as_ref()
            .map(|r| round_money(r.amount))
            .unwrap_or(Decimal::ZERO);

        Ok(CartQuote {
            subtotal,
            discount_amount,
            total: (subtotal - discount_amount).max(Decimal::ZERO),
            discount_code: resolved.as_ref().map(|r| r.code.code.clone()),
            discount_source: resolved.as_ref().map(|r| r.source),
        })
    }
}

fn cart_subtotal(lines: &[CartLineInput]) -> Decimal {
    lines
        .iter()
        .map(|line| round_money(line.unit_price * Decimal::from(line.quantity)))
        .sum()
}

fn validate_lines(lines: &[CartLineInput]) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError("Cart is empty".to_string()));
    }
    for line in lines {
        if line.quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for product {} must be at least 1",
                line.product_id
            )));
        }
        if line.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Unit price for product {} cannot be negative",
                line.product_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn line(price: Decimal, quantity: i32) -> CartLineInput {
        CartLineInput {
            product_id: Uuid::new_v4(),
            title: "Test product".to_string(),
            unit_price: price,
            quantity,
            image_ref: None,
        }
    }

    #[test]
    fn subtotal_sums_rounded_line_totals() {
        let lines = vec![line(dec!(1000), 2), line(dec!(49.995), 1)];
        assert_eq!(cart_subtotal(&lines), dec!(2050.00));
    }

    #[test]
    fn empty_cart_is_rejected_before_anything_else() {
        assert_matches!(
            validate_lines(&[]),
            Err(ServiceError::ValidationError(msg)) if msg == "Cart is empty"
        );
    }

    #[test]
    fn negative_price_and_zero_quantity_are_rejected() {
        assert_matches!(
            validate_lines(&[line(dec!(-1), 1)]),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_lines(&[line(dec!(10), 0)]),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn money_rounds_half_away_from_zero_at_two_places() {
        assert_eq!(round_money(dec!(10.005)), dec!(10.01));
        assert_eq!(round_money(dec!(10.004)), dec!(10.00));
    }
}
