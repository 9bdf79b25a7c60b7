use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus, PaymentMethod, PaymentStatus},
        order_item::{self, Entity as OrderItemEntity},
        status_history,
    },
    errors::ServiceError,
    services::history::StatusHistoryService,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub image_ref: Option<String>,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: String,
    pub shipping_address: String,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub discount_code: Option<String>,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub transaction_ref: Option<String>,
    pub evidence_ref: Option<String>,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryResponse {
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub history: Vec<HistoryEntryResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Admin list filters; all optional, combined with AND.
#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct OrderListFilter {
    pub order_status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub customer_id: Option<Uuid>,
}

pub fn order_to_response(model: order::Model, items: Vec<order_item::Model>) -> OrderResponse {
    OrderResponse {
        id: model.id,
        order_number: model.order_number,
        customer_id: model.customer_id,
        customer_name: model.customer_name,
        customer_email: model.customer_email,
        customer_phone: model.customer_phone,
        shipping_address: model.shipping_address,
        subtotal: model.subtotal,
        discount_amount: model.discount_amount,
        discount_code: model.discount_code,
        total_amount: model.total_amount,
        payment_method: model.payment_method,
        transaction_ref: model.transaction_ref,
        evidence_ref: model.evidence_ref,
        payment_status: model.payment_status,
        order_status: model.order_status,
        tracking_number: model.tracking_number,
        estimated_delivery: model.estimated_delivery,
        notes: model.notes,
        items: items.into_iter().map(item_to_response).collect(),
        created_at: model.created_at,
        updated_at: model.updated_at,
        version: model.version,
    }
}

fn item_to_response(model: order_item::Model) -> OrderItemResponse {
    OrderItemResponse {
        product_id: model.product_id,
        product_name: model.product_name,
        unit_price: model.unit_price,
        quantity: model.quantity,
        image_ref: model.image_ref,
        line_total: model.line_total,
    }
}

fn history_to_response(model: status_history::Model) -> HistoryEntryResponse {
    HistoryEntryResponse {
        order_status: model.order_status,
        payment_status: model.payment_status,
        notes: model.notes,
        created_at: model.created_at,
    }
}

/// Read side of the order store: pure, side-effect-free queries. Caching, if
/// any, belongs to callers.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    history: StatusHistoryService,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, history: StatusHistoryService) -> Self {
        Self { db, history }
    }

    /// One order with its lines and full audit trail.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetailResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let history = self.history.list_for_order(order_id).await?;

        Ok(OrderDetailResponse {
            order: order_to_response(order, items),
            history: history.into_iter().map(history_to_response).collect(),
        })
    }

    /// Filtered, paginated admin listing, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let mut query = OrderEntity::find();

        if let Some(order_status) = filter.order_status {
            query = query.filter(order::Column::OrderStatus.eq(order_status));
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.filter(order::Column::PaymentStatus.eq(payment_status));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.max(1) - 1).await?;

        info!(
            total = total,
            page = page,
            per_page = per_page,
            returned_count = orders.len(),
            "Orders listed"
        );

        Ok(OrderListResponse {
            orders: orders
                .into_iter()
                .map(|o| order_to_response(o, Vec::new()))
                .collect(),
            total,
            page,
            per_page,
        })
    }
}
