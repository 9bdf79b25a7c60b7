use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::{
        lifecycle::TransitionAction,
        orders::{
            order_to_response, HistoryEntryResponse, OrderDetailResponse, OrderListFilter,
            OrderResponse,
        },
    },
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

use super::AdminAuth;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/history", get(get_order_history))
        .route("/orders/:id/confirm", post(confirm_order))
        .route("/orders/:id/ship", post(ship_order))
        .route("/orders/:id/out-for-delivery", post(mark_out_for_delivery))
        .route("/orders/:id/deliver", post(deliver_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/approve-payment", post(approve_payment))
        .route("/orders/:id/reject-payment", post(reject_payment))
        .route("/orders/:id/mark-paid", post(mark_paid))
        .route("/orders/:id/mark-payment-failed", post(mark_payment_failed))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ShipOrderRequest {
    pub tracking_number: String,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// List orders with pagination and filtering
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Get a paginated list of orders with optional filtering, newest first",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("order_status" = Option<String>, Query, description = "Filter by fulfillment status"),
        ("payment_status" = Option<String>, Query, description = "Filter by payment status"),
        ("customer_id" = Option<String>, Query, description = "Filter by customer ID"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<PaginatedResponse<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<OrderListFilter>,
    _admin: AdminAuth,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    let (page, limit) = query.normalized();
    let result = state
        .services
        .orders
        .list_orders(filter, page, limit)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        result.orders,
        result.total,
        page,
        limit,
    ))))
}

/// Fetch one order with its lines and audit trail
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderDetailResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetailResponse>>, ServiceError> {
    let detail = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// Fetch the audit trail of one order, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/history",
    summary = "Get order history",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "History retrieved", body = ApiResponse<Vec<HistoryEntryResponse>>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn get_order_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<HistoryEntryResponse>>>, ServiceError> {
    // 404 for unknown orders rather than an empty trail
    let detail = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(detail.history)))
}

async fn run_transition(
    state: &AppState,
    id: Uuid,
    action: TransitionAction,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.lifecycle.transition(id, action).await?;
    Ok(Json(ApiResponse::success(order_to_response(
        order,
        Vec::new(),
    ))))
}

/// Confirm a processing order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/confirm",
    summary = "Confirm order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order confirmed", body = ApiResponse<OrderResponse>),
        (status = 409, description = "Invalid transition", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Orders"
)]
pub async fn confirm_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    run_transition(&state, id, TransitionAction::Confirm).await
}

/// Ship a confirmed order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/ship",
    summary = "Ship order",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ShipOrderRequest,
    responses(
        (status = 200, description = "Order shipped", body = ApiResponse<OrderResponse>),
        (status = 409, description = "Invalid transition", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Orders"
)]
pub async fn ship_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
    Json(request): Json<ShipOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    if request.tracking_number.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "Tracking number is required".to_string(),
        ));
    }
    run_transition(
        &state,
        id,
        TransitionAction::Ship {
            tracking_number: request.tracking_number,
            estimated_delivery: request.estimated_delivery,
        },
    )
    .await
}

/// Mark a shipped order as out for delivery
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/out-for-delivery",
    summary = "Mark out for delivery",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order out for delivery", body = ApiResponse<OrderResponse>),
        (status = 409, description = "Invalid transition", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Orders"
)]
pub async fn mark_out_for_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    run_transition(&state, id, TransitionAction::OutForDelivery).await
}

/// Mark an order as delivered
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/deliver",
    summary = "Mark delivered",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order delivered", body = ApiResponse<OrderResponse>),
        (status = 409, description = "Invalid transition", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Orders"
)]
pub async fn deliver_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    run_transition(&state, id, TransitionAction::Deliver).await
}

/// Cancel a non-terminal order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderResponse>),
        (status = 409, description = "Invalid transition", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
    request: Option<Json<ReasonRequest>>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let reason = request.and_then(|Json(r)| r.reason);
    run_transition(&state, id, TransitionAction::Cancel { reason }).await
}

/// Approve a pending payment verification
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/approve-payment",
    summary = "Approve payment",
    description = "Verify the uploaded evidence: payment becomes paid and the order is confirmed, atomically.",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payment approved", body = ApiResponse<OrderResponse>),
        (status = 409, description = "Order is not awaiting verification", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Payments"
)]
pub async fn approve_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    run_transition(&state, id, TransitionAction::ApprovePayment).await
}

/// Reject a pending payment verification
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/reject-payment",
    summary = "Reject payment",
    description = "Reject the uploaded evidence: payment becomes failed and the order is cancelled, atomically.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Payment rejected", body = ApiResponse<OrderResponse>),
        (status = 409, description = "Order is not awaiting verification", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Payments"
)]
pub async fn reject_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
    request: Option<Json<ReasonRequest>>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let reason = request.and_then(|Json(r)| r.reason);
    run_transition(&state, id, TransitionAction::RejectPayment { reason }).await
}

/// Mark a deferred payment as collected
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/mark-paid",
    summary = "Mark paid",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payment recorded", body = ApiResponse<OrderResponse>),
        (status = 409, description = "Invalid transition", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Payments"
)]
pub async fn mark_paid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    run_transition(&state, id, TransitionAction::MarkPaid).await
}

/// Mark a deferred payment as failed
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/mark-payment-failed",
    summary = "Mark payment failed",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Payment failure recorded", body = ApiResponse<OrderResponse>),
        (status = 409, description = "Invalid transition", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Payments"
)]
pub async fn mark_payment_failed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
    request: Option<Json<ReasonRequest>>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let reason = request.and_then(|Json(r)| r.reason);
    run_transition(&state, id, TransitionAction::MarkPaymentFailed { reason }).await
}
