use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    entities::order::{PaymentMethod, PaymentStatus},
    errors::ServiceError,
    services::{
        checkout::{CartQuote, CartQuoteRequest, SubmitOrderRequest},
        orders::OrderResponse,
        payments::{self, EvidenceUpload, MethodRequirements},
    },
    ApiResponse, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(submit_order))
        .route("/checkout/quote", post(quote_cart))
        .route("/checkout/payment-methods", get(list_payment_methods))
        .route("/checkout/evidence/validate", post(validate_evidence))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentMethodInfo {
    pub method: PaymentMethod,
    pub required_fields: MethodRequirements,
    pub initial_payment_status: PaymentStatus,
}

/// Available payment methods and what each requires at submission
#[utoipa::path(
    get,
    path = "/api/v1/checkout/payment-methods",
    summary = "List payment methods",
    responses(
        (status = 200, description = "Payment methods", body = ApiResponse<Vec<PaymentMethodInfo>>),
    ),
    tag = "Checkout"
)]
pub async fn list_payment_methods() -> Json<ApiResponse<Vec<PaymentMethodInfo>>> {
    let methods = [PaymentMethod::WalletTransfer, PaymentMethod::CashOnDelivery]
        .into_iter()
        .map(|method| PaymentMethodInfo {
            method,
            required_fields: payments::requirements(method),
            initial_payment_status: payments::initial_payment_status(method),
        })
        .collect();
    Json(ApiResponse::success(methods))
}

/// Submit a cart as an order
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Submit order",
    description = "Convert a cart into a durable order. Succeeds once the order is committed; \
                   discount usage, history, and notifications are best-effort afterwards.",
    request_body = SubmitOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid cart or missing payment evidence", body = crate::errors::ErrorResponse),
        (status = 422, description = "Discount code rejected", body = crate::errors::ErrorResponse),
        (status = 500, description = "Order could not be persisted", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn submit_order(
    State(state): State<AppState>,
    Json(request): Json<SubmitOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let order = state.services.checkout.submit_order(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(order, "Order placed")),
    ))
}

/// Preview cart pricing without side effects
#[utoipa::path(
    post,
    path = "/api/v1/checkout/quote",
    summary = "Quote cart",
    description = "Resolve the best discount for a cart without consuming any usage quota.",
    request_body = CartQuoteRequest,
    responses(
        (status = 200, description = "Quote computed", body = ApiResponse<CartQuote>),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse),
        (status = 422, description = "Discount code rejected", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn quote_cart(
    State(state): State<AppState>,
    Json(request): Json<CartQuoteRequest>,
) -> Result<Json<ApiResponse<CartQuote>>, ServiceError> {
    let quote = state.services.checkout.quote(request).await?;
    Ok(Json(ApiResponse::success(quote)))
}

/// Pre-flight check of evidence metadata against the size/type contract
#[utoipa::path(
    post,
    path = "/api/v1/checkout/evidence/validate",
    summary = "Validate payment evidence metadata",
    description = "Checks an evidence file's size and content type before the storefront uploads \
                   it to blob storage.",
    request_body = EvidenceUpload,
    responses(
        (status = 200, description = "Evidence acceptable", body = ApiResponse<String>),
        (status = 400, description = "Evidence violates the size/type contract", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn validate_evidence(
    State(state): State<AppState>,
    Json(upload): Json<EvidenceUpload>,
) -> Result<Json<ApiResponse<String>>, ServiceError> {
    payments::validate_evidence_upload(&state.config.evidence_policy(), &upload)?;
    Ok(Json(ApiResponse::success("accepted".to_string())))
}
