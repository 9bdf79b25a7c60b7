use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{discount_code, product_discount},
    errors::ServiceError,
    services::discounts::{CreateDiscountCodeRequest, UpdateDiscountCodeRequest},
    ApiResponse, AppState, ListQuery, PaginatedResponse,
};

use super::AdminAuth;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/discounts", post(create_discount).get(list_discounts))
        .route("/discounts/:id", get(get_discount).put(update_discount))
        .route("/discounts/:id/deactivate", post(deactivate_discount))
        .route("/discounts/:id/products", post(link_product))
        .route("/discounts/:id/products/:product_id", delete(unlink_product))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkProductRequest {
    pub product_id: Uuid,
}

/// Create a discount code
#[utoipa::path(
    post,
    path = "/api/v1/discounts",
    summary = "Create discount code",
    request_body = CreateDiscountCodeRequest,
    responses(
        (status = 201, description = "Discount code created", body = ApiResponse<discount_code::Model>),
        (status = 400, description = "Invalid discount definition", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Discounts"
)]
pub async fn create_discount(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(request): Json<CreateDiscountCodeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<discount_code::Model>>), ServiceError> {
    let created = state.services.discounts.create_code(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

/// List discount codes
#[utoipa::path(
    get,
    path = "/api/v1/discounts",
    summary = "List discount codes",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Discount codes retrieved", body = ApiResponse<PaginatedResponse<discount_code::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Discounts"
)]
pub async fn list_discounts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    _admin: AdminAuth,
) -> Result<Json<ApiResponse<PaginatedResponse<discount_code::Model>>>, ServiceError> {
    let (page, limit) = query.normalized();
    let result = state.services.discounts.list_codes(page, limit).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        result.codes,
        result.total,
        page,
        limit,
    ))))
}

/// Fetch one discount code
#[utoipa::path(
    get,
    path = "/api/v1/discounts/{id}",
    summary = "Get discount code",
    params(("id" = Uuid, Path, description = "Discount code ID")),
    responses(
        (status = 200, description = "Discount code retrieved", body = ApiResponse<discount_code::Model>),
        (status = 404, description = "Discount code not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Discounts"
)]
pub async fn get_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
) -> Result<Json<ApiResponse<discount_code::Model>>, ServiceError> {
    let code = state.services.discounts.get_code(id).await?;
    Ok(Json(ApiResponse::success(code)))
}

/// Update a discount code
#[utoipa::path(
    put,
    path = "/api/v1/discounts/{id}",
    summary = "Update discount code",
    params(("id" = Uuid, Path, description = "Discount code ID")),
    request_body = UpdateDiscountCodeRequest,
    responses(
        (status = 200, description = "Discount code updated", body = ApiResponse<discount_code::Model>),
        (status = 404, description = "Discount code not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Discounts"
)]
pub async fn update_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
    Json(request): Json<UpdateDiscountCodeRequest>,
) -> Result<Json<ApiResponse<discount_code::Model>>, ServiceError> {
    let updated = state.services.discounts.update_code(id, request).await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Deactivate a discount code (soft; the row stays for auditability)
#[utoipa::path(
    post,
    path = "/api/v1/discounts/{id}/deactivate",
    summary = "Deactivate discount code",
    params(("id" = Uuid, Path, description = "Discount code ID")),
    responses(
        (status = 200, description = "Discount code deactivated", body = ApiResponse<discount_code::Model>),
        (status = 404, description = "Discount code not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Discounts"
)]
pub async fn deactivate_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
) -> Result<Json<ApiResponse<discount_code::Model>>, ServiceError> {
    let updated = state.services.discounts.deactivate_code(id).await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Link a product to a discount code
#[utoipa::path(
    post,
    path = "/api/v1/discounts/{id}/products",
    summary = "Link product",
    description = "Linking enables the automatic (codeless) discount pool for carts containing the product.",
    params(("id" = Uuid, Path, description = "Discount code ID")),
    request_body = LinkProductRequest,
    responses(
        (status = 201, description = "Product linked", body = ApiResponse<product_discount::Model>),
        (status = 404, description = "Discount code not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Already linked", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Discounts"
)]
pub async fn link_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminAuth,
    Json(request): Json<LinkProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<product_discount::Model>>), ServiceError> {
    let link = state
        .services
        .discounts
        .link_product(id, request.product_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(link))))
}

/// Unlink a product from a discount code
#[utoipa::path(
    delete,
    path = "/api/v1/discounts/{id}/products/{product_id}",
    summary = "Unlink product",
    params(
        ("id" = Uuid, Path, description = "Discount code ID"),
        ("product_id" = Uuid, Path, description = "Product ID"),
    ),
    responses(
        (status = 200, description = "Product unlinked", body = ApiResponse<String>),
        (status = 404, description = "Link not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "Discounts"
)]
pub async fn unlink_product(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
    _admin: AdminAuth,
) -> Result<Json<ApiResponse<String>>, ServiceError> {
    state
        .services
        .discounts
        .unlink_product(id, product_id)
        .await?;
    Ok(Json(ApiResponse::success("unlinked".to_string())))
}
