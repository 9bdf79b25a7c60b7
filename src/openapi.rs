use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// Registers the admin key header as a security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "AdminKey",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-admin-key"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Storefront API",
        version = "0.3.0",
        description = r#"
# Storefront Order & Checkout API

Converts shopping carts into durable, auditable orders.

## Features

- **Checkout**: cart submission with method-specific payment preconditions
- **Discounts**: manual codes and automatic product-linked codes; the single
  best discount wins, usage quota is consumed only when an order commits
- **Payment verification**: wallet-transfer orders carry evidence that an
  admin approves or rejects
- **Order lifecycle**: forward-only fulfillment axis, admin-decided payment
  axis, every transition recorded in an insert-only history

## Authentication

Customer endpoints are open (identity is handled by the upstream identity
service). Admin endpoints require the shared key in the `x-admin-key` header.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Cart submission and pricing preview"),
        (name = "Orders", description = "Order queries and lifecycle transitions"),
        (name = "Payments", description = "Payment verification and collection"),
        (name = "Discounts", description = "Discount code administration"),
    ),
    paths(
        // Checkout
        crate::handlers::checkout::submit_order,
        crate::handlers::checkout::quote_cart,
        crate::handlers::checkout::list_payment_methods,
        crate::handlers::checkout::validate_evidence,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_history,
        crate::handlers::orders::confirm_order,
        crate::handlers::orders::ship_order,
        crate::handlers::orders::mark_out_for_delivery,
        crate::handlers::orders::deliver_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::approve_payment,
        crate::handlers::orders::reject_payment,
        crate::handlers::orders::mark_paid,
        crate::handlers::orders::mark_payment_failed,

        // Discounts
        crate::handlers::discounts::create_discount,
        crate::handlers::discounts::list_discounts,
        crate::handlers::discounts::get_discount,
        crate::handlers::discounts::update_discount,
        crate::handlers::discounts::deactivate_discount,
        crate::handlers::discounts::link_product,
        crate::handlers::discounts::unlink_product,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::OrderStatus,
        crate::entities::order::PaymentStatus,
        crate::entities::order::PaymentMethod,
        crate::entities::discount_code::DiscountType,
        crate::services::checkout::CartLineInput,
        crate::services::checkout::CustomerInput,
        crate::services::checkout::SubmitOrderRequest,
        crate::services::checkout::CartQuoteRequest,
        crate::services::checkout::CartQuote,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderItemResponse,
        crate::services::orders::OrderDetailResponse,
        crate::services::orders::HistoryEntryResponse,
        crate::entities::discount_code::Model,
        crate::entities::product_discount::Model,
        crate::services::payments::EvidenceUpload,
        crate::services::payments::MethodRequirements,
        crate::handlers::checkout::PaymentMethodInfo,
        crate::services::discounts::CreateDiscountCodeRequest,
        crate::services::discounts::UpdateDiscountCodeRequest,
        crate::handlers::orders::ShipOrderRequest,
        crate::handlers::orders::ReasonRequest,
        crate::handlers::discounts::LinkProductRequest,
    ))
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
