pub mod checkout;
pub mod discounts;
pub mod health;
pub mod orders;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts, Router};
use sea_orm::DatabaseConnection;

use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    checkout::CheckoutService, discounts::DiscountService, history::StatusHistoryService,
    lifecycle::OrderLifecycleService, orders::OrderService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub discounts: Arc<DiscountService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub lifecycle: Arc<OrderLifecycleService>,
    pub history: StatusHistoryService,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        let history = StatusHistoryService::new(db.clone());
        let discounts = Arc::new(DiscountService::new(
            db.clone(),
            Some(event_sender.clone()),
        ));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            discounts.clone(),
            history.clone(),
            event_sender.clone(),
        ));
        let orders = Arc::new(OrderService::new(db.clone(), history.clone()));
        let lifecycle = Arc::new(OrderLifecycleService::new(
            db,
            history.clone(),
            event_sender,
        ));

        Self {
            discounts,
            checkout,
            orders,
            lifecycle,
            history,
        }
    }
}

/// Marker extractor for admin routes. The external identity layer owns real
/// authentication; deployments front this service with it and configure the
/// shared `x-admin-key` it injects.
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get("x-admin-key")
            .and_then(|value| value.to_str().ok());

        match provided {
            Some(key) if key == state.config.admin_api_key => Ok(AdminAuth),
            _ => Err(ServiceError::Unauthorized(
                "admin credentials required".to_string(),
            )),
        }
    }
}

/// All API routes under `/api/v1`, plus health probes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest(
            "/api/v1",
            Router::new()
                .merge(checkout::router())
                .merge(orders::router())
                .merge(discounts::router()),
        )
}
