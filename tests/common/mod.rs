use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header::CONTENT_TYPE, Method, Request, Response},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    config::AppConfig,
    entities::{discount_code, product_discount},
    events::{self, EventSender},
    handlers::AppServices,
    migrator::Migrator,
    notifications::LogNotificationSink,
    AppState,
};

/// Helper harness: application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        // Named shared-cache memory database: every pooled connection sees
        // the same schema, and each TestApp gets its own isolated name.
        let db_name = format!("storefront_test_{}", Uuid::new_v4().simple());
        let cfg = AppConfig {
            database_url: format!("sqlite:file:{db_name}?mode=memory&cache=shared"),
            environment: "test".to_string(),
            db_max_connections: 1,
            db_min_connections: 1,
            ..AppConfig::default()
        };

        let mut options = ConnectOptions::new(cfg.database_url.clone());
        options
            .max_connections(cfg.db_max_connections)
            .min_connections(cfg.db_min_connections)
            .sqlx_logging(false);
        let db = Database::connect(options).await.expect("sqlite connection");
        Migrator::up(&db, None).await.expect("migrations");
        let db = Arc::new(db);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(
            event_rx,
            Arc::new(LogNotificationSink),
        ));

        let services = AppServices::new(db.clone(), Arc::new(event_sender.clone()));
        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services,
        };

        let router = storefront_api::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.send(method, uri, body, false).await
    }

    /// Same as `request`, with the admin key header attached.
    pub async fn admin_request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        self.send(method, uri, body, true).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        admin: bool,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if admin {
            builder = builder.header("x-admin-key", self.state.config.admin_api_key.clone());
        }
        let request = match body {
            Some(json) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router.clone().oneshot(request).await.expect("response")
    }

    /// Inserts a discount code row directly, bypassing CRUD validation so
    /// tests can construct expired or exhausted codes.
    pub async fn seed_code(&self, seed: CodeSeed) -> discount_code::Model {
        let now = Utc::now();
        discount_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(seed.code.to_uppercase()),
            discount_type: Set(seed.discount_type),
            value: Set(seed.value),
            min_order_amount: Set(seed.min_order_amount),
            max_uses: Set(seed.max_uses),
            current_uses: Set(seed.current_uses),
            valid_from: Set(now - Duration::days(1)),
            valid_until: Set(seed.valid_until),
            is_active: Set(seed.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed discount code")
    }

    /// Links a product to a code, enabling the automatic pool.
    pub async fn seed_link(&self, product_id: Uuid, code_id: Uuid) -> product_discount::Model {
        product_discount::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            discount_code_id: Set(code_id),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product link")
    }
}

/// Seed parameters for a discount code row.
pub struct CodeSeed {
    pub code: &'static str,
    pub discount_type: discount_code::DiscountType,
    pub value: Decimal,
    pub min_order_amount: Decimal,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub valid_until: Option<chrono::DateTime<Utc>>,
    pub is_active: bool,
}

impl CodeSeed {
    pub fn percentage(code: &'static str, value: Decimal) -> Self {
        Self {
            code,
            discount_type: discount_code::DiscountType::Percentage,
            value,
            min_order_amount: Decimal::ZERO,
            max_uses: Some(100),
            current_uses: 0,
            valid_until: Some(Utc::now() + Duration::days(30)),
            is_active: true,
        }
    }

    pub fn fixed(code: &'static str, value: Decimal) -> Self {
        Self {
            discount_type: discount_code::DiscountType::Fixed,
            ..Self::percentage(code, value)
        }
    }
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Decimal fields serialize as JSON strings; parse whichever shape arrives.
pub fn decimal_field(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal field, got {other:?}"),
    }
}
