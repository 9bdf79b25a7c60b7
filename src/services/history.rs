use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        order::{OrderStatus, PaymentStatus},
        status_history::{self, Entity as StatusHistoryEntity},
    },
    errors::ServiceError,
};

/// Writer and reader for the insert-only audit trail. There is deliberately
/// no update or delete here; a history row, once written, is permanent.
#[derive(Clone)]
pub struct StatusHistoryService {
    db: Arc<DatabaseConnection>,
}

impl StatusHistoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Appends one entry. Generic over the connection so lifecycle
    /// transitions can write history inside their own transaction.
    pub async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        order_status: OrderStatus,
        payment_status: PaymentStatus,
        notes: Option<String>,
    ) -> Result<status_history::Model, ServiceError> {
        let entry = status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            order_status: Set(order_status),
            payment_status: Set(payment_status),
            notes: Set(notes),
            created_at: Set(Utc::now()),
        };

        Ok(entry.insert(conn).await?)
    }

    /// Full trail for one order, oldest first.
    #[instrument(skip(self))]
    pub async fn list_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<status_history::Model>, ServiceError> {
        Ok(StatusHistoryEntity::find()
            .filter(status_history::Column::OrderId.eq(order_id))
            .order_by_asc(status_history::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}
