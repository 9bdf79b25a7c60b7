use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountType {
    /// `value` is a percentage of the subtotal, in (0, 100].
    #[sea_orm(string_value = "percentage")]
    Percentage,
    /// `value` is a flat amount off the subtotal.
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// A discount code. Codes are stored uppercase and matched by normalizing
/// customer input, so matching is case-insensitive.
///
/// `current_uses` only ever grows; cancelled orders do not return quota.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = DiscountCode)]
#[sea_orm(table_name = "discount_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_order_amount: Decimal,
    /// None means unlimited uses.
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub valid_from: DateTime<Utc>,
    /// None means the code never expires.
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_discount::Entity")]
    ProductDiscounts,
}

impl Related<super::product_discount::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductDiscounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
