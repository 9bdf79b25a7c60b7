use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        discount_code::{self, DiscountType, Entity as DiscountCodeEntity},
        product_discount::{self, Entity as ProductDiscountEntity},
    },
    errors::{DiscountError, ServiceError},
    events::{Event, EventSender},
};

/// Which pool a resolved discount came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    /// The customer typed the code at checkout.
    ManualCode,
    /// The code is linked to a product in the cart.
    ProductLink,
}

/// Outcome of discount resolution: the winning code and the amount it takes
/// off the subtotal. Resolution never mutates anything; the usage counter
/// moves only when an order commits.
#[derive(Debug, Clone)]
pub struct ResolvedDiscount {
    pub code: discount_code::Model,
    pub amount: Decimal,
    pub source: DiscountSource,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateDiscountCodeRequest {
    #[validate(length(min = 1, max = 40, message = "Code must be between 1 and 40 characters"))]
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    #[serde(default)]
    pub min_order_amount: Decimal,
    pub max_uses: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateDiscountCodeRequest {
    pub value: Option<Decimal>,
    pub min_order_amount: Option<Decimal>,
    pub max_uses: Option<Option<i32>>,
    pub valid_until: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountCodeListResponse {
    pub codes: Vec<discount_code::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Normalizes customer input so code matching is case-insensitive.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Validity rules shared by the manual and automatic pools.
pub fn validate_code(
    code: &discount_code::Model,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<(), DiscountError> {
    if !code.is_active || code.valid_from > now {
        return Err(DiscountError::Inactive);
    }
    if let Some(valid_until) = code.valid_until {
        if valid_until < now {
            return Err(DiscountError::Expired);
        }
    }
    if let Some(max_uses) = code.max_uses {
        if code.current_uses >= max_uses {
            return Err(DiscountError::UsageExceeded);
        }
    }
    if subtotal < code.min_order_amount {
        return Err(DiscountError::MinimumNotMet {
            minimum: code.min_order_amount,
            subtotal,
        });
    }
    Ok(())
}

/// Amount a valid code takes off the given subtotal, clamped to [0, subtotal].
pub fn discount_amount(code: &discount_code::Model, subtotal: Decimal) -> Decimal {
    let raw = match code.discount_type {
        DiscountType::Percentage => subtotal * code.value / Decimal::from(100),
        DiscountType::Fixed => code.value,
    };
    raw.max(Decimal::ZERO).min(subtotal)
}

/// Final resolution between the two pools: the larger amount wins, an exact
/// tie keeps the manual code (explicit intent wins).
fn pick_best(
    manual: Option<ResolvedDiscount>,
    automatic: Option<ResolvedDiscount>,
) -> Option<ResolvedDiscount> {
    match (manual, automatic) {
        (Some(manual), Some(automatic)) => {
            if automatic.amount > manual.amount {
                Some(automatic)
            } else {
                Some(manual)
            }
        }
        (manual, automatic) => manual.or(automatic),
    }
}

#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl DiscountService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Resolves the single best discount for a cart, or None when no discount
    /// applies and no manual code was given.
    ///
    /// A failing manual code surfaces its reason so the storefront can tell
    /// the customer; invalid automatic candidates are skipped silently.
    /// No side effects: preview and checkout share this path, and abandoned
    /// checkouts never consume quota.
    #[instrument(skip(self, product_ids), fields(product_count = product_ids.len(), subtotal = %subtotal))]
    pub async fn resolve(
        &self,
        product_ids: &[Uuid],
        subtotal: Decimal,
        manual_code: Option<&str>,
    ) -> Result<Option<ResolvedDiscount>, ServiceError> {
        let now = Utc::now();

        let manual = match manual_code {
            Some(raw) if !raw.trim().is_empty() => Some(self.resolve_manual(raw, subtotal, now).await?),
            _ => None,
        };

        let automatic = self.best_automatic(product_ids, subtotal, now).await?;

        let winner = pick_best(manual, automatic);
        if let Some(ref resolved) = winner {
            debug!(
                code = %resolved.code.code,
                amount = %resolved.amount,
                source = ?resolved.source,
                "Resolved discount"
            );
        }
        Ok(winner)
    }

    async fn resolve_manual(
        &self,
        raw_code: &str,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ResolvedDiscount, ServiceError> {
        let normalized = normalize_code(raw_code);

        let code = DiscountCodeEntity::find()
            .filter(discount_code::Column::Code.eq(normalized.clone()))
            .one(&*self.db)
            .await?
            .ok_or(DiscountError::NotFound)?;

        validate_code(&code, subtotal, now)?;

        let amount = discount_amount(&code, subtotal);
        Ok(ResolvedDiscount {
            code,
            amount,
            source: DiscountSource::ManualCode,
        })
    }

    /// Best automatic candidate across every product-linked code in the cart.
    /// Largest amount wins; ties keep the first-seen link.
    async fn best_automatic(
        &self,
        product_ids: &[Uuid],
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<ResolvedDiscount>, ServiceError> {
        if product_ids.is_empty() {
            return Ok(None);
        }

        let links = ProductDiscountEntity::find()
            .filter(product_discount::Column::ProductId.is_in(product_ids.iter().copied()))
            .order_by_asc(product_discount::Column::CreatedAt)
            .find_also_related(DiscountCodeEntity)
            .all(&*self.db)
            .await?;

        let mut best: Option<ResolvedDiscount> = None;
        let mut seen: Vec<Uuid> = Vec::new();

        for (_link, code) in links {
            let Some(code) = code else { continue };
            if seen.contains(&code.id) {
                continue;
            }
            seen.push(code.id);

            if validate_code(&code, subtotal, now).is_err() {
                continue;
            }

            let amount = discount_amount(&code, subtotal);
            let better = match &best {
                Some(current) => amount > current.amount,
                None => true,
            };
            if better {
                best = Some(ResolvedDiscount {
                    code,
                    amount,
                    source: DiscountSource::ProductLink,
                });
            }
        }

        Ok(best)
    }

    /// Atomically consumes one use of a code, guarded against the cap:
    /// `current_uses` is only bumped when it is still below `max_uses`, so
    /// concurrent checkouts near the cap cannot overshoot it.
    ///
    /// Returns false when the cap was already reached (or the code vanished);
    /// callers treat that as a logged anomaly, not a failure, because the
    /// order has already committed.
    #[instrument(skip(self))]
    pub async fn increment_usage(&self, code_id: Uuid) -> Result<bool, ServiceError> {
        let result = DiscountCodeEntity::update_many()
            .col_expr(
                discount_code::Column::CurrentUses,
                Expr::col(discount_code::Column::CurrentUses).add(1),
            )
            .col_expr(discount_code::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(discount_code::Column::Id.eq(code_id))
            .filter(
                Condition::any()
                    .add(discount_code::Column::MaxUses.is_null())
                    .add(
                        Expr::col(discount_code::Column::CurrentUses)
                            .lt(Expr::col(discount_code::Column::MaxUses)),
                    ),
            )
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Creates a new discount code. Codes are stored uppercase.
    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_code(
        &self,
        request: CreateDiscountCodeRequest,
    ) -> Result<discount_code::Model, ServiceError> {
        request.validate()?;
        validate_value(request.discount_type, request.value)?;
        if request.min_order_amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Minimum order amount cannot be negative".to_string(),
            ));
        }
        if matches!(request.max_uses, Some(max) if max < 1) {
            return Err(ServiceError::ValidationError(
                "Usage limit must be at least 1".to_string(),
            ));
        }

        let normalized = normalize_code(&request.code);
        let existing = DiscountCodeEntity::find()
            .filter(discount_code::Column::Code.eq(normalized.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Discount code {} already exists",
                normalized
            )));
        }

        let now = Utc::now();
        let model = discount_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(normalized),
            discount_type: Set(request.discount_type),
            value: Set(request.value),
            min_order_amount: Set(request.min_order_amount),
            max_uses: Set(request.max_uses),
            current_uses: Set(0),
            valid_from: Set(request.valid_from.unwrap_or(now)),
            valid_until: Set(request.valid_until),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;
        info!(code_id = %created.id, code = %created.code, "Discount code created");

        self.emit(Event::DiscountCodeCreated(created.id)).await;

        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_code(
        &self,
        code_id: Uuid,
        request: UpdateDiscountCodeRequest,
    ) -> Result<discount_code::Model, ServiceError> {
        let code = self.get_code(code_id).await?;

        if let Some(value) = request.value {
            validate_value(code.discount_type, value)?;
        }

        let mut active: discount_code::ActiveModel = code.into();
        if let Some(value) = request.value {
            active.value = Set(value);
        }
        if let Some(min_order_amount) = request.min_order_amount {
            if min_order_amount < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Minimum order amount cannot be negative".to_string(),
                ));
            }
            active.min_order_amount = Set(min_order_amount);
        }
        if let Some(max_uses) = request.max_uses {
            active.max_uses = Set(max_uses);
        }
        if let Some(valid_until) = request.valid_until {
            active.valid_until = Set(valid_until);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;
        info!(code_id = %updated.id, "Discount code updated");
        Ok(updated)
    }

    /// Deactivation is soft; the row stays so past orders keep their audit trail.
    #[instrument(skip(self))]
    pub async fn deactivate_code(&self, code_id: Uuid) -> Result<discount_code::Model, ServiceError> {
        let code = self.get_code(code_id).await?;

        let mut active: discount_code::ActiveModel = code.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(code_id = %updated.id, code = %updated.code, "Discount code deactivated");
        self.emit(Event::DiscountCodeDeactivated(updated.id)).await;

        Ok(updated)
    }

    pub async fn get_code(&self, code_id: Uuid) -> Result<discount_code::Model, ServiceError> {
        DiscountCodeEntity::find_by_id(code_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", code_id)))
    }

    #[instrument(skip(self))]
    pub async fn list_codes(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<DiscountCodeListResponse, ServiceError> {
        let paginator = DiscountCodeEntity::find()
            .order_by_desc(discount_code::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let codes = paginator.fetch_page(page.max(1) - 1).await?;

        Ok(DiscountCodeListResponse {
            codes,
            total,
            page,
            per_page,
        })
    }

    /// Links a product to a code, enabling the automatic pool for carts
    /// containing the product.
    #[instrument(skip(self))]
    pub async fn link_product(
        &self,
        code_id: Uuid,
        product_id: Uuid,
    ) -> Result<product_discount::Model, ServiceError> {
        // Ensure the code exists before linking
        self.get_code(code_id).await?;

        let existing = ProductDiscountEntity::find()
            .filter(product_discount::Column::DiscountCodeId.eq(code_id))
            .filter(product_discount::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Product {} is already linked to discount code {}",
                product_id, code_id
            )));
        }

        let link = product_discount::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            discount_code_id: Set(code_id),
            created_at: Set(Utc::now()),
        };
        let created = link.insert(&*self.db).await?;
        info!(code_id = %code_id, product_id = %product_id, "Product linked to discount code");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn unlink_product(&self, code_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let result = ProductDiscountEntity::delete_many()
            .filter(product_discount::Column::DiscountCodeId.eq(code_id))
            .filter(product_discount::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not linked to discount code {}",
                product_id, code_id
            )));
        }
        Ok(())
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!("Failed to send discount event: {}", e);
            }
        }
    }
}

fn validate_value(discount_type: DiscountType, value: Decimal) -> Result<(), ServiceError> {
    match discount_type {
        DiscountType::Percentage => {
            if value <= Decimal::ZERO || value > Decimal::from(100) {
                return Err(ServiceError::ValidationError(
                    "Percentage value must be in (0, 100]".to_string(),
                ));
            }
        }
        DiscountType::Fixed => {
            if value <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Fixed discount value must be positive".to_string(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample_code(discount_type: DiscountType, value: Decimal) -> discount_code::Model {
        let now = Utc::now();
        discount_code::Model {
            id: Uuid::new_v4(),
            code: "SAVE10".to_string(),
            discount_type,
            value,
            min_order_amount: Decimal::ZERO,
            max_uses: Some(100),
            current_uses: 0,
            valid_from: now - Duration::days(1),
            valid_until: Some(now + Duration::days(30)),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn resolved(code: discount_code::Model, amount: Decimal, source: DiscountSource) -> ResolvedDiscount {
        ResolvedDiscount { code, amount, source }
    }

    #[test]
    fn percentage_amount_is_a_share_of_the_subtotal() {
        let code = sample_code(DiscountType::Percentage, dec!(10));
        assert_eq!(discount_amount(&code, dec!(2000)), dec!(200));
    }

    #[test]
    fn fixed_amount_is_clamped_to_the_subtotal() {
        let code = sample_code(DiscountType::Fixed, dec!(500));
        assert_eq!(discount_amount(&code, dec!(2000)), dec!(500));
        assert_eq!(discount_amount(&code, dec!(300)), dec!(300));
    }

    #[test]
    fn expired_code_is_never_valid() {
        let mut code = sample_code(DiscountType::Percentage, dec!(10));
        code.valid_until = Some(Utc::now() - Duration::hours(1));
        assert_matches!(
            validate_code(&code, dec!(1000), Utc::now()),
            Err(DiscountError::Expired)
        );
    }

    #[test]
    fn code_at_its_usage_cap_is_never_valid() {
        let mut code = sample_code(DiscountType::Percentage, dec!(10));
        code.max_uses = Some(5);
        code.current_uses = 5;
        assert_matches!(
            validate_code(&code, dec!(1000), Utc::now()),
            Err(DiscountError::UsageExceeded)
        );
    }

    #[test]
    fn not_yet_valid_code_reports_inactive() {
        let mut code = sample_code(DiscountType::Percentage, dec!(10));
        code.valid_from = Utc::now() + Duration::days(1);
        assert_matches!(
            validate_code(&code, dec!(1000), Utc::now()),
            Err(DiscountError::Inactive)
        );
    }

    #[test]
    fn subtotal_below_minimum_is_rejected_with_amounts() {
        let mut code = sample_code(DiscountType::Fixed, dec!(100));
        code.min_order_amount = dec!(1500);
        assert_matches!(
            validate_code(&code, dec!(1000), Utc::now()),
            Err(DiscountError::MinimumNotMet { minimum, subtotal })
                if minimum == dec!(1500) && subtotal == dec!(1000)
        );
    }

    #[test]
    fn larger_amount_wins_regardless_of_pool() {
        let manual = resolved(
            sample_code(DiscountType::Fixed, dec!(500)),
            dec!(500),
            DiscountSource::ManualCode,
        );
        let auto = resolved(
            sample_code(DiscountType::Fixed, dec!(300)),
            dec!(300),
            DiscountSource::ProductLink,
        );
        let winner = pick_best(Some(manual.clone()), Some(auto)).unwrap();
        assert_eq!(winner.source, DiscountSource::ManualCode);
        assert_eq!(winner.amount, dec!(500));

        // Swap the values and the automatic pool wins.
        let manual = resolved(
            sample_code(DiscountType::Fixed, dec!(300)),
            dec!(300),
            DiscountSource::ManualCode,
        );
        let auto = resolved(
            sample_code(DiscountType::Fixed, dec!(500)),
            dec!(500),
            DiscountSource::ProductLink,
        );
        let winner = pick_best(Some(manual), Some(auto)).unwrap();
        assert_eq!(winner.source, DiscountSource::ProductLink);
        assert_eq!(winner.amount, dec!(500));
    }

    #[test]
    fn exact_tie_prefers_the_manual_code() {
        let manual = resolved(
            sample_code(DiscountType::Fixed, dec!(400)),
            dec!(400),
            DiscountSource::ManualCode,
        );
        let auto = resolved(
            sample_code(DiscountType::Fixed, dec!(400)),
            dec!(400),
            DiscountSource::ProductLink,
        );
        let winner = pick_best(Some(manual), Some(auto)).unwrap();
        assert_eq!(winner.source, DiscountSource::ManualCode);
    }

    #[test]
    fn normalization_uppercases_and_trims() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
    }
}
