//! Discount engine: resolves the active promotional discount for a product
//! and computes the per-unit discount amount.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::discount::{self, DiscountType, Entity as DiscountEntity};
use crate::errors::ServiceError;

#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DbPool>,
}

impl DiscountService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Finds the discount in effect for a product at `now`: active and with
    /// `now` inside `[starts_at, ends_at]`. When several rows qualify the
    /// oldest one wins.
    #[instrument(skip(self))]
    pub async fn resolve_active_discount(
        &self,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<discount::Model>, ServiceError> {
        self.resolve_active_discount_on(&*self.db, product_id, now)
            .await
    }

    pub async fn resolve_active_discount_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<discount::Model>, ServiceError> {
        let found = DiscountEntity::find()
            .filter(discount::Column::ProductId.eq(product_id))
            .filter(discount::Column::IsActive.eq(true))
            .filter(discount::Column::StartsAt.lte(now))
            .filter(discount::Column::EndsAt.gte(now))
            .order_by_asc(discount::Column::CreatedAt)
            .one(conn)
            .await?;
        Ok(found)
    }
}

/// Per-unit discount amount for a base price.
///
/// Percentage: `base * value / 100`. Fixed: `value`, deliberately uncapped
/// here; the checkout orchestrator clamps the discounted unit price at zero.
pub fn unit_discount(discount_type: DiscountType, value: Decimal, base_price: Decimal) -> Decimal {
    match discount_type {
        DiscountType::Percentage => base_price * value / Decimal::from(100),
        DiscountType::Fixed => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn percentage_discount_is_fraction_of_base() {
        assert_eq!(
            unit_discount(DiscountType::Percentage, dec!(10), dec!(200)),
            dec!(20)
        );
        assert_eq!(
            unit_discount(DiscountType::Percentage, dec!(25), dec!(80)),
            dec!(20)
        );
    }

    #[test]
    fn fixed_discount_is_value_itself() {
        assert_eq!(unit_discount(DiscountType::Fixed, dec!(15), dec!(200)), dec!(15));
    }

    #[test]
    fn fixed_discount_may_exceed_base_price() {
        // The orchestrator clamps the resulting unit price at zero.
        assert_eq!(unit_discount(DiscountType::Fixed, dec!(50), dec!(30)), dec!(50));
    }

    #[test]
    fn zero_percent_means_no_discount() {
        assert_eq!(
            unit_discount(DiscountType::Percentage, dec!(0), dec!(99.99)),
            dec!(0)
        );
    }
}
