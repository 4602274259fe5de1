//! Flash-sale quota tracker: enforces the per-user maximum purchase
//! quantity against an active campaign.
//!
//! Quota consumption is recorded only at order commit, never during
//! preview, and is deliberately not reversed on cancellation.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{BinOper, Expr};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::flash_sale::{self, Entity as FlashSaleEntity, FlashSaleStatus};
use crate::entities::flash_sale_purchase::{self, Entity as FlashSalePurchaseEntity};
use crate::errors::ServiceError;

#[derive(Clone)]
pub struct FlashSaleService {
    db: Arc<DbPool>,
}

impl FlashSaleService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Finds the campaign covering a product at `now`, if any.
    #[instrument(skip(self, conn))]
    pub async fn find_active_sale<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<flash_sale::Model>, ServiceError> {
        let sale = FlashSaleEntity::find()
            .filter(flash_sale::Column::ProductId.eq(product_id))
            .filter(flash_sale::Column::Status.eq(FlashSaleStatus::Active))
            .filter(flash_sale::Column::StartsAt.lte(now))
            .filter(flash_sale::Column::EndsAt.gte(now))
            .one(conn)
            .await?;
        Ok(sale)
    }

    /// Units the user may still purchase: `max(0, cap - purchased so far)`.
    #[instrument(skip(self, conn))]
    pub async fn available_for_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        sale: &flash_sale::Model,
        user_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let purchased = self.purchased_so_far(conn, sale.id, user_id).await?;
        Ok((sale.max_purchase_quantity - purchased).max(0))
    }

    #[instrument(skip(self, conn))]
    pub async fn can_purchase<C: ConnectionTrait>(
        &self,
        conn: &C,
        sale: &flash_sale::Model,
        user_id: Uuid,
        qty: i32,
    ) -> Result<bool, ServiceError> {
        Ok(qty <= self.available_for_user(conn, sale, user_id).await?)
    }

    /// Records `qty` units against the user's quota, inside the order
    /// commit transaction.
    ///
    /// Upserts the per-user counter: an existing row is bumped with a
    /// conditional increment guarded by the cap (zero rows affected means a
    /// concurrent order of the same user won the race), a missing row is
    /// inserted after the cap check. Also advances the campaign's `sold`
    /// counter.
    #[instrument(skip(self, conn, sale), fields(flash_sale_id = %sale.id))]
    pub async fn record_purchase<C: ConnectionTrait>(
        &self,
        conn: &C,
        sale: &flash_sale::Model,
        user_id: Uuid,
        qty: i32,
    ) -> Result<(), ServiceError> {
        if qty <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let existing = FlashSalePurchaseEntity::find()
            .filter(flash_sale_purchase::Column::FlashSaleId.eq(sale.id))
            .filter(flash_sale_purchase::Column::UserId.eq(user_id))
            .one(conn)
            .await?;

        match existing {
            Some(_) => {
                let result = FlashSalePurchaseEntity::update_many()
                    .col_expr(
                        flash_sale_purchase::Column::PurchasedQuantity,
                        Expr::col(flash_sale_purchase::Column::PurchasedQuantity).add(qty),
                    )
                    .filter(flash_sale_purchase::Column::FlashSaleId.eq(sale.id))
                    .filter(flash_sale_purchase::Column::UserId.eq(user_id))
                    .filter(
                        Expr::col(flash_sale_purchase::Column::PurchasedQuantity)
                            .add(qty)
                            .binary(BinOper::SmallerThanOrEqual, sale.max_purchase_quantity),
                    )
                    .exec(conn)
                    .await?;

                if result.rows_affected == 0 {
                    return Err(quota_exceeded(sale, user_id));
                }
            }
            None => {
                if qty > sale.max_purchase_quantity {
                    return Err(quota_exceeded(sale, user_id));
                }
                flash_sale_purchase::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    flash_sale_id: Set(sale.id),
                    user_id: Set(user_id),
                    purchased_quantity: Set(qty),
                }
                .insert(conn)
                .await?;
            }
        }

        FlashSaleEntity::update_many()
            .col_expr(
                flash_sale::Column::Sold,
                Expr::col(flash_sale::Column::Sold).add(qty),
            )
            .filter(flash_sale::Column::Id.eq(sale.id))
            .exec(conn)
            .await?;

        info!(flash_sale_id = %sale.id, user_id = %user_id, qty = qty, "Flash sale purchase recorded");
        Ok(())
    }

    async fn purchased_so_far<C: ConnectionTrait>(
        &self,
        conn: &C,
        flash_sale_id: Uuid,
        user_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let row = FlashSalePurchaseEntity::find()
            .filter(flash_sale_purchase::Column::FlashSaleId.eq(flash_sale_id))
            .filter(flash_sale_purchase::Column::UserId.eq(user_id))
            .one(conn)
            .await?;
        Ok(row.map(|r| r.purchased_quantity).unwrap_or(0))
    }
}

fn quota_exceeded(sale: &flash_sale::Model, user_id: Uuid) -> ServiceError {
    ServiceError::QuotaExceeded(format!(
        "User {} exceeds the per-user limit of {} for flash sale {}",
        user_id, sale.max_purchase_quantity, sale.id
    ))
}
