//! Cart collaborator: a simple keyed store of user_id -> active items.
//!
//! The checkout core only reads selections from it and clears ordered
//! variants at commit; cart presentation is owned elsewhere.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::cart_item::{self, Entity as CartItemEntity};
use crate::errors::ServiceError;

#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_items(&self, user_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        let items = CartItemEntity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await?;
        Ok(items)
    }

    /// Adds a variant to the user's cart, merging quantities when the
    /// variant is already present. The price snapshot of the first add wins.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
        price_snapshot: Option<Decimal>,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let db = &*self.db;
        let result = CartItemEntity::update_many()
            .col_expr(
                cart_item::Column::Quantity,
                Expr::col(cart_item::Column::Quantity).add(quantity),
            )
            .col_expr(cart_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::VariantId.eq(variant_id))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            let now = Utc::now();
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                variant_id: Set(variant_id),
                quantity: Set(quantity),
                price_snapshot: Set(price_snapshot),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await?;
        }

        Ok(())
    }

    /// Removes the given variants from the user's cart; called inside the
    /// order commit transaction after the lines have been persisted.
    #[instrument(skip(self, conn, variant_ids), fields(count = variant_ids.len()))]
    pub async fn remove_variants<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        variant_ids: &[Uuid],
    ) -> Result<u64, ServiceError> {
        if variant_ids.is_empty() {
            return Ok(0);
        }
        let result = CartItemEntity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::VariantId.is_in(variant_ids.iter().copied()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
