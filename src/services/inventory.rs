//! Inventory ledger: available vs. reserved stock per product variant.
//!
//! All mutations are single atomic conditional updates (predicate on the
//! current row, checked via `rows_affected`), never read-modify-write. The
//! checkout preview's availability check is advisory; `decrement` at order
//! commit is the binding enforcement point.

use chrono::Utc;
use sea_orm::sea_query::{BinOper, Expr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::inventory_level::{self, Entity as InventoryLevelEntity};
use crate::errors::ServiceError;

/// Service owning the per-variant stock ledger.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Returns `stock_quantity - reserved_quantity` for the variant.
    #[instrument(skip(self))]
    pub async fn get_available(&self, variant_id: Uuid) -> Result<i32, ServiceError> {
        self.get_available_on(&*self.db, variant_id).await
    }

    /// Same as [`get_available`](Self::get_available) but on an explicit
    /// connection, so it can run inside an order transaction.
    pub async fn get_available_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let level = InventoryLevelEntity::find_by_id(variant_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No inventory record for variant {}", variant_id))
            })?;
        Ok(level.available())
    }

    /// Atomically reserves `qty` units: `reserved += qty` only if
    /// `stock - reserved >= qty`. Returns whether the reservation succeeded.
    #[instrument(skip(self, conn))]
    pub async fn reserve<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
        qty: i32,
    ) -> Result<bool, ServiceError> {
        validate_quantity(qty)?;

        let result = InventoryLevelEntity::update_many()
            .col_expr(
                inventory_level::Column::ReservedQuantity,
                Expr::col(inventory_level::Column::ReservedQuantity).add(qty),
            )
            .col_expr(inventory_level::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_level::Column::VariantId.eq(variant_id))
            .filter(available_at_least(qty))
            .exec(conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Permanently deducts `qty` from stock and frees the matching
    /// reservation, as one conditional statement. Fails with
    /// `InsufficientStock` when availability has dropped below `qty` since
    /// the advisory preview check.
    #[instrument(skip(self, conn))]
    pub async fn decrement<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
        qty: i32,
    ) -> Result<(), ServiceError> {
        validate_quantity(qty)?;

        let result = InventoryLevelEntity::update_many()
            .col_expr(
                inventory_level::Column::StockQuantity,
                Expr::col(inventory_level::Column::StockQuantity).sub(qty),
            )
            .col_expr(
                inventory_level::Column::ReservedQuantity,
                reserved_minus_floored(qty),
            )
            .col_expr(inventory_level::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_level::Column::VariantId.eq(variant_id))
            .filter(available_at_least(qty))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let level = InventoryLevelEntity::find_by_id(variant_id).one(conn).await?;
            return Err(match level {
                Some(level) => ServiceError::InsufficientStock(format!(
                    "variant {}: requested {}, available {}",
                    variant_id,
                    qty,
                    level.available()
                )),
                None => ServiceError::NotFound(format!(
                    "No inventory record for variant {}",
                    variant_id
                )),
            });
        }

        info!(variant_id = %variant_id, qty = qty, "Inventory decremented");
        Ok(())
    }

    /// Inverse of [`decrement`](Self::decrement), used on order
    /// cancellation: adds `qty` back to stock and reduces the reservation,
    /// floored at zero so `reserved_quantity` never goes negative.
    #[instrument(skip(self, conn))]
    pub async fn restore<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
        qty: i32,
    ) -> Result<(), ServiceError> {
        validate_quantity(qty)?;

        let result = InventoryLevelEntity::update_many()
            .col_expr(
                inventory_level::Column::StockQuantity,
                Expr::col(inventory_level::Column::StockQuantity).add(qty),
            )
            .col_expr(
                inventory_level::Column::ReservedQuantity,
                reserved_minus_floored(qty),
            )
            .col_expr(inventory_level::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_level::Column::VariantId.eq(variant_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "No inventory record for variant {}",
                variant_id
            )));
        }

        info!(variant_id = %variant_id, qty = qty, "Inventory restored");
        Ok(())
    }

    /// Sets the absolute stock level for a variant, creating the ledger row
    /// if it does not exist. Used for seeding and admin adjustments.
    #[instrument(skip(self, conn))]
    pub async fn set_level<C: ConnectionTrait>(
        &self,
        conn: &C,
        variant_id: Uuid,
        stock: i32,
    ) -> Result<(), ServiceError> {
        if stock < 0 {
            return Err(ServiceError::ValidationError(
                "Stock level must not be negative".to_string(),
            ));
        }

        let result = InventoryLevelEntity::update_many()
            .col_expr(inventory_level::Column::StockQuantity, Expr::value(stock))
            .col_expr(inventory_level::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_level::Column::VariantId.eq(variant_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            inventory_level::ActiveModel {
                variant_id: Set(variant_id),
                stock_quantity: Set(stock),
                reserved_quantity: Set(0),
                updated_at: Set(Utc::now()),
            }
            .insert(conn)
            .await?;
        }

        Ok(())
    }
}

fn validate_quantity(qty: i32) -> Result<(), ServiceError> {
    if qty <= 0 {
        return Err(ServiceError::ValidationError(
            "Quantity must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Predicate `stock_quantity - reserved_quantity >= qty`.
fn available_at_least(qty: i32) -> sea_orm::sea_query::SimpleExpr {
    Expr::col(inventory_level::Column::StockQuantity)
        .sub(Expr::col(inventory_level::Column::ReservedQuantity))
        .binary(BinOper::GreaterThanOrEqual, qty)
}

/// `max(reserved_quantity - qty, 0)` as a CASE expression, so the floor is
/// applied inside the same atomic statement.
fn reserved_minus_floored(qty: i32) -> sea_orm::sea_query::SimpleExpr {
    Expr::case(
        Expr::col(inventory_level::Column::ReservedQuantity)
            .binary(BinOper::GreaterThanOrEqual, qty),
        Expr::col(inventory_level::Column::ReservedQuantity).sub(qty),
    )
    .finally(Expr::value(0))
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_quantities() {
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_quantity(1).is_ok());
    }

    #[test]
    fn available_is_stock_minus_reserved() {
        let level = inventory_level::Model {
            variant_id: Uuid::new_v4(),
            stock_quantity: 10,
            reserved_quantity: 3,
            updated_at: Utc::now(),
        };
        assert_eq!(level.available(), 7);
    }
}
