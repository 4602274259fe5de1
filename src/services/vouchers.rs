//! Voucher engine: order-level discount codes with global usage caps and
//! per-user saved vouchers.
//!
//! The global `used_count` is contended across concurrent orders using the
//! same code, so marking and releasing usage are single conditional updates
//! checked via `rows_affected`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{BinOper, Expr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::discount::DiscountType;
use crate::entities::user_voucher::{self, Entity as UserVoucherEntity, UserVoucherStatus};
use crate::entities::voucher::{self, Entity as VoucherEntity, VoucherStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// A voucher saved by a user, for listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SavedVoucher {
    pub voucher_id: Uuid,
    pub code: String,
    pub status: UserVoucherStatus,
    pub redeemed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct VoucherService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl VoucherService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Validates `code` against the order subtotal and returns the voucher
    /// together with the discount it grants.
    ///
    /// Fails with `NotFound` for an unknown code and `VoucherInvalid` for an
    /// inactive, expired or exhausted voucher or an unmet minimum order
    /// value.
    #[instrument(skip(self))]
    pub async fn calculate_discount(
        &self,
        code: &str,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(voucher::Model, Decimal), ServiceError> {
        self.calculate_discount_on(&*self.db, code, subtotal, now)
            .await
    }

    pub async fn calculate_discount_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(voucher::Model, Decimal), ServiceError> {
        let voucher = VoucherEntity::find()
            .filter(voucher::Column::Code.eq(code))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Voucher {} not found", code)))?;

        check_eligibility(&voucher, subtotal, now)?;
        let amount = discount_amount(
            voucher.discount_type,
            voucher.discount_value,
            voucher.max_discount,
            subtotal,
        );
        Ok((voucher, amount))
    }

    /// Consumes one global use of the voucher, as a single conditional
    /// increment guarded by the usage limit. Runs inside the order commit
    /// transaction; a zero-row update means a concurrent order exhausted the
    /// voucher first and the whole commit must abort.
    #[instrument(skip(self, conn))]
    pub async fn mark_used<C: ConnectionTrait>(
        &self,
        conn: &C,
        voucher_id: Uuid,
    ) -> Result<(), ServiceError> {
        let under_limit = Condition::any()
            .add(voucher::Column::UsageLimit.is_null())
            .add(
                Expr::col(voucher::Column::UsedCount)
                    .binary(BinOper::SmallerThan, Expr::col(voucher::Column::UsageLimit)),
            );

        let result = VoucherEntity::update_many()
            .col_expr(
                voucher::Column::UsedCount,
                Expr::col(voucher::Column::UsedCount).add(1),
            )
            .col_expr(voucher::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(voucher::Column::Id.eq(voucher_id))
            .filter(under_limit)
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::VoucherInvalid(format!(
                "Voucher {} has reached its usage limit",
                voucher_id
            )));
        }
        Ok(())
    }

    /// Releases one global use on order cancellation. The decrement floors
    /// at zero inside the statement so `used_count` never goes negative.
    #[instrument(skip(self, conn))]
    pub async fn restore<C: ConnectionTrait>(
        &self,
        conn: &C,
        voucher_id: Uuid,
    ) -> Result<(), ServiceError> {
        let floored = Expr::case(
            Expr::col(voucher::Column::UsedCount).binary(BinOper::GreaterThan, 0),
            Expr::col(voucher::Column::UsedCount).sub(1),
        )
        .finally(Expr::value(0));

        let result = VoucherEntity::update_many()
            .col_expr(voucher::Column::UsedCount, floored.into())
            .col_expr(voucher::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(voucher::Column::Id.eq(voucher_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Voucher {} not found",
                voucher_id
            )));
        }
        Ok(())
    }

    /// Saves a voucher to a user's wallet. The voucher must be active,
    /// inside its time window and under its usage cap; saving the same
    /// voucher twice is a conflict.
    #[instrument(skip(self))]
    pub async fn save_for_user(
        &self,
        user_id: Uuid,
        voucher_id: Uuid,
    ) -> Result<user_voucher::Model, ServiceError> {
        let db = &*self.db;
        let now = Utc::now();

        let voucher = VoucherEntity::find_by_id(voucher_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Voucher {} not found", voucher_id)))?;

        // Saving shares the redeemability rules, minus the subtotal check.
        check_eligibility(&voucher, Decimal::MAX, now)?;

        let existing = UserVoucherEntity::find()
            .filter(user_voucher::Column::UserId.eq(user_id))
            .filter(user_voucher::Column::VoucherId.eq(voucher_id))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Voucher {} already saved by user {}",
                voucher.code, user_id
            )));
        }

        let saved = user_voucher::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            voucher_id: Set(voucher_id),
            status: Set(UserVoucherStatus::Unused),
            redeemed_at: Set(now),
        }
        .insert(db)
        .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::VoucherSaved {
                voucher_id,
                user_id,
            })
            .await
        {
            info!(error = %e, "Failed to send voucher saved event");
        }

        Ok(saved)
    }

    /// Lists the vouchers a user has saved.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<SavedVoucher>, ServiceError> {
        let rows = UserVoucherEntity::find()
            .filter(user_voucher::Column::UserId.eq(user_id))
            .find_also_related(VoucherEntity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(uv, v)| {
                v.map(|v| SavedVoucher {
                    voucher_id: v.id,
                    code: v.code,
                    status: uv.status,
                    redeemed_at: uv.redeemed_at,
                })
            })
            .collect())
    }
}

/// Checks the redeemability rules shared by discount application and
/// saving: active status, time window, usage cap, minimum order value.
fn check_eligibility(
    voucher: &voucher::Model,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if voucher.status != VoucherStatus::Active {
        return Err(ServiceError::VoucherInvalid(format!(
            "Voucher {} is not active",
            voucher.code
        )));
    }
    if now < voucher.starts_at || now > voucher.ends_at {
        return Err(ServiceError::VoucherInvalid(format!(
            "Voucher {} is outside its validity window",
            voucher.code
        )));
    }
    if let Some(limit) = voucher.usage_limit {
        if voucher.used_count >= limit {
            return Err(ServiceError::VoucherInvalid(format!(
                "Voucher {} has reached its usage limit",
                voucher.code
            )));
        }
    }
    if let Some(min) = voucher.min_order_value {
        if subtotal < min {
            return Err(ServiceError::VoucherInvalid(format!(
                "Voucher {} requires a minimum order value of {}",
                voucher.code, min
            )));
        }
    }
    Ok(())
}

/// Raw discount for the subtotal, clamped first to `max_discount` (when
/// set) and then to the subtotal itself; an order is never discounted
/// below zero.
pub fn discount_amount(
    discount_type: DiscountType,
    value: Decimal,
    max_discount: Option<Decimal>,
    subtotal: Decimal,
) -> Decimal {
    let raw = match discount_type {
        DiscountType::Percentage => subtotal * value / Decimal::from(100),
        DiscountType::Fixed => value,
    };
    let capped = match max_discount {
        Some(max) => raw.min(max),
        None => raw,
    };
    capped.min(subtotal).max(Decimal::ZERO)
}
