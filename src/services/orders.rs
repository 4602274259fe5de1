//! Order creation and lifecycle.
//!
//! `create_order` re-runs the checkout orchestrator for an authoritative
//! snapshot, then commits everything in one database transaction: the order
//! row and its line snapshots, the binding inventory decrements, the voucher
//! usage, the flash-sale quota and the cart cleanup. Any conditional update
//! losing its race aborts the whole transaction, so a failed order leaves no
//! partial state behind.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::entities::{product, CustomerAddress, Product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::carts::CartService;
use crate::services::checkout::{CheckoutRequest, CheckoutService, CheckoutSnapshot};
use crate::services::flash_sales::FlashSaleService;
use crate::services::inventory::InventoryService;
use crate::services::vouchers::VoucherService;

/// One order line as returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItemView {
    pub variant_id: Uuid,
    pub product_name: String,
    pub attribution: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub discount_amount: Decimal,
    pub total_price: Decimal,
}

/// One row of a user's order history.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub grand_total: Decimal,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<order::Model> for OrderSummary {
    fn from(order: order::Model) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            grand_total: order.grand_total,
            created_at: order.created_at,
        }
    }
}

/// An order with its line snapshots, as returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_fee: Decimal,
    pub grand_total: Decimal,
    pub note: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

impl OrderView {
    fn from_parts(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            status: order.status,
            subtotal: order.subtotal,
            discount_total: order.discount_total,
            shipping_fee: order.shipping_fee,
            grand_total: order.grand_total,
            note: order.note,
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|item| OrderItemView {
                    variant_id: item.variant_id,
                    product_name: item.product_name,
                    attribution: item.attribution,
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                    discount_amount: item.discount_amount,
                    total_price: item.total_price,
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    checkout: Arc<CheckoutService>,
    inventory: Arc<InventoryService>,
    vouchers: Arc<VoucherService>,
    flash_sales: Arc<FlashSaleService>,
    carts: Arc<CartService>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        checkout: Arc<CheckoutService>,
        inventory: Arc<InventoryService>,
        vouchers: Arc<VoucherService>,
        flash_sales: Arc<FlashSaleService>,
        carts: Arc<CartService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            checkout,
            inventory,
            vouchers,
            flash_sales,
            carts,
            event_sender,
        }
    }

    /// Places an order from the given checkout request.
    ///
    /// Re-runs the orchestrator so the committed totals come from a fresh
    /// snapshot, never from client-supplied numbers.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn create_order(&self, request: &CheckoutRequest) -> Result<OrderView, ServiceError> {
        let snapshot = self.checkout.build_snapshot(request).await?;
        ensure_ready(&snapshot)?;

        // The snapshot already validated ownership, but the address is about
        // to be written into a financial record, so re-check against the
        // live row.
        let address_id = snapshot
            .shipping_address_id
            .ok_or_else(|| ServiceError::CheckoutInvalid(vec!["No shipping address".to_string()]))?;
        let address = CustomerAddress::find_by_id(address_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))?;
        if address.user_id != request.user_id {
            return Err(ServiceError::Forbidden(
                "Shipping address does not belong to the user".to_string(),
            ));
        }
        let payment_method_id = snapshot
            .payment_method_id
            .ok_or_else(|| ServiceError::CheckoutInvalid(vec!["No payment method".to_string()]))?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(request.user_id),
            payment_method_id: Set(payment_method_id),
            voucher_id: Set(snapshot.voucher_id),
            shipping_address_id: Set(address_id),
            shipping_method_id: Set(snapshot.shipping_method_id),
            subtotal: Set(snapshot.subtotal),
            discount_total: Set(snapshot.voucher_discount),
            shipping_fee: Set(snapshot.shipping_fee),
            grand_total: Set(snapshot.final_total),
            status: Set(OrderStatus::Pending),
            note: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(snapshot.items.len());
        let mut flash_purchases: Vec<(Uuid, i32)> = Vec::new();
        for line in &snapshot.items {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                variant_id: Set(line.variant_id),
                product_name: Set(line.product_name.clone()),
                attribution: Set(line.attribution.clone()),
                unit_price: Set(line.discounted_price),
                quantity: Set(line.quantity),
                discount_amount: Set(line.unit_discount),
                total_price: Set(line.line_total),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);

            // Binding enforcement point: a concurrent order can still win
            // the remaining stock here, which aborts the transaction.
            self.inventory
                .decrement(&txn, line.variant_id, line.quantity)
                .await?;

            if let Some(sale) = self
                .flash_sales
                .find_active_sale(&txn, line.product_id, now)
                .await?
            {
                self.flash_sales
                    .record_purchase(&txn, &sale, request.user_id, line.quantity)
                    .await?;
                flash_purchases.push((sale.id, line.quantity));
            }

            self.bump_sold_count(&txn, line.product_id, line.quantity)
                .await?;
        }

        if let Some(voucher_id) = snapshot.voucher_id {
            self.vouchers.mark_used(&txn, voucher_id).await?;
        }

        let ordered_variants: Vec<Uuid> = snapshot.items.iter().map(|l| l.variant_id).collect();
        self.carts
            .remove_variants(&txn, request.user_id, &ordered_variants)
            .await?;

        txn.commit().await?;

        info!(order_id = %order_id, order_number = %order_number, "Order created");
        self.emit(Event::OrderCreated {
            order_id,
            order_number: order_number.clone(),
            user_id: request.user_id,
        })
        .await;
        for line in &snapshot.items {
            self.emit(Event::InventoryDecremented {
                variant_id: line.variant_id,
                quantity: line.quantity,
            })
            .await;
        }
        if let Some(voucher_id) = snapshot.voucher_id {
            self.emit(Event::VoucherRedeemed {
                voucher_id,
                user_id: request.user_id,
            })
            .await;
        }
        for (flash_sale_id, quantity) in flash_purchases {
            self.emit(Event::FlashSalePurchaseRecorded {
                flash_sale_id,
                user_id: request.user_id,
                quantity,
            })
            .await;
        }

        Ok(OrderView::from_parts(order, items))
    }

    /// Cancels an order on the user's behalf.
    ///
    /// Inventory and voucher usage are handed back inside one transaction;
    /// flash-sale quota is intentionally kept consumed so cancellation
    /// cannot be used to reset the per-user cap.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderView, ServiceError> {
        let order = self.find_owned(order_id, user_id).await?;
        if !order.status.is_cancelable() {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} cannot be canceled from status {}",
                order.order_number,
                order.status.as_str()
            )));
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        let txn = self.db.begin().await?;

        for item in &items {
            self.inventory
                .restore(&txn, item.variant_id, item.quantity)
                .await?;
        }
        if let Some(voucher_id) = order.voucher_id {
            self.vouchers.restore(&txn, voucher_id).await?;
        }

        let now = Utc::now();
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Canceled);
        active.note = Set(Some("Canceled by user".to_string()));
        active.updated_at = Set(Some(now));
        let order = active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, "Order canceled");
        self.emit(Event::OrderCanceled {
            order_id,
            canceled_at: now,
        })
        .await;
        for item in &items {
            self.emit(Event::InventoryRestored {
                variant_id: item.variant_id,
                quantity: item.quantity,
            })
            .await;
        }
        if let Some(voucher_id) = order.voucher_id {
            self.emit(Event::VoucherReleased { voucher_id }).await;
        }

        Ok(OrderView::from_parts(order, items))
    }

    /// Moves an order along the status state machine.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderView, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition(format!(
                "Order {} cannot move from {} to {}",
                order.order_number,
                order.status.as_str(),
                new_status.as_str()
            )));
        }

        let old_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        let order = active.update(&*self.db).await?;

        self.emit(Event::OrderStatusChanged {
            order_id,
            old_status: old_status.as_str().to_string(),
            new_status: new_status.as_str().to_string(),
        })
        .await;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(OrderView::from_parts(order, items))
    }

    /// Looks an order up by its public order number.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_number: &str,
        user_id: Uuid,
    ) -> Result<OrderView, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;
        if order.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "Order does not belong to the user".to_string(),
            ));
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;
        Ok(OrderView::from_parts(order, items))
    }

    /// Lists a user's orders, newest first, optionally filtered by status.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        status: Option<OrderStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderSummary>, u64), ServiceError> {
        let mut query = OrderEntity::find().filter(order::Column::UserId.eq(user_id));
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page).await?;
        Ok((orders.into_iter().map(OrderSummary::from).collect(), total))
    }

    async fn find_owned(&self, order_id: Uuid, user_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if order.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "Order does not belong to the user".to_string(),
            ));
        }
        Ok(order)
    }

    async fn bump_sold_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        qty: i32,
    ) -> Result<(), ServiceError> {
        Product::update_many()
            .col_expr(
                product::Column::SoldCount,
                Expr::col(product::Column::SoldCount).add(qty),
            )
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!(error = %e, "Failed to send event");
        }
    }
}

/// Maps a not-ready snapshot into `CheckoutInvalid` with human-readable
/// reasons.
///
/// An unresolved address always carries a recorded validation error, so only
/// the pieces that can be missing without one are spelled out here: an empty
/// item list, an unselected payment method (`payment_method_code` is `None`
/// exactly when no code was requested) and a non-positive total.
fn ensure_ready(snapshot: &CheckoutSnapshot) -> Result<(), ServiceError> {
    if snapshot.can_proceed_to_payment {
        return Ok(());
    }
    let mut reasons = snapshot.validation_errors.clone();
    if snapshot.items.is_empty() {
        reasons.push("No purchasable items".to_string());
    }
    if snapshot.payment_method_code.is_none() {
        reasons.push("No payment method selected".to_string());
    }
    if snapshot.final_total <= Decimal::ZERO && !snapshot.items.is_empty() {
        reasons.push("Order total must be positive".to_string());
    }
    Err(ServiceError::CheckoutInvalid(reasons))
}

/// Public order number: `ORD-` plus a date stamp and a short random token.
fn generate_order_number() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!(
        "ORD-{}-{}",
        Utc::now().format("%Y%m%d"),
        token.to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_carry_prefix_and_are_unique() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert!(a.starts_with("ORD-"));
        assert_ne!(a, b);
    }

    #[test]
    fn not_ready_snapshot_reports_missing_pieces() {
        let snapshot = CheckoutSnapshot {
            items: vec![],
            subtotal: Decimal::ZERO,
            shipping_method_id: None,
            shipping_fee: Decimal::ZERO,
            voucher_code: None,
            voucher_id: None,
            voucher_discount: Decimal::ZERO,
            payment_method_id: None,
            payment_method_code: None,
            shipping_address_id: None,
            final_total: Decimal::ZERO,
            can_proceed_to_payment: false,
            validation_errors: vec!["No shipping address selected or on file".to_string()],
        };
        match ensure_ready(&snapshot) {
            Err(ServiceError::CheckoutInvalid(reasons)) => {
                assert!(reasons.iter().any(|r| r.contains("items")));
                assert!(reasons.iter().any(|r| r.contains("address")));
                assert!(reasons.iter().any(|r| r.contains("payment")));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn recorded_errors_are_not_repeated_as_generic_reasons() {
        let snapshot = CheckoutSnapshot {
            items: vec![],
            subtotal: Decimal::ZERO,
            shipping_method_id: None,
            shipping_fee: Decimal::ZERO,
            voucher_code: None,
            voucher_id: None,
            voucher_discount: Decimal::ZERO,
            payment_method_id: None,
            payment_method_code: Some("paypal".to_string()),
            shipping_address_id: None,
            final_total: Decimal::ZERO,
            can_proceed_to_payment: false,
            validation_errors: vec![
                "No shipping address selected or on file".to_string(),
                "Payment method paypal is not available".to_string(),
            ],
        };
        match ensure_ready(&snapshot) {
            Err(ServiceError::CheckoutInvalid(reasons)) => {
                assert_eq!(
                    reasons.iter().filter(|r| r.contains("address")).count(),
                    1
                );
                assert_eq!(
                    reasons.iter().filter(|r| r.contains("ayment")).count(),
                    1
                );
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
