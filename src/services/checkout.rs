//! Checkout orchestrator: turns a set of variant selections into a fully
//! priced checkout snapshot.
//!
//! `build_snapshot` is re-run on every checkout step (address selection,
//! shipping selection, voucher apply/remove, payment selection) and always
//! recomputes the snapshot from scratch; it is never partially mutated.
//! Per-line problems are collected as validation errors rather than thrown,
//! so the caller can render partial feedback. Only infrastructure failures
//! propagate as errors.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{
    customer_address, payment_method, shipping_method, CustomerAddress, PaymentMethod, Product,
    ProductVariant, ShippingMethod,
};
use crate::errors::ServiceError;
use crate::services::discounts::{self, DiscountService};
use crate::services::inventory::InventoryService;
use crate::services::vouchers::VoucherService;

/// One (variant, quantity) selection supplied by the caller.
///
/// `price_snapshot`, when present, is the price the user saw in the cart
/// and takes precedence over catalog prices.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VariantSelection {
    pub variant_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub price_snapshot: Option<Decimal>,
}

/// Input to one orchestrator pass.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub selections: Vec<VariantSelection>,
    #[serde(default)]
    pub shipping_method_id: Option<Uuid>,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    pub payment_method_code: Option<String>,
    #[serde(default)]
    pub address_id: Option<Uuid>,
}

/// Priced line derived from one surviving selection. Never persisted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutItem {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    /// Variant attribution, e.g. "Red / XL".
    pub attribution: String,
    pub base_price: Decimal,
    pub unit_discount: Decimal,
    pub discounted_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// Full pricing picture of the checkout at one instant.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutSnapshot {
    pub items: Vec<CheckoutItem>,
    pub subtotal: Decimal,
    pub shipping_method_id: Option<Uuid>,
    pub shipping_fee: Decimal,
    pub voucher_code: Option<String>,
    pub voucher_id: Option<Uuid>,
    pub voucher_discount: Decimal,
    pub payment_method_id: Option<Uuid>,
    /// The requested payment code, echoed even when it failed to resolve;
    /// `None` means no payment method was selected at all.
    pub payment_method_code: Option<String>,
    pub shipping_address_id: Option<Uuid>,
    pub final_total: Decimal,
    pub can_proceed_to_payment: bool,
    pub validation_errors: Vec<String>,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    inventory: Arc<InventoryService>,
    discounts: Arc<DiscountService>,
    vouchers: Arc<VoucherService>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DbPool>,
        inventory: Arc<InventoryService>,
        discounts: Arc<DiscountService>,
        vouchers: Arc<VoucherService>,
    ) -> Self {
        Self {
            db,
            inventory,
            discounts,
            vouchers,
        }
    }

    /// Builds the checkout snapshot for the given selections and options.
    ///
    /// The stock check here is advisory; two concurrent previews can both
    /// pass and race at commit, where the atomic decrement decides.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.selections.len()))]
    pub async fn build_snapshot(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSnapshot, ServiceError> {
        let now = Utc::now();
        let mut errors: Vec<String> = Vec::new();
        let mut items: Vec<CheckoutItem> = Vec::new();
        let mut subtotal = Decimal::ZERO;

        for selection in &request.selections {
            match self.price_line(selection, now).await? {
                Ok(item) => {
                    subtotal += item.line_total;
                    items.push(item);
                }
                Err(message) => errors.push(message),
            }
        }

        let (shipping_method_id, shipping_fee) = self
            .resolve_shipping(request.shipping_method_id, &mut errors)
            .await?;

        let voucher_code = request
            .voucher_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty());
        let (voucher_id, voucher_discount) = match voucher_code {
            Some(code) => self.resolve_voucher(code, subtotal, now, &mut errors).await?,
            None => (None, Decimal::ZERO),
        };

        let shipping_address_id = self
            .resolve_address(request.user_id, request.address_id, &mut errors)
            .await?;

        let (payment_method_id, payment_method_code) = self
            .resolve_payment(request.payment_method_code.as_deref(), &mut errors)
            .await?;

        let final_total = (subtotal + shipping_fee - voucher_discount).max(Decimal::ZERO);

        let can_proceed_to_payment = errors.is_empty()
            && shipping_address_id.is_some()
            && payment_method_id.is_some()
            && !items.is_empty()
            && final_total > Decimal::ZERO;

        Ok(CheckoutSnapshot {
            items,
            subtotal,
            shipping_method_id,
            shipping_fee,
            voucher_code: voucher_code.map(str::to_string),
            voucher_id,
            voucher_discount,
            payment_method_id,
            payment_method_code,
            shipping_address_id,
            final_total,
            can_proceed_to_payment,
            validation_errors: errors,
        })
    }

    /// Prices one selection. The outer `Result` is an infrastructure
    /// failure; the inner one is a per-line validation error message.
    async fn price_line(
        &self,
        selection: &VariantSelection,
        now: DateTime<Utc>,
    ) -> Result<Result<CheckoutItem, String>, ServiceError> {
        let db = &*self.db;

        if selection.quantity <= 0 {
            return Ok(Err(format!(
                "Variant {}: quantity must be positive",
                selection.variant_id
            )));
        }

        let Some((variant, product)) = ProductVariant::find_by_id(selection.variant_id)
            .find_also_related(Product)
            .one(db)
            .await?
        else {
            return Ok(Err(format!("Variant {} not found", selection.variant_id)));
        };
        let Some(product) = product.filter(|p| p.is_active) else {
            return Ok(Err(format!(
                "Variant {} is not available for purchase",
                selection.variant_id
            )));
        };
        if !variant.is_active {
            return Ok(Err(format!(
                "Variant {} is not available for purchase",
                selection.variant_id
            )));
        }

        let available = match self
            .inventory
            .get_available_on(db, selection.variant_id)
            .await
        {
            Ok(available) => available,
            Err(ServiceError::NotFound(_)) => {
                return Ok(Err(format!(
                    "Variant {} has no inventory record",
                    selection.variant_id
                )))
            }
            Err(e) => return Err(e),
        };
        if available < selection.quantity {
            return Ok(Err(format!(
                "Variant {}: requested {}, only {} in stock",
                selection.variant_id, selection.quantity, available
            )));
        }

        let base_price = resolve_base_price(
            selection.price_snapshot,
            variant.price_override,
            product.base_price,
        );

        let unit_discount = match self
            .discounts
            .resolve_active_discount_on(db, product.id, now)
            .await?
        {
            Some(discount) => {
                discounts::unit_discount(discount.discount_type, discount.value, base_price)
            }
            None => Decimal::ZERO,
        };

        let (unit_discount, discounted_price) = clamp_unit_discount(base_price, unit_discount);
        let line_total = discounted_price * Decimal::from(selection.quantity);

        Ok(Ok(CheckoutItem {
            variant_id: variant.id,
            product_id: product.id,
            product_name: product.name,
            attribution: variant.name,
            base_price,
            unit_discount,
            discounted_price,
            quantity: selection.quantity,
            line_total,
        }))
    }

    async fn resolve_shipping(
        &self,
        requested: Option<Uuid>,
        errors: &mut Vec<String>,
    ) -> Result<(Option<Uuid>, Decimal), ServiceError> {
        let db = &*self.db;

        if let Some(id) = requested {
            let method = ShippingMethod::find_by_id(id)
                .filter(shipping_method::Column::IsActive.eq(true))
                .one(db)
                .await?;
            return Ok(match method {
                Some(m) => (Some(m.id), m.fee),
                None => {
                    errors.push(format!("Shipping method {} is not available", id));
                    (None, Decimal::ZERO)
                }
            });
        }

        // Default to the cheapest active method.
        let cheapest = ShippingMethod::find()
            .filter(shipping_method::Column::IsActive.eq(true))
            .order_by_asc(shipping_method::Column::Fee)
            .one(db)
            .await?;
        Ok(match cheapest {
            Some(m) => (Some(m.id), m.fee),
            None => {
                errors.push("No shipping method available".to_string());
                (None, Decimal::ZERO)
            }
        })
    }

    async fn resolve_voucher(
        &self,
        code: &str,
        subtotal: Decimal,
        now: DateTime<Utc>,
        errors: &mut Vec<String>,
    ) -> Result<(Option<Uuid>, Decimal), ServiceError> {
        match self
            .vouchers
            .calculate_discount_on(&*self.db, code, subtotal, now)
            .await
        {
            Ok((voucher, amount)) => Ok((Some(voucher.id), amount)),
            Err(ServiceError::DatabaseError(e)) => Err(ServiceError::DatabaseError(e)),
            Err(e) => {
                errors.push(e.to_string());
                Ok((None, Decimal::ZERO))
            }
        }
    }

    async fn resolve_address(
        &self,
        user_id: Uuid,
        requested: Option<Uuid>,
        errors: &mut Vec<String>,
    ) -> Result<Option<Uuid>, ServiceError> {
        let db = &*self.db;

        if let Some(id) = requested {
            let address = CustomerAddress::find_by_id(id).one(db).await?;
            return Ok(match address {
                Some(a) if a.user_id == user_id => Some(a.id),
                Some(_) => {
                    errors.push(format!("Address {} does not belong to the user", id));
                    None
                }
                None => {
                    errors.push(format!("Address {} not found", id));
                    None
                }
            });
        }

        let default = CustomerAddress::find()
            .filter(customer_address::Column::UserId.eq(user_id))
            .filter(customer_address::Column::IsDefault.eq(true))
            .one(db)
            .await?;
        Ok(match default {
            Some(a) => Some(a.id),
            None => {
                errors.push("No shipping address selected or on file".to_string());
                None
            }
        })
    }

    async fn resolve_payment(
        &self,
        code: Option<&str>,
        errors: &mut Vec<String>,
    ) -> Result<(Option<Uuid>, Option<String>), ServiceError> {
        let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
            // Not an error: the snapshot is simply not ready for payment.
            return Ok((None, None));
        };

        let method = PaymentMethod::find()
            .filter(payment_method::Column::Code.eq(code))
            .filter(payment_method::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;
        Ok(match method {
            Some(m) => (Some(m.id), Some(m.code)),
            None => {
                errors.push(format!("Payment method {} is not available", code));
                (None, Some(code.to_string()))
            }
        })
    }
}

/// Base price precedence: cart price snapshot, then variant override, then
/// the catalog product price. A price shown in the cart is honored through
/// checkout even if the catalog changes mid-session.
fn resolve_base_price(
    price_snapshot: Option<Decimal>,
    variant_override: Option<Decimal>,
    product_price: Decimal,
) -> Decimal {
    price_snapshot.or(variant_override).unwrap_or(product_price)
}

/// Clamps the discounted unit price at zero; a fixed discount larger than
/// the base price never produces a negative price. Returns the effective
/// (unit_discount, discounted_price) pair, kept consistent so
/// `discounted_price = base_price - unit_discount` still holds.
fn clamp_unit_discount(base_price: Decimal, unit_discount: Decimal) -> (Decimal, Decimal) {
    let discounted = (base_price - unit_discount).max(Decimal::ZERO);
    (base_price - discounted, discounted)
}
