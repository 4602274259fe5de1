mod common;

use assert_matches::assert_matches;
use common::TestCtx;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

use storefront_api::entities::discount::DiscountType;
use storefront_api::entities::order::OrderStatus;
use storefront_api::entities::{Product, Voucher};
use storefront_api::errors::ServiceError;
use storefront_api::services::checkout::{CheckoutRequest, VariantSelection};

struct Fixture {
    ctx: TestCtx,
    user_id: Uuid,
    variant_id: Uuid,
    product_id: Uuid,
}

async fn fixture(stock: i32) -> Fixture {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();
    let product_id = ctx.seed_product("Espresso Machine", dec!(200)).await;
    let variant_id = ctx.seed_variant(product_id, "ESP-1", None, stock).await;
    ctx.seed_shipping_method("Standard", dec!(10)).await;
    ctx.seed_payment_method("cod").await;
    ctx.seed_address(user_id, true).await;
    Fixture {
        ctx,
        user_id,
        variant_id,
        product_id,
    }
}

fn order_request(f: &Fixture, quantity: i32) -> CheckoutRequest {
    CheckoutRequest {
        user_id: f.user_id,
        selections: vec![VariantSelection {
            variant_id: f.variant_id,
            quantity,
            price_snapshot: None,
        }],
        shipping_method_id: None,
        voucher_code: None,
        payment_method_code: Some("cod".to_string()),
        address_id: None,
    }
}

#[tokio::test]
async fn create_order_commits_stock_voucher_and_cart() {
    let f = fixture(10).await;
    let voucher_id = f
        .ctx
        .seed_voucher("SAVE30", DiscountType::Fixed, dec!(30), None, None, Some(5))
        .await;
    f.ctx
        .services
        .carts
        .add_item(f.user_id, f.variant_id, 2, None)
        .await
        .expect("cart add");

    let mut req = order_request(&f, 2);
    req.voucher_code = Some("SAVE30".to_string());

    let order = f
        .ctx
        .services
        .orders
        .create_order(&req)
        .await
        .expect("order created");

    assert!(order.order_number.starts_with("ORD-"));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.subtotal, dec!(400));
    assert_eq!(order.discount_total, dec!(30));
    assert_eq!(order.shipping_fee, dec!(10));
    assert_eq!(order.grand_total, dec!(380));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 2);

    // Stock was decremented.
    let available = f
        .ctx
        .services
        .inventory
        .get_available(f.variant_id)
        .await
        .expect("available");
    assert_eq!(available, 8);

    // Voucher usage was consumed.
    let voucher = Voucher::find_by_id(voucher_id)
        .one(&*f.ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(voucher.used_count, 1);

    // Ordered variants were cleared from the cart.
    let cart = f
        .ctx
        .services
        .carts
        .list_items(f.user_id)
        .await
        .expect("cart");
    assert!(cart.is_empty());

    // Product popularity counter advanced.
    let product = Product::find_by_id(f.product_id)
        .one(&*f.ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.sold_count, 2);
}

#[tokio::test]
async fn cancel_restores_stock_and_voucher() {
    let f = fixture(5).await;
    let voucher_id = f
        .ctx
        .seed_voucher("BACK10", DiscountType::Fixed, dec!(10), None, None, Some(1))
        .await;

    let mut req = order_request(&f, 3);
    req.voucher_code = Some("BACK10".to_string());
    let order = f
        .ctx
        .services
        .orders
        .create_order(&req)
        .await
        .expect("order created");

    let canceled = f
        .ctx
        .services
        .orders
        .cancel_order(order.id, f.user_id)
        .await
        .expect("canceled");
    assert_eq!(canceled.status, OrderStatus::Canceled);

    let available = f
        .ctx
        .services
        .inventory
        .get_available(f.variant_id)
        .await
        .expect("available");
    assert_eq!(available, 5);

    let voucher = Voucher::find_by_id(voucher_id)
        .one(&*f.ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(voucher.used_count, 0);

    // A canceled order cannot be canceled again.
    let again = f
        .ctx
        .services
        .orders
        .cancel_order(order.id, f.user_id)
        .await;
    assert!(matches!(again, Err(ServiceError::InvalidTransition(_))));
}

#[tokio::test]
async fn cancel_is_rejected_once_shipped() {
    let f = fixture(5).await;
    let order = f
        .ctx
        .services
        .orders
        .create_order(&order_request(&f, 1))
        .await
        .expect("order created");

    f.ctx
        .services
        .orders
        .update_status(order.id, OrderStatus::Processing)
        .await
        .expect("processing");
    f.ctx
        .services
        .orders
        .update_status(order.id, OrderStatus::Shipped)
        .await
        .expect("shipped");

    let result = f
        .ctx
        .services
        .orders
        .cancel_order(order.id, f.user_id)
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidTransition(_))));

    // The forward path still works.
    let delivered = f
        .ctx
        .services
        .orders
        .update_status(order.id, OrderStatus::Delivered)
        .await
        .expect("delivered");
    assert_eq!(delivered.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn status_cannot_skip_states() {
    let f = fixture(5).await;
    let order = f
        .ctx
        .services
        .orders
        .create_order(&order_request(&f, 1))
        .await
        .expect("order created");

    let result = f
        .ctx
        .services
        .orders
        .update_status(order.id, OrderStatus::Delivered)
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidTransition(_))));
}

#[tokio::test]
async fn oversell_is_rejected_at_creation() {
    let f = fixture(1).await;
    let result = f
        .ctx
        .services
        .orders
        .create_order(&order_request(&f, 2))
        .await;
    assert!(matches!(result, Err(ServiceError::CheckoutInvalid(_))));
}

#[tokio::test]
async fn second_decrement_of_last_unit_fails() {
    let f = fixture(1).await;

    f.ctx
        .services
        .inventory
        .decrement(&*f.ctx.db, f.variant_id, 1)
        .await
        .expect("first decrement");
    let second = f
        .ctx
        .services
        .inventory
        .decrement(&*f.ctx.db, f.variant_id, 1)
        .await;
    assert!(matches!(second, Err(ServiceError::InsufficientStock(_))));
}

#[tokio::test]
async fn reservation_holds_stock_against_later_claims() {
    let f = fixture(5).await;
    let inventory = &f.ctx.services.inventory;
    let db = &*f.ctx.db;

    assert!(inventory.reserve(db, f.variant_id, 3).await.expect("reserve"));
    let available = inventory
        .get_available(f.variant_id)
        .await
        .expect("available");
    assert_eq!(available, 2);

    // The hold counts against further reservations.
    assert!(!inventory.reserve(db, f.variant_id, 3).await.expect("reserve"));

    // And against decrements beyond what is left.
    let over = inventory.decrement(db, f.variant_id, 3).await;
    assert_matches!(over, Err(ServiceError::InsufficientStock(_)));

    // A decrement within the remaining availability consumes its share of
    // the hold.
    inventory
        .decrement(db, f.variant_id, 2)
        .await
        .expect("decrement within availability");
    let available = inventory
        .get_available(f.variant_id)
        .await
        .expect("available");
    assert_eq!(available, 2);
}

#[tokio::test]
async fn orders_of_other_users_are_off_limits() {
    let f = fixture(5).await;
    let order = f
        .ctx
        .services
        .orders
        .create_order(&order_request(&f, 1))
        .await
        .expect("order created");

    let stranger = Uuid::new_v4();
    let cancel = f.ctx.services.orders.cancel_order(order.id, stranger).await;
    assert!(matches!(cancel, Err(ServiceError::Forbidden(_))));

    let get = f
        .ctx
        .services
        .orders
        .get_order(&order.order_number, stranger)
        .await;
    assert!(matches!(get, Err(ServiceError::Forbidden(_))));
}

#[tokio::test]
async fn list_orders_is_scoped_and_paginated() {
    let f = fixture(10).await;
    for _ in 0..3 {
        f.ctx
            .services
            .orders
            .create_order(&order_request(&f, 1))
            .await
            .expect("order created");
    }

    let (orders, total) = f
        .ctx
        .services
        .orders
        .list_orders(f.user_id, None, 0, 2)
        .await
        .expect("list");
    assert_eq!(total, 3);
    assert_eq!(orders.len(), 2);

    let (canceled, total) = f
        .ctx
        .services
        .orders
        .list_orders(f.user_id, Some(OrderStatus::Canceled), 0, 10)
        .await
        .expect("list");
    assert_eq!(total, 0);
    assert!(canceled.is_empty());

    let (none, total) = f
        .ctx
        .services
        .orders
        .list_orders(Uuid::new_v4(), None, 0, 10)
        .await
        .expect("list");
    assert_eq!(total, 0);
    assert!(none.is_empty());
}
