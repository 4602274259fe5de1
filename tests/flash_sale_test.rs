mod common;

use common::TestCtx;
use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

use storefront_api::entities::order::OrderStatus;
use storefront_api::entities::FlashSale;
use storefront_api::errors::ServiceError;
use storefront_api::services::checkout::{CheckoutRequest, VariantSelection};

#[tokio::test]
async fn per_user_cap_is_enforced() {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();
    let product_id = ctx.seed_product("Limited Drop", dec!(60)).await;
    let sale_id = ctx.seed_flash_sale(product_id, 2).await;
    let sale = FlashSale::find_by_id(sale_id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();

    let svc = &ctx.services.flash_sales;
    assert_eq!(svc.available_for_user(&*ctx.db, &sale, user_id).await.unwrap(), 2);

    svc.record_purchase(&*ctx.db, &sale, user_id, 1)
        .await
        .expect("first unit");
    assert!(svc.can_purchase(&*ctx.db, &sale, user_id, 1).await.unwrap());
    assert!(!svc.can_purchase(&*ctx.db, &sale, user_id, 2).await.unwrap());

    let over = svc.record_purchase(&*ctx.db, &sale, user_id, 2).await;
    assert!(matches!(over, Err(ServiceError::QuotaExceeded(_))));

    svc.record_purchase(&*ctx.db, &sale, user_id, 1)
        .await
        .expect("second unit");
    assert_eq!(svc.available_for_user(&*ctx.db, &sale, user_id).await.unwrap(), 0);

    // Another user has a fresh quota.
    let other = Uuid::new_v4();
    assert!(svc.can_purchase(&*ctx.db, &sale, other, 2).await.unwrap());
}

#[tokio::test]
async fn order_through_flash_sale_consumes_quota_permanently() {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();
    let product_id = ctx.seed_product("Hype Sneaker", dec!(150)).await;
    let variant_id = ctx.seed_variant(product_id, "SNKR-1", None, 50).await;
    let sale_id = ctx.seed_flash_sale(product_id, 2).await;
    ctx.seed_shipping_method("Standard", dec!(5)).await;
    ctx.seed_payment_method("cod").await;
    ctx.seed_address(user_id, true).await;

    let req = CheckoutRequest {
        user_id,
        selections: vec![VariantSelection {
            variant_id,
            quantity: 2,
            price_snapshot: None,
        }],
        shipping_method_id: None,
        voucher_code: None,
        payment_method_code: Some("cod".to_string()),
        address_id: None,
    };
    let order = ctx
        .services
        .orders
        .create_order(&req)
        .await
        .expect("order created");
    assert_eq!(order.status, OrderStatus::Pending);

    let sale = FlashSale::find_by_id(sale_id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sale.sold, 2);

    // A second order would exceed the per-user cap and must abort whole.
    let second = ctx.services.orders.create_order(&req).await;
    assert!(matches!(second, Err(ServiceError::QuotaExceeded(_))));
    let available = ctx
        .services
        .inventory
        .get_available(variant_id)
        .await
        .unwrap();
    assert_eq!(available, 48, "aborted order must not consume stock");

    // Cancellation keeps the quota consumed.
    ctx.services
        .orders
        .cancel_order(order.id, user_id)
        .await
        .expect("canceled");
    let quota_left = ctx
        .services
        .flash_sales
        .available_for_user(&*ctx.db, &sale, user_id)
        .await
        .unwrap();
    assert_eq!(quota_left, 0);
}

#[tokio::test]
async fn expired_sale_is_not_matched() {
    let ctx = TestCtx::new().await;
    let product_id = ctx.seed_product("Old Drop", dec!(20)).await;
    ctx.seed_flash_sale(product_id, 3).await;

    let future = Utc::now() + chrono::Duration::days(2);
    let sale = ctx
        .services
        .flash_sales
        .find_active_sale(&*ctx.db, product_id, future)
        .await
        .unwrap();
    assert!(sale.is_none());
}
