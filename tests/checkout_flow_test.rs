mod common;

use common::TestCtx;
use rust_decimal_macros::dec;
use uuid::Uuid;

use storefront_api::entities::discount::DiscountType;
use storefront_api::services::checkout::{CheckoutRequest, VariantSelection};

fn request(user_id: Uuid, selections: Vec<VariantSelection>) -> CheckoutRequest {
    CheckoutRequest {
        user_id,
        selections,
        shipping_method_id: None,
        voucher_code: None,
        payment_method_code: None,
        address_id: None,
    }
}

#[tokio::test]
async fn snapshot_prices_lines_and_totals() {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();

    let product_id = ctx.seed_product("Mechanical Keyboard", dec!(100)).await;
    let variant_id = ctx.seed_variant(product_id, "KB-100", None, 10).await;
    ctx.seed_discount(product_id, DiscountType::Percentage, dec!(10))
        .await;
    ctx.seed_shipping_method("Express", dec!(10)).await;
    ctx.seed_shipping_method("Standard", dec!(5)).await;
    ctx.seed_voucher("TAKE20", DiscountType::Fixed, dec!(20), None, None, None)
        .await;
    ctx.seed_payment_method("cod").await;
    ctx.seed_address(user_id, true).await;

    let mut req = request(
        user_id,
        vec![VariantSelection {
            variant_id,
            quantity: 2,
            price_snapshot: None,
        }],
    );
    req.voucher_code = Some("TAKE20".to_string());
    req.payment_method_code = Some("cod".to_string());

    let snapshot = ctx
        .services
        .checkout
        .build_snapshot(&req)
        .await
        .expect("snapshot");

    assert!(snapshot.validation_errors.is_empty());
    assert_eq!(snapshot.items.len(), 1);
    let line = &snapshot.items[0];
    assert_eq!(line.base_price, dec!(100));
    assert_eq!(line.unit_discount, dec!(10));
    assert_eq!(line.discounted_price, dec!(90));
    assert_eq!(line.line_total, dec!(180));

    assert_eq!(snapshot.subtotal, dec!(180));
    // Cheapest active method is chosen when none is selected.
    assert_eq!(snapshot.shipping_fee, dec!(5));
    assert_eq!(snapshot.voucher_discount, dec!(20));
    assert_eq!(snapshot.final_total, dec!(165));
    assert!(snapshot.can_proceed_to_payment);
}

#[tokio::test]
async fn cart_price_snapshot_overrides_catalog() {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();

    let product_id = ctx.seed_product("Desk Lamp", dec!(40)).await;
    let variant_id = ctx
        .seed_variant(product_id, "LAMP-1", Some(dec!(35)), 5)
        .await;
    ctx.seed_shipping_method("Standard", dec!(5)).await;
    ctx.seed_address(user_id, true).await;

    let req = request(
        user_id,
        vec![VariantSelection {
            variant_id,
            quantity: 1,
            price_snapshot: Some(dec!(30)),
        }],
    );
    let snapshot = ctx
        .services
        .checkout
        .build_snapshot(&req)
        .await
        .expect("snapshot");
    assert_eq!(snapshot.items[0].base_price, dec!(30));

    // Without a cart snapshot, the variant override beats the product price.
    let req = request(
        user_id,
        vec![VariantSelection {
            variant_id,
            quantity: 1,
            price_snapshot: None,
        }],
    );
    let snapshot = ctx
        .services
        .checkout
        .build_snapshot(&req)
        .await
        .expect("snapshot");
    assert_eq!(snapshot.items[0].base_price, dec!(35));
}

#[tokio::test]
async fn invalid_lines_are_collected_not_fatal() {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();

    let product_id = ctx.seed_product("Mug", dec!(12)).await;
    let variant_id = ctx.seed_variant(product_id, "MUG-1", None, 3).await;
    ctx.seed_shipping_method("Standard", dec!(5)).await;
    ctx.seed_address(user_id, true).await;
    ctx.seed_payment_method("card").await;

    let mut req = request(
        user_id,
        vec![
            VariantSelection {
                variant_id,
                quantity: 1,
                price_snapshot: None,
            },
            // Unknown variant.
            VariantSelection {
                variant_id: Uuid::new_v4(),
                quantity: 1,
                price_snapshot: None,
            },
            // More than is in stock.
            VariantSelection {
                variant_id,
                quantity: 99,
                price_snapshot: None,
            },
        ],
    );
    req.payment_method_code = Some("card".to_string());

    let snapshot = ctx
        .services
        .checkout
        .build_snapshot(&req)
        .await
        .expect("snapshot");

    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.validation_errors.len(), 2);
    assert!(!snapshot.can_proceed_to_payment);
}

#[tokio::test]
async fn ineligible_voucher_is_absorbed_as_validation_error() {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();

    let product_id = ctx.seed_product("Socks", dec!(10)).await;
    let variant_id = ctx.seed_variant(product_id, "SOCK-1", None, 10).await;
    ctx.seed_shipping_method("Standard", dec!(5)).await;
    ctx.seed_address(user_id, true).await;
    ctx.seed_payment_method("cod").await;
    ctx.seed_voucher(
        "BIGSPEND",
        DiscountType::Fixed,
        dec!(5),
        None,
        Some(dec!(100)),
        None,
    )
    .await;

    let mut req = request(
        user_id,
        vec![VariantSelection {
            variant_id,
            quantity: 1,
            price_snapshot: None,
        }],
    );
    req.voucher_code = Some("BIGSPEND".to_string());
    req.payment_method_code = Some("cod".to_string());

    let snapshot = ctx
        .services
        .checkout
        .build_snapshot(&req)
        .await
        .expect("snapshot");

    assert_eq!(snapshot.voucher_discount, dec!(0));
    assert_eq!(snapshot.voucher_id, None);
    assert_eq!(snapshot.validation_errors.len(), 1);
    assert!(!snapshot.can_proceed_to_payment);
}

#[tokio::test]
async fn missing_payment_method_blocks_without_error() {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();

    let product_id = ctx.seed_product("Notebook", dec!(8)).await;
    let variant_id = ctx.seed_variant(product_id, "NB-1", None, 4).await;
    ctx.seed_shipping_method("Standard", dec!(5)).await;
    ctx.seed_address(user_id, true).await;

    let req = request(
        user_id,
        vec![VariantSelection {
            variant_id,
            quantity: 1,
            price_snapshot: None,
        }],
    );
    let snapshot = ctx
        .services
        .checkout
        .build_snapshot(&req)
        .await
        .expect("snapshot");

    assert!(snapshot.validation_errors.is_empty());
    assert!(snapshot.payment_method_id.is_none());
    assert!(!snapshot.can_proceed_to_payment);
}

#[tokio::test]
async fn fixed_discount_larger_than_price_clamps_line_to_zero() {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();

    let product_id = ctx.seed_product("Sticker", dec!(3)).await;
    let variant_id = ctx.seed_variant(product_id, "STK-1", None, 10).await;
    ctx.seed_discount(product_id, DiscountType::Fixed, dec!(5))
        .await;
    ctx.seed_shipping_method("Standard", dec!(5)).await;
    ctx.seed_address(user_id, true).await;

    let req = request(
        user_id,
        vec![VariantSelection {
            variant_id,
            quantity: 2,
            price_snapshot: None,
        }],
    );
    let snapshot = ctx
        .services
        .checkout
        .build_snapshot(&req)
        .await
        .expect("snapshot");

    let line = &snapshot.items[0];
    assert_eq!(line.discounted_price, dec!(0));
    assert_eq!(line.unit_discount, dec!(3));
    assert_eq!(line.line_total, dec!(0));
    assert_eq!(snapshot.subtotal, dec!(0));
}
