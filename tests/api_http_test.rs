mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::TestCtx;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{api_v1_routes, config::AppConfig, AppState};

async fn app(ctx: &TestCtx) -> Router {
    let cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    let state = AppState {
        db: ctx.db.clone(),
        config: cfg,
        event_sender: ctx.event_sender.clone(),
        services: ctx.services.clone(),
    };
    Router::new().nest("/api/v1", api_v1_routes()).with_state(state)
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_database() {
    let ctx = TestCtx::new().await;
    let app = app(&ctx).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["checks"]["database"], "healthy");
}

#[tokio::test]
async fn preview_then_create_then_fetch_order() {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();

    let product_id = ctx.seed_product("Coffee Grinder", dec!(80)).await;
    let variant_id = ctx.seed_variant(product_id, "GRND-1", None, 10).await;
    ctx.seed_shipping_method("Standard", dec!(5)).await;
    ctx.seed_payment_method("cod").await;
    ctx.seed_address(user_id, true).await;

    let app = app(&ctx).await;

    let payload = json!({
        "user_id": user_id,
        "selections": [{ "variant_id": variant_id, "quantity": 1 }],
        "payment_method_code": "cod",
    });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/checkout/preview")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["can_proceed_to_payment"], true);
    assert_eq!(body["data"]["final_total"], "85");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/orders")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    let order_number = body["data"]["order_number"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/api/v1/orders/{}?user_id={}",
                    order_number, user_id
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["items"][0]["quantity"], 1);
}

#[tokio::test]
async fn create_order_without_address_is_unprocessable() {
    let ctx = TestCtx::new().await;
    let user_id = Uuid::new_v4();
    let product_id = ctx.seed_product("Kettle", dec!(25)).await;
    let variant_id = ctx.seed_variant(product_id, "KTL-1", None, 5).await;
    ctx.seed_shipping_method("Standard", dec!(5)).await;
    ctx.seed_payment_method("cod").await;

    let app = app(&ctx).await;
    let payload = json!({
        "user_id": user_id,
        "selections": [{ "variant_id": variant_id, "quantity": 1 }],
        "payment_method_code": "cod",
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/orders")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await;
    let details = body["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert!(details[0].as_str().unwrap().contains("address"));
}
