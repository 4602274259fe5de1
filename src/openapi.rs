use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = "Checkout and order pipeline: inventory, discounts, vouchers, flash sales and order lifecycle."
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Checkout preview endpoints"),
        (name = "Orders", description = "Order management endpoints"),
        (name = "Vouchers", description = "Voucher wallet endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::checkout::preview_checkout,
        crate::handlers::orders::create_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::vouchers::save_voucher,
        crate::handlers::vouchers::list_saved_vouchers,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::checkout::CheckoutRequest,
        crate::services::checkout::CheckoutSnapshot,
        crate::services::checkout::CheckoutItem,
        crate::services::checkout::VariantSelection,
        crate::services::orders::OrderView,
        crate::services::orders::OrderItemView,
        crate::services::orders::OrderSummary,
        crate::services::vouchers::SavedVoucher,
        crate::entities::user_voucher::Model,
        crate::entities::order::OrderStatus,
        crate::entities::user_voucher::UserVoucherStatus,
        crate::handlers::orders::CancelOrderRequest,
        crate::handlers::orders::UpdateOrderStatusRequest,
        crate::handlers::vouchers::SaveVoucherRequest,
    ))
)]
pub struct ApiDoc;

/// Serves the generated OpenAPI document as JSON.
pub fn openapi_routes() -> Router<AppState> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
