use axum::{extract::State, response::Json};

use crate::services::checkout::{CheckoutRequest, CheckoutSnapshot};
use crate::{errors::ServiceError, ApiResponse, AppState};

/// Preview the checkout for a set of selections
#[utoipa::path(
    post,
    path = "/api/v1/checkout/preview",
    summary = "Preview checkout",
    description = "Price the given selections and report whether the checkout can proceed to payment",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Snapshot computed", body = ApiResponse<CheckoutSnapshot>),
        (status = 400, description = "Malformed request", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn preview_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<ApiResponse<CheckoutSnapshot>>, ServiceError> {
    let snapshot = state.services.checkout.build_snapshot(&request).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}
