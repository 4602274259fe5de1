use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::user_voucher;
use crate::services::vouchers::SavedVoucher;
use crate::{errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SaveVoucherRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserQuery {
    pub user_id: Uuid,
}

/// Save a voucher to the user's wallet
#[utoipa::path(
    post,
    path = "/api/v1/vouchers/{id}/save",
    summary = "Save voucher",
    description = "Claim a voucher for later use; rejected when the voucher is inactive, expired or exhausted",
    params(("id" = Uuid, Path, description = "Voucher ID")),
    request_body = SaveVoucherRequest,
    responses(
        (status = 201, description = "Voucher saved", body = ApiResponse<user_voucher::Model>),
        (status = 404, description = "Voucher not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Voucher already saved", body = crate::errors::ErrorResponse),
        (status = 422, description = "Voucher not redeemable", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn save_voucher(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SaveVoucherRequest>,
) -> Result<(StatusCode, Json<ApiResponse<user_voucher::Model>>), ServiceError> {
    let saved = state
        .services
        .vouchers
        .save_for_user(request.user_id, id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(saved))))
}

/// List the user's saved vouchers
#[utoipa::path(
    get,
    path = "/api/v1/vouchers",
    summary = "List saved vouchers",
    description = "Get the vouchers the user has saved, with their usage state",
    params(("user_id" = Uuid, Query, description = "Owner of the wallet")),
    responses(
        (status = 200, description = "Vouchers retrieved", body = ApiResponse<Vec<SavedVoucher>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_saved_vouchers(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<Vec<SavedVoucher>>>, ServiceError> {
    let vouchers = state.services.vouchers.list_for_user(query.user_id).await?;
    Ok(Json(ApiResponse::success(vouchers)))
}
