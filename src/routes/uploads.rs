use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::auth::Principal;
use crate::error::{AppError, AppResult};
use crate::models::tryon::{UploadRequest, UploadResponse};

const UPLOAD_URL_EXPIRY_SECS: u32 = 3600;

/// POST /uploads: presigned URL for uploading a person image directly to storage.
pub async fn create_upload(
    State(state): State<AppState>,
    principal: Principal,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> AppResult<Json<UploadResponse>> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let presigned = state
        .storage
        .presign_upload(&request.file_name, UPLOAD_URL_EXPIRY_SECS)
        .await?;

    tracing::info!(owner_id = %principal.id, key = %presigned.key, "Issued upload URL");

    Ok(Json(UploadResponse {
        upload_url: presigned.upload_url,
        key: presigned.key,
        public_url: presigned.public_url,
        expires_in: presigned.expires_in,
    }))
}
