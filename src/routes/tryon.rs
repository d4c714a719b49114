use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::Principal;
use crate::error::{AppError, AppResult};
use crate::models::job::SubjectRef;
use crate::models::tryon::{
    HistoryResponse, TryOnRequest, TryOnResponse, TryOnStatusResponse, TryOnSummary,
};
use crate::services::imaging;
use crate::services::orchestrator::SubmitRequest;
use crate::services::storage::BlobKind;

const HISTORY_LIMIT: i64 = 50;

/// POST /tryon: accept a try-on request and start processing in the background.
pub async fn submit_tryon(
    State(state): State<AppState>,
    principal: Principal,
    payload: Result<Json<TryOnRequest>, JsonRejection>,
) -> AppResult<Json<TryOnResponse>> {
    let Json(request) = payload?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let person_image = resolve_person_image(&state, &request).await?;

    // Guests share one principal id, so they get no owner record.
    if !principal.is_guest {
        if let Some(image_ref) = &person_image {
            state
                .owners
                .record_person_image(&principal.id, image_ref)
                .await?;
        }
    }

    let handle = state
        .orchestrator
        .submit(SubmitRequest {
            owner_id: principal.id.clone(),
            subject: SubjectRef {
                product_id: request.product_id,
                variant_id: request.variant_id,
                shop: request.shop,
            },
            input_image_ref: person_image.unwrap_or_default(),
            garment_image_url: request.garment_image_url,
            description: request.description.unwrap_or_default(),
        })
        .await?;

    // History is an index only; the job is already running.
    if !principal.is_guest {
        if let Err(e) = state.owners.append_job(&principal.id, handle.id).await {
            tracing::warn!(job_id = %handle.id, owner_id = %principal.id, error = %e, "Failed to append job to owner history");
        }
    }

    Ok(Json(TryOnResponse {
        status: handle.status,
        id: handle.id,
        message: "Try-on request received and is being processed".to_string(),
    }))
}

/// Inline images are stored first so the job only ever references a URL.
async fn resolve_person_image(
    state: &AppState,
    request: &TryOnRequest,
) -> AppResult<Option<String>> {
    if let Some(inline) = request.person_image.as_deref().filter(|s| !s.trim().is_empty()) {
        let image = imaging::decode_inline_image(inline)
            .map_err(|e| AppError::Validation(format!("personImage: {e}")))?;
        let name = format!("person-{}.{}", Uuid::new_v4(), image.extension());
        let url = state
            .storage
            .put(BlobKind::Upload, &image.bytes, &name, image.content_type())
            .await?;
        return Ok(Some(url));
    }

    Ok(request
        .person_image_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string))
}

/// GET /tryon-status/{id}: report the current state of a job.
pub async fn get_tryon_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TryOnStatusResponse>> {
    // Anything that is not a job id is simply an unknown job.
    let job_id = Uuid::parse_str(&id)
        .map_err(|_| AppError::NotFound(format!("try-on job {id}")))?;
    let view = state.orchestrator.status(job_id).await?;
    Ok(Json(view.into()))
}

/// GET /tryons: the caller's try-on history, newest first. Signed-in callers only.
pub async fn list_tryons(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<HistoryResponse>> {
    if principal.is_guest {
        return Err(AppError::Unauthorized(
            "Sign in to view try-on history".into(),
        ));
    }

    let person_images = state
        .owners
        .get_owner(&principal.id)
        .await?
        .map(|owner| owner.person_images)
        .unwrap_or_default();

    let try_ons = state
        .jobs
        .list_jobs_for_owner(&principal.id, HISTORY_LIMIT)
        .await?
        .into_iter()
        .map(TryOnSummary::from)
        .collect();

    Ok(Json(HistoryResponse {
        owner_id: principal.id,
        person_images,
        try_ons,
    }))
}
