use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobStatus, JobStatusView, TryOnJob};

/// Request to start a virtual try-on.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TryOnRequest {
    #[garde(length(min = 1, max = 200))]
    pub product_id: String,

    #[garde(length(min = 1, max = 200))]
    pub variant_id: Option<String>,

    #[garde(length(min = 1, max = 255))]
    pub shop: String,

    /// Garment image location; protocol-relative URLs are accepted.
    #[garde(length(min = 1, max = 2048))]
    pub garment_image_url: String,

    /// URL of an already uploaded person image
    #[garde(length(max = 2048))]
    pub person_image_url: Option<String>,

    /// Person image sent inline, as a `data:` URL or plain base64
    #[garde(skip)]
    pub person_image: Option<String>,

    #[garde(length(max = 2000))]
    pub description: Option<String>,
}

/// Response after submitting a try-on.
#[derive(Debug, Serialize, Deserialize)]
pub struct TryOnResponse {
    pub status: JobStatus,
    pub id: Uuid,
    pub message: String,
}

/// Response for polling a job.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnStatusResponse {
    pub id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobStatusView> for TryOnStatusResponse {
    fn from(view: JobStatusView) -> Self {
        Self {
            id: view.id,
            status: view.status,
            result_image_url: view.result_image_ref,
            error: view.error,
        }
    }
}

/// One entry of the caller's try-on history.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub shop: String,
    pub input_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<TryOnJob> for TryOnSummary {
    fn from(job: TryOnJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            product_id: job.subject.product_id,
            variant_id: job.subject.variant_id,
            shop: job.subject.shop,
            input_image_url: job.input_image_ref,
            result_image_url: job.result_image_ref,
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub owner_id: String,
    pub person_images: Vec<String>,
    pub try_ons: Vec<TryOnSummary>,
}

/// Request for a presigned person-image upload.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[garde(length(min = 1, max = 255))]
    pub file_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub upload_url: String,
    pub key: String,
    pub public_url: String,
    pub expires_in: u32,
}
