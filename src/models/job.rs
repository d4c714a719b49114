use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a try-on job.
///
/// `Pending` exists for completeness; submissions start directly in
/// `Processing`. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Done)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

/// What is being tried on. Opaque identifiers from the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectRef {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub shop: String,
}

/// A virtual try-on job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryOnJob {
    pub id: Uuid,
    pub owner_id: String,
    pub subject: SubjectRef,
    pub input_image_ref: String,
    pub result_image_ref: Option<String>,
    pub status: JobStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a job row.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner_id: String,
    pub subject: SubjectRef,
    pub input_image_ref: String,
}

/// Returned by `submit` before any pipeline work has happened.
#[derive(Debug, Clone, Serialize)]
pub struct JobHandle {
    pub id: Uuid,
    pub status: JobStatus,
    pub input_image_ref: String,
}

/// Point-in-time view of a job for status polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatusView {
    pub id: Uuid,
    pub status: JobStatus,
    pub result_image_ref: Option<String>,
    pub error: Option<String>,
}

impl From<&TryOnJob> for JobStatusView {
    fn from(job: &TryOnJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            result_image_ref: job.result_image_ref.clone(),
            error: job.error.clone(),
        }
    }
}
