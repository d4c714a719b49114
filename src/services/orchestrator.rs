use std::sync::Arc;
use uuid::Uuid;

use crate::db::store::{JobStore, StoreError};
use crate::models::job::{JobHandle, JobStatus, JobStatusView, NewJob, SubjectRef};
use crate::services::dispatch::{DispatchError, JobDispatcher};
use crate::services::pipeline::PipelineTask;

/// Stand-in person image used when a request carries none.
pub const PLACEHOLDER_PERSON_IMAGE: &str = "https://placehold.co/768x1024.png";

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub owner_id: String,
    pub subject: SubjectRef,
    pub input_image_ref: String,
    pub garment_image_url: String,
    pub description: String,
}

/// Creates jobs, schedules their pipeline and answers status queries.
pub struct Orchestrator {
    jobs: Arc<dyn JobStore>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl Orchestrator {
    pub fn new(jobs: Arc<dyn JobStore>, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self { jobs, dispatcher }
    }

    /// Create a `processing` job and schedule its pipeline without waiting for it.
    pub async fn submit(&self, request: SubmitRequest) -> Result<JobHandle, OrchestratorError> {
        let input_image_ref = match request.input_image_ref.trim() {
            "" => PLACEHOLDER_PERSON_IMAGE.to_string(),
            given => given.to_string(),
        };

        let job = self
            .jobs
            .create_job(
                &NewJob {
                    owner_id: request.owner_id,
                    subject: request.subject,
                    input_image_ref,
                },
                JobStatus::Processing,
            )
            .await?;
        metrics::counter!("tryon_jobs_submitted").increment(1);

        let task = PipelineTask {
            job_id: job.id,
            person_image_ref: job.input_image_ref.clone(),
            garment_image_url: request.garment_image_url,
            description: request.description,
        };

        if let Err(e) = self.dispatcher.dispatch(task).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to schedule try-on pipeline");
            match self.jobs.fail_job(job.id, &format!("scheduling failed: {e}")).await {
                Ok(_) => metrics::counter!("tryon_jobs_failed").increment(1),
                Err(write_err) => {
                    tracing::error!(job_id = %job.id, error = %write_err, "Failed to mark unscheduled job failed");
                }
            }
            return Err(OrchestratorError::Scheduling {
                job_id: job.id,
                source: e,
            });
        }

        tracing::info!(
            job_id = %job.id,
            owner_id = %job.owner_id,
            product_id = %job.subject.product_id,
            "Try-on job scheduled"
        );

        Ok(JobHandle {
            id: job.id,
            status: job.status,
            input_image_ref: job.input_image_ref,
        })
    }

    /// Current durable state of a job.
    pub async fn status(&self, job_id: Uuid) -> Result<JobStatusView, OrchestratorError> {
        self.jobs
            .get_job(job_id)
            .await?
            .map(|job| JobStatusView::from(&job))
            .ok_or(OrchestratorError::NotFound(job_id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Try-on job {0} not found")]
    NotFound(Uuid),

    #[error("Job store error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Could not schedule job {job_id}: {source}")]
    Scheduling {
        job_id: Uuid,
        #[source]
        source: DispatchError,
    },
}
