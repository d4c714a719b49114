//! The background half of a try-on job.
//!
//! Stages run in order and the first failure aborts the run:
//! person image prep, garment fetch, inference, result upload. The outcome is
//! then written to the job row exactly once.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::db::store::{JobStore, StoreError};
use crate::services::fetch::{FetchError, ImageFetcher};
use crate::services::imaging::{self, ImageError};
use crate::services::inference::{InferenceError, InferenceProvider};
use crate::services::storage::{BlobKind, BlobStore, StorageError};

/// Everything the pipeline needs to run one job. Also the Redis payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineTask {
    pub job_id: Uuid,
    pub person_image_ref: String,
    pub garment_image_url: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Done { result_image_ref: String },
    Failed { error: String },
}

pub struct TryOnPipeline {
    jobs: Arc<dyn JobStore>,
    fetcher: Arc<dyn ImageFetcher>,
    inference: Arc<dyn InferenceProvider>,
    storage: Arc<dyn BlobStore>,
    inference_timeout: Duration,
}

impl TryOnPipeline {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        fetcher: Arc<dyn ImageFetcher>,
        inference: Arc<dyn InferenceProvider>,
        storage: Arc<dyn BlobStore>,
        inference_timeout: Duration,
    ) -> Self {
        Self {
            jobs,
            fetcher,
            inference,
            storage,
            inference_timeout,
        }
    }

    /// Run all stages and record the terminal status.
    ///
    /// Stage errors become a `failed` job. Only a failed terminal write is
    /// returned as an error; the job then keeps its last durable status.
    pub async fn execute(&self, task: &PipelineTask) -> Result<PipelineOutcome, StoreError> {
        let start = Instant::now();
        tracing::info!(job_id = %task.job_id, provider = self.inference.name(), "Starting try-on pipeline");

        let outcome = match self.run(task).await {
            Ok(result_image_ref) => PipelineOutcome::Done { result_image_ref },
            Err(e) => {
                tracing::error!(job_id = %task.job_id, stage = e.stage(), error = %e, "Try-on pipeline failed");
                PipelineOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let write = match &outcome {
            PipelineOutcome::Done { result_image_ref } => {
                self.jobs.complete_job(task.job_id, result_image_ref).await
            }
            PipelineOutcome::Failed { error } => self.jobs.fail_job(task.job_id, error).await,
        };

        metrics::histogram!("tryon_pipeline_seconds").record(start.elapsed().as_secs_f64());

        match write {
            Ok(true) => {
                match &outcome {
                    PipelineOutcome::Done { result_image_ref } => {
                        metrics::counter!("tryon_jobs_completed").increment(1);
                        tracing::info!(
                            job_id = %task.job_id,
                            duration_ms = start.elapsed().as_millis() as u64,
                            result = %result_image_ref,
                            "Try-on job done"
                        );
                    }
                    PipelineOutcome::Failed { .. } => {
                        metrics::counter!("tryon_jobs_failed").increment(1);
                    }
                }
                Ok(outcome)
            }
            Ok(false) => {
                tracing::warn!(job_id = %task.job_id, "Job already terminal or missing; outcome discarded");
                Ok(outcome)
            }
            Err(e) => {
                metrics::counter!("tryon_terminal_write_failures").increment(1);
                tracing::error!(
                    job_id = %task.job_id,
                    error = %e,
                    "Failed to record terminal status; job remains processing"
                );
                Err(e)
            }
        }
    }

    /// The four stages, returning the stored result URL.
    pub async fn run(&self, task: &PipelineTask) -> Result<String, PipelineError> {
        // 1. person image into provider geometry
        let raw_person = self
            .fetcher
            .fetch(&task.person_image_ref)
            .await
            .map_err(PipelineError::PersonFetch)?;
        let person = tokio::task::spawn_blocking(move || imaging::normalize_person_image(&raw_person))
            .await
            .map_err(|e| PipelineError::Aborted(e.to_string()))??;

        // 2. garment image
        tracing::debug!(job_id = %task.job_id, url = %task.garment_image_url, "Fetching garment image");
        let garment = self
            .fetcher
            .fetch(&task.garment_image_url)
            .await
            .map_err(PipelineError::UpstreamFetch)?;

        // 3. inference, bounded
        let started = Instant::now();
        let generated = tokio::time::timeout(
            self.inference_timeout,
            self.inference.infer(&person, &garment, &task.description),
        )
        .await
        .map_err(|_| InferenceError::Timeout(self.inference_timeout.as_secs()))??;
        tracing::info!(
            job_id = %task.job_id,
            inference_ms = started.elapsed().as_millis() as u64,
            bytes = generated.len(),
            "Inference complete"
        );

        // 4. persist output
        let name = format!("tryon-{}.png", task.job_id);
        let url = self
            .storage
            .put(BlobKind::Result, &generated, &name, "image/png")
            .await?;

        Ok(url)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to download person image: {0}")]
    PersonFetch(FetchError),

    #[error("Failed to prepare person image: {0}")]
    ImagePrep(#[from] ImageError),

    #[error("Failed to download garment image: {0}")]
    UpstreamFetch(FetchError),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Failed to store result: {0}")]
    Storage(#[from] StorageError),

    #[error("Pipeline task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::PersonFetch(_) | PipelineError::ImagePrep(_) => "prepare",
            PipelineError::UpstreamFetch(_) => "garment_fetch",
            PipelineError::Inference(_) => "inference",
            PipelineError::Storage(_) => "upload",
            PipelineError::Aborted(_) => "runtime",
        }
    }
}
