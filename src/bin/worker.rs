use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use tryon_relay::{
    app_state::{self, StartupError},
    config::AppConfig,
    services::{
        pipeline::{PipelineOutcome, TryOnPipeline},
        queue::JobQueue,
    },
};

const POLL_INTERVAL_MS: u64 = 1000;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting try-on worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let (pipeline, queue) = init(&config)
        .await
        .expect("Failed to initialize worker");

    tracing::info!("Worker ready, starting job processing loop");

    loop {
        match process_next_job(&pipeline, &queue).await {
            Ok(true) => {
                tracing::debug!("Job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Queue error, backing off");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

async fn init(config: &AppConfig) -> Result<(TryOnPipeline, JobQueue), StartupError> {
    if config.database_url.is_none() {
        return Err(StartupError::Config(
            "worker needs DATABASE_URL to share jobs with the API".into(),
        ));
    }
    let (jobs, _owners) = app_state::connect_stores(config).await?;
    let storage = app_state::blob_store(config)?;
    let pipeline = app_state::build_pipeline(config, jobs, storage)?;
    let queue = app_state::redis_queue(config)?;

    match queue.recover_stranded().await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(requeued = n, "Requeued tasks left unfinished by a previous worker"),
        Err(e) => tracing::error!(error = %e, "Failed to requeue unfinished tasks"),
    }

    Ok((pipeline, queue))
}

/// Run the next queued job to a terminal state.
/// Returns Ok(true) if a job was taken, Ok(false) if the queue was empty.
async fn process_next_job(
    pipeline: &TryOnPipeline,
    queue: &JobQueue,
) -> Result<bool, Box<dyn std::error::Error>> {
    let task = match queue.dequeue().await? {
        Some(t) => t,
        None => return Ok(false),
    };

    tracing::info!(job_id = %task.job_id, "Processing try-on job");

    // Pipelines are never retried: a run ends in done or failed.
    match pipeline.execute(&task).await {
        Ok(PipelineOutcome::Done { .. }) => {
            tracing::info!(job_id = %task.job_id, "Job completed successfully");
        }
        Ok(PipelineOutcome::Failed { error }) => {
            tracing::warn!(job_id = %task.job_id, error = %error, "Job failed");
        }
        Err(e) => {
            tracing::error!(job_id = %task.job_id, error = %e, "Job outcome not recorded");
        }
    }

    queue.complete(&task).await?;
    Ok(true)
}
