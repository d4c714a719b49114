use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::services::pipeline::{PipelineTask, TryOnPipeline};
use crate::services::queue::{JobQueue, QueueError};

/// Hands a task to whatever will run the pipeline for it.
///
/// `dispatch` returning `Ok` means exactly one execution has been scheduled.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, task: PipelineTask) -> Result<(), DispatchError>;
}

/// Runs each job as its own Tokio task in this process.
///
/// The semaphore caps concurrent pipelines; a task waits for its permit
/// inside the spawned future, so `dispatch` itself never waits.
pub struct LocalDispatcher {
    pipeline: Arc<TryOnPipeline>,
    permits: Arc<Semaphore>,
}

impl LocalDispatcher {
    pub fn new(pipeline: Arc<TryOnPipeline>, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl JobDispatcher for LocalDispatcher {
    async fn dispatch(&self, task: PipelineTask) -> Result<(), DispatchError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DispatchError::NoRuntime(e.to_string()))?;

        let pipeline = Arc::clone(&self.pipeline);
        let permits = Arc::clone(&self.permits);
        runtime.spawn(async move {
            // Only fails if the semaphore is closed, which never happens here.
            let _permit = permits.acquire_owned().await.ok();
            // Terminal write failures are logged inside execute
            let _ = pipeline.execute(&task).await;
        });

        Ok(())
    }
}

/// Pushes tasks to Redis for the `worker` binary.
pub struct RedisDispatcher {
    queue: Arc<JobQueue>,
}

impl RedisDispatcher {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl JobDispatcher for RedisDispatcher {
    async fn dispatch(&self, task: PipelineTask) -> Result<(), DispatchError> {
        self.queue.enqueue(&task).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No async runtime available to run the job: {0}")]
    NoRuntime(String),

    #[error("Failed to enqueue job: {0}")]
    Queue(#[from] QueueError),
}
