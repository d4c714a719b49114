use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::services::pipeline::PipelineTask;

const QUEUE_KEY: &str = "tryon:jobs";
const PROCESSING_KEY: &str = "tryon:processing";

/// Redis hand-off between the API (`DISPATCH_MODE=redis`) and `worker` processes.
///
/// Tasks move `tryon:jobs` -> `tryon:processing` atomically on dequeue and are
/// removed from `tryon:processing` once their outcome is recorded.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn enqueue(&self, task: &PipelineTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, payload).await?;
        Ok(())
    }

    /// Claim the oldest task. `None` when the queue is empty.
    pub async fn dequeue(&self) -> Result<Option<PipelineTask>, QueueError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(QueueError::from))
            .transpose()
    }

    /// Release a claimed task after its terminal status is written.
    pub async fn complete(&self, task: &PipelineTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, payload).await?;
        Ok(())
    }

    /// Move every claimed-but-unfinished task back onto the queue.
    ///
    /// A worker that dies between `dequeue` and `complete` leaves its task in
    /// `tryon:processing`; the next worker start puts it back in line. If other
    /// workers are still running, one of their in-flight tasks may run twice;
    /// the conditional terminal write keeps only the first outcome.
    pub async fn recover_stranded(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let mut moved = 0;
        while conn
            .rpoplpush::<_, _, Option<String>>(PROCESSING_KEY, QUEUE_KEY)
            .await?
            .is_some()
        {
            moved += 1;
        }
        Ok(moved)
    }

    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Tasks waiting for a worker.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        Ok(conn.llen(QUEUE_KEY).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Malformed task payload: {0}")]
    Payload(#[from] serde_json::Error),
}
