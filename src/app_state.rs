use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthSettings;
use crate::config::{AppConfig, DispatchMode};
use crate::db::{self, JobStore, MemoryStore, OwnerStore, PgStore};
use crate::services::{
    dispatch::{JobDispatcher, LocalDispatcher, RedisDispatcher},
    fetch::{FetchError, HttpImageFetcher},
    inference::{self, InferenceError},
    orchestrator::Orchestrator,
    pipeline::TryOnPipeline,
    queue::{JobQueue, QueueError},
    storage::{BlobStore, S3BlobStore, StorageError},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub owners: Arc<dyn OwnerStore>,
    pub storage: Arc<dyn BlobStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub queue: Option<Arc<JobQueue>>,
    pub auth: Arc<AuthSettings>,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        owners: Arc<dyn OwnerStore>,
        storage: Arc<dyn BlobStore>,
        orchestrator: Orchestrator,
        queue: Option<Arc<JobQueue>>,
        auth: AuthSettings,
    ) -> Self {
        Self {
            jobs,
            owners,
            storage,
            orchestrator: Arc::new(orchestrator),
            queue,
            auth: Arc::new(auth),
        }
    }

    /// Wire every collaborator from configuration.
    pub async fn build(config: &AppConfig) -> Result<Self, StartupError> {
        let (jobs, owners) = connect_stores(config).await?;
        let storage = blob_store(config)?;

        let (dispatcher, queue): (Arc<dyn JobDispatcher>, Option<Arc<JobQueue>>) =
            match config.dispatch_mode {
                DispatchMode::Local => {
                    let pipeline = build_pipeline(config, jobs.clone(), storage.clone())?;
                    tracing::info!(max_concurrent = config.max_concurrent_jobs, "Using in-process dispatch");
                    let dispatcher: Arc<dyn JobDispatcher> = Arc::new(LocalDispatcher::new(
                        Arc::new(pipeline),
                        config.max_concurrent_jobs,
                    ));
                    (dispatcher, None)
                }
                DispatchMode::Redis => {
                    let queue = Arc::new(redis_queue(config)?);
                    tracing::info!("Using Redis dispatch; run the worker binary to process jobs");
                    let dispatcher: Arc<dyn JobDispatcher> =
                        Arc::new(RedisDispatcher::new(queue.clone()));
                    (dispatcher, Some(queue))
                }
            };

        let orchestrator = Orchestrator::new(jobs.clone(), dispatcher);
        let auth = AuthSettings::new(config.auth_jwt_secret.as_deref(), config.require_auth);

        Ok(Self::new(jobs, owners, storage, orchestrator, queue, auth))
    }
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise process memory.
pub async fn connect_stores(
    config: &AppConfig,
) -> Result<(Arc<dyn JobStore>, Arc<dyn OwnerStore>), StartupError> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL database");
            let pool = db::init_pool(url).await?;

            tracing::info!("Running database migrations");
            db::run_migrations(&pool).await?;

            let store = Arc::new(PgStore::new(pool));
            let jobs: Arc<dyn JobStore> = store.clone();
            let owners: Arc<dyn OwnerStore> = store;
            Ok((jobs, owners))
        }
        None if config.dispatch_mode == DispatchMode::Redis => Err(StartupError::Config(
            "DATABASE_URL is required when DISPATCH_MODE=redis".into(),
        )),
        None => {
            tracing::warn!("DATABASE_URL not set; jobs are kept in memory and lost on restart");
            let store = Arc::new(MemoryStore::new());
            let jobs: Arc<dyn JobStore> = store.clone();
            let owners: Arc<dyn OwnerStore> = store;
            Ok((jobs, owners))
        }
    }
}

pub fn blob_store(config: &AppConfig) -> Result<Arc<dyn BlobStore>, StartupError> {
    tracing::info!(bucket = %config.s3_bucket, "Initializing S3 storage client");
    let store = S3BlobStore::new(
        &config.s3_bucket,
        &config.s3_region,
        config.s3_endpoint.as_deref(),
        &config.s3_access_key,
        &config.s3_secret_key,
        config.s3_public_base_url.as_deref(),
    )?;
    Ok(Arc::new(store))
}

pub fn redis_queue(config: &AppConfig) -> Result<JobQueue, StartupError> {
    let url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| StartupError::Config("REDIS_URL is required when DISPATCH_MODE=redis".into()))?;
    tracing::info!("Connecting to Redis job queue");
    Ok(JobQueue::new(url)?)
}

pub fn build_pipeline(
    config: &AppConfig,
    jobs: Arc<dyn JobStore>,
    storage: Arc<dyn BlobStore>,
) -> Result<TryOnPipeline, StartupError> {
    let fetcher = HttpImageFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
    let provider = inference::from_config(config)?;
    tracing::info!(provider = provider.name(), timeout_secs = config.inference_timeout_secs, "Inference provider ready");

    Ok(TryOnPipeline::new(
        jobs,
        Arc::new(fetcher),
        provider,
        storage,
        Duration::from_secs(config.inference_timeout_secs),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}
