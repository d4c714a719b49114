//! Storage seams for jobs and owners.
//!
//! The orchestrator and pipeline only see these traits. [`PgStore`] backs them
//! with PostgreSQL; [`crate::db::memory::MemoryStore`] keeps everything in
//! process for single-node deployments without a database.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{owner_queries, queries};
use crate::models::job::{JobStatus, NewJob, TryOnJob};
use crate::models::owner::Owner;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &NewJob, status: JobStatus) -> Result<TryOnJob, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<TryOnJob>, StoreError>;

    /// Terminal success. Returns false if the job was already terminal.
    async fn complete_job(&self, job_id: Uuid, result_image_ref: &str) -> Result<bool, StoreError>;

    /// Terminal failure. Returns false if the job was already terminal.
    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, StoreError>;

    async fn list_jobs_for_owner(&self, owner_id: &str, limit: i64)
        -> Result<Vec<TryOnJob>, StoreError>;

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OwnerStore: Send + Sync {
    async fn record_person_image(
        &self,
        principal_id: &str,
        image_ref: &str,
    ) -> Result<Owner, StoreError>;

    async fn append_job(&self, principal_id: &str, job_id: Uuid) -> Result<(), StoreError>;

    async fn get_owner(&self, principal_id: &str) -> Result<Option<Owner>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, job: &NewJob, status: JobStatus) -> Result<TryOnJob, StoreError> {
        Ok(queries::create_job(&self.pool, job, status).await?)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<TryOnJob>, StoreError> {
        Ok(queries::get_job(&self.pool, job_id).await?)
    }

    async fn complete_job(&self, job_id: Uuid, result_image_ref: &str) -> Result<bool, StoreError> {
        Ok(queries::complete_job(&self.pool, job_id, result_image_ref).await?)
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, StoreError> {
        Ok(queries::fail_job(&self.pool, job_id, error).await?)
    }

    async fn list_jobs_for_owner(
        &self,
        owner_id: &str,
        limit: i64,
    ) -> Result<Vec<TryOnJob>, StoreError> {
        Ok(queries::list_jobs_for_owner(&self.pool, owner_id, limit).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OwnerStore for PgStore {
    async fn record_person_image(
        &self,
        principal_id: &str,
        image_ref: &str,
    ) -> Result<Owner, StoreError> {
        Ok(owner_queries::record_person_image(&self.pool, principal_id, image_ref).await?)
    }

    async fn append_job(&self, principal_id: &str, job_id: Uuid) -> Result<(), StoreError> {
        Ok(owner_queries::append_job(&self.pool, principal_id, job_id).await?)
    }

    async fn get_owner(&self, principal_id: &str) -> Result<Option<Owner>, StoreError> {
        Ok(owner_queries::get_owner(&self.pool, principal_id).await?)
    }
}
