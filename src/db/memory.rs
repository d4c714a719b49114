use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::db::store::{JobStore, OwnerStore, StoreError};
use crate::models::job::{JobStatus, NewJob, TryOnJob};
use crate::models::owner::Owner;

/// In-process job and owner store.
///
/// Each mutation holds the write lock for a single map operation, which gives
/// the same row-level atomicity the SQL statements provide.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<Uuid, TryOnJob>>,
    owners: RwLock<HashMap<String, Owner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    fn terminate(
        &self,
        job_id: Uuid,
        next: JobStatus,
        result_image_ref: Option<&str>,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if !job.status.can_transition_to(next) {
            return Ok(false);
        }

        job.status = next;
        job.result_image_ref = result_image_ref.map(str::to_string);
        job.error = error.map(str::to_string);
        job.updated_at = Utc::now();
        Ok(true)
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &NewJob, status: JobStatus) -> Result<TryOnJob, StoreError> {
        let now = Utc::now();
        let record = TryOnJob {
            id: Uuid::new_v4(),
            owner_id: job.owner_id.clone(),
            subject: job.subject.clone(),
            input_image_ref: job.input_image_ref.clone(),
            result_image_ref: None,
            status,
            error: None,
            created_at: now,
            updated_at: now,
        };

        self.jobs
            .write()
            .map_err(|_| poisoned())?
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<TryOnJob>, StoreError> {
        Ok(self.jobs.read().map_err(|_| poisoned())?.get(&job_id).cloned())
    }

    async fn complete_job(&self, job_id: Uuid, result_image_ref: &str) -> Result<bool, StoreError> {
        self.terminate(job_id, JobStatus::Done, Some(result_image_ref), None)
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, StoreError> {
        self.terminate(job_id, JobStatus::Failed, None, Some(error))
    }

    async fn list_jobs_for_owner(
        &self,
        owner_id: &str,
        limit: i64,
    ) -> Result<Vec<TryOnJob>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut owned: Vec<TryOnJob> = jobs
            .values()
            .filter(|job| job.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit.max(0) as usize);
        Ok(owned)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.jobs.read().map(|_| ()).map_err(|_| poisoned())
    }
}

#[async_trait]
impl OwnerStore for MemoryStore {
    async fn record_person_image(
        &self,
        principal_id: &str,
        image_ref: &str,
    ) -> Result<Owner, StoreError> {
        let mut owners = self.owners.write().map_err(|_| poisoned())?;
        let now = Utc::now();
        let owner = owners
            .entry(principal_id.to_string())
            .or_insert_with(|| new_owner(principal_id));

        if !owner.person_images.iter().any(|known| known == image_ref) {
            owner.person_images.push(image_ref.to_string());
        }
        owner.updated_at = now;
        Ok(owner.clone())
    }

    async fn append_job(&self, principal_id: &str, job_id: Uuid) -> Result<(), StoreError> {
        let mut owners = self.owners.write().map_err(|_| poisoned())?;
        let owner = owners
            .entry(principal_id.to_string())
            .or_insert_with(|| new_owner(principal_id));
        owner.job_ids.push(job_id);
        owner.updated_at = Utc::now();
        Ok(())
    }

    async fn get_owner(&self, principal_id: &str) -> Result<Option<Owner>, StoreError> {
        Ok(self
            .owners
            .read()
            .map_err(|_| poisoned())?
            .get(principal_id)
            .cloned())
    }
}

fn new_owner(principal_id: &str) -> Owner {
    let now = Utc::now();
    Owner {
        principal_id: principal_id.to_string(),
        person_images: Vec::new(),
        job_ids: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}
