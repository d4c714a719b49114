use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-principal history index. Jobs are referenced, not owned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub principal_id: String,
    pub person_images: Vec<String>,
    pub job_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
