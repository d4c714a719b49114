use serde::Deserialize;

/// How submitted jobs reach the pipeline.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One spawned task per job inside the API process.
    Local,
    /// Jobs are pushed to Redis and run by the `worker` binary.
    Redis,
}

/// Which inference provider backs the pipeline.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    /// Google Vertex AI `virtual-try-on-001` predict endpoint.
    Vertex,
    /// Any HTTP endpoint speaking the simple JSON try-on contract.
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Without it jobs live in process memory.
    pub database_url: Option<String>,

    /// Redis connection string, required when `dispatch_mode` is `redis`
    pub redis_url: Option<String>,

    #[serde(default = "default_dispatch_mode")]
    pub dispatch_mode: DispatchMode,

    /// Upper bound on pipelines running at once in local dispatch mode
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// S3 bucket for uploads and generated results
    #[serde(default = "default_s3_bucket")]
    pub s3_bucket: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    /// Custom S3-compatible endpoint (R2, MinIO). AWS is used when unset.
    pub s3_endpoint: Option<String>,

    #[serde(default)]
    pub s3_access_key: String,

    #[serde(default)]
    pub s3_secret_key: String,

    /// Public base URL for stored objects, e.g. a CDN in front of the bucket
    pub s3_public_base_url: Option<String>,

    #[serde(default = "default_inference_backend")]
    pub inference_backend: InferenceBackend,

    /// Google Cloud project for the Vertex backend
    pub gcp_project_id: Option<String>,

    #[serde(default = "default_gcp_location")]
    pub gcp_location: String,

    /// Fixed OAuth token for Vertex AI. When unset, tokens are minted from
    /// Application Default Credentials and refreshed before they expire.
    pub gcp_access_token: Option<String>,

    /// Endpoint URL for the remote backend
    pub inference_endpoint: Option<String>,

    pub inference_api_token: Option<String>,

    /// Hard limit on a single inference call
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,

    /// Timeout for fetching person and garment images
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// HS256 secret for verifying session tokens
    pub auth_jwt_secret: Option<String>,

    /// Reject requests without a valid token instead of treating them as guests
    #[serde(default)]
    pub require_auth: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_dispatch_mode() -> DispatchMode {
    DispatchMode::Local
}

fn default_max_concurrent_jobs() -> usize {
    8
}

fn default_s3_bucket() -> String {
    "try-on-us-assets".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_inference_backend() -> InferenceBackend {
    InferenceBackend::Vertex
}

fn default_gcp_location() -> String {
    "us-central1".to_string()
}

fn default_inference_timeout_secs() -> u64 {
    120
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build from an explicit list of variables, ignoring the process environment.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }
}
