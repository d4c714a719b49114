//! Shared harness: in-memory store plus scripted collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use tryon_relay::app_state::AppState;
use tryon_relay::auth::AuthSettings;
use tryon_relay::db::{JobStore, MemoryStore, OwnerStore, StoreError};
use tryon_relay::models::job::{JobStatus, JobStatusView, NewJob, TryOnJob};
use tryon_relay::services::dispatch::{DispatchError, JobDispatcher, LocalDispatcher};
use tryon_relay::services::fetch::{normalize_image_url, FetchError, ImageFetcher};
use tryon_relay::services::inference::{InferenceError, InferenceProvider};
use tryon_relay::services::orchestrator::Orchestrator;
use tryon_relay::services::pipeline::{PipelineTask, TryOnPipeline};
use tryon_relay::services::storage::{BlobKind, BlobStore, PresignedUpload, StorageError};

pub const PERSON_URL: &str = "https://images.test/person.jpg";
pub const GARMENT_URL: &str = "https://cdn.test/shirt.png";
pub const GENERATED: &[u8] = b"generated-tryon-image";

pub fn sample_png() -> Vec<u8> {
    let img = RgbaImage::from_pixel(60, 90, Rgba([30, 60, 200, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Serves canned bytes per URL; unknown URLs answer 404.
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Result<Vec<u8>, u16>>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Person and garment URLs both resolve to a valid image.
    pub fn with_defaults() -> Self {
        let fetcher = Self::new();
        fetcher.serve(PERSON_URL, sample_png());
        fetcher.serve(GARMENT_URL, sample_png());
        fetcher
    }

    pub fn serve(&self, url: &str, bytes: Vec<u8>) {
        self.responses.lock().unwrap().insert(url.to_string(), Ok(bytes));
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.responses.lock().unwrap().insert(url.to_string(), Err(status));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let url = normalize_image_url(url);
        self.calls.lock().unwrap().push(url.clone());
        match self.responses.lock().unwrap().get(&url) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(status)) => Err(FetchError::Status { url, status: *status }),
            None => Err(FetchError::Status { url, status: 404 }),
        }
    }
}

// ---------------------------------------------------------------------------
// Inference
// ---------------------------------------------------------------------------

pub enum InferenceScript {
    Succeed,
    Empty,
    /// Never answers within any reasonable test timeout
    Hang,
    /// Answers once the notify fires
    WaitFor(Arc<Notify>),
}

pub struct ScriptedInference {
    script: InferenceScript,
    calls: AtomicUsize,
}

impl ScriptedInference {
    pub fn new(script: InferenceScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for ScriptedInference {
    async fn infer(
        &self,
        _person_image: &[u8],
        _garment_image: &[u8],
        _description: &str,
    ) -> Result<Vec<u8>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            InferenceScript::Succeed => Ok(GENERATED.to_vec()),
            InferenceScript::Empty => Err(InferenceError::EmptyResult),
            InferenceScript::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(GENERATED.to_vec())
            }
            InferenceScript::WaitFor(gate) => {
                gate.notified().await;
                Ok(GENERATED.to_vec())
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub kind: BlobKind,
    pub name: String,
    pub content_type: String,
    pub len: usize,
}

pub struct RecordingBlobStore {
    puts: Mutex<Vec<StoredBlob>>,
    failing: AtomicBool,
}

impl RecordingBlobStore {
    pub fn new() -> Self {
        Self {
            puts: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn puts(&self) -> Vec<StoredBlob> {
        self.puts.lock().unwrap().clone()
    }
}

fn blob_prefix(kind: BlobKind) -> &'static str {
    match kind {
        BlobKind::Upload => "uploads",
        BlobKind::Result => "results",
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put(
        &self,
        kind: BlobKind,
        data: &[u8],
        name: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                key: name.to_string(),
                status: 503,
            });
        }
        self.puts.lock().unwrap().push(StoredBlob {
            kind,
            name: name.to_string(),
            content_type: content_type.to_string(),
            len: data.len(),
        });
        Ok(format!("https://blobs.test/{}/{}", blob_prefix(kind), name))
    }

    async fn presign_upload(
        &self,
        file_name: &str,
        expiry_secs: u32,
    ) -> Result<PresignedUpload, StorageError> {
        let key = format!("uploads/1_{}", file_name);
        Ok(PresignedUpload {
            upload_url: format!("https://blobs.test/{}?X-Amz-Signature=sig", key),
            public_url: format!("https://blobs.test/{}", key),
            key,
            expires_in: expiry_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// Failure injection
// ---------------------------------------------------------------------------

/// Memory store whose writes can be switched off.
pub struct FlakyJobStore {
    inner: MemoryStore,
    pub fail_create: AtomicBool,
    pub fail_terminal: AtomicBool,
}

impl FlakyJobStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_create: AtomicBool::new(false),
            fail_terminal: AtomicBool::new(false),
        }
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("injected failure".to_string())
}

#[async_trait]
impl JobStore for FlakyJobStore {
    async fn create_job(&self, job: &NewJob, status: JobStatus) -> Result<TryOnJob, StoreError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.create_job(job, status).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<TryOnJob>, StoreError> {
        self.inner.get_job(job_id).await
    }

    async fn complete_job(&self, job_id: Uuid, result_image_ref: &str) -> Result<bool, StoreError> {
        if self.fail_terminal.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.complete_job(job_id, result_image_ref).await
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, StoreError> {
        if self.fail_terminal.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.fail_job(job_id, error).await
    }

    async fn list_jobs_for_owner(
        &self,
        owner_id: &str,
        limit: i64,
    ) -> Result<Vec<TryOnJob>, StoreError> {
        self.inner.list_jobs_for_owner(owner_id, limit).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }
}

pub struct RejectingDispatcher;

#[async_trait]
impl JobDispatcher for RejectingDispatcher {
    async fn dispatch(&self, _task: PipelineTask) -> Result<(), DispatchError> {
        Err(DispatchError::NoRuntime("dispatcher shut down".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub jobs: Arc<dyn JobStore>,
    pub owners: Arc<dyn OwnerStore>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub inference: Arc<ScriptedInference>,
    pub blobs: Arc<RecordingBlobStore>,
    pub pipeline: Arc<TryOnPipeline>,
    pub dispatcher: Arc<dyn JobDispatcher>,
}

impl Harness {
    pub fn new(script: InferenceScript) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_store(store.clone(), store, script, Duration::from_secs(5))
    }

    pub fn with_store(
        jobs: Arc<dyn JobStore>,
        owners: Arc<dyn OwnerStore>,
        script: InferenceScript,
        inference_timeout: Duration,
    ) -> Self {
        let fetcher = Arc::new(ScriptedFetcher::with_defaults());
        let inference = Arc::new(ScriptedInference::new(script));
        let blobs = Arc::new(RecordingBlobStore::new());
        let pipeline = Arc::new(TryOnPipeline::new(
            jobs.clone(),
            fetcher.clone(),
            inference.clone(),
            blobs.clone(),
            inference_timeout,
        ));
        let dispatcher: Arc<dyn JobDispatcher> = Arc::new(LocalDispatcher::new(pipeline.clone(), 4));

        Self {
            jobs,
            owners,
            fetcher,
            inference,
            blobs,
            pipeline,
            dispatcher,
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.jobs.clone(), self.dispatcher.clone())
    }

    pub fn app_state(&self, auth: AuthSettings) -> AppState {
        AppState::new(
            self.jobs.clone(),
            self.owners.clone(),
            self.blobs.clone(),
            self.orchestrator(),
            None,
            auth,
        )
    }
}

/// Poll until the job leaves `processing`, or panic after ~5 seconds.
pub async fn wait_for_terminal(orchestrator: &Orchestrator, job_id: Uuid) -> JobStatusView {
    for _ in 0..500 {
        let view = orchestrator.status(job_id).await.expect("job should exist");
        if view.status.is_terminal() {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}
