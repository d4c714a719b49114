use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use gcp_auth::TokenProvider;
use tokio::sync::OnceCell;

use crate::config::{AppConfig, InferenceBackend};

/// A virtual try-on model: person + garment in, generated image out.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn infer(
        &self,
        person_image: &[u8],
        garment_image: &[u8],
        description: &str,
    ) -> Result<Vec<u8>, InferenceError>;

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}

/// Pick the provider named by `INFERENCE_BACKEND`.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn InferenceProvider>, InferenceError> {
    match config.inference_backend {
        InferenceBackend::Vertex => {
            if config.gcp_project_id.is_none() {
                tracing::warn!("GCP_PROJECT_ID not set; try-on jobs will fail until configured");
            }
            let tokens = VertexToken::from_override(config.gcp_access_token.clone());
            if matches!(tokens, VertexToken::Static(_)) {
                tracing::warn!("Using fixed GCP_ACCESS_TOKEN; it is never refreshed");
            }
            Ok(Arc::new(VertexAiClient::new(
                config.gcp_project_id.clone(),
                config.gcp_location.clone(),
                tokens,
            )))
        }
        InferenceBackend::Remote => {
            let endpoint = config.inference_endpoint.clone().ok_or_else(|| {
                InferenceError::Config("INFERENCE_ENDPOINT is required for the remote backend".into())
            })?;
            Ok(Arc::new(RemoteInferenceClient::new(
                endpoint,
                config.inference_api_token.clone(),
            )))
        }
    }
}

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Source of bearer tokens for Vertex AI.
pub enum VertexToken {
    /// `GCP_ACCESS_TOKEN` override, used as-is.
    Static(String),
    /// Application Default Credentials. The provider is resolved on first use
    /// and caches tokens, minting a new one shortly before expiry.
    ApplicationDefault(OnceCell<Arc<dyn TokenProvider>>),
}

impl VertexToken {
    pub fn from_override(token: Option<String>) -> Self {
        match token.filter(|t| !t.trim().is_empty()) {
            Some(token) => VertexToken::Static(token),
            None => VertexToken::ApplicationDefault(OnceCell::new()),
        }
    }

    /// A token valid for at least the next request.
    pub async fn bearer(&self) -> Result<String, InferenceError> {
        match self {
            VertexToken::Static(token) => Ok(token.clone()),
            VertexToken::ApplicationDefault(provider) => {
                let provider = provider.get_or_try_init(gcp_auth::provider).await?;
                let token = provider.token(&[CLOUD_PLATFORM_SCOPE]).await?;
                Ok(token.as_str().to_string())
            }
        }
    }
}

/// Client for the Vertex AI `virtual-try-on-001` model.
pub struct VertexAiClient {
    http: Client,
    project_id: Option<String>,
    location: String,
    tokens: VertexToken,
}

#[derive(Debug, Deserialize)]
struct VertexPredictResponse {
    #[serde(default)]
    predictions: Vec<VertexPrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VertexPrediction {
    bytes_base64_encoded: Option<String>,
}

impl VertexAiClient {
    pub fn new(project_id: Option<String>, location: String, tokens: VertexToken) -> Self {
        Self {
            http: Client::new(),
            project_id,
            location,
            tokens,
        }
    }

    fn predict_url(&self, project_id: &str) -> String {
        format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}/publishers/google/models/virtual-try-on-001:predict",
            loc = self.location,
            project = project_id
        )
    }
}

#[async_trait]
impl InferenceProvider for VertexAiClient {
    async fn infer(
        &self,
        person_image: &[u8],
        garment_image: &[u8],
        _description: &str,
    ) -> Result<Vec<u8>, InferenceError> {
        let project_id = self
            .project_id
            .as_deref()
            .ok_or(InferenceError::MissingCredentials("GCP_PROJECT_ID"))?;
        let access_token = self.tokens.bearer().await?;

        let engine = base64::engine::general_purpose::STANDARD;
        let request_body = serde_json::json!({
            "instances": [{
                "personImage": {
                    "image": { "bytesBase64Encoded": engine.encode(person_image) }
                },
                "productImages": [{
                    "image": { "bytesBase64Encoded": engine.encode(garment_image) }
                }]
            }],
            "parameters": { "sampleCount": 1 }
        });

        let url = self.predict_url(project_id);
        tracing::debug!(url = %url, "Calling Vertex AI");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&access_token)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        decode_vertex_response(&body)
    }

    fn name(&self) -> &'static str {
        "vertex"
    }
}

/// Extract the first generated image from a Vertex predict response body.
pub fn decode_vertex_response(body: &str) -> Result<Vec<u8>, InferenceError> {
    let parsed: VertexPredictResponse = serde_json::from_str(body)?;
    let encoded = parsed
        .predictions
        .into_iter()
        .next()
        .and_then(|p| p.bytes_base64_encoded)
        .filter(|b| !b.is_empty())
        .ok_or(InferenceError::EmptyResult)?;

    decode_image_payload(&encoded)
}

/// Client for a self-hosted or hosted try-on endpoint.
///
/// Request: `{"person_image", "garment_image", "description"}` with base64
/// images. Response: `{"images": [<base64>, ...]}`; the first image is used.
pub struct RemoteInferenceClient {
    http: Client,
    endpoint: String,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    #[serde(default)]
    images: Vec<String>,
}

impl RemoteInferenceClient {
    pub fn new(endpoint: String, api_token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            api_token,
        }
    }
}

#[async_trait]
impl InferenceProvider for RemoteInferenceClient {
    async fn infer(
        &self,
        person_image: &[u8],
        garment_image: &[u8],
        description: &str,
    ) -> Result<Vec<u8>, InferenceError> {
        let engine = base64::engine::general_purpose::STANDARD;
        let request_body = serde_json::json!({
            "person_image": engine.encode(person_image),
            "garment_image": engine.encode(garment_image),
            "description": description,
        });

        let mut request = self.http.post(&self.endpoint).json(&request_body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        decode_remote_response(&body)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

pub fn decode_remote_response(body: &str) -> Result<Vec<u8>, InferenceError> {
    let parsed: RemoteResponse = serde_json::from_str(body)?;
    let encoded = parsed
        .images
        .into_iter()
        .find(|image| !image.is_empty())
        .ok_or(InferenceError::EmptyResult)?;

    decode_image_payload(&encoded)
}

fn decode_image_payload(encoded: &str) -> Result<Vec<u8>, InferenceError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| InferenceError::Malformed(e.to_string()))?;
    if bytes.is_empty() {
        return Err(InferenceError::EmptyResult);
    }
    Ok(bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse provider response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Provider returned no output image")]
    EmptyResult,

    #[error("Provider returned malformed image data: {0}")]
    Malformed(String),

    #[error("Missing credentials: {0} is not configured")]
    MissingCredentials(&'static str),

    #[error("Failed to obtain Google access token: {0}")]
    Auth(#[from] gcp_auth::Error),

    #[error("Inference timed out after {0}s")]
    Timeout(u64),

    #[error("Inference configuration error: {0}")]
    Config(String),
}
