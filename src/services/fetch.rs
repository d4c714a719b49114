use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Fetches image bytes by URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Storefront CDNs hand out protocol-relative URLs (`//cdn.shopify.com/...`).
pub fn normalize_image_url(url: &str) -> String {
    let trimmed = url.trim();
    match trimmed.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => trimmed.to_string(),
    }
}

pub struct HttpImageFetcher {
    http: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Http)?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let url = normalize_image_url(url);
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(FetchError::InvalidUrl(url));
        }

        tracing::debug!(url = %url, "Downloading image");
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Not a fetchable image URL: {0}")]
    InvalidUrl(String),
}
