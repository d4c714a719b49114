//! Test helper utilities for E2E testing

use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

use tryon_relay::models::job::JobStatus;
use tryon_relay::models::tryon::{TryOnResponse, TryOnStatusResponse};

/// Public images the running service can fetch.
pub const PERSON_IMAGE_URL: &str = "https://placehold.co/768x1024.png";
pub const GARMENT_IMAGE_URL: &str = "https://placehold.co/600x800.png";

/// Submit a try-on to POST /tryon
pub async fn submit_tryon(
    client: &reqwest::Client,
    base_url: &str,
    person_image_url: Option<&str>,
    token: Option<&str>,
) -> Result<TryOnResponse, Box<dyn std::error::Error>> {
    let mut body = json!({
        "productId": "e2e-product",
        "shop": "e2e.myshop.test",
        "garmentImageUrl": GARMENT_IMAGE_URL,
        "description": "plain t-shirt"
    });
    if let Some(url) = person_image_url {
        body["personImageUrl"] = json!(url);
    }

    let mut request = client.post(format!("{}/tryon", base_url)).json(&body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Submit failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<TryOnResponse>().await?)
}

/// Poll job status until done or failed (with timeout)
pub async fn poll_job_status(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &str,
    timeout_secs: u64,
) -> Result<TryOnStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{}/tryon-status/{}", base_url, job_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let status_response = response.json::<TryOnStatusResponse>().await?;
        if status_response.status.is_terminal() {
            return Ok(status_response);
        }

        if attempt % 10 == 0 {
            println!("  waiting on {} ({})", job_id, status_response.status);
        }
        sleep(Duration::from_millis(500)).await;
    }

    Err(format!("Job {} did not finish within {}s", job_id, timeout_secs).into())
}

/// Inference can take a while on a cold provider.
pub async fn wait_for_job_completion(
    client: &reqwest::Client,
    base_url: &str,
    job_id: &str,
) -> Result<TryOnStatusResponse, Box<dyn std::error::Error>> {
    poll_job_status(client, base_url, job_id, 180).await
}

pub fn assert_done(status: &TryOnStatusResponse) {
    assert_eq!(
        status.status,
        JobStatus::Done,
        "job failed: {:?}",
        status.error
    );
    let url = status
        .result_image_url
        .as_deref()
        .expect("done job without result URL");
    assert!(url.starts_with("http"), "unexpected result URL: {url}");
}
