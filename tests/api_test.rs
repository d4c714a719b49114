//! HTTP surface, driven through the router without a socket.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine;
use common::*;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use tryon_relay::app_state::AppState;
use tryon_relay::auth::{AuthSettings, Claims, GUEST_PRINCIPAL};
use tryon_relay::db::{MemoryStore, OwnerStore};
use tryon_relay::routes;
use tryon_relay::services::orchestrator::Orchestrator;
use tryon_relay::services::storage::BlobKind;

const SECRET: &str = "test-session-secret";

fn token_for(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn app(harness: &Harness, require_auth: bool) -> Router {
    routes::router(
        harness.app_state(AuthSettings::new(Some(SECRET), require_auth)),
        None,
    )
}

fn tryon_body() -> Value {
    json!({
        "productId": "prod-42",
        "variantId": "var-7",
        "shop": "demo.myshop.test",
        "garmentImageUrl": GARMENT_URL,
        "personImageUrl": PERSON_URL,
        "description": "linen shirt"
    })
}

fn post_json(uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn poll_until_terminal(app: &Router, id: &str) -> Value {
    for _ in 0..500 {
        let (status, body) = send(app, get(&format!("/tryon-status/{id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != "processing" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish");
}

#[tokio::test]
async fn test_banner_and_health() {
    let harness = Harness::new(InferenceScript::Succeed);
    let app = app(&harness, false);

    let response = app.clone().oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&text[..], b"TryOn relay is running!");

    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["job_store"]["status"], "ok");
    assert!(body["checks"].get("redis").is_none());
}

#[tokio::test]
async fn test_submit_then_poll_until_done() {
    let harness = Harness::new(InferenceScript::Succeed);
    let app = app(&harness, false);

    let (status, body) = send(&app, post_json("/tryon", &tryon_body(), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "processing");
    let id = body["id"].as_str().unwrap().to_string();

    let done = poll_until_terminal(&app, &id).await;
    assert_eq!(done["status"], "done");
    assert_eq!(done["id"], id.as_str());
    assert!(done["resultImageUrl"]
        .as_str()
        .unwrap()
        .starts_with("https://"));
    assert!(done.get("error").is_none());
}

#[tokio::test]
async fn test_failed_job_reports_error_without_result() {
    let harness = Harness::new(InferenceScript::Empty);
    let app = app(&harness, false);

    let (_, body) = send(&app, post_json("/tryon", &tryon_body(), None)).await;
    let id = body["id"].as_str().unwrap().to_string();

    let failed = poll_until_terminal(&app, &id).await;
    assert_eq!(failed["status"], "failed");
    assert!(failed.get("resultImageUrl").is_none());
    assert!(failed["error"].as_str().unwrap().contains("no output image"));
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let harness = Harness::new(InferenceScript::Succeed);
    let app = app(&harness, false);

    let (status, body) = send(
        &app,
        get(&format!("/tryon-status/{}", uuid::Uuid::new_v4()), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    // Ids that are not UUIDs are unknown jobs too, with the same envelope.
    let (status, body) = send(&app, get("/tryon-status/abc", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_required_auth_rejects_anonymous_and_bad_tokens() {
    let harness = Harness::new(InferenceScript::Succeed);
    let app = app(&harness, true);

    let (status, body) = send(&app, post_json("/tryon", &tryon_body(), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, post_json("/tryon", &tryon_body(), Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        post_json("/tryon", &tryon_body(), Some(&token_for("user-1"))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_validation_errors_are_400() {
    let harness = Harness::new(InferenceScript::Succeed);
    let app = app(&harness, false);

    let mut body = tryon_body();
    body["productId"] = json!("");
    let (status, response) = send(&app, post_json("/tryon", &body, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "VALIDATION_ERROR");

    let mut body = tryon_body();
    body["personImage"] = json!("data:image/png;base64,@@@not-base64@@@");
    let (status, _) = send(&app, post_json("/tryon", &body, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unreadable_bodies_use_error_envelope() {
    let harness = Harness::new(InferenceScript::Succeed);
    let app = app(&harness, false);

    let mut body = tryon_body();
    body.as_object_mut().unwrap().remove("productId");
    let (status, response) = send(&app, post_json("/tryon", &body, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "VALIDATION_ERROR");
    assert!(response["error"].as_str().unwrap().contains("productId"));

    let request = Request::builder()
        .method("POST")
        .uri("/tryon")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, response) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "VALIDATION_ERROR");

    let (status, response) = send(&app, post_json("/uploads", &json!({}), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_store_failure_is_500() {
    let jobs = Arc::new(FlakyJobStore::new());
    jobs.fail_create.store(true, Ordering::SeqCst);
    let harness = Harness::with_store(
        jobs,
        Arc::new(MemoryStore::new()),
        InferenceScript::Succeed,
        Duration::from_secs(5),
    );
    let app = app(&harness, false);

    let (status, body) = send(&app, post_json("/tryon", &tryon_body(), None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INTERNAL_ERROR");

    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_scheduling_failure_is_503() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(RecordingBlobStore::new());
    let state = AppState::new(
        store.clone(),
        store.clone(),
        blobs,
        Orchestrator::new(store.clone(), Arc::new(RejectingDispatcher)),
        None,
        AuthSettings::new(None, false),
    );
    let app = routes::router(state, None);

    let (status, body) = send(&app, post_json("/tryon", &tryon_body(), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "UNAVAILABLE");
    assert_eq!(store.job_count(), 1);
}

#[tokio::test]
async fn test_concurrent_submissions_from_one_owner() {
    let harness = Harness::new(InferenceScript::Succeed);
    let app = app(&harness, false);
    let token = token_for("shopper-9");

    let (first, second) = futures::join!(
        send(&app, post_json("/tryon", &tryon_body(), Some(&token))),
        send(&app, post_json("/tryon", &tryon_body(), Some(&token))),
    );
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    let first_id = first.1["id"].as_str().unwrap().to_string();
    let second_id = second.1["id"].as_str().unwrap().to_string();
    assert_ne!(first_id, second_id);

    for id in [&first_id, &second_id] {
        assert_eq!(poll_until_terminal(&app, id).await["status"], "done");
    }

    let (status, history) = send(&app, get("/tryons", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["ownerId"], "shopper-9");
    assert_eq!(history["personImages"], json!([PERSON_URL]));
    let ids: Vec<&str> = history["tryOns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first_id.as_str()));
    assert!(ids.contains(&second_id.as_str()));

    // The owner record indexes both jobs as well.
    let owner = harness
        .owners
        .get_owner("shopper-9")
        .await
        .unwrap()
        .expect("owner record");
    let owned: Vec<String> = owner.job_ids.iter().map(|id| id.to_string()).collect();
    assert_eq!(owned.len(), 2);
    assert!(owned.contains(&first_id));
    assert!(owned.contains(&second_id));
    assert_eq!(owner.person_images, vec![PERSON_URL.to_string()]);

    // Other principals see nothing of it.
    let (_, other_history) = send(&app, get("/tryons", Some(&token_for("shopper-10")))).await;
    assert_eq!(other_history["tryOns"], json!([]));
    assert_eq!(other_history["personImages"], json!([]));
}

#[tokio::test]
async fn test_guests_have_no_history() {
    let harness = Harness::new(InferenceScript::Succeed);
    let app = app(&harness, false);

    let mut body = tryon_body();
    body["personImageUrl"] = json!("https://private.test/alice-selfie.jpg");
    let (status, _) = send(&app, post_json("/tryon", &body, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, response) = send(&app, get("/tryons", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["code"], "UNAUTHORIZED");
    assert!(response.get("personImages").is_none());

    assert!(harness
        .owners
        .get_owner(GUEST_PRINCIPAL)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_inline_person_image_is_uploaded_first() {
    let harness = Harness::new(InferenceScript::Succeed);
    let app = app(&harness, false);

    let encoded = base64::engine::general_purpose::STANDARD.encode(sample_png());
    let mut body = tryon_body();
    body.as_object_mut().unwrap().remove("personImageUrl");
    body["personImage"] = json!(format!("data:image/png;base64,{encoded}"));

    let token = token_for("shopper-3");
    let (status, response) = send(&app, post_json("/tryon", &body, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    let uploads: Vec<StoredBlob> = harness
        .blobs
        .puts()
        .into_iter()
        .filter(|b| b.kind == BlobKind::Upload)
        .collect();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].content_type, "image/png");
    assert!(uploads[0].name.ends_with(".png"));

    let uploaded_url = format!("https://blobs.test/uploads/{}", uploads[0].name);
    let (_, history) = send(&app, get("/tryons", Some(&token))).await;
    assert_eq!(history["personImages"], json!([uploaded_url]));
    assert_eq!(history["tryOns"][0]["inputImageUrl"], uploaded_url.as_str());

    // The pipeline reads the stored copy, never the inline payload.
    let id = response["id"].as_str().unwrap();
    let _ = poll_until_terminal(&app, id).await;
    assert!(harness.fetcher.calls().contains(&uploaded_url));
}

#[tokio::test]
async fn test_presigned_upload() {
    let harness = Harness::new(InferenceScript::Succeed);
    let app = app(&harness, false);

    let (status, body) = send(
        &app,
        post_json("/uploads", &json!({ "fileName": "me.jpg" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["uploadUrl"].as_str().unwrap().contains("X-Amz-Signature"));
    assert_eq!(body["key"], "uploads/1_me.jpg");
    assert_eq!(body["expiresIn"], 3600);

    let (status, _) = send(&app, post_json("/uploads", &json!({ "fileName": "" }), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
