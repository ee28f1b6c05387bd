use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use secrecy::Secret;
use serde_json::{json, Value};
use tower::ServiceExt;

use fixit_core::mocks::{ScriptedProvider, StaticRetriever};
use fixit_core::ProviderError;
use fixit_gateway::{build_router, AppState, ImageProcessor};
use fixit_governance::AdminGuard;
use fixit_model_gateway::{GatewayLimits, InferenceGateway, RetryPolicy};
use fixit_pipeline::{GatePipeline, PipelinePolicy};

const ADMIN_KEY: &str = "test-admin-key";

fn app_with(provider: Arc<ScriptedProvider>, limits: GatewayLimits) -> Router {
    let policy = RetryPolicy {
        max_retries: 1,
        backoff: Duration::ZERO,
    };
    let gateway = Arc::new(InferenceGateway::with_limits(provider, limits, policy));
    let pipeline = GatePipeline::with_policy(
        gateway,
        Arc::new(StaticRetriever::new(Vec::new())),
        PipelinePolicy::default(),
    );
    let state = AppState {
        pipeline,
        images: ImageProcessor::default(),
        admin: AdminGuard::new(Some(Secret::new(ADMIN_KEY.to_string()))),
    };
    build_router(Arc::new(state), None, true)
}

fn app(provider: Arc<ScriptedProvider>) -> Router {
    app_with(provider, GatewayLimits::default().with_max_calls_per_minute(50))
}

fn png_base64(width: u32, height: u32) -> String {
    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
    BASE64.encode(buf)
}

fn low_confidence_analysis() -> Value {
    json!({
        "validation": {"is_valid": true},
        "device": {"device_type": "Router", "device_confidence": 0.2},
        "query": {"query_type": "troubleshoot"}
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn troubleshoot(query: &str) -> Request<Body> {
    post_json(
        "/api/troubleshoot",
        json!({"image_base64": png_base64(120, 80), "query": query}),
    )
}

#[tokio::test]
async fn test_health() {
    let response = app(Arc::new(ScriptedProvider::new(Vec::new())))
        .oneshot(get("/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["pipeline"], "gate-based");
}

#[tokio::test]
async fn test_troubleshoot_returns_scenario_payload() {
    let provider = Arc::new(ScriptedProvider::json(vec![low_confidence_analysis()]));
    let response = app(provider.clone()).oneshot(troubleshoot("wifi drops")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "low_confidence");
    assert_eq!(body["device_identified"], "Router");
    assert!(!body["clarifying_questions"].as_array().unwrap().is_empty());
    assert!(!body["audio_instructions"].as_str().unwrap().is_empty());

    // The provider saw the normalized PNG.
    let request = &provider.requests()[0];
    assert!(request.has_image());
}

#[tokio::test]
async fn test_invalid_image_is_bad_request() {
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let response = app(provider.clone())
        .oneshot(post_json(
            "/api/troubleshoot",
            json!({"image_base64": "definitely-not-an-image", "query": "help"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid image"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_tiny_image_is_bad_request() {
    let response = app(Arc::new(ScriptedProvider::new(Vec::new())))
        .oneshot(post_json(
            "/api/troubleshoot",
            json!({"image_base64": png_base64(20, 20), "query": "help"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_blank_query_is_bad_request() {
    let response = app(Arc::new(ScriptedProvider::new(Vec::new())))
        .oneshot(troubleshoot("   "))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rate_limit_is_429() {
    let provider = Arc::new(ScriptedProvider::json(vec![
        low_confidence_analysis(),
        low_confidence_analysis(),
    ]));
    let app = app_with(provider.clone(), GatewayLimits::default().with_max_calls_per_minute(1));

    let first = app.clone().oneshot(troubleshoot("first question")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(troubleshoot("second question")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(second).await;
    assert!(body["detail"].as_str().unwrap().contains("rate limit"));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_transient_failure_after_retry_is_503() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::http(503, "backend overloaded")),
        Err(ProviderError::http(503, "backend overloaded")),
    ]));
    let response = app(provider.clone()).oneshot(troubleshoot("help")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_malformed_output_is_500() {
    let provider = Arc::new(ScriptedProvider::constant("no json here"));
    let response = app(provider).oneshot(troubleshoot("help")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_quota_status_and_admin_reset() {
    let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::http(
        429,
        "RESOURCE_EXHAUSTED",
    ))]));
    let app = app(provider);

    // Trip the circuit.
    let response = app.clone().oneshot(troubleshoot("help")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "error");

    let status = body_json(app.clone().oneshot(get("/api/quota-status")).await.unwrap()).await;
    assert_eq!(status["circuit_breaker_active"], true);
    assert_eq!(status["status"], "disabled");
    assert_eq!(status["total_calls_this_session"], 1);

    let denied = app
        .clone()
        .oneshot(post_json("/api/reset-quota", json!({"admin_key": "guess"})))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let reset = app
        .clone()
        .oneshot(post_json(
            "/api/reset-quota",
            json!({"admin_key": ADMIN_KEY, "reset_daily_usage": true}),
        ))
        .await
        .unwrap();
    assert_eq!(reset.status(), StatusCode::OK);
    let body = body_json(reset).await;
    assert_eq!(body["status"]["circuit_breaker_active"], false);
    assert_eq!(body["status"]["daily_units_consumed"], 0);
}
