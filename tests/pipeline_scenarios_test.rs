use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use secrecy::Secret;
use serde_json::{json, Value};
use tower::ServiceExt;

use fixit_core::mocks::{ScriptedProvider, StaticRetriever};
use fixit_core::{Error, ImagePart, ProviderError, ResponseScenario};
use fixit_gateway::{build_router, AppState, ImageProcessor};
use fixit_governance::AdminGuard;
use fixit_model_gateway::{GatewayLimits, InferenceGateway, RetryPolicy};
use fixit_pipeline::{GatePipeline, InMemoryManualIndex, PipelinePolicy, TroubleshootInput};

fn no_backoff() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        backoff: Duration::ZERO,
    }
}

fn pipeline(provider: Arc<ScriptedProvider>, limits: GatewayLimits) -> GatePipeline {
    let gateway = Arc::new(InferenceGateway::with_limits(provider, limits, no_backoff()));
    GatePipeline::with_policy(
        gateway,
        Arc::new(StaticRetriever::new(Vec::new())),
        PipelinePolicy::default(),
    )
}

fn input(query: &str) -> TroubleshootInput {
    TroubleshootInput::new(ImagePart::new("image/png", vec![7u8; 64], 800, 600), query)
}

fn low_confidence() -> Value {
    json!({
        "validation": {"is_valid": true},
        "device": {"device_type": "Printer", "device_confidence": 0.1},
        "query": {"query_type": "troubleshoot"}
    })
}

fn locate_analysis(target: &str) -> Value {
    json!({
        "validation": {"is_valid": true},
        "device": {"device_type": "Router", "device_confidence": 0.85, "components": [target]},
        "query": {
            "query_type": "locate",
            "target_component": target,
            "needs_localization": true,
            "needs_steps": false
        }
    })
}

fn visible(description: &str) -> Value {
    json!({
        "component_visible": true,
        "spatial_description": description,
        "bounding_box": {"ymin": 100, "xmin": 100, "ymax": 300, "xmax": 300},
        "confidence": 0.9
    })
}

#[tokio::test(start_paused = true)]
async fn test_cache_makes_repeat_requests_free_until_ttl() {
    let provider = Arc::new(ScriptedProvider::json(vec![low_confidence(), low_confidence()]));
    let pipeline = pipeline(provider.clone(), GatewayLimits::default());

    let first = pipeline.run(&input("printer jams")).await.unwrap();
    let second = pipeline.run(&input("printer jams")).await.unwrap();
    assert_eq!(serde_json::to_value(&first).unwrap(), serde_json::to_value(&second).unwrap());
    assert_eq!(provider.call_count(), 1);

    tokio::time::advance(Duration::from_secs(301)).await;

    pipeline.run(&input("printer jams")).await.unwrap();
    assert_eq!(provider.call_count(), 2);
    assert_eq!(pipeline.gateway().status().daily_units_consumed, 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_rejects_then_recovers() {
    let provider = Arc::new(ScriptedProvider::json(vec![
        locate_analysis("antenna"),
        visible("on the top left"),
        low_confidence(),
    ]));
    let pipeline = pipeline(provider.clone(), GatewayLimits::default().with_max_calls_per_minute(2));

    let located = pipeline.run(&input("where is the antenna")).await.unwrap();
    assert_eq!(located.status, ResponseScenario::Success);
    assert_eq!(provider.call_count(), 2);

    let err = pipeline.run(&input("why does it jam")).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited { limit: 2 }));
    assert!(err.is_retryable());
    // Rejected calls consume nothing.
    assert_eq!(provider.call_count(), 2);
    assert_eq!(pipeline.gateway().status().daily_units_consumed, 2);

    tokio::time::advance(Duration::from_secs(61)).await;

    let retried = pipeline.run(&input("why does it jam")).await.unwrap();
    assert_eq!(retried.status, ResponseScenario::LowConfidence);
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_circuit_breaker_short_circuits_until_reset() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::http(429, "429 Too Many Requests: quota exceeded")),
        Ok(low_confidence().to_string()),
    ]));
    let pipeline = pipeline(provider.clone(), GatewayLimits::default());

    let tripped = pipeline.run(&input("help")).await.unwrap();
    assert_eq!(tripped.status, ResponseScenario::Error);
    assert_eq!(provider.call_count(), 1);

    for query in ["still broken", "anything?"] {
        let resp = pipeline.run(&input(query)).await.unwrap();
        assert_eq!(resp.status, ResponseScenario::Error);
        assert!(resp.retry_after.is_some());
    }
    assert_eq!(provider.call_count(), 1);
    assert!(pipeline.gateway().status().circuit_breaker_active);

    assert!(pipeline.gateway().reset_circuit());
    let resp = pipeline.run(&input("help again")).await.unwrap();
    assert_eq!(resp.status, ResponseScenario::LowConfidence);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn test_manual_passages_reach_step_synthesis() {
    let index = InMemoryManualIndex::new();
    index.add(
        "router_0",
        "To restore the router, hold the reset button for ten seconds until the lights blink.",
        Some("Router"),
    );

    let provider = Arc::new(ScriptedProvider::json(vec![
        json!({
            "validation": {"is_valid": true},
            "device": {"device_type": "Router", "device_confidence": 0.9},
            "query": {"query_type": "troubleshoot", "action_requested": "reset", "needs_steps": true}
        }),
        json!({"issue_diagnosis": "Needs a reset", "troubleshooting_steps": [{"instruction": "Hold reset"}]}),
    ]));
    let gateway = Arc::new(InferenceGateway::with_limits(
        provider.clone(),
        GatewayLimits::default(),
        no_backoff(),
    ));
    let pipeline = GatePipeline::with_policy(gateway, Arc::new(index), PipelinePolicy::default());

    let resp = pipeline.run(&input("how do I reset the router")).await.unwrap();

    assert_eq!(resp.status, ResponseScenario::Success);
    assert!(provider.requests()[1].text().contains("hold the reset button for ten seconds"));
}

#[tokio::test]
async fn test_http_end_to_end_success() {
    let provider = Arc::new(ScriptedProvider::json(vec![
        json!({
            "validation": {"is_valid": true, "what_i_see": "A white inkjet printer"},
            "device": {
                "device_type": "Printer",
                "brand": "Canon",
                "device_confidence": 0.92,
                "components": ["paper tray", "control panel"]
            },
            "query": {
                "query_type": "troubleshoot",
                "target_component": "paper tray",
                "action_requested": "fix",
                "needs_localization": true,
                "needs_steps": true
            }
        }),
        json!({
            "component_visible": true,
            "spatial_description": "at the bottom front",
            "bounding_box": {"ymin": 700, "xmin": 200, "ymax": 950, "xmax": 800},
            "confidence": 0.8
        }),
        json!({
            "issue_diagnosis": "Paper is jammed in the tray.",
            "troubleshooting_steps": [
                {"instruction": "Turn the printer off"},
                {"instruction": "Pull the paper tray out"},
                {"instruction": "Remove any crumpled sheets"}
            ]
        }),
    ]));
    let gateway = Arc::new(InferenceGateway::with_limits(
        provider.clone(),
        GatewayLimits::default(),
        no_backoff(),
    ));
    let state = AppState {
        pipeline: GatePipeline::with_policy(
            gateway,
            Arc::new(StaticRetriever::new(Vec::new())),
            PipelinePolicy::default(),
        ),
        images: ImageProcessor::default(),
        admin: AdminGuard::new(Some(Secret::new("key".to_string()))),
    };
    let app = build_router(Arc::new(state), None, true);

    let mut png = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(2000, 1000))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    let body = json!({
        "image_base64": format!("data:image/png;base64,{}", BASE64.encode(png)),
        "query": "how do I fix the paper jam in the tray",
        "device_hint": "printer"
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/troubleshoot")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let resp: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(resp["status"], "success");
    assert_eq!(resp["device_identified"], "Printer");
    assert_eq!(resp["brand"], "Canon");
    // Image was downscaled to 1024x512 before the box was scaled.
    assert_eq!(resp["bounding_box"]["x_min"], 204.0);
    assert_eq!(resp["bounding_box"]["y_max"], 486.0);
    let steps = resp["troubleshooting_steps"].as_array().unwrap();
    let numbers: Vec<u64> = steps.iter().map(|s| s["step_number"].as_u64().unwrap()).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(resp["query_understood"]["type"], "troubleshoot");
    assert!(resp["audio_instructions"].as_str().unwrap().contains("Step 1: Turn the printer off"));

    // Device hint reached the combined analysis prompt.
    assert!(provider.requests()[0].text().contains("printer"));
}
