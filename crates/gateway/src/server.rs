//! Axum-based HTTP server.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Json, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use fixit_core::config::ServerConfig;
use fixit_core::{Error, Result, TroubleshootResponse};
use fixit_governance::{track_request, AdminGuard};
use fixit_model_gateway::QuotaStatus;
use fixit_pipeline::{GatePipeline, TroubleshootInput};

use crate::vision::ImageProcessor;

/// Base64 photos are far larger than axum's default body limit.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Shared application state.
pub struct AppState {
    pub pipeline: GatePipeline,
    pub images: ImageProcessor,
    pub admin: AdminGuard,
}

/// HTTP server.
pub struct GatewayServer {
    config: ServerConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
            metrics_handle: None,
        }
    }

    /// Expose `/metrics` from this recorder handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn build_router(&self) -> Router {
        build_router(self.state.clone(), self.metrics_handle.clone(), self.config.enable_cors)
    }

    /// Bind and serve until the process exits.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::config(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(addr = %addr, "FixIt API listening");

        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// Build the router over shared state.
pub fn build_router(state: Arc<AppState>, metrics: Option<PrometheusHandle>, enable_cors: bool) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/troubleshoot", post(troubleshoot_handler))
        .route("/api/quota-status", get(quota_status_handler))
        .route("/api/reset-quota", post(reset_quota_handler))
        .with_state(state);

    if let Some(handle) = metrics {
        router = router.route("/metrics", get(move || async move { handle.render() }));
    }

    router = router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(track_metrics));

    if enable_cors {
        router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }

    router.layer(TraceLayer::new_for_http())
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TroubleshootRequest {
    /// Base64 image, optionally a data URL.
    pub image_base64: String,
    pub query: String,
    pub device_hint: Option<String>,
    /// Display dimensions the caller wants boxes in.
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ResetQuotaRequest {
    pub admin_key: String,
    /// Also zero the daily unit counter.
    #[serde(default)]
    pub reset_daily_usage: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetQuotaResponse {
    pub message: String,
    pub status: QuotaStatus,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pipeline: String,
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidImage(_) | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Unauthorized => StatusCode::FORBIDDEN,
            Error::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pipeline: "gate-based".to_string(),
    })
}

async fn troubleshoot_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TroubleshootRequest>,
) -> std::result::Result<Json<TroubleshootResponse>, ApiError> {
    let trace_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("troubleshoot", trace_id = %trace_id);

    let response = troubleshoot(&state, payload).instrument(span).await?;
    Ok(Json(response))
}

async fn troubleshoot(state: &AppState, payload: TroubleshootRequest) -> Result<TroubleshootResponse> {
    if payload.query.trim().is_empty() {
        return Err(Error::invalid_request("query must not be empty"));
    }

    let images = state.images.clone();
    let encoded = payload.image_base64;
    let image = tokio::task::spawn_blocking(move || images.process(&encoded))
        .await
        .map_err(|e| Error::internal(format!("Image task failed: {}", e)))??;

    let mut input = TroubleshootInput::new(image, payload.query);
    if let Some(hint) = payload.device_hint.filter(|h| !h.trim().is_empty()) {
        input = input.with_device_hint(hint);
    }
    if let (Some(width), Some(height)) = (payload.image_width, payload.image_height) {
        if width > 0 && height > 0 {
            input = input.with_dimensions(width, height);
        }
    }

    state.pipeline.run(&input).await
}

async fn quota_status_handler(State(state): State<Arc<AppState>>) -> Json<QuotaStatus> {
    Json(state.pipeline.gateway().status())
}

async fn reset_quota_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetQuotaRequest>,
) -> std::result::Result<Json<ResetQuotaResponse>, ApiError> {
    state.admin.verify(&payload.admin_key)?;

    let gateway = state.pipeline.gateway();
    gateway.reset_circuit();
    let message = if payload.reset_daily_usage {
        gateway.reset_daily_usage();
        "Circuit breaker and daily usage reset"
    } else {
        "Circuit breaker reset"
    };

    Ok(Json(ResetQuotaResponse {
        message: message.to_string(),
        status: gateway.status(),
    }))
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    track_request(&method, &path, response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Error::invalid_image("bad"), StatusCode::BAD_REQUEST),
            (Error::RateLimited { limit: 5 }, StatusCode::TOO_MANY_REQUESTS),
            (Error::Unauthorized, StatusCode::FORBIDDEN),
            (Error::provider_unavailable("down"), StatusCode::SERVICE_UNAVAILABLE),
            (Error::malformed_output("junk"), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }
}
