#![deny(unused)]
//! FixIt - visual device troubleshooting API.
//!
//! Accepts a device photo and a question, runs the five-gate pipeline over a
//! rate-limited Gemini gateway and returns a scenario-shaped answer with a
//! spoken script.

use std::sync::Arc;

use fixit_core::config::AppConfig;
use fixit_core::ManualRetriever;
use fixit_gateway::{AppState, GatewayServer, ImageProcessor};
use fixit_governance::AdminGuard;
use fixit_model_gateway::{GeminiProvider, InferenceGateway};
use fixit_pipeline::{GatePipeline, InMemoryManualIndex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    fixit_governance::configure_tracing(config.telemetry.json_logs)?;

    tracing::info!("Starting FixIt v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Inference Gateway
    // =========================================================================
    let provider = Arc::new(GeminiProvider::from_config(&config.provider)?);
    let gateway = Arc::new(InferenceGateway::new(provider, &config.gateway));

    tracing::info!(
        model = %config.provider.model,
        max_calls_per_minute = config.gateway.max_calls_per_minute,
        daily_quota_units = config.gateway.daily_quota_units,
        cache_ttl_secs = config.gateway.cache_ttl_secs,
        "Inference gateway initialized"
    );

    // =========================================================================
    // Manual Index
    // =========================================================================
    let index = InMemoryManualIndex::new();
    let chunks = match index.load_dir(&config.pipeline.manuals_dir).await {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load manuals, continuing without them");
            0
        }
    };
    tracing::info!(dir = %config.pipeline.manuals_dir, chunks, "Manual index loaded");
    let retriever: Arc<dyn ManualRetriever> = Arc::new(index);

    // =========================================================================
    // Pipeline & Server
    // =========================================================================
    let state = AppState {
        pipeline: GatePipeline::new(gateway, retriever, &config.pipeline),
        images: ImageProcessor::from(&config.pipeline),
        admin: AdminGuard::new(config.admin.admin_key.clone()),
    };

    let mut server = GatewayServer::new(config.server.clone(), state);

    if config.telemetry.enable_metrics {
        let handle = fixit_governance::setup_metrics_recorder()?;
        server = server.with_metrics(handle);
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Endpoints: GET /health, POST /api/troubleshoot, GET /api/quota-status, POST /api/reset-quota"
    );

    server.run().await?;

    Ok(())
}
