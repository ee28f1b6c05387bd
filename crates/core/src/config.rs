use config::{Config, ConfigError, Environment, File};
use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub admin: AdminConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

/// Limits enforced by the inference gateway.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub max_calls_per_minute: usize,
    pub cache_ttl_secs: u64,
    pub daily_quota_units: u64,
    /// Billed units charged per admitted remote call.
    pub unit_cost_per_call: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: String,
    pub api_base: String,
    pub api_key: Option<Secret<String>>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub high_confidence: f64,
    pub medium_confidence: f64,
    pub localization_threshold: f64,
    pub manual_passages: usize,
    pub max_image_dimension: u32,
    pub min_image_dimension: u32,
    /// Directory of plain-text manuals indexed at startup.
    pub manuals_dir: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AdminConfig {
    pub admin_key: Option<Secret<String>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    pub enable_metrics: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("FIXIT_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map APP__GATEWAY__MAX_CALLS_PER_MINUTE=10 to gateway.max_calls_per_minute
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mut cfg: Self = s.try_deserialize()?;
        cfg.apply_legacy_env();
        Ok(cfg)
    }

    /// Honor the plain environment variables older deployments set.
    fn apply_legacy_env(&mut self) {
        if self.provider.api_key.is_none() {
            if let Ok(key) = std::env::var("GEMINI_API_KEY") {
                self.provider.api_key = Some(Secret::new(key));
            }
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL_NAME") {
            if !model.trim().is_empty() {
                self.provider.model = model;
            }
        }
        if self.admin.admin_key.is_none() {
            if let Ok(key) = std::env::var("ADMIN_KEY") {
                self.admin.admin_key = Some(Secret::new(key));
            }
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            enable_cors: true,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_calls_per_minute: 5,
            cache_ttl_secs: 300,
            daily_quota_units: 20,
            unit_cost_per_call: 1,
            max_retries: 1,
            retry_backoff_ms: 2000,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".into(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: None,
            request_timeout_secs: 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            high_confidence: 0.6,
            medium_confidence: 0.3,
            localization_threshold: 0.4,
            manual_passages: 3,
            max_image_dimension: 1024,
            min_image_dimension: 50,
            manuals_dir: "data/manuals".into(),
        }
    }
}
