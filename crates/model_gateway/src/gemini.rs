//! Gemini REST provider.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::{ExposeSecret, Secret};
use serde_json::{json, Value};

use fixit_core::config::ProviderConfig;
use fixit_core::{ContentPart, Error, InferenceProvider, InferenceRequest, ProviderError, ResponseShape, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// `generateContent` client for Gemini models.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: Option<Secret<String>>,
}

impl GeminiProvider {
    /// Build from configuration. A missing API key is reported on each
    /// call rather than at startup.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        if cfg.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set, provider calls will fail");
        }

        Ok(Self {
            http,
            api_base: cfg.api_base.trim().trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim();
        let path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        format!("{}/{}:generateContent", self.api_base, path)
    }

    /// Request body for `generateContent`.
    pub fn build_body(request: &InferenceRequest) -> Value {
        let parts: Vec<Value> = request
            .parts()
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => json!({ "text": text }),
                ContentPart::Image(image) => json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": BASE64.encode(&image.data),
                    }
                }),
            })
            .collect();

        let mut generation_config = json!({
            "temperature": request.temperature(),
            "maxOutputTokens": request.max_output_tokens(),
        });
        if request.shape() == ResponseShape::Json {
            generation_config["responseMimeType"] = json!("application/json");
        }

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        })
    }

    /// Concatenated text of the first candidate.
    pub fn extract_text(payload: &Value) -> std::result::Result<String, ProviderError> {
        let parts = payload
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect();

        if text.trim().is_empty() {
            let reason = payload
                .pointer("/promptFeedback/blockReason")
                .or_else(|| payload.pointer("/candidates/0/finishReason"))
                .and_then(Value::as_str)
                .unwrap_or("no candidates");
            return Err(ProviderError::new(format!("Gemini returned no text ({})", reason)));
        }
        Ok(text)
    }
}

#[async_trait]
impl InferenceProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &InferenceRequest) -> std::result::Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_ref() else {
            return Err(ProviderError::http(401, "GEMINI_API_KEY not configured"));
        };

        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key.expose_secret().as_str())
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| {
                let timed_out = e.is_timeout();
                let e = e.without_url();
                if timed_out {
                    ProviderError::timeout(format!("Gemini request timeout: {}", e))
                } else {
                    ProviderError::new(format!("Gemini request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http(status.as_u16(), format!("{}: {}", status, body)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::new(format!("Gemini response decode failed: {}", e)))?;

        Self::extract_text(&payload)
    }
}
