use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// =============================================================================
// Inference Request Types
// =============================================================================

/// Image attached to an inference request.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePart {
    /// MIME type of the encoded bytes.
    pub mime_type: String,
    /// Encoded image bytes.
    pub data: Bytes,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImagePart {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>, width: u32, height: u32) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
            width,
            height,
        }
    }
}

/// One ordered content part of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Image(ImagePart),
}

/// Shape the caller expects back from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// A single JSON object.
    Json,
    /// Free text, returned as `{"text": ...}`.
    Text,
}

/// Immutable request sent through the inference gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    parts: Vec<ContentPart>,
    shape: ResponseShape,
    temperature: f32,
    max_output_tokens: u32,
}

/// Canonical form hashed for cache identity. Images contribute only their
/// dimensions.
#[derive(Serialize)]
struct CanonicalRequest<'a> {
    parts: Vec<CanonicalPart<'a>>,
    shape: ResponseShape,
    temperature: String,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CanonicalPart<'a> {
    Text { text: &'a str },
    Image { width: u32, height: u32 },
}

impl InferenceRequest {
    /// Start building a request.
    pub fn builder() -> InferenceRequestBuilder {
        InferenceRequestBuilder::default()
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    pub fn shape(&self) -> ResponseShape {
        self.shape
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    /// Whether an image part is attached.
    pub fn has_image(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, ContentPart::Image(_)))
    }

    /// Concatenated text parts, in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Deterministic SHA-256 hex digest over the canonical form.
    pub fn cache_key(&self) -> String {
        let canonical = CanonicalRequest {
            parts: self
                .parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text(text) => CanonicalPart::Text { text },
                    ContentPart::Image(img) => CanonicalPart::Image {
                        width: img.width,
                        height: img.height,
                    },
                })
                .collect(),
            shape: self.shape,
            temperature: format!("{:.3}", self.temperature),
            max_output_tokens: self.max_output_tokens,
        };

        // Serializing plain structs with borrowed strings cannot fail.
        let encoded = serde_json::to_vec(&canonical).unwrap_or_default();
        format!("{:x}", Sha256::digest(&encoded))
    }
}

/// Builder for [`InferenceRequest`].
#[derive(Debug, Clone)]
pub struct InferenceRequestBuilder {
    parts: Vec<ContentPart>,
    shape: ResponseShape,
    temperature: f32,
    max_output_tokens: u32,
}

impl Default for InferenceRequestBuilder {
    fn default() -> Self {
        Self {
            parts: Vec::new(),
            shape: ResponseShape::Json,
            temperature: 0.2,
            max_output_tokens: 2000,
        }
    }
}

impl InferenceRequestBuilder {
    /// Append a text segment.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(ContentPart::Text(text.into()));
        self
    }

    /// Attach the image. A second call replaces the first image.
    pub fn image(mut self, image: ImagePart) -> Self {
        self.parts.retain(|p| !matches!(p, ContentPart::Image(_)));
        self.parts.push(ContentPart::Image(image));
        self
    }

    pub fn shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    pub fn build(self) -> InferenceRequest {
        InferenceRequest {
            parts: self.parts,
            shape: self.shape,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }
}
