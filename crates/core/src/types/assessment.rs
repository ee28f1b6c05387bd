//! Records produced by the inference provider and consumed by the pipeline.
//!
//! Providers are loose about types: fields go missing, arrays come back as
//! `null`. Every record deserializes leniently and falls back to defaults.

use serde::{Deserialize, Deserializer, Serialize};

use super::response::{AnswerType, BoundingBox, Explanation, TroubleshootingStep};

/// Device type the provider uses for images that show no device.
pub const NOT_A_DEVICE: &str = "not_a_device";

/// Device type used when nothing was identified.
pub const UNKNOWN_DEVICE: &str = "Unknown";

/// Treat `null` like a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Combined Analysis (Gates 1-3)
// =============================================================================

/// Output of the single combined validation/detection/intent call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinedAnalysis {
    #[serde(deserialize_with = "null_as_default")]
    pub validation: ValidationInfo,
    #[serde(deserialize_with = "null_as_default")]
    pub device: DeviceAssessment,
    #[serde(deserialize_with = "null_as_default")]
    pub query: QueryIntent,
    #[serde(deserialize_with = "null_as_default")]
    pub safety: SafetyAssessment,
}

/// Image category validity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub is_valid: bool,
    pub image_category: Option<String>,
    pub what_i_see: Option<String>,
    pub image_quality: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub multiple_devices: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub device_list: Vec<String>,
    pub rejection_reason: Option<String>,
    pub suggestion: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub supported_devices: Vec<String>,
}

/// What device the provider thinks it is looking at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceAssessment {
    pub device_type: Option<String>,
    pub device_category: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub brand_model_guidance: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub device_confidence: f64,
    /// Provider's own label. Routing uses the numeric score.
    pub confidence_level: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub components: Vec<String>,
    pub reasoning: Option<String>,
    pub what_i_see: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub clarifying_questions: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub suggestions: Vec<String>,
}

impl DeviceAssessment {
    /// Device type, `Unknown` when absent or blank.
    pub fn device_type(&self) -> &str {
        self.device_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNKNOWN_DEVICE)
    }

    /// Confidence clamped into `[0, 1]`; NaN reads as zero.
    pub fn confidence(&self) -> f64 {
        if self.device_confidence.is_nan() {
            0.0
        } else {
            self.device_confidence.clamp(0.0, 1.0)
        }
    }

    /// Explicitly flagged as not showing a device.
    pub fn is_not_a_device(&self) -> bool {
        self.device_type().eq_ignore_ascii_case(NOT_A_DEVICE)
    }

    /// A concrete device type was identified.
    pub fn is_recognized(&self) -> bool {
        let t = self.device_type();
        !t.eq_ignore_ascii_case(UNKNOWN_DEVICE) && !t.eq_ignore_ascii_case(NOT_A_DEVICE)
    }

    /// Brand if it was actually readable.
    pub fn visible_brand(&self) -> Option<&str> {
        self.brand
            .as_deref()
            .filter(|b| !matches!(b.trim().to_lowercase().as_str(), "" | "unknown" | "generic"))
    }

    /// Model if it was actually readable.
    pub fn visible_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .filter(|m| !matches!(m.trim().to_lowercase().as_str(), "" | "not visible" | "unknown"))
    }
}

/// Primary user intent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Identify,
    Locate,
    Explain,
    Troubleshoot,
    Procedure,
    Compare,
    #[default]
    #[serde(other)]
    Unclear,
}

/// What the user is asking for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryIntent {
    #[serde(deserialize_with = "null_as_default")]
    pub query_type: QueryType,
    #[serde(deserialize_with = "null_as_default")]
    pub answer_type: AnswerType,
    pub target_component: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub target_components: Vec<String>,
    pub action_requested: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub needs_localization: bool,
    pub needs_steps: Option<bool>,
    #[serde(deserialize_with = "null_as_default")]
    pub needs_explanation: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub clarification_needed: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub clarifying_questions: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub confidence: f64,
}

impl Default for QueryIntent {
    fn default() -> Self {
        Self {
            query_type: QueryType::Unclear,
            answer_type: AnswerType::default(),
            target_component: None,
            target_components: Vec::new(),
            action_requested: None,
            needs_localization: false,
            needs_steps: None,
            needs_explanation: false,
            clarification_needed: false,
            clarifying_questions: Vec::new(),
            confidence: 0.0,
        }
    }
}

impl QueryIntent {
    /// Explicit, non-blank target component.
    pub fn target(&self) -> Option<&str> {
        self.target_component
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("null"))
    }

    /// Steps are assumed wanted unless the provider said otherwise.
    pub fn wants_steps(&self) -> bool {
        self.needs_steps.unwrap_or(true)
    }
}

/// Safety-critical indicators found in the query or the image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyAssessment {
    #[serde(deserialize_with = "null_as_default")]
    pub safety_detected: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub safety_keywords_found: Vec<String>,
    pub safety_message: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub override_answer_type: bool,
}

// =============================================================================
// Localization (Gate 4)
// =============================================================================

/// Box on the provider's 0-1000 normalized scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizedBox {
    #[serde(deserialize_with = "null_as_default")]
    pub ymin: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub xmin: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub ymax: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub xmax: f64,
}

/// Raw localization answer as the provider returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSpatialResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub component_visible: bool,
    pub component_name: Option<String>,
    pub visibility_status: Option<String>,
    pub visibility_reason: Option<String>,
    pub spatial_description: Option<String>,
    pub bounding_box: Option<NormalizedBox>,
    #[serde(deserialize_with = "null_as_default")]
    pub confidence: f64,
    pub suggested_action: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub visible_alternatives: Vec<String>,
    pub typical_location: Option<String>,
}

/// Localization outcome after scaling to pixel space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialAssessment {
    pub component: String,
    pub component_visible: bool,
    pub visibility_reason: Option<String>,
    pub spatial_description: Option<String>,
    /// Present only when confidence cleared the localization threshold.
    pub bounding_box: Option<BoundingBox>,
    pub confidence: f64,
    pub visible_alternatives: Vec<String>,
    pub typical_location: Option<String>,
    pub suggested_action: Option<String>,
}

// =============================================================================
// Step Synthesis (Gate 5)
// =============================================================================

/// Step-synthesis output. Normalization guarantees `diagnosis`, `steps` and
/// `narration` are always present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepPlan {
    #[serde(alias = "issue_diagnosis", deserialize_with = "null_as_default")]
    pub diagnosis: String,
    #[serde(alias = "troubleshooting_steps", deserialize_with = "null_as_default")]
    pub steps: Vec<TroubleshootingStep>,
    /// Provider-written script. Kept for the record only; the spoken
    /// `audio_instructions` always come from the narrator.
    #[serde(alias = "audio_instructions", deserialize_with = "null_as_default")]
    pub narration: String,
    #[serde(deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
    pub when_to_seek_help: Option<String>,
    pub general_safety_tip: Option<String>,
    pub confidence_note: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub clarifying_questions: Vec<String>,
    #[serde(alias = "likely_causes", deserialize_with = "null_as_default")]
    pub possible_causes: Vec<String>,
    pub severity: Option<String>,
    #[serde(deserialize_with = "loose_explanation")]
    pub explanation: Option<Explanation>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseExplanation {
    Text(String),
    Detailed(Explanation),
}

/// Accept an explanation as plain text or as a structured record.
fn loose_explanation<'de, D>(deserializer: D) -> Result<Option<Explanation>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LooseExplanation>::deserialize(deserializer)? {
        Some(LooseExplanation::Text(overview)) if !overview.trim().is_empty() => Some(Explanation {
            overview,
            ..Default::default()
        }),
        Some(LooseExplanation::Detailed(explanation)) => Some(explanation),
        _ => None,
    })
}
