use serde::{Deserialize, Serialize};

use super::assessment::null_as_default;

// =============================================================================
// Scenario & Confidence
// =============================================================================

/// Terminal classification of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseScenario {
    Success,
    InvalidImage,
    LowConfidence,
    #[serde(rename = "component_not_located")]
    ComponentNotFound,
    NeedsClarification,
    Error,
}

impl ResponseScenario {
    /// Wire value of the `status` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::InvalidImage => "invalid_image",
            Self::LowConfidence => "low_confidence",
            Self::ComponentNotFound => "component_not_located",
            Self::NeedsClarification => "needs_clarification",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ResponseScenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confidence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Bucket a score: `< medium` is low, `< high` is medium, otherwise high.
    /// NaN is low.
    pub fn from_score(score: f64, medium: f64, high: f64) -> Self {
        if score.is_nan() || score < medium {
            Self::Low
        } else if score < high {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Content shape requested for narration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    LocateOnly,
    IdentifyOnly,
    ExplainOnly,
    #[default]
    TroubleshootSteps,
    DiagnoseOnly,
    Mixed,
    AskClarifyingQuestions,
    RejectInvalidImage,
    AskForBetterInput,
    SafetyWarningOnly,
    /// Any tag the provider invents.
    #[serde(other)]
    Unrecognized,
}

// =============================================================================
// Response Building Blocks
// =============================================================================

/// Pixel-space box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    /// Clamp every edge into `[0, width] x [0, height]` and keep min <= max.
    pub fn clamp(self, width: u32, height: u32) -> Self {
        let w = f64::from(width);
        let h = f64::from(height);
        let fix = |v: f64, hi: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, hi) };

        let (x_min, x_max) = (fix(self.x_min, w), fix(self.x_max, w));
        let (y_min, y_max) = (fix(self.y_min, h), fix(self.y_max, h));

        Self {
            x_min: x_min.min(x_max),
            y_min: y_min.min(y_max),
            x_max: x_min.max(x_max),
            y_max: y_min.max(y_max),
        }
    }
}

/// One ordered troubleshooting instruction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TroubleshootingStep {
    #[serde(deserialize_with = "null_as_default")]
    pub step_number: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub instruction: String,
    #[serde(deserialize_with = "null_as_default")]
    pub visual_cue: String,
    #[serde(deserialize_with = "null_as_default")]
    pub estimated_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caveat: Option<String>,
}

impl TroubleshootingStep {
    pub fn new(step_number: u32, instruction: impl Into<String>) -> Self {
        Self {
            step_number,
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn with_visual_cue(mut self, cue: impl Into<String>) -> Self {
        self.visual_cue = cue.into();
        self
    }

    pub fn with_estimated_time(mut self, time: impl Into<String>) -> Self {
        self.estimated_time = time.into();
        self
    }

    pub fn with_safety_note(mut self, note: impl Into<String>) -> Self {
        self.safety_note = Some(note.into());
        self
    }
}

/// Per-target localization status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalizationStatus {
    Found,
    NotVisible,
    NotPresent,
    Ambiguous,
}

/// Per-target localization outcome, read by locate narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationResult {
    pub target: String,
    pub status: LocalizationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// Echo of how the query was interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryUnderstood {
    #[serde(rename = "type")]
    pub query_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Structured diagnosis, read by diagnose and safety narration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_warning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_causes: Vec<String>,
}

/// What one component does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentFunction {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub purpose: String,
}

/// How-it-works explanation, read by explain narration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Explanation {
    #[serde(deserialize_with = "null_as_default")]
    pub overview: String,
    #[serde(deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub component_functions: Vec<ComponentFunction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_flow: Option<String>,
}

/// Safety warning attached when safety-critical indicators were found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyNotice {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// Structured "temporarily unavailable, retry later" marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaNotice {
    pub error: String,
    pub retry_after: String,
}

impl Default for QuotaNotice {
    fn default() -> Self {
        Self {
            error: "AI temporarily unavailable (free tier quota reached)".into(),
            retry_after: "tomorrow".into(),
        }
    }
}

// =============================================================================
// Troubleshoot Response
// =============================================================================

/// Final payload returned to the caller. Scenario-specific fields are
/// omitted when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroubleshootResponse {
    pub status: ResponseScenario,
    pub device_identified: String,
    pub device_confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<ConfidenceLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_diagnosis: Option<String>,
    #[serde(default)]
    pub troubleshooting_steps: Vec<TroubleshootingStep>,
    pub audio_instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clarifying_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_devices: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visible_alternatives: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typical_location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detected_components: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when_to_seek_help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general_safety_tip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub what_i_see: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_note: Option<String>,
    pub answer_type: AnswerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety: Option<SafetyNotice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_understood: Option<QueryUnderstood>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_info: Option<QuotaNotice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub localization_results: Vec<LocalizationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<DiagnosisDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

impl TroubleshootResponse {
    /// Empty payload for a scenario; builders fill the rest.
    pub fn new(status: ResponseScenario, device: impl Into<String>, confidence: f64) -> Self {
        Self {
            status,
            device_identified: device.into(),
            device_confidence: confidence,
            confidence_level: None,
            brand: None,
            model: None,
            component: None,
            spatial_description: None,
            bounding_box: None,
            issue_diagnosis: None,
            troubleshooting_steps: Vec::new(),
            audio_instructions: String::new(),
            message: None,
            clarifying_questions: Vec::new(),
            suggestions: Vec::new(),
            supported_devices: Vec::new(),
            visible_alternatives: Vec::new(),
            typical_location: None,
            detected_components: Vec::new(),
            reasoning: None,
            warnings: Vec::new(),
            when_to_seek_help: None,
            general_safety_tip: None,
            what_i_see: None,
            confidence_note: None,
            answer_type: AnswerType::default(),
            safety: None,
            query_understood: None,
            quota_info: None,
            retry_after: None,
            localization_results: Vec::new(),
            diagnosis: None,
            explanation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_buckets() {
        let bucket = |c| ConfidenceLevel::from_score(c, 0.3, 0.6);
        assert_eq!(bucket(0.0), ConfidenceLevel::Low);
        assert_eq!(bucket(0.29), ConfidenceLevel::Low);
        assert_eq!(bucket(0.3), ConfidenceLevel::Medium);
        assert_eq!(bucket(0.59), ConfidenceLevel::Medium);
        assert_eq!(bucket(0.6), ConfidenceLevel::High);
        assert_eq!(bucket(1.0), ConfidenceLevel::High);
        assert_eq!(bucket(f64::NAN), ConfidenceLevel::Low);
    }

    #[test]
    fn test_bbox_clamp() {
        let bbox = BoundingBox {
            x_min: -10.0,
            y_min: 20.0,
            x_max: 900.0,
            y_max: 300.0,
        }
        .clamp(640, 480);

        assert_eq!(bbox.x_min, 0.0);
        assert_eq!(bbox.x_max, 640.0);
        assert_eq!(bbox.y_min, 20.0);
        assert_eq!(bbox.y_max, 300.0);
    }

    #[test]
    fn test_bbox_clamp_orders_edges() {
        let bbox = BoundingBox {
            x_min: 500.0,
            y_min: 400.0,
            x_max: 100.0,
            y_max: 50.0,
        }
        .clamp(640, 480);
        assert!(bbox.x_min <= bbox.x_max);
        assert!(bbox.y_min <= bbox.y_max);
    }

    #[test]
    fn test_status_wire_values() {
        let resp = TroubleshootResponse::new(ResponseScenario::ComponentNotFound, "Router", 0.8);
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["status"], "component_not_located");
        assert!(value.get("bounding_box").is_none());
        assert!(value.get("clarifying_questions").is_none());
        assert_eq!(ResponseScenario::LowConfidence.to_string(), "low_confidence");
    }

    #[test]
    fn test_unknown_answer_type() {
        let at: AnswerType = serde_json::from_value(serde_json::json!("haiku")).unwrap();
        assert_eq!(at, AnswerType::Unrecognized);
    }
}
