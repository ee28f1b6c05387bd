//! Confidence-stratified response assembly.
//!
//! Pure data assembly: takes whatever the gates accumulated plus the
//! terminal scenario and fills the fields that scenario carries.

use fixit_core::{
    AnswerType, CombinedAnalysis, DeviceAssessment, DiagnosisDetail, LocalizationResult, LocalizationStatus,
    QueryIntent, QueryUnderstood, ResponseScenario, SafetyNotice, SpatialAssessment, StepPlan,
    TroubleshootResponse, TroubleshootingStep, NOT_A_DEVICE,
};

use crate::accumulator::PipelineState;
use crate::policy::PipelinePolicy;
use crate::steps::owned;

pub const SUPPORTED_DEVICES: [&str; 6] = [
    "WiFi Routers & Modems",
    "Printers & Scanners",
    "Laptops & Computers",
    "Smart Home Devices",
    "Home Appliances",
    "Circuit Boards & Arduino",
];

const LOW_CONFIDENCE_QUESTIONS: [&str; 3] = [
    "What type of device is this? (router, printer, laptop, etc.)",
    "Can you take a photo from a different angle?",
    "Are there any visible brand names or labels?",
];

const LOW_CONFIDENCE_SUGGESTIONS: [&str; 3] = [
    "Ensure the entire device is visible in the photo",
    "Take the photo in good lighting",
    "Include any visible brand names or model numbers",
];

const CLARIFICATION_QUESTION: &str = "Could you describe what you're looking for or what issue you're experiencing?";
const QUOTA_MESSAGE: &str = "Device identified successfully. Detailed steps temporarily unavailable (AI quota reached).";
const SAFETY_FALLBACK: &str =
    "A potential safety hazard was detected. Disconnect power and keep a safe distance from the device.";

/// Builds the final payload for each scenario.
#[derive(Debug, Clone, Default)]
pub struct ResponseSynthesizer {
    policy: PipelinePolicy,
}

impl ResponseSynthesizer {
    pub fn new(policy: PipelinePolicy) -> Self {
        Self { policy }
    }

    /// Assemble the response. `audio_instructions` is left for the narrator.
    pub fn assemble(
        &self,
        scenario: ResponseScenario,
        state: &PipelineState,
        query: &str,
        dims: (u32, u32),
    ) -> TroubleshootResponse {
        let default_analysis = CombinedAnalysis::default();
        let analysis = state.analysis.as_ref().unwrap_or(&default_analysis);

        let response = match scenario {
            ResponseScenario::Error => self.quota_error(state),
            ResponseScenario::InvalidImage => self.rejection(analysis),
            ResponseScenario::LowConfidence => self.low_confidence(analysis),
            ResponseScenario::ComponentNotFound => self.component_not_found(analysis, state, dims),
            ResponseScenario::Success | ResponseScenario::NeedsClarification => {
                self.answer(scenario, analysis, state, query, dims)
            }
        };

        tracing::debug!(
            scenario = %response.status,
            answer_type = ?response.answer_type,
            steps = response.troubleshooting_steps.len(),
            "Response assembled"
        );
        response
    }

    // =========================================================================
    // Terminal Scenarios
    // =========================================================================

    fn quota_error(&self, state: &PipelineState) -> TroubleshootResponse {
        let notice = state.quota.clone().unwrap_or_default();
        let mut resp = TroubleshootResponse::new(ResponseScenario::Error, fixit_core::UNKNOWN_DEVICE, 0.0);
        resp.message = Some(notice.error.clone());
        resp.retry_after = Some(notice.retry_after.clone());
        resp.issue_diagnosis = Some("AI analysis temporarily unavailable.".into());
        resp.quota_info = Some(notice);
        resp
    }

    fn rejection(&self, analysis: &CombinedAnalysis) -> TroubleshootResponse {
        let validation = &analysis.validation;
        let device = &analysis.device;

        let message = if validation.is_valid {
            non_blank(device.reasoning.as_deref())
                .unwrap_or("This does not appear to be an electronic device.")
                .to_string()
        } else {
            non_blank(validation.rejection_reason.as_deref())
                .unwrap_or("This image is not suitable for device troubleshooting.")
                .to_string()
        };

        let mut resp = TroubleshootResponse::new(ResponseScenario::InvalidImage, NOT_A_DEVICE, 0.0);
        resp.message = Some(message);
        resp.what_i_see = first_non_blank(&[&validation.what_i_see, &device.what_i_see]);
        resp.suggestions = validation.suggestion.iter().filter(|s| !s.trim().is_empty()).cloned().collect();
        resp.supported_devices = if validation.supported_devices.is_empty() {
            owned(&SUPPORTED_DEVICES)
        } else {
            validation.supported_devices.clone()
        };
        resp.issue_diagnosis = Some("Image not suitable for device troubleshooting.".into());
        resp.answer_type = AnswerType::RejectInvalidImage;
        resp
    }

    fn low_confidence(&self, analysis: &CombinedAnalysis) -> TroubleshootResponse {
        let device = &analysis.device;
        let mut resp = self.device_response(ResponseScenario::LowConfidence, device);

        resp.message = Some("I'm having trouble identifying this device clearly.".into());
        resp.what_i_see = first_non_blank(&[&device.what_i_see, &analysis.validation.what_i_see]);
        resp.reasoning = non_blank(device.reasoning.as_deref()).map(str::to_string);
        resp.clarifying_questions = or_default(
            merged(&device.clarifying_questions, &analysis.query.clarifying_questions),
            &LOW_CONFIDENCE_QUESTIONS,
        );
        resp.suggestions = or_default(device.suggestions.clone(), &LOW_CONFIDENCE_SUGGESTIONS);
        resp.troubleshooting_steps = vec![TroubleshootingStep::new(
            1,
            "Please answer the questions above or provide a clearer image",
        )
        .with_visual_cue("Look for brand names, model numbers, or distinctive features")
        .with_estimated_time("1 minute")];
        resp.issue_diagnosis = Some("Device identification uncertain - need more information.".into());
        resp.general_safety_tip = Some("Before working on any electronic device, always disconnect power first.".into());
        resp.answer_type = AnswerType::AskClarifyingQuestions;
        resp
    }

    fn component_not_found(
        &self,
        analysis: &CombinedAnalysis,
        state: &PipelineState,
        dims: (u32, u32),
    ) -> TroubleshootResponse {
        let device = &analysis.device;
        let default_spatial = SpatialAssessment::default();
        let spatial = state.spatial.as_ref().unwrap_or(&default_spatial);
        let component = state.target.clone().unwrap_or_else(|| spatial.component.clone());
        let device_type = device.device_type();

        let mut message = format!("I can see this is a {}, but I couldn't locate the {}.", device_type, component);
        if let Some(reason) = non_blank(spatial.visibility_reason.as_deref()) {
            message.push(' ');
            message.push_str(reason);
        }

        let mut steps = Vec::new();
        if let Some(loc) = &spatial.typical_location {
            steps.push(
                TroubleshootingStep::new(1, format!("The {} is typically located {}", component, loc))
                    .with_visual_cue(format!("Look for the {} in that area", component))
                    .with_estimated_time("30 seconds"),
            );
        }
        if let Some(action) = &spatial.suggested_action {
            steps.push(
                TroubleshootingStep::new(steps.len() as u32 + 1, action.clone())
                    .with_visual_cue("This should reveal the component")
                    .with_estimated_time("1 minute"),
            );
        }
        if steps.is_empty() {
            steps.push(
                TroubleshootingStep::new(
                    1,
                    format!("Try taking a photo from a different angle to show the {}", component),
                )
                .with_visual_cue(format!("Make sure the area containing the {} is visible", component))
                .with_estimated_time("30 seconds"),
            );
        }

        let mut resp = self.device_response(ResponseScenario::ComponentNotFound, device);
        resp.component = Some(component.clone());
        resp.message = Some(message);
        resp.spatial_description = spatial.spatial_description.clone();
        resp.visible_alternatives = spatial.visible_alternatives.clone();
        resp.typical_location = spatial.typical_location.clone();
        resp.troubleshooting_steps = steps;
        resp.query_understood = Some(understood(&analysis.query, Some(&component)));
        resp.localization_results = vec![localization_result(&component, spatial, dims)];
        resp.answer_type = AnswerType::LocateOnly;
        resp
    }

    // =========================================================================
    // Full Answer
    // =========================================================================

    fn answer(
        &self,
        scenario: ResponseScenario,
        analysis: &CombinedAnalysis,
        state: &PipelineState,
        query: &str,
        dims: (u32, u32),
    ) -> TroubleshootResponse {
        let device = &analysis.device;
        let intent = &analysis.query;
        let safety = &analysis.safety;
        let plan = state.plan.clone().unwrap_or_default();

        let mut resp = self.device_response(scenario, device);

        let component = intent.target().map(str::to_string).or_else(|| state.target.clone());
        if let (Some(component), Some(spatial)) = (&component, &state.spatial) {
            resp.spatial_description = spatial.spatial_description.clone();
            if spatial.component_visible {
                resp.bounding_box = spatial.bounding_box.map(|b| b.clamp(dims.0, dims.1));
            } else {
                resp.typical_location = spatial.typical_location.clone();
                resp.visible_alternatives = spatial.visible_alternatives.clone();
            }
            resp.localization_results = vec![localization_result(component, spatial, dims)];
        }
        resp.component = component;

        resp.issue_diagnosis = non_blank(Some(plan.diagnosis.as_str())).map(str::to_string);
        resp.troubleshooting_steps = plan.steps.clone();
        resp.when_to_seek_help = plan.when_to_seek_help.clone();
        resp.general_safety_tip = plan.general_safety_tip.clone();
        resp.confidence_note = plan.confidence_note.clone();
        resp.explanation = plan.explanation.clone();
        resp.what_i_see = first_non_blank(&[&device.what_i_see, &analysis.validation.what_i_see]);
        resp.reasoning = non_blank(device.reasoning.as_deref()).map(str::to_string);
        resp.query_understood = Some(understood(intent, resp.component.as_deref()));

        resp.warnings = plan.warnings.clone();
        if safety.safety_detected {
            let message = non_blank(safety.safety_message.as_deref()).unwrap_or(SAFETY_FALLBACK).to_string();
            if !resp.warnings.contains(&message) {
                resp.warnings.insert(0, message.clone());
            }
            resp.safety = Some(SafetyNotice {
                message,
                keywords: safety.safety_keywords_found.clone(),
            });
        }

        if let Some(notice) = &state.quota {
            resp.quota_info = Some(notice.clone());
            resp.message = Some(QUOTA_MESSAGE.into());
        }

        resp.answer_type = if safety.safety_detected {
            AnswerType::SafetyWarningOnly
        } else if scenario == ResponseScenario::NeedsClarification {
            AnswerType::AskClarifyingQuestions
        } else {
            intent.answer_type
        };

        if scenario == ResponseScenario::NeedsClarification || !plan.clarifying_questions.is_empty() {
            resp.clarifying_questions = merged(&intent.clarifying_questions, &plan.clarifying_questions);
        }
        if scenario == ResponseScenario::NeedsClarification && resp.clarifying_questions.is_empty() {
            resp.clarifying_questions = vec![CLARIFICATION_QUESTION.to_string()];
        }

        if needs_diagnosis(resp.answer_type, &plan) {
            resp.diagnosis = Some(DiagnosisDetail {
                issue: resp.issue_diagnosis.clone(),
                severity: plan.severity.clone(),
                safety_warning: resp.safety.as_ref().map(|s| s.message.clone()),
                possible_causes: plan.possible_causes.clone(),
            });
        }

        tracing::debug!(query, component = ?resp.component, "Answer assembled");
        resp
    }

    /// Fields shared by every scenario that identified a device.
    fn device_response(&self, scenario: ResponseScenario, device: &DeviceAssessment) -> TroubleshootResponse {
        let confidence = device.confidence();
        let mut resp = TroubleshootResponse::new(scenario, device.device_type(), confidence);
        resp.confidence_level = Some(self.policy.bucket(confidence));
        resp.brand = device.visible_brand().map(str::to_string);
        resp.model = device.visible_model().map(str::to_string);
        resp.detected_components = device.components.clone();
        resp
    }
}

fn needs_diagnosis(answer_type: AnswerType, plan: &StepPlan) -> bool {
    matches!(
        answer_type,
        AnswerType::DiagnoseOnly | AnswerType::Mixed | AnswerType::SafetyWarningOnly
    ) || !plan.possible_causes.is_empty()
}

fn localization_result(target: &str, spatial: &SpatialAssessment, dims: (u32, u32)) -> LocalizationResult {
    let status = if spatial.component_visible {
        LocalizationStatus::Found
    } else {
        LocalizationStatus::NotVisible
    };

    let suggested_action = spatial.suggested_action.clone().or_else(|| {
        spatial
            .typical_location
            .as_ref()
            .map(|loc| format!("It is typically located {}.", loc))
    });

    LocalizationResult {
        target: target.to_string(),
        status,
        spatial_description: spatial.spatial_description.clone(),
        suggested_action,
        reasoning: spatial.visibility_reason.clone(),
        bbox: spatial
            .bounding_box
            .filter(|_| spatial.component_visible)
            .map(|b| b.clamp(dims.0, dims.1)),
    }
}

fn understood(intent: &QueryIntent, target: Option<&str>) -> QueryUnderstood {
    let query_type = serde_json::to_value(intent.query_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unclear".into());

    QueryUnderstood {
        query_type,
        target: target.map(str::to_string),
        action: intent.action_requested.clone(),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn first_non_blank(candidates: &[&Option<String>]) -> Option<String> {
    candidates.iter().find_map(|c| non_blank(c.as_deref()).map(str::to_string))
}

fn merged(first: &[String], second: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(first.len() + second.len());
    for item in first.iter().chain(second) {
        if !item.trim().is_empty() && !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

fn or_default(items: Vec<String>, fallback: &[&str]) -> Vec<String> {
    if items.is_empty() {
        owned(fallback)
    } else {
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixit_core::{BoundingBox, ConfidenceLevel, QueryType, QuotaNotice, SafetyAssessment, ValidationInfo};

    fn analysis(kind: &str, confidence: f64) -> CombinedAnalysis {
        CombinedAnalysis {
            validation: ValidationInfo {
                is_valid: true,
                ..Default::default()
            },
            device: DeviceAssessment {
                device_type: Some(kind.into()),
                device_confidence: confidence,
                components: vec!["reset button".into(), "antenna".into()],
                ..Default::default()
            },
            query: QueryIntent {
                query_type: QueryType::Troubleshoot,
                answer_type: AnswerType::TroubleshootSteps,
                ..Default::default()
            },
            safety: SafetyAssessment::default(),
        }
    }

    fn state(analysis: CombinedAnalysis) -> PipelineState {
        let mut state = PipelineState::new();
        state.analysis = Some(analysis);
        state
    }

    fn synth() -> ResponseSynthesizer {
        ResponseSynthesizer::new(PipelinePolicy::default())
    }

    #[test]
    fn test_rejection_defaults() {
        let mut a = analysis("Unknown", 0.0);
        a.validation.is_valid = false;
        let resp = synth().assemble(ResponseScenario::InvalidImage, &state(a), "q", (640, 480));

        assert_eq!(resp.status, ResponseScenario::InvalidImage);
        assert_eq!(resp.message.as_deref(), Some("This image is not suitable for device troubleshooting."));
        assert_eq!(resp.supported_devices.len(), 6);
        assert_eq!(resp.answer_type, AnswerType::RejectInvalidImage);
    }

    #[test]
    fn test_not_a_device_uses_reasoning() {
        let mut a = analysis("not_a_device", 0.9);
        a.device.reasoning = Some("This is a photo of a sandwich.".into());
        let resp = synth().assemble(ResponseScenario::InvalidImage, &state(a), "q", (640, 480));
        assert_eq!(resp.message.as_deref(), Some("This is a photo of a sandwich."));
    }

    #[test]
    fn test_low_confidence_has_questions() {
        let resp = synth().assemble(
            ResponseScenario::LowConfidence,
            &state(analysis("Router", 0.2)),
            "q",
            (640, 480),
        );
        assert_eq!(resp.confidence_level, Some(ConfidenceLevel::Low));
        assert_eq!(resp.clarifying_questions.len(), 3);
        assert_eq!(resp.suggestions.len(), 3);
        assert_eq!(resp.troubleshooting_steps[0].step_number, 1);
    }

    #[test]
    fn test_component_not_found_carries_hint() {
        let mut s = state(analysis("Router", 0.8));
        s.target = Some("reset button".into());
        s.spatial = Some(SpatialAssessment {
            component: "reset button".into(),
            typical_location: Some("on the back panel near the power port".into()),
            visible_alternatives: vec!["antenna".into()],
            visibility_reason: Some("Only the front is shown.".into()),
            ..Default::default()
        });

        let resp = synth().assemble(ResponseScenario::ComponentNotFound, &s, "where is reset", (640, 480));
        assert_eq!(resp.typical_location.as_deref(), Some("on the back panel near the power port"));
        assert!(resp.message.as_deref().unwrap().ends_with("Only the front is shown."));
        assert_eq!(
            resp.troubleshooting_steps[0].instruction,
            "The reset button is typically located on the back panel near the power port"
        );
        assert_eq!(resp.localization_results[0].status, LocalizationStatus::NotVisible);
        assert_eq!(resp.answer_type, AnswerType::LocateOnly);
    }

    #[test]
    fn test_success_clamps_box_and_merges_safety() {
        let mut a = analysis("Router", 0.8);
        a.query.target_component = Some("reset button".into());
        a.safety = SafetyAssessment {
            safety_detected: true,
            safety_message: Some("Unplug it; the casing is scorched.".into()),
            ..Default::default()
        };
        let mut s = state(a);
        s.spatial = Some(SpatialAssessment {
            component: "reset button".into(),
            component_visible: true,
            bounding_box: Some(BoundingBox {
                x_min: 600.0,
                y_min: 100.0,
                x_max: 704.0,
                y_max: 200.0,
            }),
            ..Default::default()
        });
        s.plan = Some(StepPlan {
            diagnosis: "Scorched casing".into(),
            steps: vec![TroubleshootingStep::new(1, "Unplug the router")],
            warnings: vec!["Do not touch the board".into()],
            ..Default::default()
        });

        let resp = synth().assemble(ResponseScenario::Success, &s, "q", (640, 480));
        assert_eq!(resp.bounding_box.unwrap().x_max, 640.0);
        assert_eq!(resp.component.as_deref(), Some("reset button"));
        assert_eq!(resp.answer_type, AnswerType::SafetyWarningOnly);
        assert_eq!(resp.warnings[0], "Unplug it; the casing is scorched.");
        assert_eq!(resp.warnings.len(), 2);
        assert_eq!(
            resp.diagnosis.unwrap().safety_warning.as_deref(),
            Some("Unplug it; the casing is scorched.")
        );
        assert_eq!(resp.detected_components.len(), 2);
    }

    #[test]
    fn test_quota_degraded_success() {
        let mut s = state(analysis("Router", 0.8));
        s.quota = Some(QuotaNotice::default());
        s.plan = Some(StepPlan::default());
        let resp = synth().assemble(ResponseScenario::Success, &s, "q", (640, 480));
        assert_eq!(resp.message.as_deref(), Some(QUOTA_MESSAGE));
        assert_eq!(resp.quota_info.unwrap().retry_after, "tomorrow");
    }

    #[test]
    fn test_needs_clarification_always_asks() {
        let mut s = state(analysis("Router", 0.8));
        s.needs_clarification = true;
        let resp = synth().assemble(ResponseScenario::NeedsClarification, &s, "help", (640, 480));
        assert_eq!(resp.answer_type, AnswerType::AskClarifyingQuestions);
        assert_eq!(resp.clarifying_questions, vec![CLARIFICATION_QUESTION.to_string()]);
    }

    #[test]
    fn test_quota_error_response() {
        let mut s = PipelineState::new();
        s.quota = Some(QuotaNotice::default());
        let resp = synth().assemble(ResponseScenario::Error, &s, "q", (640, 480));
        assert_eq!(resp.status, ResponseScenario::Error);
        assert_eq!(resp.retry_after.as_deref(), Some("tomorrow"));
        assert!(resp.message.unwrap().contains("quota"));
    }
}
