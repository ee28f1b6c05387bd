//! Gate 5: step synthesis.
//!
//! One of four strategies is chosen from the device record and its
//! confidence bucket. Every strategy makes one gateway call and then
//! normalizes the plan so `diagnosis`, `steps` and `narration` are always
//! usable, filling gaps with canned guidance for that strategy.

use fixit_core::{ConfidenceLevel, DeviceAssessment, QuotaNotice, Result, StepPlan, TroubleshootingStep};
use fixit_model_gateway::InferenceGateway;

use crate::prompts::{self, StepContext};

pub const DIAGNOSTIC_QUESTIONS: [&str; 3] = [
    "What type of device is this? (e.g., router, printer, laptop)",
    "What brand is it? Are there any visible logos or labels?",
    "Can you describe the issue you're experiencing?",
];

pub const PHOTO_SUGGESTIONS: [&str; 3] = [
    "Try taking a photo from a different angle",
    "Make sure the device is well-lit",
    "Include any visible brand names or model numbers",
];

const CAUTIOUS_NOTE: &str = "Please verify this matches your device before following these steps.";
const CAUTIOUS_CAVEAT: &str = "The device type is uncertain; confirm it before continuing.";

/// Generation strategy for Gate 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStrategy {
    /// High confidence: device-specific steps.
    Detailed,
    /// Medium confidence: general steps with caveats.
    Cautious,
    /// Low confidence: questions instead of steps.
    Diagnostic,
    /// No device: help taking a usable photo.
    Onboarding,
}

impl StepStrategy {
    pub fn select(device: &DeviceAssessment, bucket: ConfidenceLevel) -> Self {
        if !device.is_recognized() {
            return Self::Onboarding;
        }
        match bucket {
            ConfidenceLevel::Low => Self::Diagnostic,
            ConfidenceLevel::Medium => Self::Cautious,
            ConfidenceLevel::High => Self::Detailed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detailed => "detailed",
            Self::Cautious => "cautious",
            Self::Diagnostic => "diagnostic",
            Self::Onboarding => "onboarding",
        }
    }
}

/// A synthesized plan, degraded when the quota ran out.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub plan: StepPlan,
    pub quota: Option<QuotaNotice>,
}

/// Runs the selected strategy through the gateway.
#[derive(Debug, Clone, Default)]
pub struct StepSynthesizer;

impl StepSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub async fn synthesize(
        &self,
        gateway: &InferenceGateway,
        strategy: StepStrategy,
        ctx: &StepContext<'_>,
    ) -> Result<StepOutcome> {
        let request = match strategy {
            StepStrategy::Detailed => prompts::detailed_steps(ctx),
            StepStrategy::Cautious => prompts::cautious_steps(ctx),
            StepStrategy::Diagnostic => prompts::diagnostic_questions(ctx),
            StepStrategy::Onboarding => prompts::onboarding(ctx),
        };

        tracing::info!(strategy = strategy.as_str(), "Synthesizing steps");

        match gateway.call_as::<StepPlan>(&request).await? {
            Some(plan) => Ok(StepOutcome {
                plan: normalize(plan, strategy, ctx),
                quota: None,
            }),
            None => {
                tracing::warn!(strategy = strategy.as_str(), "Step synthesis degraded, quota exhausted");
                Ok(StepOutcome {
                    plan: quota_plan(ctx),
                    quota: Some(QuotaNotice::default()),
                })
            }
        }
    }
}

/// Guarantee the plan's required fields and renumber steps from 1.
pub fn normalize(mut plan: StepPlan, strategy: StepStrategy, ctx: &StepContext<'_>) -> StepPlan {
    let device = ctx.device.device_type();

    plan.steps.retain(|s| !s.instruction.trim().is_empty() || !s.visual_cue.trim().is_empty());
    if plan.steps.is_empty() {
        plan.steps = match strategy {
            StepStrategy::Detailed => fallback_steps(device),
            StepStrategy::Cautious => cautious_steps(),
            StepStrategy::Diagnostic => vec![TroubleshootingStep::new(
                1,
                "Please help me understand your device better by answering a few questions",
            )
            .with_visual_cue("Look at your device to answer these questions")
            .with_estimated_time("1 minute")],
            StepStrategy::Onboarding => onboarding_steps(&ctx.device.components),
        };
    }

    for (i, step) in plan.steps.iter_mut().enumerate() {
        step.step_number = i as u32 + 1;
        if step.instruction.trim().is_empty() {
            step.instruction = "No instruction available".into();
        }
        if step.estimated_time.trim().is_empty() {
            step.estimated_time = "N/A".into();
        }
        if strategy == StepStrategy::Cautious && step.caveat.is_none() {
            step.caveat = Some(CAUTIOUS_CAVEAT.into());
        }
    }

    if plan.diagnosis.trim().is_empty() {
        plan.diagnosis = match strategy {
            StepStrategy::Cautious => format!(
                "I think this might be a {}, but I'm not entirely certain. Here's general guidance.",
                device
            ),
            StepStrategy::Diagnostic => "I'm having trouble identifying this device clearly.".into(),
            StepStrategy::Onboarding => "I couldn't identify a troubleshootable device in this image.".into(),
            StepStrategy::Detailed => "Unable to determine specific diagnosis.".into(),
        };
    }

    match strategy {
        StepStrategy::Cautious => {
            if plan.confidence_note.as_deref().map_or(true, |n| n.trim().is_empty()) {
                plan.confidence_note = Some(CAUTIOUS_NOTE.into());
            }
        }
        StepStrategy::Diagnostic => {
            if plan.clarifying_questions.is_empty() {
                plan.clarifying_questions = owned(&DIAGNOSTIC_QUESTIONS);
            }
            if plan.general_safety_tip.is_none() {
                plan.general_safety_tip = Some(
                    "While I gather more information, remember: always disconnect power before working on any electronic device."
                        .into(),
                );
            }
        }
        StepStrategy::Detailed | StepStrategy::Onboarding => {}
    }

    plan
}

/// Degraded plan when the quota ran out during Gate 5. Detection results are
/// still reported.
pub fn quota_plan(ctx: &StepContext<'_>) -> StepPlan {
    let device = ctx.device.device_type();
    let component = ctx.target.unwrap_or("component");
    let cue = ctx
        .spatial
        .and_then(|s| s.spatial_description.clone())
        .unwrap_or_else(|| "See bounding box for location".into());

    StepPlan {
        diagnosis: format!(
            "I successfully identified your {} and located the {}, but I've reached my AI analysis limit for now.",
            device, component
        ),
        steps: vec![TroubleshootingStep::new(
            1,
            format!("The {} is visible in the image at the location shown", component),
        )
        .with_visual_cue(cue)
        .with_estimated_time("N/A")],
        ..Default::default()
    }
}

/// Placeholder used when Gate 5 is skipped.
pub fn location_only_plan() -> StepPlan {
    StepPlan {
        diagnosis: "Location identified.".into(),
        ..Default::default()
    }
}

fn fallback_steps(device: &str) -> Vec<TroubleshootingStep> {
    vec![
        TroubleshootingStep::new(
            1,
            format!(
                "For {} issues, start by power cycling the device (unplug, wait 30 seconds, plug back in)",
                device
            ),
        )
        .with_visual_cue("Wait for all lights to return to normal")
        .with_estimated_time("2 minutes"),
        TroubleshootingStep::new(2, "Check all cable connections are secure")
            .with_visual_cue("Look for loose or damaged cables")
            .with_estimated_time("1 minute"),
        TroubleshootingStep::new(3, "If the issue persists, consult the device manual or manufacturer support")
            .with_visual_cue("Model number is usually on a label on the back or bottom")
            .with_estimated_time("5 minutes"),
    ]
}

fn cautious_steps() -> Vec<TroubleshootingStep> {
    vec![
        TroubleshootingStep::new(1, "First, verify this is the correct device type")
            .with_visual_cue("Check for brand name and model number")
            .with_estimated_time("30 seconds"),
        TroubleshootingStep::new(2, "Safely disconnect power before any troubleshooting")
            .with_visual_cue("Confirm all power indicators are off")
            .with_estimated_time("30 seconds"),
    ]
}

fn onboarding_steps(components: &[String]) -> Vec<TroubleshootingStep> {
    let mut steps = vec![TroubleshootingStep::new(
        1,
        "Upload a clear photo of the electronic device you need help with",
    )
    .with_visual_cue("Show the entire device with visible brand/labels if possible")
    .with_estimated_time("30 seconds")];

    if !components.is_empty() {
        let seen: Vec<&str> = components.iter().take(3).map(String::as_str).collect();
        steps.push(
            TroubleshootingStep::new(
                2,
                format!(
                    "I can see some elements in the image: {}. If you're asking about these, please clarify.",
                    seen.join(", ")
                ),
            )
            .with_visual_cue("Point to or describe the specific part you need help with")
            .with_estimated_time("30 seconds"),
        );
    }
    steps
}

pub(crate) fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixit_core::mocks::ScriptedProvider;
    use fixit_core::QueryIntent;
    use fixit_model_gateway::{GatewayLimits, RetryPolicy};
    use serde_json::json;
    use std::sync::Arc;

    fn device(kind: &str) -> DeviceAssessment {
        DeviceAssessment {
            device_type: Some(kind.into()),
            device_confidence: 0.8,
            components: vec!["antenna".into(), "power port".into()],
            ..Default::default()
        }
    }

    fn ctx<'a>(device: &'a DeviceAssessment, intent: &'a QueryIntent) -> StepContext<'a> {
        StepContext {
            query: "my router keeps dropping wifi",
            device,
            intent,
            target: Some("antenna"),
            spatial: None,
            manual_context: &[],
        }
    }

    #[test]
    fn test_strategy_selection() {
        let router = device("Router");
        assert_eq!(StepStrategy::select(&router, ConfidenceLevel::High), StepStrategy::Detailed);
        assert_eq!(StepStrategy::select(&router, ConfidenceLevel::Medium), StepStrategy::Cautious);
        assert_eq!(StepStrategy::select(&router, ConfidenceLevel::Low), StepStrategy::Diagnostic);
        assert_eq!(
            StepStrategy::select(&device("not_a_device"), ConfidenceLevel::High),
            StepStrategy::Onboarding
        );
        assert_eq!(
            StepStrategy::select(&device("Unknown"), ConfidenceLevel::High),
            StepStrategy::Onboarding
        );
    }

    #[test]
    fn test_normalize_renumbers_and_defaults() {
        let router = device("Router");
        let intent = QueryIntent::default();
        let plan = StepPlan {
            steps: vec![
                TroubleshootingStep::new(7, "Unplug the router"),
                TroubleshootingStep::default(),
                TroubleshootingStep::new(3, "Plug it back in").with_estimated_time("1 minute"),
            ],
            ..Default::default()
        };

        let plan = normalize(plan, StepStrategy::Detailed, &ctx(&router, &intent));
        let numbers: Vec<u32> = plan.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(plan.steps[0].estimated_time, "N/A");
        assert_eq!(plan.steps[1].estimated_time, "1 minute");
        assert_eq!(plan.diagnosis, "Unable to determine specific diagnosis.");
    }

    #[test]
    fn test_normalize_fills_empty_plans() {
        let router = device("Router");
        let intent = QueryIntent::default();
        let c = ctx(&router, &intent);

        let detailed = normalize(StepPlan::default(), StepStrategy::Detailed, &c);
        assert_eq!(detailed.steps.len(), 3);
        assert!(detailed.steps[0].instruction.contains("For Router issues"));

        let cautious = normalize(StepPlan::default(), StepStrategy::Cautious, &c);
        assert_eq!(cautious.confidence_note.as_deref(), Some(CAUTIOUS_NOTE));
        assert!(cautious.steps.iter().all(|s| s.caveat.is_some()));

        let diagnostic = normalize(StepPlan::default(), StepStrategy::Diagnostic, &c);
        assert_eq!(diagnostic.clarifying_questions.len(), 3);

        let onboarding = normalize(StepPlan::default(), StepStrategy::Onboarding, &c);
        assert_eq!(onboarding.steps.len(), 2);
        assert!(onboarding.steps[1].instruction.contains("antenna, power port"));
    }

    #[test]
    fn test_quota_plan_mentions_detection() {
        let router = device("Router");
        let intent = QueryIntent::default();
        let plan = quota_plan(&ctx(&router, &intent));
        assert!(plan.diagnosis.contains("identified your Router and located the antenna"));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].step_number, 1);
    }

    #[tokio::test]
    async fn test_synthesize_through_gateway() {
        let provider = Arc::new(ScriptedProvider::json(vec![json!({
            "issue_diagnosis": "Antenna loose",
            "troubleshooting_steps": [
                {"step_number": 2, "instruction": "Tighten the antenna"},
                {"step_number": 5, "instruction": "Restart the router"}
            ]
        })]));
        let gateway = InferenceGateway::with_limits(provider.clone(), GatewayLimits::default(), RetryPolicy::default());
        let router = device("Router");
        let intent = QueryIntent::default();

        let outcome = StepSynthesizer::new()
            .synthesize(&gateway, StepStrategy::Detailed, &ctx(&router, &intent))
            .await
            .unwrap();

        assert!(outcome.quota.is_none());
        assert_eq!(outcome.plan.diagnosis, "Antenna loose");
        assert_eq!(outcome.plan.steps[1].step_number, 2);
        assert_eq!(provider.call_count(), 1);
    }
}
