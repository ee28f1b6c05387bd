//! Prompt builders for every gateway call the pipeline makes.

use fixit_core::{DeviceAssessment, ImagePart, InferenceRequest, QueryIntent, QueryType, SpatialAssessment};

/// Temperature for analysis and localization calls.
pub const ANALYSIS_TEMPERATURE: f32 = 0.2;
/// Temperature for step synthesis.
pub const SYNTHESIS_TEMPERATURE: f32 = 0.3;

const ANALYSIS_MAX_TOKENS: u32 = 3000;

const ANALYSIS_SCHEMA: &str = r#"{
  "validation": {
    "is_valid": true,
    "image_category": "device category",
    "what_i_see": "what the image actually shows",
    "image_quality": "good | blurry | dark | too_far | partial",
    "multiple_devices": false,
    "device_list": [],
    "rejection_reason": null,
    "suggestion": null
  },
  "device": {
    "device_type": "specific device type, or not_a_device",
    "device_category": "networking | computing | appliance | ...",
    "brand": "brand if readable, else unknown",
    "model": "model if readable, else not visible",
    "brand_model_guidance": "where to find brand/model on this device type, or null",
    "device_confidence": 0.85,
    "confidence_level": "high | medium | low",
    "components": ["visible components"],
    "reasoning": "why this identification"
  },
  "query": {
    "query_type": "identify | locate | explain | troubleshoot | procedure | compare | unclear",
    "answer_type": "locate_only | identify_only | explain_only | troubleshoot_steps | diagnose_only | mixed | ask_clarifying_questions | reject_invalid_image | ask_for_better_input | safety_warning_only",
    "target_component": "primary component or null",
    "target_components": [],
    "action_requested": "what the user wants to do",
    "needs_localization": true,
    "needs_steps": false,
    "needs_explanation": false,
    "clarification_needed": false,
    "clarifying_questions": [],
    "confidence": 0.9
  },
  "safety": {
    "safety_detected": false,
    "safety_keywords_found": [],
    "safety_message": null,
    "override_answer_type": false
  }
}"#;

/// Gates 1-3 in one call: validity, device, intent and safety.
pub fn combined_analysis(image: &ImagePart, query: &str, device_hint: Option<&str>) -> InferenceRequest {
    let hint = device_hint
        .filter(|h| !h.trim().is_empty())
        .map(|h| format!("\nDevice hint from user: {}", h.trim()))
        .unwrap_or_default();

    let text = format!(
        r#"You are FixIt AI's analysis stage. Look at the image and the user's question.

User query: "{query}"{hint}

1. Image validation: is this a physical electronic device? Judge image quality and
   list every device if several are visible. Screenshots, people, food and artwork
   are not devices; give a rejection_reason for them.
2. Device detection: name the specific device type, with brand and model only when
   the text or logo is readable. Give a confidence between 0.0 and 1.0
   (high >= 0.6, medium 0.3-0.6, low < 0.3) and list every visible component.
3. Intent: classify the primary intent and the answer_type that controls what is
   generated. Use "mixed" only when the user asks two distinct questions.
   Extract every target component the query names.
4. Safety: burning, smoke, melting, swollen batteries, sparking, exposed mains or
   visible burn marks set safety_detected and answer_type "safety_warning_only".

A blurry or dark image sets answer_type "ask_for_better_input". Several devices with
an ambiguous query set clarification_needed.

Return only JSON with this structure:
{schema}"#,
        query = query,
        hint = hint,
        schema = ANALYSIS_SCHEMA,
    );

    InferenceRequest::builder()
        .text(text)
        .image(image.clone())
        .temperature(ANALYSIS_TEMPERATURE)
        .max_output_tokens(ANALYSIS_MAX_TOKENS)
        .build()
}

/// Gate 4: staged visibility, rough location and bounding box for one target.
pub fn localization(image: &ImagePart, target: &str, device: &DeviceAssessment) -> InferenceRequest {
    let mut context = String::new();
    if device.is_recognized() {
        context = format!("This device was identified as: {}", device.device_type());
        if !device.components.is_empty() {
            let shown: Vec<&str> = device.components.iter().take(5).map(String::as_str).collect();
            context.push_str(&format!("\nAlready detected components: {}", shown.join(", ")));
        }
    }

    let text = format!(
        r#"You are FixIt AI's spatial reasoning stage.

Locate "{target}" in this image.
{context}

Stage 1, visibility: is the component visible at all, and could it exist on this device?
Stage 2, rough location: where is it and what is it next to? Only if stage 1 passed.
Stage 3, bounding box: only if you can clearly see it.

If it is not visible say so, and describe where it typically sits on this kind of device.

Return JSON:
{{
  "component_visible": true,
  "component_name": "{target}",
  "visibility_status": "visible | not_visible | partially_visible | too_blurry | not_applicable | wrong_angle",
  "visibility_reason": "why it is or is not visible",
  "spatial_description": "e.g. bottom right corner, next to the power port",
  "bounding_box": null or {{"ymin": 0, "xmin": 0, "ymax": 1000, "xmax": 1000}},
  "confidence": 0.0,
  "suggested_action": "what the user should do if it was not found",
  "visible_alternatives": ["components that are visible"],
  "typical_location": "where this component usually is on this device type"
}}

Coordinates are on a 0-1000 scale. Only give bounding_box when confidence > 0.4."#,
        target = target,
        context = context,
    );

    InferenceRequest::builder()
        .text(text)
        .image(image.clone())
        .temperature(ANALYSIS_TEMPERATURE)
        .build()
}

/// Everything step synthesis needs to know about the request.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub query: &'a str,
    pub device: &'a DeviceAssessment,
    pub intent: &'a QueryIntent,
    pub target: Option<&'a str>,
    pub spatial: Option<&'a SpatialAssessment>,
    pub manual_context: &'a [String],
}

impl StepContext<'_> {
    fn device_label(&self) -> String {
        let mut label = self.device.device_type().to_string();
        if let Some(brand) = self.device.visible_brand() {
            label.push_str(&format!(" ({}", brand));
            if let Some(model) = self.device.visible_model() {
                label.push_str(&format!(" {}", model));
            }
            label.push(')');
        }
        label
    }

    fn component_line(&self) -> String {
        let Some(target) = self.target else {
            return String::new();
        };
        let mut line = format!("Target: {}", target);
        match self.spatial {
            Some(s) if s.component_visible => {
                if let Some(desc) = &s.spatial_description {
                    line.push_str(&format!(" - Located at: {}", desc));
                }
            }
            Some(s) => {
                if let Some(loc) = &s.typical_location {
                    line.push_str(&format!(" - Typically located: {}", loc));
                }
            }
            None => {}
        }
        line
    }

    fn manual_block(&self) -> String {
        if self.manual_context.is_empty() {
            "No specific manual pages found.".to_string()
        } else {
            self.manual_context.join("\n\n")
        }
    }
}

fn focus_for(query_type: QueryType) -> &'static str {
    match query_type {
        QueryType::Identify => "Focus on what the component is, its purpose and how it relates to the device.",
        QueryType::Locate => "Focus on the exact location, nearby landmarks and how to reach it if hidden.",
        QueryType::Procedure => "Focus on clear sequential steps, tools needed and common pitfalls.",
        QueryType::Troubleshoot => "Focus on diagnosing the issue, a step-by-step fix and when to get help.",
        QueryType::Explain => "Focus on how the device works and what each major component does.",
        QueryType::Compare | QueryType::Unclear => "",
    }
}

const STEP_SCHEMA: &str = r#"{
  "issue_diagnosis": "concise explanation of what is likely happening",
  "troubleshooting_steps": [
    {"step_number": 1, "instruction": "clear action", "visual_cue": "what to look for",
     "estimated_time": "e.g. 30 seconds", "safety_note": "precautions if any"}
  ],
  "audio_instructions": "friendly paragraph combining the steps",
  "warnings": ["important warnings"],
  "when_to_seek_help": "when to consult a professional",
  "likely_causes": ["possible causes"],
  "severity": "low | medium | high",
  "explanation": {"overview": "how it works", "component_functions": [{"name": "", "purpose": ""}], "data_flow": ""}
}"#;

/// High confidence: detailed device-specific steps.
pub fn detailed_steps(ctx: &StepContext<'_>) -> InferenceRequest {
    let text = format!(
        r#"You are FixIt AI's repair technician.
Write specific, actionable troubleshooting steps.

User query: {query}
Device: {device}
{component}

Manual context:
{manual}

{focus}

Return JSON:
{schema}

Keep steps safe for beginners, specific to this device, grounded in visible components and in logical order."#,
        query = ctx.query,
        device = ctx.device_label(),
        component = ctx.component_line(),
        manual = ctx.manual_block(),
        focus = focus_for(ctx.intent.query_type),
        schema = STEP_SCHEMA,
    );
    synthesis_request(text)
}

/// Medium confidence: general guidance with explicit caveats.
pub fn cautious_steps(ctx: &StepContext<'_>) -> InferenceRequest {
    let device = ctx.device.device_type();
    let text = format!(
        r#"You are FixIt AI's repair assistant.
The user asked: "{query}"
This might be a {device}, but the identification is uncertain.
Reasoning: {reasoning}
{component}

Manual context:
{manual}

Give general guidance that applies to most {device}s, put a caveat on each step
where the uncertainty matters, suggest how to verify the device type and keep to
safe universal steps.

Return JSON:
{{
  "issue_diagnosis": "assessment, noting the uncertainty",
  "confidence_note": "the uncertainty, explained to the user",
  "troubleshooting_steps": [
    {{"step_number": 1, "instruction": "general safe step", "visual_cue": "what to look for",
     "estimated_time": "estimate", "caveat": "uncertainty about this step"}}
  ],
  "audio_instructions": "friendly paragraph that acknowledges the uncertainty",
  "clarifying_questions": ["questions to verify the device type"],
  "general_safety_tip": "one universal safety tip"
}}"#,
        query = ctx.query,
        device = device,
        reasoning = ctx.device.reasoning.as_deref().unwrap_or("not given"),
        component = ctx.component_line(),
        manual = ctx.manual_block(),
    );
    synthesis_request(text)
}

/// Low confidence: questions that would pin the device down.
pub fn diagnostic_questions(ctx: &StepContext<'_>) -> InferenceRequest {
    let text = format!(
        r#"You are FixIt AI's intake assistant. The device could not be identified reliably.
The user asked: "{query}"
What the image shows: {seen}

Do not give repair steps. Ask the questions that would identify the device and the issue.

Return JSON:
{{
  "issue_diagnosis": "what is unclear",
  "clarifying_questions": ["question"],
  "audio_instructions": "short friendly request for more information"
}}"#,
        query = ctx.query,
        seen = ctx.device.what_i_see.as_deref().unwrap_or("unclear"),
    );
    synthesis_request(text)
}

/// No device: help the user take a usable photo.
pub fn onboarding(ctx: &StepContext<'_>) -> InferenceRequest {
    let text = format!(
        r#"You are FixIt AI's onboarding assistant. No troubleshootable device was found.
The user asked: "{query}"
What the image shows: {seen}

Explain briefly what FixIt can help with and how to photograph a device.

Return JSON:
{{
  "issue_diagnosis": "why no device could be identified",
  "troubleshooting_steps": [{{"step_number": 1, "instruction": "", "visual_cue": "", "estimated_time": ""}}],
  "audio_instructions": "short friendly guidance"
}}"#,
        query = ctx.query,
        seen = ctx.device.what_i_see.as_deref().unwrap_or("nothing recognizable"),
    );
    synthesis_request(text)
}

fn synthesis_request(text: String) -> InferenceRequest {
    InferenceRequest::builder()
        .text(text)
        .temperature(SYNTHESIS_TEMPERATURE)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImagePart {
        ImagePart::new("image/png", vec![0u8; 8], 640, 480)
    }

    #[test]
    fn test_combined_analysis_request() {
        let req = combined_analysis(&image(), "where is the reset button", Some("router"));
        assert!(req.has_image());
        assert_eq!(req.max_output_tokens(), 3000);
        assert!(req.text().contains("where is the reset button"));
        assert!(req.text().contains("Device hint from user: router"));
    }

    #[test]
    fn test_blank_hint_is_omitted() {
        let req = combined_analysis(&image(), "q", Some("  "));
        assert!(!req.text().contains("Device hint"));
    }

    #[test]
    fn test_detailed_steps_carry_context() {
        let device = DeviceAssessment {
            device_type: Some("Router".into()),
            brand: Some("Netgear".into()),
            model: Some("R7000".into()),
            ..Default::default()
        };
        let intent = QueryIntent::default();
        let spatial = SpatialAssessment {
            component: "reset button".into(),
            component_visible: true,
            spatial_description: Some("rear panel, left of the power jack".into()),
            ..Default::default()
        };
        let manual = vec!["Hold reset for 10 seconds.".to_string()];
        let ctx = StepContext {
            query: "how do I reset it",
            device: &device,
            intent: &intent,
            target: Some("reset button"),
            spatial: Some(&spatial),
            manual_context: &manual,
        };

        let req = detailed_steps(&ctx);
        let text = req.text();
        assert!(!req.has_image());
        assert_eq!(req.temperature(), SYNTHESIS_TEMPERATURE);
        assert!(text.contains("Router (Netgear R7000)"));
        assert!(text.contains("Located at: rear panel"));
        assert!(text.contains("Hold reset for 10 seconds."));
    }
}
