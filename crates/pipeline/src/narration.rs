//! Narration generator.
//!
//! Builds the spoken `audio_instructions` from an assembled response. The
//! result is never empty: the builder for the answer type runs first, then
//! the troubleshoot builder, then a generic one-line summary.

use fixit_core::{AnswerType, LocalizationStatus, TroubleshootResponse};

const MAX_SPOKEN_STEPS: usize = 5;
const MAX_SPOKEN_COMPONENTS: usize = 5;
const MAX_SPOKEN_QUESTIONS: usize = 3;
const MAX_SPOKEN_CAUSES: usize = 3;
const MAX_SPOKEN_FUNCTIONS: usize = 3;

/// Turns a response into a spoken script.
#[derive(Debug, Clone)]
pub struct Narrator {
    medium: f64,
    high: f64,
}

impl Default for Narrator {
    fn default() -> Self {
        Self::new(0.3, 0.6)
    }
}

impl Narrator {
    pub fn new(medium: f64, high: f64) -> Self {
        Self { medium, high }
    }

    pub fn narrate(&self, resp: &TroubleshootResponse) -> String {
        let selected = match resp.answer_type {
            AnswerType::LocateOnly => locate(resp),
            AnswerType::IdentifyOnly => self.identify(resp),
            AnswerType::ExplainOnly => explain(resp),
            AnswerType::TroubleshootSteps => troubleshoot(resp),
            AnswerType::DiagnoseOnly => diagnose(resp),
            AnswerType::Mixed => mixed(resp),
            AnswerType::AskClarifyingQuestions => Some(clarification(resp)),
            AnswerType::RejectInvalidImage => Some(rejection(resp)),
            AnswerType::AskForBetterInput => Some(better_input(resp)),
            AnswerType::SafetyWarningOnly => Some(safety(resp)),
            AnswerType::Unrecognized => None,
        };

        if let Some(script) = selected.and_then(non_empty) {
            return script;
        }

        tracing::debug!(answer_type = ?resp.answer_type, "Narration fell back to troubleshoot builder");
        troubleshoot(resp)
            .and_then(non_empty)
            .unwrap_or_else(|| fallback(resp))
    }

    fn identify(&self, resp: &TroubleshootResponse) -> Option<String> {
        let mut parts = Vec::new();
        let device = &resp.device_identified;

        if resp.device_confidence >= self.high {
            parts.push(format!("This appears to be a {}.", device));
        } else if resp.device_confidence >= self.medium {
            parts.push(format!(
                "I think this might be a {}, but I'm not entirely certain.",
                device
            ));
        } else {
            parts.push("I'm having trouble identifying this device.".to_string());
        }

        if !resp.detected_components.is_empty() {
            parts.push(format!(
                "I can see the following components: {}.",
                first_n(&resp.detected_components, MAX_SPOKEN_COMPONENTS)
            ));
        }

        if let Some(brand) = &resp.brand {
            parts.push(format!("The brand appears to be {}.", brand));
            if let Some(model) = &resp.model {
                parts.push(format!("The model is {}.", model));
            }
        }

        join(parts)
    }
}

fn locate(resp: &TroubleshootResponse) -> Option<String> {
    let mut parts = Vec::new();
    let results = &resp.localization_results;

    for r in results.iter().filter(|r| r.status == LocalizationStatus::Found) {
        let desc = r.spatial_description.as_deref().unwrap_or("in the image");
        parts.push(format!("I found the {} {}.", r.target, desc));
    }

    for r in results.iter().filter(|r| r.status != LocalizationStatus::Found) {
        let line = match r.status {
            LocalizationStatus::NotVisible => format!(
                "The {} is not visible from this angle. {}",
                r.target,
                r.suggested_action
                    .as_deref()
                    .unwrap_or("Try photographing from a different angle.")
            ),
            LocalizationStatus::NotPresent => format!(
                "The {} does not appear to be present. {}",
                r.target,
                r.reasoning
                    .as_deref()
                    .unwrap_or("It does not appear to be present on this device.")
            ),
            LocalizationStatus::Ambiguous => format!(
                "I'm not sure which {} you mean. {}",
                r.target,
                r.reasoning.as_deref().unwrap_or("I see multiple similar components.")
            ),
            LocalizationStatus::Found => continue,
        };
        parts.push(line);
    }

    join(parts)
}

fn explain(resp: &TroubleshootResponse) -> Option<String> {
    let explanation = resp.explanation.as_ref()?;
    let mut parts = Vec::new();

    if !explanation.overview.trim().is_empty() {
        parts.push(explanation.overview.clone());
    }
    for cf in explanation
        .component_functions
        .iter()
        .filter(|cf| !cf.name.trim().is_empty() && !cf.purpose.trim().is_empty())
        .take(MAX_SPOKEN_FUNCTIONS)
    {
        parts.push(format!("The {} {}.", cf.name, cf.purpose.trim_end_matches('.')));
    }
    if let Some(flow) = &explanation.data_flow {
        parts.push(flow.clone());
    }

    join(parts)
}

fn troubleshoot(resp: &TroubleshootResponse) -> Option<String> {
    let mut parts = Vec::new();

    match &resp.diagnosis {
        Some(d) => {
            if let Some(issue) = &d.issue {
                parts.push(issue.clone());
            }
            if let Some(warning) = &d.safety_warning {
                parts.push(format!("Safety warning: {}", warning));
            }
        }
        None => {
            if let Some(issue) = &resp.issue_diagnosis {
                parts.push(issue.clone());
            }
        }
    }

    let steps = &resp.troubleshooting_steps;
    if !steps.is_empty() {
        parts.push(format!("Here are {} steps to help fix this.", steps.len()));
        for step in steps
            .iter()
            .filter(|s| !s.instruction.trim().is_empty())
            .take(MAX_SPOKEN_STEPS)
        {
            parts.push(format!("Step {}: {}", step.step_number, step.instruction));
        }
    }

    if let Some(help) = &resp.when_to_seek_help {
        parts.push(format!("Seek professional help if: {}", help));
    }

    join(parts)
}

fn diagnose(resp: &TroubleshootResponse) -> Option<String> {
    let d = resp.diagnosis.as_ref()?;
    let mut parts = Vec::new();

    if let Some(issue) = &d.issue {
        parts.push(issue.clone());
    }
    if let Some(severity) = &d.severity {
        parts.push(format!("The severity appears to be {}.", severity));
    }
    if let Some(warning) = &d.safety_warning {
        parts.push(format!("Important safety note: {}", warning));
    }
    if !d.possible_causes.is_empty() {
        parts.push(format!(
            "Possible causes include: {}.",
            first_n(&d.possible_causes, MAX_SPOKEN_CAUSES)
        ));
    }

    join(parts)
}

fn mixed(resp: &TroubleshootResponse) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(e) = &resp.explanation {
        if !e.overview.trim().is_empty() {
            parts.push(e.overview.clone());
        }
    }
    if let Some(issue) = resp.diagnosis.as_ref().and_then(|d| d.issue.clone()) {
        parts.push(issue);
    }
    if !resp.troubleshooting_steps.is_empty() {
        parts.push(format!(
            "I've prepared {} steps to address this.",
            resp.troubleshooting_steps.len()
        ));
    }

    let found: Vec<&str> = resp
        .localization_results
        .iter()
        .filter(|r| r.status == LocalizationStatus::Found)
        .map(|r| r.target.as_str())
        .collect();
    if !found.is_empty() {
        parts.push(format!("I located: {}.", found.join(", ")));
    }

    join(parts)
}

fn clarification(resp: &TroubleshootResponse) -> String {
    let questions: Vec<&str> = resp
        .clarifying_questions
        .iter()
        .map(String::as_str)
        .filter(|q| !q.trim().is_empty())
        .take(MAX_SPOKEN_QUESTIONS)
        .collect();

    if questions.is_empty() {
        return "I need a bit more information. Could you describe what you're looking for or what issue you're experiencing?"
            .to_string();
    }
    format!("I need more information to help you. {}", questions.join(" "))
}

fn rejection(resp: &TroubleshootResponse) -> String {
    match resp.message.as_deref().filter(|m| !m.trim().is_empty()) {
        Some(message) => format!(
            "{} FixIt AI helps troubleshoot electronic devices like routers, printers, and appliances. Please upload a photo of the actual device you need help with.",
            message
        ),
        None => "This image doesn't appear to show an electronic device. Please upload a photo of the device you need help troubleshooting."
            .to_string(),
    }
}

fn better_input(resp: &TroubleshootResponse) -> String {
    match resp.message.as_deref().filter(|m| !m.trim().is_empty()) {
        Some(message) => format!(
            "{} Please retake the photo with better lighting, a steady camera, and focus on the device from about 6 to 12 inches away.",
            message
        ),
        None => "The image quality isn't sufficient for analysis. Please retake the photo with better lighting and make sure the device is clearly visible."
            .to_string(),
    }
}

fn safety(resp: &TroubleshootResponse) -> String {
    let mut parts = vec!["Warning! This situation may require professional help.".to_string()];

    let notice = resp.safety.as_ref().map(|s| s.message.clone());
    if let Some(message) = &notice {
        parts.push(message.clone());
    }
    if let Some(warning) = resp.diagnosis.as_ref().and_then(|d| d.safety_warning.clone()) {
        if notice.as_ref() != Some(&warning) {
            parts.push(warning);
        }
    }

    parts.push(
        "Do not attempt to repair this yourself. Contact a qualified professional or your device manufacturer for assistance."
            .to_string(),
    );
    parts.join(" ")
}

fn fallback(resp: &TroubleshootResponse) -> String {
    let device = resp.device_identified.trim();
    let named = if device.is_empty()
        || device.eq_ignore_ascii_case(fixit_core::UNKNOWN_DEVICE)
        || device.eq_ignore_ascii_case(fixit_core::NOT_A_DEVICE)
    {
        "your device"
    } else {
        device
    };
    format!(
        "I've completed the analysis of {}. Please review the results on screen for detailed information.",
        named
    )
}

fn first_n(items: &[String], n: usize) -> String {
    items.iter().take(n).map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn join(parts: Vec<String>) -> Option<String> {
    let parts: Vec<String> = parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn non_empty(script: String) -> Option<String> {
    let trimmed = script.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
