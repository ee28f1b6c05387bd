//! Routing policy: confidence buckets and gate conditions.

use fixit_core::config::PipelineConfig;
use fixit_core::{ConfidenceLevel, DeviceAssessment, QueryIntent, QueryType};

/// Verbs that force step synthesis even for locate queries.
pub const ACTION_VERBS: &[&str] = &["remove", "replace", "install", "repair", "fix"];

/// Thresholds that drive gate decisions.
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    pub high_confidence: f64,
    pub medium_confidence: f64,
    pub localization_threshold: f64,
    pub manual_passages: usize,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelinePolicy {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            high_confidence: cfg.high_confidence,
            medium_confidence: cfg.medium_confidence,
            localization_threshold: cfg.localization_threshold,
            manual_passages: cfg.manual_passages,
        }
    }
}

impl PipelinePolicy {
    pub fn bucket(&self, confidence: f64) -> ConfidenceLevel {
        ConfidenceLevel::from_score(confidence, self.medium_confidence, self.high_confidence)
    }

    /// Whether Gate 4 should run, with the reason for the log.
    pub fn should_localize(&self, device: &DeviceAssessment, intent: &QueryIntent) -> (bool, &'static str) {
        if device.confidence() < self.medium_confidence {
            return (false, "device confidence too low for localization");
        }
        if !device.is_recognized() {
            return (false, "device type not recognized");
        }
        if !intent.needs_localization && intent.target().is_none() {
            return (false, "query does not need localization");
        }
        (true, "localization appropriate")
    }

    /// Gate 5 is skipped only for pure locate queries that asked for no steps.
    pub fn should_skip_steps(&self, intent: &QueryIntent, query: &str) -> bool {
        intent.query_type == QueryType::Locate && !intent.wants_steps() && !requests_action(intent, query)
    }

    /// Locate intent with no action requested.
    pub fn is_pure_locate(&self, intent: &QueryIntent, query: &str) -> bool {
        intent.query_type == QueryType::Locate && !requests_action(intent, query)
    }
}

/// Any allow-listed action verb in the requested action or the query.
pub fn requests_action(intent: &QueryIntent, query: &str) -> bool {
    let action = intent.action_requested.as_deref().unwrap_or_default();
    contains_action_verb(action) || contains_action_verb(query)
}

fn contains_action_verb(text: &str) -> bool {
    words(text).iter().any(|word| ACTION_VERBS.contains(&word.as_str()))
}

/// Lowercased alphanumeric words of `text`.
pub fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether `phrase` occurs in `tokens` as a run of whole words.
pub fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let needle = words(phrase);
    !needle.is_empty() && tokens.windows(needle.len()).any(|run| run == needle.as_slice())
}
