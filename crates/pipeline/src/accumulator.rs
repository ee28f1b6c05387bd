//! Per-request pipeline state.

use fixit_core::{CombinedAnalysis, ConfidenceLevel, QuotaNotice, ResponseScenario, SpatialAssessment, StepPlan};

/// The five gates, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Validity,
    DeviceConfidence,
    Intent,
    Localization,
    StepSynthesis,
}

impl Gate {
    pub const ORDER: [Gate; 5] = [
        Gate::Validity,
        Gate::DeviceConfidence,
        Gate::Intent,
        Gate::Localization,
        Gate::StepSynthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validity => "validity",
            Self::DeviceConfidence => "device_confidence",
            Self::Intent => "intent",
            Self::Localization => "localization",
            Self::StepSynthesis => "step_synthesis",
        }
    }
}

/// What a gate tells the orchestrator to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// Records accumulated as gates run.
#[derive(Debug, Default)]
pub struct PipelineState {
    pub analysis: Option<CombinedAnalysis>,
    pub confidence: Option<ConfidenceLevel>,
    pub needs_clarification: bool,
    pub manual_context: Vec<String>,
    /// Component the request is about, explicit or derived.
    pub target: Option<String>,
    pub spatial: Option<SpatialAssessment>,
    pub plan: Option<StepPlan>,
    /// Set when any call after Gate 1 came back quota-exhausted.
    pub quota: Option<QuotaNotice>,
    pub gates_run: Vec<Gate>,
    scenario: Option<ResponseScenario>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the terminal scenario. Only the first call has effect.
    pub fn terminate(&mut self, scenario: ResponseScenario) -> Flow {
        if self.scenario.is_none() {
            self.scenario = Some(scenario);
        }
        Flow::Terminate
    }

    pub fn scenario(&self) -> Option<ResponseScenario> {
        self.scenario
    }

    pub fn is_terminated(&self) -> bool {
        self.scenario.is_some()
    }

    /// Close out a run that passed every gate.
    pub fn finish(&mut self) -> ResponseScenario {
        if self.scenario.is_none() {
            self.scenario = Some(if self.needs_clarification {
                ResponseScenario::NeedsClarification
            } else {
                ResponseScenario::Success
            });
        }
        self.scenario.unwrap_or(ResponseScenario::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_is_set_once() {
        let mut state = PipelineState::new();
        assert_eq!(state.terminate(ResponseScenario::LowConfidence), Flow::Terminate);
        state.terminate(ResponseScenario::InvalidImage);
        assert_eq!(state.scenario(), Some(ResponseScenario::LowConfidence));
        assert_eq!(state.finish(), ResponseScenario::LowConfidence);
    }

    #[test]
    fn test_finish_reflects_clarification() {
        let mut state = PipelineState::new();
        state.needs_clarification = true;
        assert_eq!(state.finish(), ResponseScenario::NeedsClarification);

        let mut clean = PipelineState::new();
        assert!(!clean.is_terminated());
        assert_eq!(clean.finish(), ResponseScenario::Success);
    }
}
