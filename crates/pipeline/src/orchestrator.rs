//! The five-gate pipeline.

use std::sync::Arc;
use std::time::Instant;

use metrics::counter;

use fixit_core::config::PipelineConfig;
use fixit_core::{
    CombinedAnalysis, ConfidenceLevel, ImagePart, ManualRetriever, QueryType, QuotaNotice, ResponseScenario, Result,
    TroubleshootResponse,
};
use fixit_model_gateway::InferenceGateway;

use crate::accumulator::{Flow, Gate, PipelineState};
use crate::localization::{resolve_target, SpatialLocator};
use crate::narration::Narrator;
use crate::policy::PipelinePolicy;
use crate::prompts::{self, StepContext};
use crate::steps::{self, StepStrategy, StepSynthesizer};
use crate::synthesizer::ResponseSynthesizer;

/// One troubleshooting request, image already decoded and normalized.
#[derive(Debug, Clone)]
pub struct TroubleshootInput {
    pub image: ImagePart,
    pub query: String,
    pub device_hint: Option<String>,
    /// Dimensions used for bounding boxes. Defaults to the image's own.
    pub dimensions: Option<(u32, u32)>,
}

impl TroubleshootInput {
    pub fn new(image: ImagePart, query: impl Into<String>) -> Self {
        Self {
            image,
            query: query.into(),
            device_hint: None,
            dimensions: None,
        }
    }

    pub fn with_device_hint(mut self, hint: impl Into<String>) -> Self {
        self.device_hint = Some(hint.into());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }

    fn dims(&self) -> (u32, u32) {
        self.dimensions.unwrap_or((self.image.width, self.image.height))
    }
}

/// Sequences the gates for one request and hands the result to the
/// synthesizer and narrator.
pub struct GatePipeline {
    gateway: Arc<InferenceGateway>,
    retriever: Arc<dyn ManualRetriever>,
    policy: PipelinePolicy,
    locator: SpatialLocator,
    steps: StepSynthesizer,
    synthesizer: ResponseSynthesizer,
    narrator: Narrator,
}

impl GatePipeline {
    pub fn new(gateway: Arc<InferenceGateway>, retriever: Arc<dyn ManualRetriever>, config: &PipelineConfig) -> Self {
        Self::with_policy(gateway, retriever, PipelinePolicy::from(config))
    }

    pub fn with_policy(
        gateway: Arc<InferenceGateway>,
        retriever: Arc<dyn ManualRetriever>,
        policy: PipelinePolicy,
    ) -> Self {
        Self {
            gateway,
            retriever,
            locator: SpatialLocator::new(policy.localization_threshold),
            steps: StepSynthesizer::new(),
            synthesizer: ResponseSynthesizer::new(policy.clone()),
            narrator: Narrator::new(policy.medium_confidence, policy.high_confidence),
            policy,
        }
    }

    pub fn gateway(&self) -> &Arc<InferenceGateway> {
        &self.gateway
    }

    /// Run a request through the gates. Errors are reserved for gateway
    /// failures the pipeline cannot turn into a response.
    pub async fn run(&self, input: &TroubleshootInput) -> Result<TroubleshootResponse> {
        let started = Instant::now();
        let mut state = PipelineState::new();

        tracing::info!(
            query = %input.query,
            device_hint = ?input.device_hint,
            width = input.image.width,
            height = input.image.height,
            "Troubleshoot request received"
        );

        for gate in Gate::ORDER {
            state.gates_run.push(gate);
            let flow = match gate {
                Gate::Validity => self.validity(input, &mut state).await?,
                Gate::DeviceConfidence => self.device_confidence(&mut state),
                Gate::Intent => self.intent(input, &mut state).await,
                Gate::Localization => self.localization(input, &mut state).await?,
                Gate::StepSynthesis => self.step_synthesis(input, &mut state).await?,
            };
            if flow == Flow::Terminate {
                tracing::info!(gate = gate.as_str(), scenario = ?state.scenario(), "Pipeline terminated");
                break;
            }
        }

        let scenario = state.finish();
        let mut response = self
            .synthesizer
            .assemble(scenario, &state, &input.query, input.dims());
        response.audio_instructions = self.narrator.narrate(&response);

        counter!("pipeline_requests_total", "scenario" => scenario.as_str()).increment(1);
        tracing::info!(
            scenario = %scenario,
            gates = state.gates_run.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Troubleshoot request complete"
        );
        Ok(response)
    }

    // =========================================================================
    // Gates
    // =========================================================================

    async fn validity(&self, input: &TroubleshootInput, state: &mut PipelineState) -> Result<Flow> {
        let request = prompts::combined_analysis(&input.image, &input.query, input.device_hint.as_deref());
        let Some(analysis) = self.gateway.call_as::<CombinedAnalysis>(&request).await? else {
            tracing::error!("Combined analysis unavailable, quota exhausted");
            state.quota = Some(QuotaNotice::default());
            return Ok(state.terminate(ResponseScenario::Error));
        };

        let valid = analysis.validation.is_valid;
        tracing::info!(
            valid,
            category = ?analysis.validation.image_category,
            quality = ?analysis.validation.image_quality,
            "Gate 1: validity"
        );
        state.analysis = Some(analysis);

        if !valid {
            return Ok(state.terminate(ResponseScenario::InvalidImage));
        }
        Ok(Flow::Continue)
    }

    fn device_confidence(&self, state: &mut PipelineState) -> Flow {
        let (confidence, not_a_device) = match &state.analysis {
            Some(analysis) => {
                let device = &analysis.device;
                tracing::info!(
                    device_type = device.device_type(),
                    confidence = device.confidence(),
                    "Gate 2: device confidence"
                );
                (device.confidence(), device.is_not_a_device())
            }
            None => return state.terminate(ResponseScenario::InvalidImage),
        };

        let bucket = self.policy.bucket(confidence);
        tracing::debug!(bucket = bucket.as_str(), "Confidence bucketed");
        state.confidence = Some(bucket);

        if not_a_device {
            return state.terminate(ResponseScenario::InvalidImage);
        }
        if bucket == ConfidenceLevel::Low {
            return state.terminate(ResponseScenario::LowConfidence);
        }
        Flow::Continue
    }

    async fn intent(&self, input: &TroubleshootInput, state: &mut PipelineState) -> Flow {
        let Some(analysis) = &state.analysis else {
            return Flow::Continue;
        };
        let intent = &analysis.query;
        let device = &analysis.device;

        tracing::info!(
            query_type = ?intent.query_type,
            answer_type = ?intent.answer_type,
            target = ?intent.target(),
            needs_localization = intent.needs_localization,
            needs_steps = intent.wants_steps(),
            "Gate 3: intent"
        );

        if intent.query_type == QueryType::Unclear && intent.clarification_needed {
            tracing::info!("Clarification needed, continuing with degraded answer");
            state.needs_clarification = true;
        }

        if device.is_recognized() {
            let device_type = device.device_type().to_string();
            let query = format!("{} {}", device_type, input.query);
            state.manual_context = match self
                .retriever
                .retrieve(&query, Some(&device_type), self.policy.manual_passages)
                .await
            {
                Ok(passages) => passages,
                Err(e) => {
                    tracing::warn!(error = %e, "Manual retrieval failed, continuing without context");
                    Vec::new()
                }
            };
            tracing::debug!(passages = state.manual_context.len(), "Manual context retrieved");
        }

        Flow::Continue
    }

    async fn localization(&self, input: &TroubleshootInput, state: &mut PipelineState) -> Result<Flow> {
        let Some(analysis) = &state.analysis else {
            return Ok(Flow::Continue);
        };
        let device = &analysis.device;
        let intent = &analysis.query;

        let (should, reason) = self.policy.should_localize(device, intent);
        tracing::info!(run = should, reason, "Gate 4: localization");
        if !should {
            state.target = intent.target().map(str::to_string);
            return Ok(Flow::Continue);
        }

        let target = resolve_target(intent.target(), &input.query, &device.components);
        let spatial = self
            .locator
            .locate(&self.gateway, &input.image, &target, input.dims(), device)
            .await?;
        let pure_locate = self.policy.is_pure_locate(intent, &input.query);

        state.target = Some(target);
        match spatial {
            None => {
                state.quota = Some(QuotaNotice::default());
                Ok(Flow::Continue)
            }
            Some(spatial) => {
                let missing = !spatial.component_visible;
                state.spatial = Some(spatial);
                if missing && pure_locate {
                    return Ok(state.terminate(ResponseScenario::ComponentNotFound));
                }
                Ok(Flow::Continue)
            }
        }
    }

    async fn step_synthesis(&self, input: &TroubleshootInput, state: &mut PipelineState) -> Result<Flow> {
        let Some(analysis) = &state.analysis else {
            return Ok(Flow::Continue);
        };
        let intent = &analysis.query;
        let device = &analysis.device;

        if self.policy.should_skip_steps(intent, &input.query) {
            tracing::info!("Gate 5: skipped, location-only request");
            state.plan = Some(steps::location_only_plan());
            return Ok(Flow::Continue);
        }

        let bucket = state.confidence.unwrap_or_else(|| self.policy.bucket(device.confidence()));
        let strategy = StepStrategy::select(device, bucket);
        tracing::info!(strategy = strategy.as_str(), "Gate 5: step synthesis");

        let ctx = StepContext {
            query: &input.query,
            device,
            intent,
            target: state.target.as_deref(),
            spatial: state.spatial.as_ref(),
            manual_context: &state.manual_context,
        };
        let outcome = self.steps.synthesize(&self.gateway, strategy, &ctx).await?;

        if outcome.quota.is_some() {
            state.quota = outcome.quota;
        }
        state.plan = Some(outcome.plan);
        Ok(Flow::Continue)
    }
}
