//! Gate pipeline for FixIt.
//!
//! This crate provides:
//! - The five-gate orchestrator that sequences gateway calls per request
//! - Localization and step-synthesis sub-flows
//! - The confidence-stratified response synthesizer
//! - The narration generator
//! - An in-memory manual index for retrieval

pub mod accumulator;
pub mod localization;
pub mod narration;
pub mod orchestrator;
pub mod policy;
pub mod prompts;
pub mod retrieval;
pub mod steps;
pub mod synthesizer;

pub use accumulator::{Flow, Gate, PipelineState};
pub use localization::SpatialLocator;
pub use narration::Narrator;
pub use orchestrator::{GatePipeline, TroubleshootInput};
pub use policy::PipelinePolicy;
pub use retrieval::InMemoryManualIndex;
pub use steps::{StepStrategy, StepSynthesizer};
pub use synthesizer::ResponseSynthesizer;
