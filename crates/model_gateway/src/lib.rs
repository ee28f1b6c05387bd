//! Inference Gateway for FixIt.
//!
//! This crate provides:
//! - The single channel through which remote inference calls pass
//! - Response caching, per-minute rate limiting and daily quota accounting
//! - A quota circuit breaker and bounded transient retry
//! - Recovery of structured output from loosely formatted provider text
//! - A Gemini REST provider

pub mod config;
pub mod gateway;
pub mod gemini;
pub mod policy;
pub mod recovery;
pub mod state;

pub use config::GatewayLimits;
pub use gateway::{InferenceGateway, InferenceOutcome, QuotaStatus};
pub use gemini::GeminiProvider;
pub use policy::{ErrorClass, RetryDecision, RetryPolicy};
