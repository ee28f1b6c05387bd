#![deny(unused)]
//! Governance for FixIt.
//!
//! This crate provides:
//! - Tracing subscriber setup with optional OTLP export
//! - Prometheus metrics recorder and HTTP metric helpers
//! - The administrative credential guard

pub mod admin;
pub mod metrics;
pub mod tracing_layer;

pub use admin::AdminGuard;
pub use metrics::{setup_metrics_recorder, track_request};
pub use tracing_layer::configure_tracing;
