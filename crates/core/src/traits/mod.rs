//! Core traits for FixIt.
//!
//! - `llm`: the inference provider seam used by the gateway
//! - `retrieval`: the manual-corpus collaborator used by the pipeline

pub mod llm;
pub mod retrieval;

pub use llm::*;
pub use retrieval::*;
