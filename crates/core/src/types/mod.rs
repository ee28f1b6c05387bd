//! Core type definitions for FixIt.
//!
//! - `request`: what goes to the inference provider
//! - `assessment`: what the provider sends back
//! - `response`: what the caller receives

pub mod assessment;
pub mod request;
pub mod response;

pub use assessment::*;
pub use request::*;
pub use response::*;
