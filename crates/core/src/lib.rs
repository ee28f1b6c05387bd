//! Core types, traits, and error definitions for FixIt.
//!
//! This crate provides the building blocks shared by the inference gateway,
//! the gate pipeline and the HTTP surface.

pub mod config;
pub mod error;
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Error, ProviderError, Result};
pub use traits::*;
pub use types::*;
