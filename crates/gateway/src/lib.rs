//! HTTP surface for FixIt.
//!
//! This crate provides:
//! - The axum router for troubleshooting and quota administration
//! - Decoding and normalization of uploaded images

pub mod server;
pub mod vision;

pub use server::{build_router, AppState, GatewayServer};
pub use vision::ImageProcessor;
