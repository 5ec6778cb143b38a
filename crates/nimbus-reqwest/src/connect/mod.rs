//! Reqwest transport module.
//!
//! This module wraps the `reqwest` crate to carry single storage requests.

mod client;
mod config;

pub use client::ReqwestTransport;
pub use config::ReqwestConfig;

/// Tracing target for reqwest transport operations.
pub const TRACING_TARGET: &str = "nimbus_reqwest::client";
