//! Reqwest-based [`ResourceTransport`](nimbus_core::ResourceTransport) for
//! nimbus storage clients.
//!
//! The transport stamps every request with the service version and date,
//! appends an optional shared access signature and returns every server
//! response as-is, leaving classification to the coordinators.
//!
//! # Example
//!
//! ```rust,ignore
//! use nimbus_reqwest::{ReqwestConfig, ReqwestTransport};
//! use nimbus_storage::LeaseCoordinator;
//!
//! let transport = ReqwestTransport::new(ReqwestConfig::default().with_sas_token(sas))?;
//! let coordinator = LeaseCoordinator::blob(transport.into_shared(), blob_url);
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod connect;
mod error;

pub use crate::connect::{ReqwestConfig, ReqwestTransport, TRACING_TARGET};
pub use crate::error::{Error, Result};
