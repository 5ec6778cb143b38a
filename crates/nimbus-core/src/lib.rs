#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Nimbus Core
//!
//! Foundational types for coordinating with a remote object-storage service:
//! the tagged [`Error`], [`AccessCondition`] preconditions, lease, paging and
//! copy value types, typed reads over [`HeaderMap`] and the collaborator
//! traits ([`ResourceTransport`], [`PageFetcher`], [`AttributeFetcher`]) that
//! the higher-level coordinators are generic over.
//!
//! This crate performs no I/O of its own.

/// Tracing target for retry operations.
pub const TRACING_TARGET_RETRY: &str = "nimbus_core::retry";

mod error;

pub mod condition;
pub mod copy;
pub mod headers;
pub mod lease;
pub mod paging;
pub mod prelude;
pub mod retry;
pub mod transport;

pub use http::{HeaderMap, HeaderName, HeaderValue, Method};

pub use crate::condition::{AccessCondition, AccessConditionBuilder};
pub use crate::error::{BoxedError, Error, ErrorKind, Result};
pub use crate::headers::HeaderMapExt;
pub use crate::retry::RetryPolicy;
pub use crate::transport::{
    AttributeFetcher, PageFetcher, ResourceRequest, ResourceResponse, ResourceTransport,
};
