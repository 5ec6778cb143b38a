#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Nimbus Storage
//!
//! Client-side coordination on top of a remote object-storage API:
//!
//! - [`LeaseCoordinator`]: pessimistic locking through server-enforced leases.
//! - [`SegmentedEnumerator`]: resumable, pull-based listing over continuation tokens.
//! - [`CopyMonitor`]: starts a server-side copy and polls it to completion.
//!
//! Every component takes its collaborators explicitly (a
//! [`ResourceTransport`](nimbus_core::ResourceTransport), a
//! [`PageFetcher`](nimbus_core::PageFetcher) or an
//! [`AttributeFetcher`](nimbus_core::AttributeFetcher)) so tests can swap in
//! the in-memory service from `nimbus-test`.

/// Tracing target for lease operations.
pub const TRACING_TARGET_LEASE: &str = "nimbus_storage::lease";

/// Tracing target for paged listings.
pub const TRACING_TARGET_PAGING: &str = "nimbus_storage::paging";

/// Tracing target for copy operations.
pub const TRACING_TARGET_COPY: &str = "nimbus_storage::copy";

mod classify;
mod conditional;

pub mod copy;
pub mod lease;
pub mod paging;

#[doc(hidden)]
pub mod prelude;

pub use crate::classify::{classify, classify_response};
pub use crate::conditional::send_conditional;
pub use crate::copy::{CopyMonitor, CopyMonitorConfig, HeadAttributeFetcher};
pub use crate::lease::LeaseCoordinator;
pub use crate::paging::SegmentedEnumerator;
