#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Nimbus Test
//!
//! In-memory stand-ins for the storage service, used by the tests of the
//! other nimbus crates.
//!
//! - [`MockStorageService`]: a [`ResourceTransport`](nimbus_core::ResourceTransport)
//!   that keeps containers and blobs in memory and enforces leases,
//!   conditional headers and asynchronous copies.
//! - [`MockListing`]: a [`PageFetcher`](nimbus_core::PageFetcher) over a
//!   fixed list of names with marker-based continuation.

mod mock;

pub use mock::{MockCopyPlan, MockListing, MockStorageService};
