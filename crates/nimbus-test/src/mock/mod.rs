//! Mock implementations of the storage collaborators.
//!
//! Lease and copy timing is measured with [`tokio::time::Instant`], so tests
//! running with a paused clock can step through expiry and break periods
//! with `tokio::time::advance`.

mod copy;
mod lease;
mod listing;
mod service;

pub use copy::MockCopyPlan;
pub use listing::MockListing;
pub use service::MockStorageService;
