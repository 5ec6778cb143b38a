//! Convenient re-exports for common use.

pub use nimbus_core::prelude::*;

pub use crate::copy::{CopyMonitor, CopyMonitorConfig, HeadAttributeFetcher};
pub use crate::lease::LeaseCoordinator;
pub use crate::paging::SegmentedEnumerator;
pub use crate::send_conditional;
