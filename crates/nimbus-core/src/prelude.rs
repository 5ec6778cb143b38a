//! Convenient re-exports for common use.

pub use http::{HeaderMap, HeaderName, HeaderValue, Method};

pub use crate::condition::AccessCondition;
pub use crate::copy::{CopyOperationState, CopyRequest, CopyStatus, ResourceAttributes};
pub use crate::error::{BoxedError, Error, ErrorKind, Result};
pub use crate::headers::HeaderMapExt;
pub use crate::lease::{LeaseAction, LeaseDuration, LeaseId, LeaseState, LeaseStatus, ResourceKind};
pub use crate::paging::{
    ContinuationToken, ListInclude, ListOptions, PageRequest, PageResponse, Segment,
};
pub use crate::retry::RetryPolicy;
pub use crate::transport::{
    AttributeFetcher, PageFetcher, ResourceRequest, ResourceResponse, ResourceTransport,
};
