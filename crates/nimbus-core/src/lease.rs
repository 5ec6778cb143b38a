//! Lease identifiers, durations and the client-side view of a lease.

use std::time::Duration;

use derive_more::Display;
use http::HeaderValue;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumString, IntoStaticStr};
use url::Url;
use uuid::Uuid;

use crate::{Error, Result};

/// Shortest finite lease the service grants, in seconds.
pub const MIN_LEASE_SECS: u32 = 15;

/// Longest finite lease the service grants, in seconds.
pub const MAX_LEASE_SECS: u32 = 60;

/// Longest break period the service accepts, in seconds.
pub const MAX_BREAK_PERIOD_SECS: u32 = 60;

/// Opaque lease identifier issued (or accepted) by the service.
///
/// Proposed ids are UUIDs, but the service may hand back any string, so the
/// id is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[derive(Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(String);

impl LeaseId {
    /// Creates a lease id from its wire representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id suitable for proposing.
    pub fn generate() -> Self {
        Uuid::new_v4().into()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LeaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for LeaseId {
    fn from(id: Uuid) -> Self {
        Self(id.hyphenated().to_string())
    }
}

impl From<String> for LeaseId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for LeaseId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Requested lease duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseDuration {
    /// A lease that expires unless renewed, `15..=60` seconds.
    Fixed(u32),
    /// A lease that lasts until released or broken.
    Infinite,
}

impl LeaseDuration {
    /// Creates a finite duration, validating the `15..=60` second range.
    pub fn fixed(secs: u32) -> Result<Self> {
        if !(MIN_LEASE_SECS..=MAX_LEASE_SECS).contains(&secs) {
            return Err(Error::invalid_argument().with_message(format!(
                "lease duration must be between {MIN_LEASE_SECS} and {MAX_LEASE_SECS} seconds, got {secs}"
            )));
        }

        Ok(Self::Fixed(secs))
    }

    /// Checks the range of a [`Fixed`](Self::Fixed) value built directly.
    pub fn validate(self) -> Result<Self> {
        match self {
            Self::Fixed(secs) => Self::fixed(secs),
            Self::Infinite => Ok(self),
        }
    }

    /// Value of the `x-ms-lease-duration` header.
    pub fn header_value(&self) -> HeaderValue {
        match self {
            Self::Fixed(secs) => HeaderValue::from(*secs),
            Self::Infinite => HeaderValue::from_static("-1"),
        }
    }

    /// Returns the finite length, or `None` for infinite leases.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Fixed(secs) => Some(Duration::from_secs(u64::from(*secs))),
            Self::Infinite => None,
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }
}

/// Client-side belief about a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(AsRefStr, StrumDisplay, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    #[default]
    Unleased,
    Acquiring,
    Leased,
    Breaking,
    Broken,
    Expired,
}

impl LeaseStatus {
    /// Returns `true` while the coordinator believes it owns the lease.
    pub fn is_held(&self) -> bool {
        matches!(self, Self::Leased | Self::Breaking)
    }
}

/// Lease verbs, serialized as the `x-ms-lease-action` header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, StrumDisplay, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum LeaseAction {
    Acquire,
    Renew,
    Release,
    Break,
    Change,
}

impl LeaseAction {
    /// Value of the `x-ms-lease-action` header.
    pub fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.into())
    }
}

/// The kind of resource a lease is taken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(AsRefStr, StrumDisplay, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Container,
    #[default]
    Blob,
}

impl ResourceKind {
    /// Query parameters that address the lease sub-resource.
    pub fn lease_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::with_capacity(2);
        if matches!(self, Self::Container) {
            query.push(("restype".to_owned(), "container".to_owned()));
        }
        query.push(("comp".to_owned(), "lease".to_owned()));
        query
    }
}

/// Snapshot of what a coordinator believes about its lease.
///
/// Never authoritative: another client may have broken the lease since the
/// last response was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseState {
    /// The leased resource.
    pub resource_uri: Url,
    /// Whether the resource is a container or a blob.
    pub kind: ResourceKind,
    /// The id returned by the last successful acquire or change.
    pub lease_id: Option<LeaseId>,
    /// Current belief.
    pub status: LeaseStatus,
    /// Duration requested at acquire time.
    pub duration: Option<LeaseDuration>,
    /// The id proposed on the last acquire or change.
    pub proposed_lease_id: Option<LeaseId>,
}

impl LeaseState {
    /// Creates the initial state for a resource nobody has leased yet.
    pub fn unleased(resource_uri: Url, kind: ResourceKind) -> Self {
        Self {
            resource_uri,
            kind,
            lease_id: None,
            status: LeaseStatus::Unleased,
            duration: None,
            proposed_lease_id: None,
        }
    }
}
