//! Optimistic-concurrency preconditions.
//!
//! An [`AccessCondition`] makes a request conditional on the state the
//! caller last observed: an ETag, a modification time, or an active lease.
//! Conditions are immutable values. Combining two of them (for example a
//! caller's `If-Match` with the lease a coordinator holds) produces a new
//! condition and never mutates either input.
//!
//! ```rust
//! use nimbus_core::AccessCondition;
//! use nimbus_core::lease::LeaseId;
//!
//! let explicit = AccessCondition::if_match("\"0x8D4BCC2E4835CD0\"");
//! let lease = LeaseId::from("a3b6e5a2-0f3c-4a8e-9d6b-1c2d3e4f5a6b");
//!
//! let merged = AccessCondition::merge(Some(&explicit), Some(&lease))?;
//! let headers = merged.to_headers()?;
//!
//! assert_eq!(headers["If-Match"], "\"0x8D4BCC2E4835CD0\"");
//! assert_eq!(headers["x-ms-lease-id"], lease.as_str());
//! # Ok::<(), nimbus_core::Error>(())
//! ```

use derive_builder::Builder;
use http::header::{HeaderMap, HeaderName};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::headers::{format_http_date, header, header_value};
use crate::lease::LeaseId;
use crate::{Error, Result};

/// Preconditions attached to a single request.
///
/// `if_match` and `if_none_match` are mutually exclusive, as are
/// `if_modified_since` and `if_unmodified_since`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Builder, Serialize, Deserialize)]
#[builder(
    name = "AccessConditionBuilder",
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(private, name = "build_inner", validate = "Self::validate_condition")
)]
pub struct AccessCondition {
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    if_match: Option<String>,
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    if_none_match: Option<String>,
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    if_modified_since: Option<Timestamp>,
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    if_unmodified_since: Option<Timestamp>,
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lease_id: Option<LeaseId>,
}

impl AccessConditionBuilder {
    /// Builds the condition, rejecting mutually exclusive fields.
    pub fn build(self) -> Result<AccessCondition> {
        self.build_inner()
            .map_err(|e| Error::invalid_argument().with_message(e.to_string()))
    }

    fn validate_condition(&self) -> std::result::Result<(), String> {
        let if_match = matches!(self.if_match, Some(Some(_)));
        let if_none_match = matches!(self.if_none_match, Some(Some(_)));
        if if_match && if_none_match {
            return Err("If-Match and If-None-Match cannot be combined".to_string());
        }

        let modified = matches!(self.if_modified_since, Some(Some(_)));
        let unmodified = matches!(self.if_unmodified_since, Some(Some(_)));
        if modified && unmodified {
            return Err(
                "If-Modified-Since and If-Unmodified-Since cannot be combined".to_string(),
            );
        }

        Ok(())
    }
}

impl AccessCondition {
    /// Creates a new condition builder.
    pub fn builder() -> AccessConditionBuilder {
        AccessConditionBuilder::default()
    }

    /// A condition with no constraints.
    pub fn none() -> Self {
        Self::default()
    }

    /// Succeed only if the resource's ETag matches.
    pub fn if_match(etag: impl Into<String>) -> Self {
        Self {
            if_match: Some(etag.into()),
            ..Self::default()
        }
    }

    /// Succeed only if the resource's ETag differs. `*` means "does not exist".
    pub fn if_none_match(etag: impl Into<String>) -> Self {
        Self {
            if_none_match: Some(etag.into()),
            ..Self::default()
        }
    }

    /// Succeed only if the resource changed after `since`.
    pub fn if_modified_since(since: Timestamp) -> Self {
        Self {
            if_modified_since: Some(since),
            ..Self::default()
        }
    }

    /// Succeed only if the resource did not change after `since`.
    pub fn if_unmodified_since(since: Timestamp) -> Self {
        Self {
            if_unmodified_since: Some(since),
            ..Self::default()
        }
    }

    /// Succeed only while `lease_id` is the active lease.
    pub fn lease(lease_id: impl Into<LeaseId>) -> Self {
        Self {
            lease_id: Some(lease_id.into()),
            ..Self::default()
        }
    }

    pub fn etag_match(&self) -> Option<&str> {
        self.if_match.as_deref()
    }

    pub fn etag_none_match(&self) -> Option<&str> {
        self.if_none_match.as_deref()
    }

    pub fn modified_since(&self) -> Option<Timestamp> {
        self.if_modified_since
    }

    pub fn unmodified_since(&self) -> Option<Timestamp> {
        self.if_unmodified_since
    }

    pub fn lease_id(&self) -> Option<&LeaseId> {
        self.lease_id.as_ref()
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Returns a copy of this condition without its lease requirement.
    #[must_use]
    pub fn without_lease(&self) -> Self {
        Self {
            lease_id: None,
            ..self.clone()
        }
    }

    /// Field-wise union of two conditions.
    ///
    /// Identical values on both sides are accepted. Two different values for
    /// the same field, or values for mutually exclusive fields, fail with
    /// [`InvalidArgument`](crate::ErrorKind::InvalidArgument).
    pub fn combine(&self, other: &AccessCondition) -> Result<AccessCondition> {
        let combined = Self {
            if_match: pick("If-Match", &self.if_match, &other.if_match)?,
            if_none_match: pick("If-None-Match", &self.if_none_match, &other.if_none_match)?,
            if_modified_since: pick(
                "If-Modified-Since",
                &self.if_modified_since,
                &other.if_modified_since,
            )?,
            if_unmodified_since: pick(
                "If-Unmodified-Since",
                &self.if_unmodified_since,
                &other.if_unmodified_since,
            )?,
            lease_id: pick("lease id", &self.lease_id, &other.lease_id)?,
        };

        if combined.if_match.is_some() && combined.if_none_match.is_some() {
            return Err(Error::invalid_argument()
                .with_message("conflicting ETag conditions: If-Match and If-None-Match"));
        }

        if combined.if_modified_since.is_some() && combined.if_unmodified_since.is_some() {
            return Err(Error::invalid_argument().with_message(
                "conflicting time conditions: If-Modified-Since and If-Unmodified-Since",
            ));
        }

        Ok(combined)
    }

    /// Combines a caller-supplied condition with the implicit lease
    /// requirement of a held lease.
    ///
    /// Fails with [`InvalidArgument`](crate::ErrorKind::InvalidArgument) when
    /// `base` already names a different lease id.
    pub fn merge(
        base: Option<&AccessCondition>,
        lease_id: Option<&LeaseId>,
    ) -> Result<AccessCondition> {
        let implicit = lease_id.cloned().map(Self::lease).unwrap_or_default();
        match base {
            Some(base) => base.combine(&implicit),
            None => Ok(implicit),
        }
    }

    /// Projects the condition onto request headers.
    ///
    /// Unset fields produce no header. Times are rendered as IMF-fixdate.
    /// An ETag or lease id that cannot be carried in a header is an
    /// [`ErrorKind::InvalidArgument`](crate::ErrorKind::InvalidArgument).
    pub fn to_headers(&self) -> Result<HeaderMap> {
        self.project(
            header::IF_MATCH,
            header::IF_NONE_MATCH,
            header::IF_MODIFIED_SINCE,
            header::IF_UNMODIFIED_SINCE,
            header::LEASE_ID,
        )
    }

    /// Projects the condition onto copy-source headers
    /// (`x-ms-source-if-match` and friends).
    pub fn to_source_headers(&self) -> Result<HeaderMap> {
        self.project(
            header::SOURCE_IF_MATCH,
            header::SOURCE_IF_NONE_MATCH,
            header::SOURCE_IF_MODIFIED_SINCE,
            header::SOURCE_IF_UNMODIFIED_SINCE,
            header::SOURCE_LEASE_ID,
        )
    }

    fn project(
        &self,
        if_match: HeaderName,
        if_none_match: HeaderName,
        if_modified_since: HeaderName,
        if_unmodified_since: HeaderName,
        lease_id: HeaderName,
    ) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(etag) = &self.if_match {
            let value = header_value(&if_match, etag)?;
            headers.insert(if_match, value);
        }
        if let Some(etag) = &self.if_none_match {
            let value = header_value(&if_none_match, etag)?;
            headers.insert(if_none_match, value);
        }
        if let Some(since) = self.if_modified_since {
            let value = header_value(&if_modified_since, format_http_date(since))?;
            headers.insert(if_modified_since, value);
        }
        if let Some(since) = self.if_unmodified_since {
            let value = header_value(&if_unmodified_since, format_http_date(since))?;
            headers.insert(if_unmodified_since, value);
        }
        if let Some(id) = &self.lease_id {
            let value = header_value(&lease_id, id.as_str())?;
            headers.insert(lease_id, value);
        }

        Ok(headers)
    }
}

fn pick<T: Clone + PartialEq>(name: &str, a: &Option<T>, b: &Option<T>) -> Result<Option<T>> {
    match (a, b) {
        (Some(a), Some(b)) if a != b => Err(Error::invalid_argument()
            .with_message(format!("conflicting {name} conditions"))),
        (Some(v), _) | (None, Some(v)) => Ok(Some(v.clone())),
        (None, None) => Ok(None),
    }
}
