//! Header names used on the wire and typed reads over [`HeaderMap`].

use http::header::{AsHeaderName, HeaderMap, HeaderName, HeaderValue};
use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;

use crate::{Error, Result};

/// IMF-fixdate layout used by `If-Modified-Since` and friends.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Header names used on the wire.
pub mod header {
    use http::header::HeaderName;
    pub use http::header::{
        CONTENT_LENGTH, ETAG, IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE,
        LAST_MODIFIED,
    };

    pub const SOURCE_IF_MATCH: HeaderName = HeaderName::from_static("x-ms-source-if-match");
    pub const SOURCE_IF_NONE_MATCH: HeaderName =
        HeaderName::from_static("x-ms-source-if-none-match");
    pub const SOURCE_IF_MODIFIED_SINCE: HeaderName =
        HeaderName::from_static("x-ms-source-if-modified-since");
    pub const SOURCE_IF_UNMODIFIED_SINCE: HeaderName =
        HeaderName::from_static("x-ms-source-if-unmodified-since");
    pub const SOURCE_LEASE_ID: HeaderName = HeaderName::from_static("x-ms-source-lease-id");

    pub const LEASE_ID: HeaderName = HeaderName::from_static("x-ms-lease-id");
    pub const LEASE_ACTION: HeaderName = HeaderName::from_static("x-ms-lease-action");
    pub const LEASE_DURATION: HeaderName = HeaderName::from_static("x-ms-lease-duration");
    pub const LEASE_BREAK_PERIOD: HeaderName = HeaderName::from_static("x-ms-lease-break-period");
    pub const LEASE_TIME: HeaderName = HeaderName::from_static("x-ms-lease-time");
    pub const LEASE_STATE: HeaderName = HeaderName::from_static("x-ms-lease-state");
    pub const LEASE_STATUS: HeaderName = HeaderName::from_static("x-ms-lease-status");
    pub const PROPOSED_LEASE_ID: HeaderName = HeaderName::from_static("x-ms-proposed-lease-id");

    pub const COPY_ID: HeaderName = HeaderName::from_static("x-ms-copy-id");
    pub const COPY_SOURCE: HeaderName = HeaderName::from_static("x-ms-copy-source");
    pub const COPY_STATUS: HeaderName = HeaderName::from_static("x-ms-copy-status");
    pub const COPY_STATUS_DESCRIPTION: HeaderName =
        HeaderName::from_static("x-ms-copy-status-description");
    pub const COPY_PROGRESS: HeaderName = HeaderName::from_static("x-ms-copy-progress");
    pub const COPY_COMPLETION_TIME: HeaderName =
        HeaderName::from_static("x-ms-copy-completion-time");

    pub const ERROR_CODE: HeaderName = HeaderName::from_static("x-ms-error-code");
    pub const VERSION: HeaderName = HeaderName::from_static("x-ms-version");
}

/// Server error codes reported through `x-ms-error-code`.
pub mod error_code {
    pub const LEASE_ALREADY_PRESENT: &str = "LeaseAlreadyPresent";
    pub const LEASE_IS_BREAKING_AND_CANNOT_BE_ACQUIRED: &str =
        "LeaseIsBreakingAndCannotBeAcquired";
    pub const LEASE_IS_BREAKING_AND_CANNOT_BE_CHANGED: &str = "LeaseIsBreakingAndCannotBeChanged";
    pub const LEASE_IS_BROKEN_AND_CANNOT_BE_RENEWED: &str = "LeaseIsBrokenAndCannotBeRenewed";
    pub const LEASE_ID_MISMATCH_WITH_LEASE_OPERATION: &str = "LeaseIdMismatchWithLeaseOperation";
    pub const LEASE_ID_MISMATCH_WITH_BLOB_OPERATION: &str = "LeaseIdMismatchWithBlobOperation";
    pub const LEASE_ID_MISMATCH_WITH_CONTAINER_OPERATION: &str =
        "LeaseIdMismatchWithContainerOperation";
    pub const LEASE_NOT_PRESENT_WITH_LEASE_OPERATION: &str = "LeaseNotPresentWithLeaseOperation";
    pub const LEASE_NOT_PRESENT_WITH_BLOB_OPERATION: &str = "LeaseNotPresentWithBlobOperation";
    pub const LEASE_NOT_PRESENT_WITH_CONTAINER_OPERATION: &str =
        "LeaseNotPresentWithContainerOperation";
    pub const LEASE_LOST: &str = "LeaseLost";
    pub const LEASE_ID_MISSING: &str = "LeaseIdMissing";
    pub const CONDITION_NOT_MET: &str = "ConditionNotMet";
    pub const SOURCE_CONDITION_NOT_MET: &str = "SourceConditionNotMet";
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
    pub const BLOB_NOT_FOUND: &str = "BlobNotFound";
    pub const SERVER_BUSY: &str = "ServerBusy";
    pub const INVALID_HEADER_VALUE: &str = "InvalidHeaderValue";
}

/// Typed reads over a [`HeaderMap`].
///
/// A header that is present but cannot be decoded is an error rather than
/// a silent `None`, so a malformed server response is never mistaken for
/// an absent property.
pub trait HeaderMapExt {
    /// Returns the value as text, or `None` when absent or not visible ASCII.
    fn get_str<K: AsHeaderName>(&self, name: K) -> Option<&str>;

    /// Returns the value as text; a value that is not visible ASCII is an error.
    fn try_get_str(&self, name: &HeaderName) -> Result<Option<&str>>;

    /// Parses a header value as an IMF-fixdate timestamp.
    fn get_http_date(&self, name: &HeaderName) -> Result<Option<Timestamp>>;

    /// Parses a header value as an unsigned integer.
    fn get_u64(&self, name: &HeaderName) -> Result<Option<u64>>;
}

impl HeaderMapExt for HeaderMap {
    fn get_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.get(name).and_then(|value| value.to_str().ok())
    }

    fn try_get_str(&self, name: &HeaderName) -> Result<Option<&str>> {
        self.get(name)
            .map(|value| {
                value.to_str().map_err(|e| {
                    Error::transport()
                        .with_message(format!("`{name}` header is not visible ASCII"))
                        .with_source(e)
                })
            })
            .transpose()
    }

    fn get_http_date(&self, name: &HeaderName) -> Result<Option<Timestamp>> {
        self.try_get_str(name)?.map(parse_http_date).transpose()
    }

    fn get_u64(&self, name: &HeaderName) -> Result<Option<u64>> {
        self.try_get_str(name)?
            .map(|value| {
                value.trim().parse::<u64>().map_err(|e| {
                    Error::transport()
                        .with_message(format!("invalid `{name}` header value '{value}'"))
                        .with_source(e)
                })
            })
            .transpose()
    }
}

/// Encodes caller-supplied text as the value of header `name`.
///
/// Fails with [`ErrorKind::InvalidArgument`] when the text contains bytes a
/// header cannot carry, such as a line break.
///
/// [`ErrorKind::InvalidArgument`]: crate::ErrorKind::InvalidArgument
pub fn header_value(name: &HeaderName, value: impl AsRef<str>) -> Result<HeaderValue> {
    let value = value.as_ref();
    HeaderValue::from_str(value).map_err(|e| {
        Error::invalid_argument()
            .with_message(format!("value for `{name}` header cannot be encoded"))
            .with_source(e)
    })
}

/// Formats a timestamp as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(timestamp: Timestamp) -> String {
    timestamp.strftime(HTTP_DATE_FORMAT).to_string()
}

/// Parses an IMF-fixdate into a timestamp.
pub fn parse_http_date(value: &str) -> Result<Timestamp> {
    let invalid = |e: jiff::Error| {
        Error::transport()
            .with_message(format!("invalid HTTP date '{value}'"))
            .with_source(e)
    };

    let datetime = DateTime::strptime(HTTP_DATE_FORMAT, value.trim()).map_err(invalid)?;
    let zoned = datetime.to_zoned(TimeZone::UTC).map_err(invalid)?;
    Ok(zoned.timestamp())
}
