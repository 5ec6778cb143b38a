//! Structured error handling for storage coordination.
//!
//! Every failure surfaced by the nimbus crates is an [`Error`] tagged with an
//! [`ErrorKind`]. Errors decoded from a service response also carry the HTTP
//! status and the server error code, so callers can match on the kind and
//! still inspect what the service actually said.

use hipstr::HipStr;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with our custom Error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Categories of errors that can occur while coordinating with the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed caller input, detected before any request is sent.
    InvalidArgument,
    /// The operation requires a condition (usually a lease id) that was omitted.
    PreconditionNotSet,
    /// Another client already holds a lease on the resource.
    LeaseAlreadyPresent,
    /// The lease is gone: released, expired or broken.
    LeaseLost,
    /// The supplied lease id does not match the active lease.
    LeaseIdMismatch,
    /// An explicit ETag or modification-time precondition was not met.
    ConditionNotMet,
    /// The server reported the copy operation as failed.
    CopyFailed,
    /// The copy operation was aborted or superseded.
    CopyAborted,
    /// The copy did not reach a terminal status within the caller's budget.
    CopyTimeout,
    /// The caller cancelled the operation.
    Cancelled,
    /// Anything the transport reported that could not be classified.
    #[default]
    Transport,
}

impl ErrorKind {
    /// Check if this error kind describes a lease conflict.
    #[must_use]
    pub const fn is_lease_error(&self) -> bool {
        matches!(
            self,
            Self::LeaseAlreadyPresent | Self::LeaseLost | Self::LeaseIdMismatch
        )
    }

    /// Check if this error kind describes a copy outcome.
    #[must_use]
    pub const fn is_copy_error(&self) -> bool {
        matches!(
            self,
            Self::CopyFailed | Self::CopyAborted | Self::CopyTimeout
        )
    }
}

/// Structured error type carrying the decoded status and server error code.
#[must_use]
#[derive(Debug, Error)]
#[error("[{kind}]{}{}", describe_status(.status, .code), describe_message(.message))]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// HTTP status code of the response this error was decoded from.
    pub status: Option<u16>,
    /// Server error code (e.g. `LeaseAlreadyPresent`), when one was reported.
    pub code: Option<HipStr<'static>>,
    /// Primary error message.
    pub message: Option<HipStr<'static>>,
    /// Underlying source error, if any.
    #[source]
    pub source: Option<BoxedError>,
}

fn describe_status(status: &Option<u16>, code: &Option<HipStr<'static>>) -> String {
    match (status, code) {
        (Some(status), Some(code)) => format!(" {status} {code}"),
        (Some(status), None) => format!(" {status}"),
        (None, Some(code)) => format!(" {code}"),
        (None, None) => String::new(),
    }
}

fn describe_message(message: &Option<HipStr<'static>>) -> String {
    message
        .as_ref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: None,
            source: None,
        }
    }

    /// Creates a new error from a source error.
    pub fn from_source(kind: ErrorKind, source: impl Into<BoxedError>) -> Self {
        Self::new(kind).with_source(source)
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument() -> Self {
        Self::new(ErrorKind::InvalidArgument)
    }

    /// Creates a new precondition-not-set error.
    pub fn precondition_not_set() -> Self {
        Self::new(ErrorKind::PreconditionNotSet)
    }

    /// Creates a new lease-already-present error.
    pub fn lease_already_present() -> Self {
        Self::new(ErrorKind::LeaseAlreadyPresent)
    }

    /// Creates a new lease-lost error.
    pub fn lease_lost() -> Self {
        Self::new(ErrorKind::LeaseLost)
    }

    /// Creates a new lease-id-mismatch error.
    pub fn lease_id_mismatch() -> Self {
        Self::new(ErrorKind::LeaseIdMismatch)
    }

    /// Creates a new condition-not-met error.
    pub fn condition_not_met() -> Self {
        Self::new(ErrorKind::ConditionNotMet)
    }

    /// Creates a new copy-failed error.
    pub fn copy_failed() -> Self {
        Self::new(ErrorKind::CopyFailed)
    }

    /// Creates a new copy-aborted error.
    pub fn copy_aborted() -> Self {
        Self::new(ErrorKind::CopyAborted)
    }

    /// Creates a new copy-timeout error.
    pub fn copy_timeout() -> Self {
        Self::new(ErrorKind::CopyTimeout)
    }

    /// Creates a new cancellation error.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled)
    }

    /// Creates a new transport error.
    pub fn transport() -> Self {
        Self::new(ErrorKind::Transport)
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<HipStr<'static>>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Records the HTTP status this error was decoded from.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Records the server error code.
    pub fn with_code(mut self, code: impl Into<HipStr<'static>>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the source of the error.
    pub fn with_source(mut self, source: impl Into<BoxedError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the server error code, if any.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Check if the caller may reasonably retry the operation.
    ///
    /// Only unclassified transport failures qualify: connection errors
    /// (no status), request timeouts, throttling and server errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        if self.kind != ErrorKind::Transport {
            return false;
        }

        match self.status {
            None => true,
            Some(status) => status == 408 || status == 429 || status >= 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_error_new() {
        let error = Error::new(ErrorKind::LeaseLost);
        assert_eq!(error.kind, ErrorKind::LeaseLost);
        assert!(error.status.is_none());
        assert!(error.code.is_none());
        assert!(error.message.is_none());
        assert!(error.source.is_none());
    }

    #[test]
    fn test_error_builder_pattern() {
        let error = Error::lease_already_present()
            .with_status(409)
            .with_code("LeaseAlreadyPresent")
            .with_message("there is already a lease present");

        assert_eq!(error.kind(), ErrorKind::LeaseAlreadyPresent);
        assert_eq!(error.status, Some(409));
        assert_eq!(error.code(), Some("LeaseAlreadyPresent"));
        assert_eq!(
            error.message.as_deref(),
            Some("there is already a lease present")
        );
    }

    #[test]
    fn test_error_display() {
        let error = Error::lease_id_mismatch()
            .with_status(409)
            .with_code("LeaseIdMismatchWithLeaseOperation")
            .with_message("renew rejected");

        assert_eq!(
            error.to_string(),
            "[lease_id_mismatch] 409 LeaseIdMismatchWithLeaseOperation: renew rejected"
        );
        assert_eq!(Error::copy_timeout().to_string(), "[copy_timeout]");
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::transport().is_retryable());
        assert!(Error::transport().with_status(503).is_retryable());
        assert!(Error::transport().with_status(429).is_retryable());
        assert!(Error::transport().with_status(408).is_retryable());

        assert!(!Error::transport().with_status(404).is_retryable());
        assert!(!Error::lease_lost().with_status(409).is_retryable());
        assert!(!Error::copy_failed().is_retryable());
        assert!(!Error::cancelled().is_retryable());
    }

    #[test]
    fn test_from_source() {
        let source = std::io::Error::other("connection reset");
        let error = Error::from_source(ErrorKind::Transport, source);

        assert!(error.source.is_some());
        assert_eq!(error.kind, ErrorKind::Transport);
    }

    #[test]
    fn test_kind_groups() {
        assert!(ErrorKind::LeaseIdMismatch.is_lease_error());
        assert!(!ErrorKind::ConditionNotMet.is_lease_error());
        assert!(ErrorKind::CopyTimeout.is_copy_error());
        assert!(!ErrorKind::Cancelled.is_copy_error());
    }

    #[test]
    fn test_from_str() {
        assert_eq!(
            ErrorKind::from_str("lease_already_present").unwrap(),
            ErrorKind::LeaseAlreadyPresent
        );
        assert_eq!(
            ErrorKind::from_str("transport").unwrap(),
            ErrorKind::Transport
        );
        assert_eq!(ErrorKind::default(), ErrorKind::Transport);
        assert!(ErrorKind::from_str("lease").is_err());
    }
}
