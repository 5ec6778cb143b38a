//! Maps non-2xx responses onto error kinds.
//!
//! The server error code (`x-ms-error-code`) decides when it is known. The
//! status code is only a fallback, and its meaning depends on which lease
//! action (if any) was attempted.

use nimbus_core::headers::error_code as code;
use nimbus_core::lease::LeaseAction;
use nimbus_core::{Error, ErrorKind, ResourceResponse};

/// Classifies a failed response into an [`ErrorKind`].
pub fn classify(action: Option<LeaseAction>, status: u16, error_code: Option<&str>) -> ErrorKind {
    if let Some(kind) = error_code.and_then(classify_code) {
        return kind;
    }

    match (status, action) {
        (304, _) => ErrorKind::ConditionNotMet,
        (409 | 412, Some(LeaseAction::Acquire)) => ErrorKind::LeaseAlreadyPresent,
        (409 | 412, Some(_)) => ErrorKind::LeaseLost,
        (412, None) => ErrorKind::ConditionNotMet,
        _ => ErrorKind::Transport,
    }
}

fn classify_code(error_code: &str) -> Option<ErrorKind> {
    let kind = match error_code {
        code::LEASE_ALREADY_PRESENT | code::LEASE_IS_BREAKING_AND_CANNOT_BE_ACQUIRED => {
            ErrorKind::LeaseAlreadyPresent
        }
        code::LEASE_ID_MISMATCH_WITH_LEASE_OPERATION
        | code::LEASE_ID_MISMATCH_WITH_BLOB_OPERATION
        | code::LEASE_ID_MISMATCH_WITH_CONTAINER_OPERATION => ErrorKind::LeaseIdMismatch,
        code::LEASE_NOT_PRESENT_WITH_LEASE_OPERATION
        | code::LEASE_NOT_PRESENT_WITH_BLOB_OPERATION
        | code::LEASE_NOT_PRESENT_WITH_CONTAINER_OPERATION
        | code::LEASE_LOST
        | code::LEASE_IS_BROKEN_AND_CANNOT_BE_RENEWED
        | code::LEASE_IS_BREAKING_AND_CANNOT_BE_CHANGED => ErrorKind::LeaseLost,
        code::LEASE_ID_MISSING => ErrorKind::PreconditionNotSet,
        code::CONDITION_NOT_MET | code::SOURCE_CONDITION_NOT_MET => ErrorKind::ConditionNotMet,
        _ => return None,
    };

    Some(kind)
}

/// Converts a failed response into an [`Error`] carrying its status, server
/// error code and body.
pub fn classify_response(action: Option<LeaseAction>, response: ResourceResponse) -> Error {
    let kind = classify(action, response.status, response.error_code());
    response.into_error(kind)
}

#[cfg(test)]
mod tests {
    use nimbus_core::HeaderValue;
    use nimbus_core::headers::header;

    use super::*;

    #[test]
    fn test_error_code_wins_over_status() {
        assert_eq!(
            classify(Some(LeaseAction::Renew), 409, Some("LeaseIdMismatchWithLeaseOperation")),
            ErrorKind::LeaseIdMismatch
        );
        assert_eq!(
            classify(Some(LeaseAction::Acquire), 409, Some("LeaseIsBreakingAndCannotBeAcquired")),
            ErrorKind::LeaseAlreadyPresent
        );
        assert_eq!(
            classify(None, 412, Some("LeaseIdMissing")),
            ErrorKind::PreconditionNotSet
        );
        assert_eq!(
            classify(None, 412, Some("SourceConditionNotMet")),
            ErrorKind::ConditionNotMet
        );
        assert_eq!(
            classify(Some(LeaseAction::Release), 409, Some("LeaseNotPresentWithLeaseOperation")),
            ErrorKind::LeaseLost
        );
    }

    #[test]
    fn test_status_fallback_depends_on_action() {
        assert_eq!(
            classify(Some(LeaseAction::Acquire), 412, None),
            ErrorKind::LeaseAlreadyPresent
        );
        assert_eq!(classify(Some(LeaseAction::Renew), 409, None), ErrorKind::LeaseLost);
        assert_eq!(classify(Some(LeaseAction::Change), 412, None), ErrorKind::LeaseLost);
        assert_eq!(classify(None, 304, None), ErrorKind::ConditionNotMet);
        assert_eq!(classify(None, 409, None), ErrorKind::Transport);
    }

    #[test]
    fn test_unknown_codes_pass_through() {
        assert_eq!(
            classify(Some(LeaseAction::Acquire), 404, Some("BlobNotFound")),
            ErrorKind::Transport
        );
        assert_eq!(classify(None, 503, Some("ServerBusy")), ErrorKind::Transport);
    }

    #[test]
    fn test_classify_response_keeps_details() {
        let response = ResourceResponse::new(503)
            .with_header(header::ERROR_CODE, HeaderValue::from_static("ServerBusy"));
        let error = classify_response(None, response);

        assert_eq!(error.kind(), ErrorKind::Transport);
        assert_eq!(error.status, Some(503));
        assert_eq!(error.code(), Some("ServerBusy"));
        assert!(error.is_retryable());
    }
}
