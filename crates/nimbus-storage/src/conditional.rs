//! Conditional requests outside the lease API.

use nimbus_core::{AccessCondition, ResourceRequest, ResourceResponse, ResourceTransport, Result};

use crate::classify::classify_response;

/// Sends `request` with the headers of `condition` attached.
///
/// Non-2xx responses are classified: a missing lease id surfaces as
/// [`PreconditionNotSet`](nimbus_core::ErrorKind::PreconditionNotSet), a
/// failed ETag or time check as
/// [`ConditionNotMet`](nimbus_core::ErrorKind::ConditionNotMet). A
/// condition that cannot be encoded as headers is refused before sending.
pub async fn send_conditional<T>(
    transport: &T,
    request: ResourceRequest,
    condition: Option<&AccessCondition>,
) -> Result<ResourceResponse>
where
    T: ResourceTransport + ?Sized,
{
    let request = match condition {
        Some(condition) => request.with_headers(condition.to_headers()?),
        None => request,
    };

    let response = transport.send(request).await?;
    if !response.is_success() {
        return Err(classify_response(None, response));
    }

    Ok(response)
}
