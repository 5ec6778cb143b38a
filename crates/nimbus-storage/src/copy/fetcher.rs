use nimbus_core::copy::ResourceAttributes;
use nimbus_core::{AttributeFetcher, ResourceRequest, ResourceTransport, Result};
use url::Url;

use crate::TRACING_TARGET_COPY;
use crate::classify::classify_response;

/// Reads resource attributes with a `HEAD` request over any transport.
///
/// Copy state is decoded from the `x-ms-copy-*` response headers.
#[derive(Debug, Clone)]
pub struct HeadAttributeFetcher<T> {
    transport: T,
}

impl<T: ResourceTransport> HeadAttributeFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[async_trait::async_trait]
impl<T: ResourceTransport> AttributeFetcher for HeadAttributeFetcher<T> {
    async fn fetch_attributes(&self, resource: &Url) -> Result<ResourceAttributes> {
        let response = self
            .transport
            .send(ResourceRequest::head(resource.clone()))
            .await?;

        if !response.is_success() {
            let error = classify_response(None, response);
            tracing::debug!(
                target: TRACING_TARGET_COPY,
                resource = %resource,
                error = %error,
                "Attribute fetch failed"
            );
            return Err(error);
        }

        ResourceAttributes::from_headers(&response.headers)
    }
}
