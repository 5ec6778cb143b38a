//! Reqwest-based resource transport.

use std::sync::Arc;

use jiff::Timestamp;
use nimbus_core::headers::{HeaderMapExt, format_http_date, header};
use nimbus_core::{ResourceRequest, ResourceResponse, ResourceTransport};
use reqwest::header::HeaderName;
use reqwest::{Client, Method, Request, Response};

use super::{ReqwestConfig, TRACING_TARGET};
use crate::error::{Error, Result};

/// Header carrying the request date.
const DATE: HeaderName = HeaderName::from_static("x-ms-date");

/// Inner transport that holds the HTTP client and configuration.
struct ReqwestTransportInner {
    http: Client,
    config: ReqwestConfig,
    sas_query: Vec<(String, String)>,
}

/// Sends storage requests over HTTP with reqwest.
///
/// Non-2xx responses are returned as `Ok`; only failures where no response
/// exists (timeouts, connection errors) become errors.
///
/// # Examples
///
/// ```rust,ignore
/// use nimbus_core::ResourceRequest;
/// use nimbus_reqwest::{ReqwestConfig, ReqwestTransport};
///
/// let transport = ReqwestTransport::new(ReqwestConfig::default())?;
/// let response = transport.send(ResourceRequest::head(blob_url)).await?;
/// ```
#[derive(Clone)]
pub struct ReqwestTransport {
    inner: Arc<ReqwestTransportInner>,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("timeout", &self.inner.config.effective_timeout())
            .field("api_version", &self.inner.config.effective_api_version())
            .field("sas", &self.inner.config.sas_token.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Creates a new transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the SAS token cannot be parsed or the HTTP client
    /// cannot be created.
    pub fn new(config: ReqwestConfig) -> Result<Self> {
        let timeout = config.effective_timeout();
        let user_agent = config.effective_user_agent();

        tracing::debug!(
            target: TRACING_TARGET,
            timeout_ms = timeout.as_millis(),
            api_version = config.effective_api_version(),
            "Creating reqwest transport"
        );

        let sas_query = match &config.sas_token {
            Some(token) => parse_sas_token(token)?,
            None => Vec::new(),
        };

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(&user_agent)
            .build()?;

        let inner = ReqwestTransportInner {
            http,
            config,
            sas_query,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Gets the transport configuration.
    pub fn config(&self) -> &ReqwestConfig {
        &self.inner.config
    }

    /// Wraps the transport for the coordinators.
    pub fn into_shared(self) -> Arc<dyn ResourceTransport> {
        Arc::new(self)
    }

    /// Builds the HTTP request for `request` without sending it.
    pub fn build_request(&self, request: &ResourceRequest) -> Result<Request> {
        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), request.uri.clone())
            .query(&request.query)
            .query(&self.inner.sas_query)
            .header(header::VERSION, self.inner.config.effective_api_version())
            .header(DATE, format_http_date(Timestamp::now()))
            .headers(request.headers.clone());

        builder = match &request.body {
            Some(body) => builder.body(body.clone()),
            // lease and copy requests still need a zero content length
            None if request.method == Method::PUT => builder.body(bytes::Bytes::new()),
            None => builder,
        };

        Ok(builder.build()?)
    }
}

#[async_trait::async_trait]
impl ResourceTransport for ReqwestTransport {
    async fn send(&self, request: ResourceRequest) -> nimbus_core::Result<ResourceResponse> {
        let http_request = self.build_request(&request)?;

        tracing::debug!(
            target: TRACING_TARGET,
            method = %request.method,
            uri = %request.uri,
            "Sending request"
        );

        let http_response = self
            .inner
            .http
            .execute(http_request)
            .await
            .map_err(Error::from)?;

        let response = read_response(http_response).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            method = %request.method,
            uri = %request.uri,
            status = response.status,
            error_code = response.headers.get_str(header::ERROR_CODE),
            "Response received"
        );

        Ok(response)
    }
}

/// Buffers an HTTP response. Headers are kept as received, including
/// repeated names and values that are not visible ASCII.
async fn read_response(http_response: Response) -> Result<ResourceResponse> {
    let status = http_response.status().as_u16();
    let headers = http_response.headers().clone();
    let body = http_response.bytes().await?;

    Ok(ResourceResponse {
        status,
        headers,
        body,
    })
}

fn parse_sas_token(token: &str) -> Result<Vec<(String, String)>> {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(token.trim_start_matches('?').as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if !pairs.iter().any(|(name, _)| name == "sig") {
        return Err(Error::SasToken("missing 'sig' parameter".to_owned()));
    }

    Ok(pairs)
}
