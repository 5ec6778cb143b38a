//! Collaborator traits the coordinators are generic over.
//!
//! The HTTP stack, request signing and body (de)serialization live behind
//! these traits. [`ResourceTransport`] carries single requests,
//! [`PageFetcher`] returns already-decoded listing pages and
//! [`AttributeFetcher`] returns decoded resource attributes.

use std::sync::Arc;

use bytes::Bytes;
use http::header::AsHeaderName;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::copy::ResourceAttributes;
use crate::headers::{HeaderMapExt, header};
use crate::paging::{PageRequest, PageResponse};
use crate::{Error, ErrorKind, Result};

/// A single request against a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub method: Method,
    pub uri: Url,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ResourceRequest {
    pub fn new(method: Method, uri: Url) -> Self {
        Self {
            method,
            uri,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(uri: Url) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn head(uri: Url) -> Self {
        Self::new(Method::HEAD, uri)
    }

    pub fn put(uri: Url) -> Self {
        Self::new(Method::PUT, uri)
    }

    pub fn delete(uri: Url) -> Self {
        Self::new(Method::DELETE, uri)
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets a header, replacing any previous values with the same name.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Copies every header of `headers` into the request. Names present in
    /// both maps take the values of `headers`, repeated values included.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns the first query value with the given name.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A raw response, before classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResourceResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get_str(name)
    }

    /// The `x-ms-error-code` the server reported, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.headers.get_str(header::ERROR_CODE)
    }

    /// Converts this response into an error of the given kind, carrying
    /// the status and server error code.
    pub fn into_error(self, kind: ErrorKind) -> Error {
        let mut error = Error::new(kind).with_status(self.status);
        if let Some(code) = self.error_code() {
            error = error.with_code(code.to_owned());
        }
        if !self.body.is_empty() {
            error = error.with_message(String::from_utf8_lossy(&self.body).into_owned());
        }
        error
    }
}

/// Sends single requests to the storage service.
///
/// Implementations perform signing and transport-level concerns. They must
/// return `Ok` for every response the server produced, including non-2xx
/// ones; `Err` is reserved for failures where no response exists.
#[async_trait::async_trait]
pub trait ResourceTransport: Send + Sync {
    async fn send(&self, request: ResourceRequest) -> Result<ResourceResponse>;
}

/// Fetches one decoded page of a listing.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// The listed item type.
    type Item: Send;

    async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse<Self::Item>>;
}

/// Fetches the attributes of a resource.
#[async_trait::async_trait]
pub trait AttributeFetcher: Send + Sync {
    async fn fetch_attributes(&self, resource: &Url) -> Result<ResourceAttributes>;
}

#[async_trait::async_trait]
impl<T: ResourceTransport + ?Sized> ResourceTransport for Arc<T> {
    async fn send(&self, request: ResourceRequest) -> Result<ResourceResponse> {
        (**self).send(request).await
    }
}

#[async_trait::async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for Arc<T> {
    type Item = T::Item;

    async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse<Self::Item>> {
        (**self).fetch_page(request).await
    }
}

#[async_trait::async_trait]
impl<T: AttributeFetcher + ?Sized> AttributeFetcher for Arc<T> {
    async fn fetch_attributes(&self, resource: &Url) -> Result<ResourceAttributes> {
        (**self).fetch_attributes(resource).await
    }
}
