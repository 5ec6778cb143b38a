//! In-memory storage service.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use jiff::Timestamp;
use nimbus_core::copy::CopyOperationState;
use nimbus_core::headers::{
    HeaderMapExt, error_code as code, format_http_date, header, header_value,
};
use nimbus_core::lease::{LeaseAction, MAX_BREAK_PERIOD_SECS, MAX_LEASE_SECS, MIN_LEASE_SECS};
use nimbus_core::{
    HeaderMap, HeaderName, HeaderValue, Method, ResourceRequest, ResourceResponse,
    ResourceTransport, Result,
};
use tokio::time::Instant;
use url::Url;

use super::copy::{MockCopyPlan, TrackedCopy};
use super::lease::{LeaseSlot, Phase, Rejection};

/// Endpoint used by [`MockStorageService::new`].
const DEFAULT_ENDPOINT: &str = "https://mock.blob.core.example/";

/// First `Last-Modified` value handed out by the mock clock.
const EPOCH_SECS: i64 = 1_700_000_000;

const CONTAINER_ALREADY_EXISTS: &str = "ContainerAlreadyExists";
const UNSUPPORTED_HTTP_VERB: &str = "UnsupportedHttpVerb";
const INTERNAL_ERROR: &str = "InternalError";

/// A container or blob.
#[derive(Debug, Clone)]
struct Resource {
    data: Bytes,
    etag: String,
    last_modified: Timestamp,
    lease: LeaseSlot,
    copy: Option<TrackedCopy>,
}

impl Resource {
    fn new((etag, last_modified): (String, Timestamp), data: Bytes) -> Self {
        Self {
            data,
            etag,
            last_modified,
            lease: LeaseSlot::default(),
            copy: None,
        }
    }

    fn stamp(&mut self, (etag, last_modified): (String, Timestamp)) {
        self.etag = etag;
        self.last_modified = last_modified;
    }

    fn properties(&self) -> Result<ResourceResponse, ResourceResponse> {
        let last_modified = format_http_date(self.last_modified);
        Ok(ResourceResponse::new(200)
            .with_header(header::ETAG, text(&header::ETAG, &self.etag)?)
            .with_header(header::LAST_MODIFIED, text(&header::LAST_MODIFIED, last_modified)?))
    }
}

/// Hands out unique ETags and strictly increasing modification times.
#[derive(Debug, Default)]
struct Clock {
    version: u64,
}

impl Clock {
    fn tick(&mut self) -> (String, Timestamp) {
        self.version += 1;
        let etag = format!("\"0x8D{:011X}\"", self.version);
        let modified = Timestamp::from_second(EPOCH_SECS + self.version as i64).unwrap_or_default();
        (etag, modified)
    }
}

/// `container` or `container/blob`, split from a request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResourcePath {
    container: String,
    blob: Option<String>,
}

impl ResourcePath {
    fn parse(url: &Url) -> Self {
        let path = url.path().trim_matches('/');
        match path.split_once('/') {
            Some((container, blob)) => Self {
                container: container.to_owned(),
                blob: Some(blob.to_owned()),
            },
            None => Self {
                container: path.to_owned(),
                blob: None,
            },
        }
    }

    fn key(&self) -> String {
        match &self.blob {
            Some(blob) => format!("{}/{blob}", self.container),
            None => self.container.clone(),
        }
    }

    fn not_found(&self) -> ResourceResponse {
        match self.blob {
            Some(_) => reject(404, code::BLOB_NOT_FOUND, "The specified blob does not exist."),
            None => reject(
                404,
                code::RESOURCE_NOT_FOUND,
                "The specified resource does not exist.",
            ),
        }
    }
}

/// Header names a precondition is read from.
struct ConditionHeaders {
    if_match: HeaderName,
    if_none_match: HeaderName,
    if_modified_since: HeaderName,
    if_unmodified_since: HeaderName,
    failure_code: &'static str,
}

const DESTINATION: ConditionHeaders = ConditionHeaders {
    if_match: header::IF_MATCH,
    if_none_match: header::IF_NONE_MATCH,
    if_modified_since: header::IF_MODIFIED_SINCE,
    if_unmodified_since: header::IF_UNMODIFIED_SINCE,
    failure_code: code::CONDITION_NOT_MET,
};

const SOURCE: ConditionHeaders = ConditionHeaders {
    if_match: header::SOURCE_IF_MATCH,
    if_none_match: header::SOURCE_IF_NONE_MATCH,
    if_modified_since: header::SOURCE_IF_MODIFIED_SINCE,
    if_unmodified_since: header::SOURCE_IF_UNMODIFIED_SINCE,
    failure_code: code::SOURCE_CONDITION_NOT_MET,
};

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, Resource>,
    blobs: BTreeMap<String, Resource>,
    requests: Vec<ResourceRequest>,
    copy_plan: MockCopyPlan,
    failing_fetches: u32,
    clock: Clock,
}

impl State {
    fn resource(&self, path: &ResourcePath) -> Option<&Resource> {
        match path.blob {
            Some(_) => self.blobs.get(&path.key()),
            None => self.containers.get(&path.container),
        }
    }

    fn resource_mut(&mut self, path: &ResourcePath) -> Option<&mut Resource> {
        match path.blob {
            Some(_) => self.blobs.get_mut(&path.key()),
            None => self.containers.get_mut(&path.container),
        }
    }

    fn handle(&mut self, request: &ResourceRequest) -> ResourceResponse {
        let now = Instant::now();
        let path = ResourcePath::parse(&request.uri);

        let result = match (request.method.as_str(), request.query_value("comp")) {
            ("PUT", Some("lease")) => self.lease(now, &path, request),
            ("PUT", _) if path.blob.is_none() => self.create_container(&path),
            ("PUT", _) if request.headers.contains_key(header::COPY_SOURCE) => {
                self.copy(now, &path, request)
            }
            ("PUT", _) => self.upload(now, &path, request),
            ("GET" | "HEAD", _) => self.read(now, &path, request),
            ("DELETE", _) => self.delete(now, &path, request),
            _ => Err(reject(
                405,
                UNSUPPORTED_HTTP_VERB,
                "The resource doesn't support the specified HTTP verb.",
            )),
        };

        let mut response = result.unwrap_or_else(|response| response);
        if request.method == Method::HEAD {
            response.body = Bytes::new();
        }
        response
    }

    fn lease(
        &mut self,
        now: Instant,
        path: &ResourcePath,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse, ResourceResponse> {
        let headers = &request.headers;
        let resource = self.resource_mut(path).ok_or_else(|| path.not_found())?;
        evaluate(resource, headers, &DESTINATION, false)?;

        let action = headers
            .get_str(header::LEASE_ACTION)
            .and_then(|action| action.parse::<LeaseAction>().ok())
            .ok_or_else(|| invalid_header(&header::LEASE_ACTION))?;
        let lease_id = headers.get_str(header::LEASE_ID);
        let proposed = headers.get_str(header::PROPOSED_LEASE_ID).map(str::to_owned);

        let slot = &mut resource.lease;
        let (status, granted, lease_time) = match action {
            LeaseAction::Acquire => {
                let length = parse_lease_duration(headers.get_str(header::LEASE_DURATION))?;
                let (status, id) = slot.acquire(now, length, proposed).map_err(rejected)?;
                (status, Some(id), None)
            }
            LeaseAction::Renew => {
                let lease_id = lease_id.ok_or_else(missing_lease_id)?;
                let id = slot.renew(now, lease_id).map_err(rejected)?;
                (200, Some(id), None)
            }
            LeaseAction::Release => {
                let lease_id = lease_id.ok_or_else(missing_lease_id)?;
                slot.release(now, lease_id).map_err(rejected)?;
                (200, None, None)
            }
            LeaseAction::Break => {
                let period = parse_break_period(headers.get_str(header::LEASE_BREAK_PERIOD))?;
                let secs = slot.break_lease(now, period).map_err(rejected)?;
                (202, None, Some(secs))
            }
            LeaseAction::Change => {
                let lease_id = lease_id.ok_or_else(missing_lease_id)?;
                let proposed =
                    proposed.ok_or_else(|| invalid_header(&header::PROPOSED_LEASE_ID))?;
                let id = slot.change(now, lease_id, proposed).map_err(rejected)?;
                (200, Some(id), None)
            }
        };

        let mut response = resource.properties()?;
        response.status = status;
        if let Some(id) = granted {
            response = response.with_header(header::LEASE_ID, text(&header::LEASE_ID, id)?);
        }
        if let Some(secs) = lease_time {
            response = response.with_header(header::LEASE_TIME, HeaderValue::from(secs));
        }
        Ok(response)
    }

    fn create_container(&mut self, path: &ResourcePath) -> Result<ResourceResponse, ResourceResponse> {
        if self.containers.contains_key(&path.container) {
            return Err(reject(
                409,
                CONTAINER_ALREADY_EXISTS,
                "The specified container already exists.",
            ));
        }

        let resource = Resource::new(self.clock.tick(), Bytes::new());
        let mut response = resource.properties()?;
        response.status = 201;
        self.containers.insert(path.container.clone(), resource);
        Ok(response)
    }

    /// Checks that a write may replace the blob at `path`.
    fn check_blob_write(
        &self,
        now: Instant,
        path: &ResourcePath,
        headers: &HeaderMap,
    ) -> Result<(), ResourceResponse> {
        if !self.containers.contains_key(&path.container) {
            return Err(ResourcePath {
                container: path.container.clone(),
                blob: None,
            }
            .not_found());
        }

        match self.blobs.get(&path.key()) {
            Some(existing) => {
                check_write_lease(&existing.lease, now, headers, true)?;
                evaluate(existing, headers, &DESTINATION, false)
            }
            None => {
                check_write_lease(&LeaseSlot::default(), now, headers, true)?;
                evaluate_missing(headers, &DESTINATION)
            }
        }
    }

    fn upload(
        &mut self,
        now: Instant,
        path: &ResourcePath,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse, ResourceResponse> {
        self.check_blob_write(now, path, &request.headers)?;

        let data = request.body.clone().unwrap_or_default();
        let stamp = self.clock.tick();
        let resource = self
            .blobs
            .entry(path.key())
            .or_insert_with(|| Resource::new(stamp.clone(), Bytes::new()));
        resource.stamp(stamp);
        resource.data = data;
        resource.copy = None;

        let mut response = resource.properties()?;
        response.status = 201;
        Ok(response)
    }

    fn copy(
        &mut self,
        now: Instant,
        path: &ResourcePath,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse, ResourceResponse> {
        let headers = &request.headers;
        let source_url = headers
            .get_str(header::COPY_SOURCE)
            .and_then(|value| Url::parse(value).ok())
            .ok_or_else(|| invalid_header(&header::COPY_SOURCE))?;

        let source_path = ResourcePath::parse(&source_url);
        let source = self
            .blobs
            .get(&source_path.key())
            .filter(|_| source_path.blob.is_some())
            .ok_or_else(|| source_path.not_found())?;

        if let Some(lease_id) = headers.get_str(header::SOURCE_LEASE_ID)
            && source.lease.active_id(now) != Some(lease_id)
        {
            return Err(reject(
                412,
                code::LEASE_ID_MISMATCH_WITH_BLOB_OPERATION,
                "The lease ID specified did not match the lease ID for the source blob.",
            ));
        }
        evaluate(source, headers, &SOURCE, false)?;
        let payload = source.data.clone();

        self.check_blob_write(now, path, headers)?;

        let stamp = self.clock.tick();
        let copy = TrackedCopy::start(source_url, payload, self.copy_plan.clone());
        let resource = self
            .blobs
            .entry(path.key())
            .or_insert_with(|| Resource::new(stamp.clone(), Bytes::new()));
        resource.stamp(stamp);
        resource.data = Bytes::new();

        let mut response = resource
            .properties()?
            .with_header(header::COPY_ID, text(&header::COPY_ID, &copy.state.copy_id)?)
            .with_header(header::COPY_STATUS, HeaderValue::from_static(copy.state.status.into()));
        response.status = 202;
        resource.copy = Some(copy);
        Ok(response)
    }

    fn read(
        &mut self,
        now: Instant,
        path: &ResourcePath,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse, ResourceResponse> {
        if request.method == Method::HEAD && self.failing_fetches > 0 {
            self.failing_fetches -= 1;
            return Err(reject(503, code::SERVER_BUSY, "The server is busy."));
        }

        let Self { blobs, containers, clock, .. } = self;
        let resource = match path.blob {
            Some(_) => blobs.get_mut(&path.key()),
            None => containers.get_mut(&path.container),
        }
        .ok_or_else(|| path.not_found())?;
        evaluate(resource, &request.headers, &DESTINATION, true)?;

        if request.method == Method::HEAD
            && let Some(copy) = resource.copy.as_mut()
        {
            let completed = copy.advance(clock.tick().1);
            if let Some(payload) = completed {
                resource.data = payload;
                resource.stamp(clock.tick());
            }
        }

        let lease_status = match resource.lease.active_id(now) {
            Some(_) => "locked",
            None => "unlocked",
        };
        let mut response = resource
            .properties()?
            .with_header(header::CONTENT_LENGTH, HeaderValue::from(resource.data.len()))
            .with_header(
                header::LEASE_STATE,
                HeaderValue::from_static(lease_state(resource.lease.phase(now))),
            )
            .with_header(header::LEASE_STATUS, HeaderValue::from_static(lease_status))
            .with_body(resource.data.clone());
        if let Some(copy) = &resource.copy {
            let headers = copy.state.to_headers().map_err(|_| internal_error())?;
            response.headers.extend(headers);
        }

        Ok(response)
    }

    fn delete(
        &mut self,
        now: Instant,
        path: &ResourcePath,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse, ResourceResponse> {
        let resource = self.resource(path).ok_or_else(|| path.not_found())?;
        check_write_lease(&resource.lease, now, &request.headers, path.blob.is_some())?;
        evaluate(resource, &request.headers, &DESTINATION, false)?;

        match path.blob {
            Some(_) => {
                self.blobs.remove(&path.key());
            }
            None => {
                let prefix = format!("{}/", path.container);
                self.containers.remove(&path.container);
                self.blobs.retain(|key, _| !key.starts_with(&prefix));
            }
        }

        Ok(ResourceResponse::new(202))
    }
}

fn reject(status: u16, error_code: &'static str, message: &str) -> ResourceResponse {
    ResourceResponse::new(status)
        .with_header(header::ERROR_CODE, HeaderValue::from_static(error_code))
        .with_body(message.to_owned())
}

/// Encodes a response header value the service produced itself.
fn text(name: &HeaderName, value: impl AsRef<str>) -> Result<HeaderValue, ResourceResponse> {
    header_value(name, value).map_err(|_| internal_error())
}

fn internal_error() -> ResourceResponse {
    reject(
        500,
        INTERNAL_ERROR,
        "The server encountered an internal error. Please retry the request.",
    )
}

fn rejected(rejection: Rejection) -> ResourceResponse {
    reject(rejection.status, rejection.code, rejection.message)
}

fn invalid_header(name: &HeaderName) -> ResourceResponse {
    reject(
        400,
        code::INVALID_HEADER_VALUE,
        &format!("The value for header '{name}' is missing or invalid."),
    )
}

fn missing_lease_id() -> ResourceResponse {
    reject(
        400,
        code::LEASE_ID_MISSING,
        "A lease ID was not specified in the request.",
    )
}

fn parse_lease_duration(value: Option<&str>) -> Result<Option<Duration>, ResourceResponse> {
    let invalid = || invalid_header(&header::LEASE_DURATION);
    match value.ok_or_else(invalid)?.trim() {
        "-1" => Ok(None),
        secs => match secs.parse::<u32>() {
            Ok(secs) if (MIN_LEASE_SECS..=MAX_LEASE_SECS).contains(&secs) => {
                Ok(Some(Duration::from_secs(u64::from(secs))))
            }
            _ => Err(invalid()),
        },
    }
}

fn parse_break_period(value: Option<&str>) -> Result<Option<u64>, ResourceResponse> {
    let Some(value) = value else {
        return Ok(None);
    };

    match value.trim().parse::<u32>() {
        Ok(secs) if secs <= MAX_BREAK_PERIOD_SECS => Ok(Some(u64::from(secs))),
        _ => Err(invalid_header(&header::LEASE_BREAK_PERIOD)),
    }
}

fn check_write_lease(
    lease: &LeaseSlot,
    now: Instant,
    headers: &HeaderMap,
    blob: bool,
) -> Result<(), ResourceResponse> {
    let (mismatch, not_present) = if blob {
        (
            code::LEASE_ID_MISMATCH_WITH_BLOB_OPERATION,
            code::LEASE_NOT_PRESENT_WITH_BLOB_OPERATION,
        )
    } else {
        (
            code::LEASE_ID_MISMATCH_WITH_CONTAINER_OPERATION,
            code::LEASE_NOT_PRESENT_WITH_CONTAINER_OPERATION,
        )
    };

    match (lease.active_id(now), headers.get_str(header::LEASE_ID)) {
        (Some(_), None) => Err(reject(
            412,
            code::LEASE_ID_MISSING,
            "There is currently a lease on the resource and no lease ID was specified in the request.",
        )),
        (Some(active), Some(supplied)) if active != supplied => Err(reject(
            412,
            mismatch,
            "The lease ID specified did not match the lease ID for the resource.",
        )),
        (None, Some(_)) => Err(reject(
            412,
            not_present,
            "There is currently no lease on the resource.",
        )),
        _ => Ok(()),
    }
}

/// Evaluates ETag and time preconditions against an existing resource.
///
/// Failed `If-None-Match` and `If-Modified-Since` checks on reads answer
/// `304 Not Modified`, every other failure `412`.
fn evaluate(
    resource: &Resource,
    headers: &HeaderMap,
    names: &ConditionHeaders,
    read: bool,
) -> Result<(), ResourceResponse> {
    let failed = || {
        reject(
            412,
            names.failure_code,
            "The condition specified using HTTP conditional header(s) is not met.",
        )
    };
    let not_modified = || if read { ResourceResponse::new(304) } else { failed() };

    if let Some(etag) = headers.get_str(&names.if_match)
        && etag != "*"
        && etag != resource.etag
    {
        return Err(failed());
    }

    if let Some(etag) = headers.get_str(&names.if_none_match)
        && (etag == "*" || etag == resource.etag)
    {
        return Err(not_modified());
    }

    let modified_since = headers
        .get_http_date(&names.if_modified_since)
        .map_err(|_| invalid_header(&names.if_modified_since))?;
    if let Some(since) = modified_since
        && resource.last_modified <= since
    {
        return Err(not_modified());
    }

    let unmodified_since = headers
        .get_http_date(&names.if_unmodified_since)
        .map_err(|_| invalid_header(&names.if_unmodified_since))?;
    if let Some(since) = unmodified_since
        && resource.last_modified > since
    {
        return Err(failed());
    }

    Ok(())
}

/// Evaluates preconditions for a write that would create the resource.
fn evaluate_missing(
    headers: &HeaderMap,
    names: &ConditionHeaders,
) -> Result<(), ResourceResponse> {
    if headers.contains_key(&names.if_match) {
        return Err(reject(
            412,
            names.failure_code,
            "The condition specified using HTTP conditional header(s) is not met.",
        ));
    }

    Ok(())
}

fn lease_state(phase: Phase) -> &'static str {
    match phase {
        Phase::Available => "available",
        Phase::Leased => "leased",
        Phase::Expired => "expired",
        Phase::Breaking => "breaking",
        Phase::Broken => "broken",
    }
}

/// In-memory storage service implementing [`ResourceTransport`].
///
/// Follows the storage REST contract closely enough for client tests:
///
/// - lease acquire, renew, release, break and change with the server's
///   status codes and `x-ms-error-code` values,
/// - writes and deletes on leased resources require the matching lease id,
/// - `If-*` and `x-ms-source-if-*` preconditions,
/// - copies that progress on every `HEAD` of the destination according to
///   the current [`MockCopyPlan`].
///
/// Clones share the same state. Every request is recorded and can be
/// inspected with [`requests`](Self::requests).
#[derive(Clone)]
pub struct MockStorageService {
    endpoint: Url,
    state: Arc<Mutex<State>>,
}

impl fmt::Debug for MockStorageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockStorageService")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl Default for MockStorageService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStorageService {
    /// Creates an empty service at the default endpoint.
    pub fn new() -> Self {
        let endpoint = Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL");
        Self::with_endpoint(endpoint)
    }

    /// Creates an empty service; resource URLs are built on `endpoint`.
    pub fn with_endpoint(endpoint: Url) -> Self {
        Self {
            endpoint,
            state: Arc::default(),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// URL of the resource at `path`, e.g. `container/blob.txt`.
    pub fn resource_url(&self, path: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(path);
        url
    }

    /// The service as a shared transport.
    pub fn transport(&self) -> Arc<dyn ResourceTransport> {
        Arc::new(self.clone())
    }

    /// Creates a container if it does not exist yet and returns its URL.
    pub fn create_container(&self, name: &str) -> Url {
        let mut state = self.lock();
        let stamp = state.clock.tick();
        state
            .containers
            .entry(name.to_owned())
            .or_insert_with(|| Resource::new(stamp, Bytes::new()));
        self.resource_url(name)
    }

    /// Creates or overwrites a blob, creating its container as needed.
    pub fn create_blob(&self, container: &str, name: &str, data: impl Into<Bytes>) -> Url {
        self.create_container(container);

        let path = format!("{container}/{name}");
        let mut state = self.lock();
        let stamp = state.clock.tick();
        state
            .blobs
            .insert(path.clone(), Resource::new(stamp, data.into()));
        self.resource_url(&path)
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ResourceRequest> {
        self.lock().requests.clone()
    }

    /// The id of the lease currently restricting writes to `resource`.
    pub fn lease_id(&self, resource: &Url) -> Option<String> {
        let state = self.lock();
        let path = ResourcePath::parse(resource);
        state
            .resource(&path)
            .and_then(|r| r.lease.active_id(Instant::now()).map(str::to_owned))
    }

    /// Content of the blob at `resource`.
    pub fn blob_data(&self, resource: &Url) -> Option<Bytes> {
        let state = self.lock();
        state
            .blobs
            .get(&ResourcePath::parse(resource).key())
            .map(|blob| blob.data.clone())
    }

    /// Copy state of the blob at `resource`, without counting as a poll.
    pub fn copy_state(&self, resource: &Url) -> Option<CopyOperationState> {
        let state = self.lock();
        state
            .blobs
            .get(&ResourcePath::parse(resource).key())
            .and_then(|blob| blob.copy.as_ref())
            .map(|copy| copy.state.clone())
    }

    /// Sets how copies accepted from now on progress.
    pub fn set_copy_plan(&self, plan: MockCopyPlan) {
        self.lock().copy_plan = plan;
    }

    /// Makes the next `count` `HEAD` requests fail with `503 ServerBusy`.
    pub fn fail_next_attribute_fetches(&self, count: u32) {
        self.lock().failing_fetches = count;
    }

    /// Replaces the copy on `resource` with a new one, as if another client
    /// had started a copy onto the same destination.
    pub fn supersede_copy(&self, resource: &Url) {
        let mut state = self.lock();
        if let Some(copy) = state
            .blobs
            .get_mut(&ResourcePath::parse(resource).key())
            .and_then(|blob| blob.copy.as_mut())
        {
            copy.supersede();
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl ResourceTransport for MockStorageService {
    async fn send(&self, request: ResourceRequest) -> Result<ResourceResponse> {
        let response = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            state.handle(&request)
        };

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_lease(url: &Url, action: &'static str) -> ResourceRequest {
        ResourceRequest::put(url.clone())
            .with_query("comp", "lease")
            .with_header(header::LEASE_ACTION, HeaderValue::from_static(action))
    }

    fn value(text: &str) -> HeaderValue {
        HeaderValue::from_str(text).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_contract() {
        let service = MockStorageService::new();
        let blob = service.create_blob("c", "b", "data");

        let acquire = put_lease(&blob, "acquire").with_header(header::LEASE_DURATION, value("15"));
        let response = service.send(acquire.clone()).await.unwrap();
        assert_eq!(response.status, 201);
        let lease_id = response.header(header::LEASE_ID).unwrap().to_owned();

        let response = service.send(acquire).await.unwrap();
        assert_eq!(response.status, 409);
        assert_eq!(response.error_code(), Some(code::LEASE_ALREADY_PRESENT));

        let renew = put_lease(&blob, "renew").with_header(header::LEASE_ID, value("other"));
        let response = service.send(renew).await.unwrap();
        assert_eq!(
            response.error_code(),
            Some(code::LEASE_ID_MISMATCH_WITH_LEASE_OPERATION)
        );

        let release = put_lease(&blob, "release").with_header(header::LEASE_ID, value(&lease_id));
        assert_eq!(service.send(release.clone()).await.unwrap().status, 200);

        let response = service.send(release).await.unwrap();
        assert_eq!(response.status, 409);
        assert_eq!(
            response.error_code(),
            Some(code::LEASE_NOT_PRESENT_WITH_LEASE_OPERATION)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_duration_is_rejected() {
        let service = MockStorageService::new();
        let blob = service.create_blob("c", "b", "data");

        let acquire = put_lease(&blob, "acquire").with_header(header::LEASE_DURATION, value("90"));
        let response = service.send(acquire).await.unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.error_code(), Some(code::INVALID_HEADER_VALUE));
    }

    #[tokio::test]
    async fn test_conditional_reads_and_writes() {
        let service = MockStorageService::new();
        let blob = service.create_blob("c", "b", "v1");

        let head = service.send(ResourceRequest::head(blob.clone())).await.unwrap();
        let etag = head.header(header::ETAG).unwrap().to_owned();
        assert_eq!(head.header(header::CONTENT_LENGTH), Some("2"));
        assert!(head.body.is_empty());

        let cached = ResourceRequest::get(blob.clone())
            .with_header(header::IF_NONE_MATCH, value(&etag));
        assert_eq!(service.send(cached).await.unwrap().status, 304);

        let stale = ResourceRequest::put(blob.clone())
            .with_header(header::IF_MATCH, value("\"0xStale\""))
            .with_body("v2");
        let response = service.send(stale).await.unwrap();
        assert_eq!(response.status, 412);
        assert_eq!(response.error_code(), Some(code::CONDITION_NOT_MET));

        let fresh = ResourceRequest::put(blob.clone())
            .with_header(header::IF_MATCH, value(&etag))
            .with_body("v2");
        let response = service.send(fresh).await.unwrap();
        assert_eq!(response.status, 201);
        assert_ne!(response.header(header::ETAG), Some(etag.as_str()));
        assert_eq!(service.blob_data(&blob).as_deref(), Some(&b"v2"[..]));
    }

    #[tokio::test]
    async fn test_missing_container_and_blob() {
        let service = MockStorageService::new();

        let response = service
            .send(ResourceRequest::put(service.resource_url("nope/blob")).with_body("x"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.error_code(), Some(code::RESOURCE_NOT_FOUND));

        service.create_container("c");
        let response = service
            .send(ResourceRequest::get(service.resource_url("c/blob")))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.error_code(), Some(code::BLOB_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_copy_progresses_on_head() {
        let service = MockStorageService::new();
        let source = service.create_blob("c", "src", vec![1u8; 100]);
        let destination = service.resource_url("c/dst");
        service.set_copy_plan(MockCopyPlan::succeed_after(2));

        let response = service
            .send(
                ResourceRequest::put(destination.clone())
                    .with_header(header::COPY_SOURCE, value(source.as_str())),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 202);
        assert_eq!(response.header(header::COPY_STATUS), Some("pending"));

        let head = service.send(ResourceRequest::head(destination.clone())).await.unwrap();
        assert_eq!(head.header(header::COPY_STATUS), Some("pending"));
        assert_eq!(head.header(header::COPY_PROGRESS), Some("50/100"));

        let head = service.send(ResourceRequest::head(destination.clone())).await.unwrap();
        assert_eq!(head.header(header::COPY_STATUS), Some("success"));
        assert_eq!(service.blob_data(&destination).map(|d| d.len()), Some(100));
    }

    #[tokio::test]
    async fn test_delete_container_removes_blobs() {
        let service = MockStorageService::new();
        let container = service.create_container("c");
        let blob = service.create_blob("c", "b", "data");

        let response = service.send(ResourceRequest::delete(container)).await.unwrap();
        assert_eq!(response.status, 202);
        assert!(service.blob_data(&blob).is_none());
    }

    #[tokio::test]
    async fn test_unsupported_method_is_rejected() {
        let service = MockStorageService::new();
        let blob = service.create_blob("c", "b", "data");

        let request = ResourceRequest::new(Method::PATCH, blob);
        let response = service.send(request).await.unwrap();
        assert_eq!(response.status, 405);
        assert_eq!(response.error_code(), Some(UNSUPPORTED_HTTP_VERB));
    }
}
