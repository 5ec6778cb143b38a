use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nimbus_core::copy::{CopyOperationState, CopyRequest, CopyStatus};
use nimbus_core::{AttributeFetcher, Error, ResourceRequest, ResourceTransport, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{CopyMonitorConfig, HeadAttributeFetcher};
use crate::TRACING_TARGET_COPY;
use crate::classify::classify_response;

/// Starts server-side copies and polls them until they finish.
///
/// The monitor sends exactly one mutating request per copy (the initiating
/// `PUT`). Everything after that is attribute reads. The last observed state
/// of each copy still in flight is kept as a read-only belief, see
/// [`state`](Self::state).
#[derive(Clone)]
pub struct CopyMonitor {
    transport: Arc<dyn ResourceTransport>,
    attributes: Arc<dyn AttributeFetcher>,
    config: CopyMonitorConfig,
    observed: Arc<Mutex<HashMap<Url, CopyOperationState>>>,
}

impl fmt::Debug for CopyMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CopyMonitor {
    /// Creates a monitor with separate collaborators for the copy request
    /// and for attribute polling.
    pub fn new(
        transport: Arc<dyn ResourceTransport>,
        attributes: Arc<dyn AttributeFetcher>,
    ) -> Self {
        Self {
            transport,
            attributes,
            config: CopyMonitorConfig::default(),
            observed: Arc::default(),
        }
    }

    /// Creates a monitor that polls with `HEAD` requests over `transport`.
    pub fn from_transport(transport: Arc<dyn ResourceTransport>) -> Self {
        let attributes = Arc::new(HeadAttributeFetcher::new(transport.clone()));
        Self::new(transport, attributes)
    }

    #[must_use]
    pub fn with_config(mut self, config: CopyMonitorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CopyMonitorConfig {
        &self.config
    }

    /// Last state observed for a copy onto `destination` that is still in
    /// flight.
    ///
    /// Entries are dropped once a terminal state is observed and when
    /// [`wait_until_complete`](Self::wait_until_complete) returns.
    pub fn state(&self, destination: &Url) -> Option<CopyOperationState> {
        self.observed().get(destination).cloned()
    }

    /// Drops the belief about `destination`, returning it.
    ///
    /// For callers driving [`start_copy`](Self::start_copy) and
    /// [`poll`](Self::poll) themselves and abandoning a copy midway.
    pub fn forget(&self, destination: &Url) -> Option<CopyOperationState> {
        self.observed().remove(destination)
    }

    /// Issues the copy request and returns the state the server accepted.
    ///
    /// Destination preconditions travel as regular condition headers, source
    /// preconditions as `x-ms-source-*` headers.
    pub async fn start_copy(&self, request: &CopyRequest) -> Result<CopyOperationState> {
        tracing::debug!(
            target: TRACING_TARGET_COPY,
            source = %request.source,
            destination = %request.destination,
            "Starting copy"
        );

        let put = ResourceRequest::put(request.destination.clone())
            .with_headers(request.to_headers()?);
        let response = self.transport.send(put).await?;

        if !response.is_success() {
            let error = classify_response(None, response);
            tracing::warn!(
                target: TRACING_TARGET_COPY,
                destination = %request.destination,
                error = %error,
                "Copy request rejected"
            );
            return Err(error);
        }

        let mut state = CopyOperationState::from_headers(&response.headers)?.ok_or_else(|| {
            Error::transport()
                .with_status(response.status)
                .with_message("copy response carries no copy id")
        })?;
        if state.source.is_none() {
            state.source = Some(request.source.clone());
        }

        tracing::info!(
            target: TRACING_TARGET_COPY,
            copy_id = %state.copy_id,
            status = %state.status,
            destination = %request.destination,
            "Copy accepted"
        );

        self.observe(&request.destination, &state);
        Ok(state)
    }

    /// Re-fetches the destination's copy state.
    ///
    /// Transient fetch failures are retried under the configured policy, so
    /// an intermittent read error is never reported as a failed copy.
    pub async fn poll(&self, destination: &Url) -> Result<CopyOperationState> {
        let attributes = self
            .config
            .fetch_retry()
            .retry(|| self.attributes.fetch_attributes(destination))
            .await?;

        let state = attributes.copy.ok_or_else(|| {
            Error::transport().with_message(format!("'{destination}' carries no copy state"))
        })?;

        tracing::debug!(
            target: TRACING_TARGET_COPY,
            copy_id = %state.copy_id,
            status = %state.status,
            bytes_copied = ?state.bytes_copied,
            total_bytes = ?state.total_bytes,
            "Copy polled"
        );

        self.observe(destination, &state);
        Ok(state)
    }

    /// Starts a copy and waits for it with the configured interval and budget.
    pub async fn wait(
        &self,
        request: &CopyRequest,
        cancel: &CancellationToken,
    ) -> Result<CopyOperationState> {
        self.wait_until_complete(
            request,
            self.config.poll_interval(),
            self.config.timeout(),
            cancel,
        )
        .await
    }

    /// Starts a copy and polls it until it reaches a terminal status.
    ///
    /// The budget is measured on the monotonic clock from the call. Waiting
    /// between polls is timer-based and returns `Cancelled` as soon as
    /// `cancel` fires. A poll whose fetch retries run past the budget is
    /// abandoned one poll interval after it. A budget too large for the clock
    /// waits without limit.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a zero poll interval, before any request.
    /// - `CopyFailed` or `CopyAborted` with the server-reported description.
    /// - `CopyTimeout` when the budget runs out first.
    /// - `Cancelled` when `cancel` fires.
    pub async fn wait_until_complete(
        &self,
        request: &CopyRequest,
        poll_interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CopyOperationState> {
        if poll_interval.is_zero() {
            return Err(Error::invalid_argument().with_message("poll interval must be positive"));
        }

        let result = self.drive(request, poll_interval, timeout, cancel).await;
        self.forget(&request.destination);
        result
    }

    async fn drive(
        &self,
        request: &CopyRequest,
        poll_interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CopyOperationState> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let cutoff = deadline.and_then(|deadline| deadline.checked_add(poll_interval));

        let initial = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(&request.destination)),
            result = self.start_copy(request) => result?,
        };

        let copy_id = initial.copy_id.clone();
        let mut state = initial;

        loop {
            if state.copy_id != copy_id {
                tracing::warn!(
                    target: TRACING_TARGET_COPY,
                    copy_id = %copy_id,
                    observed = %state.copy_id,
                    "Copy superseded by another operation"
                );
                return Err(Error::copy_aborted()
                    .with_message(format!("copy '{copy_id}' was superseded by '{}'", state.copy_id)));
            }

            match state.status {
                CopyStatus::Success => {
                    tracing::info!(
                        target: TRACING_TARGET_COPY,
                        copy_id = %copy_id,
                        elapsed_ms = started.elapsed().as_millis(),
                        "Copy completed"
                    );
                    return Ok(state);
                }
                CopyStatus::Failed => return Err(terminal_error(Error::copy_failed(), state)),
                CopyStatus::Aborted => return Err(terminal_error(Error::copy_aborted(), state)),
                CopyStatus::Pending => {}
            }

            let now = Instant::now();
            let pause = match deadline {
                Some(deadline) if now >= deadline => return Err(timed_out(&copy_id, timeout)),
                Some(deadline) => poll_interval.min(deadline - now),
                None => poll_interval,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&request.destination)),
                _ = tokio::time::sleep(pause) => {}
            }

            state = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(&request.destination)),
                _ = expire(cutoff) => return Err(timed_out(&copy_id, timeout)),
                result = self.poll(&request.destination) => result?,
            };
        }
    }

    fn observed(&self) -> MutexGuard<'_, HashMap<Url, CopyOperationState>> {
        self.observed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&self, destination: &Url, state: &CopyOperationState) {
        let mut observed = self.observed();
        if state.is_terminal() {
            observed.remove(destination);
        } else {
            observed.insert(destination.clone(), state.clone());
        }
    }
}

/// Completes at `at`, or never.
async fn expire(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn timed_out(copy_id: &str, timeout: Duration) -> Error {
    tracing::warn!(
        target: TRACING_TARGET_COPY,
        copy_id = %copy_id,
        timeout_secs = timeout.as_secs(),
        "Copy did not complete in time"
    );
    Error::copy_timeout().with_message(format!(
        "copy '{copy_id}' still pending after {}s",
        timeout.as_secs()
    ))
}

fn terminal_error(error: Error, state: CopyOperationState) -> Error {
    tracing::warn!(
        target: TRACING_TARGET_COPY,
        copy_id = %state.copy_id,
        status = %state.status,
        description = ?state.status_description,
        "Copy ended unsuccessfully"
    );

    match state.status_description {
        Some(description) => error.with_message(description),
        None => error.with_message(format!("copy '{}' ended as {}", state.copy_id, state.status)),
    }
}

fn cancelled(destination: &Url) -> Error {
    tracing::debug!(
        target: TRACING_TARGET_COPY,
        destination = %destination,
        "Copy wait cancelled"
    );
    Error::cancelled().with_message("copy wait was cancelled")
}
