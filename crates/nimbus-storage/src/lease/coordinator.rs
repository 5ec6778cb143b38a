use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nimbus_core::headers::{HeaderMapExt, header, header_value};
use nimbus_core::lease::{
    LeaseAction, LeaseDuration, LeaseId, LeaseState, LeaseStatus, MAX_BREAK_PERIOD_SECS,
    ResourceKind,
};
use nimbus_core::{
    AccessCondition, Error, ErrorKind, HeaderValue, ResourceRequest, ResourceResponse,
    ResourceTransport, Result,
};
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::TRACING_TARGET_LEASE;
use crate::classify::classify_response;

/// What the coordinator last learned about its lease.
#[derive(Debug, Default)]
struct LeaseBelief {
    status: LeaseStatus,
    lease_id: Option<LeaseId>,
    proposed_lease_id: Option<LeaseId>,
    duration: Option<LeaseDuration>,
    /// When the server last confirmed the lease (acquire or renew).
    confirmed_at: Option<Instant>,
    /// When a breaking lease becomes broken.
    breaks_at: Option<Instant>,
}

impl LeaseBelief {
    /// Status as of `now`, inferring expiry and completed breaks.
    fn status_at(&self, now: Instant) -> LeaseStatus {
        match self.status {
            LeaseStatus::Leased => {
                let length = self.duration.and_then(|d| d.as_duration());
                match (length, self.confirmed_at) {
                    (Some(length), Some(confirmed)) if now >= confirmed + length => {
                        LeaseStatus::Expired
                    }
                    _ => LeaseStatus::Leased,
                }
            }
            LeaseStatus::Breaking => match self.breaks_at {
                Some(at) if now >= at => LeaseStatus::Broken,
                _ => LeaseStatus::Breaking,
            },
            status => status,
        }
    }

    /// Time left before a live lease expires or a break completes.
    ///
    /// `None` when no live lease is known or the lease is infinite.
    fn remaining(&self, now: Instant) -> Option<Duration> {
        match self.status_at(now) {
            LeaseStatus::Leased => {
                let length = self.duration.and_then(|d| d.as_duration())?;
                let confirmed = self.confirmed_at?;
                Some((confirmed + length).saturating_duration_since(now))
            }
            LeaseStatus::Breaking => self.breaks_at.map(|at| at.saturating_duration_since(now)),
            _ => None,
        }
    }

    fn holds(&self, lease_id: Option<&LeaseId>) -> bool {
        lease_id.is_some() && self.lease_id.as_ref() == lease_id
    }
}

/// Drives the lease verbs for a single container or blob.
///
/// The coordinator never retries. Every rejected request is classified into
/// a lease error kind ([`LeaseAlreadyPresent`], [`LeaseLost`],
/// [`LeaseIdMismatch`]) or passed through as a transport error carrying the
/// status and server error code.
///
/// The internal lock only guards the belief and is never held across an
/// await, so a coordinator can be shared freely behind an `Arc`.
///
/// [`LeaseAlreadyPresent`]: ErrorKind::LeaseAlreadyPresent
/// [`LeaseLost`]: ErrorKind::LeaseLost
/// [`LeaseIdMismatch`]: ErrorKind::LeaseIdMismatch
///
/// # Examples
///
/// ```rust,ignore
/// use nimbus_core::lease::LeaseDuration;
/// use nimbus_storage::LeaseCoordinator;
///
/// let coordinator = LeaseCoordinator::blob(transport, blob_url);
/// let lease_id = coordinator.acquire(LeaseDuration::fixed(30)?, None, None).await?;
///
/// // write under the lease
/// let condition = coordinator.lease_condition();
///
/// coordinator.release(None).await?;
/// ```
pub struct LeaseCoordinator {
    transport: Arc<dyn ResourceTransport>,
    resource: Url,
    kind: ResourceKind,
    belief: Mutex<LeaseBelief>,
}

impl fmt::Debug for LeaseCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseCoordinator")
            .field("resource", &self.resource.as_str())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl LeaseCoordinator {
    /// Creates a coordinator for `resource`, starting out `Unleased`.
    pub fn new(transport: Arc<dyn ResourceTransport>, resource: Url, kind: ResourceKind) -> Self {
        Self {
            transport,
            resource,
            kind,
            belief: Mutex::new(LeaseBelief::default()),
        }
    }

    /// Creates a coordinator for a blob.
    pub fn blob(transport: Arc<dyn ResourceTransport>, resource: Url) -> Self {
        Self::new(transport, resource, ResourceKind::Blob)
    }

    /// Creates a coordinator for a container.
    pub fn container(transport: Arc<dyn ResourceTransport>, resource: Url) -> Self {
        Self::new(transport, resource, ResourceKind::Container)
    }

    pub fn resource(&self) -> &Url {
        &self.resource
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Snapshot of the current belief.
    ///
    /// `Expired` and `Broken` are inferred from elapsed monotonic time since
    /// the last confirming response.
    pub fn state(&self) -> LeaseState {
        let belief = self.belief();
        LeaseState {
            resource_uri: self.resource.clone(),
            kind: self.kind,
            lease_id: belief.lease_id.clone(),
            status: belief.status_at(Instant::now()),
            duration: belief.duration,
            proposed_lease_id: belief.proposed_lease_id.clone(),
        }
    }

    /// The lease id this coordinator believes it holds.
    pub fn lease_id(&self) -> Option<LeaseId> {
        self.belief().lease_id.clone()
    }

    /// A condition requiring the held lease, for writes under the lease.
    pub fn lease_condition(&self) -> Option<AccessCondition> {
        self.lease_id().map(AccessCondition::lease)
    }

    /// Acquires the lease.
    ///
    /// `proposed_lease_id` lets the caller choose the id; otherwise the server
    /// assigns one. Re-acquiring with the id of the active lease succeeds and
    /// returns the same id. The returned id is whatever the server reported.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an out-of-range duration or a condition that
    ///   names a lease id.
    /// - `LeaseAlreadyPresent` when another lease is active or breaking.
    pub async fn acquire(
        &self,
        duration: LeaseDuration,
        proposed_lease_id: Option<Uuid>,
        condition: Option<&AccessCondition>,
    ) -> Result<LeaseId> {
        let duration = duration.validate()?;
        if condition.and_then(AccessCondition::lease_id).is_some() {
            return Err(Error::invalid_argument()
                .with_message("acquire takes a proposed lease id, not a lease id condition"));
        }

        let condition = condition.cloned().unwrap_or_default();
        let proposed = proposed_lease_id.map(LeaseId::from);

        let mut request = self
            .lease_request(LeaseAction::Acquire, &condition)?
            .with_header(header::LEASE_DURATION, duration.header_value());
        if let Some(proposed) = &proposed {
            let value = header_value(&header::PROPOSED_LEASE_ID, proposed)?;
            request = request.with_header(header::PROPOSED_LEASE_ID, value);
        }

        let previous = std::mem::replace(&mut self.belief().status, LeaseStatus::Acquiring);

        let response = match self.dispatch(LeaseAction::Acquire, request).await {
            Ok(response) => response,
            Err(err) => {
                self.belief().status = previous;
                return Err(err);
            }
        };

        let granted = response
            .header(header::LEASE_ID)
            .map(LeaseId::from)
            .or_else(|| proposed.clone());
        let Some(lease_id) = granted else {
            self.belief().status = previous;
            return Err(Error::transport()
                .with_status(response.status)
                .with_message("acquire response carried no lease id"));
        };

        *self.belief() = LeaseBelief {
            status: LeaseStatus::Leased,
            lease_id: Some(lease_id.clone()),
            proposed_lease_id: proposed,
            duration: Some(duration),
            confirmed_at: Some(Instant::now()),
            breaks_at: None,
        };

        tracing::info!(
            target: TRACING_TARGET_LEASE,
            resource = %self.resource,
            lease_id = %lease_id,
            duration = ?duration,
            "Lease acquired"
        );

        Ok(lease_id)
    }

    /// Renews the lease, restarting its duration.
    ///
    /// The lease id comes from `condition` when it names one, otherwise from
    /// the lease this coordinator holds.
    ///
    /// # Errors
    ///
    /// - `PreconditionNotSet` when no lease id is known, before any request.
    /// - `LeaseIdMismatch` when the server holds a different lease.
    /// - `LeaseLost` when the lease is gone, expired and re-taken, or broken.
    pub async fn renew(&self, condition: Option<&AccessCondition>) -> Result<()> {
        let condition = self.require_lease(LeaseAction::Renew, condition)?;
        let request = self.lease_request(LeaseAction::Renew, &condition)?;

        match self.dispatch(LeaseAction::Renew, request).await {
            Ok(_) => {
                let mut belief = self.belief();
                belief.status = LeaseStatus::Leased;
                belief.lease_id = condition.lease_id().cloned();
                belief.confirmed_at = Some(Instant::now());
                belief.breaks_at = None;

                tracing::debug!(
                    target: TRACING_TARGET_LEASE,
                    resource = %self.resource,
                    "Lease renewed"
                );
                Ok(())
            }
            Err(err) => {
                self.record_loss(&err, condition.lease_id(), LeaseStatus::Expired);
                Err(err)
            }
        }
    }

    /// Releases the lease so another client can acquire it immediately.
    ///
    /// # Errors
    ///
    /// - `PreconditionNotSet` when no lease id is known, before any request.
    /// - `LeaseIdMismatch` when the server holds a different lease.
    /// - `LeaseLost` when there is no lease to release.
    pub async fn release(&self, condition: Option<&AccessCondition>) -> Result<()> {
        let condition = self.require_lease(LeaseAction::Release, condition)?;
        let request = self.lease_request(LeaseAction::Release, &condition)?;

        match self.dispatch(LeaseAction::Release, request).await {
            Ok(_) => {
                {
                    let mut belief = self.belief();
                    if belief.lease_id.is_none() || belief.holds(condition.lease_id()) {
                        *belief = LeaseBelief::default();
                    }
                }

                tracing::info!(
                    target: TRACING_TARGET_LEASE,
                    resource = %self.resource,
                    "Lease released"
                );
                Ok(())
            }
            Err(err) => {
                self.record_loss(&err, condition.lease_id(), LeaseStatus::Unleased);
                Err(err)
            }
        }
    }

    /// Breaks the lease, returning the time until it is broken.
    ///
    /// `break_period` is the grace period in seconds (`0..=60`, and no longer
    /// than what remains of the lease this coordinator holds); `None` lets a
    /// fixed lease run out.
    /// The coordinator reports `Breaking` and never waits for the break to
    /// complete.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an out-of-range grace period, before any request.
    /// - `LeaseLost` when there is no lease to break.
    pub async fn break_lease(
        &self,
        break_period: Option<u32>,
        condition: Option<&AccessCondition>,
    ) -> Result<Duration> {
        if let Some(period) = break_period {
            self.validate_break_period(period)?;
        }

        let condition = condition.cloned().unwrap_or_default();
        let mut request = self.lease_request(LeaseAction::Break, &condition)?;
        if let Some(period) = break_period {
            request = request.with_header(header::LEASE_BREAK_PERIOD, HeaderValue::from(period));
        }

        let response = match self.dispatch(LeaseAction::Break, request).await {
            Ok(response) => response,
            Err(err) => {
                if err.kind() == ErrorKind::LeaseLost {
                    *self.belief() = LeaseBelief::default();
                }
                return Err(err);
            }
        };

        let remaining = response
            .headers
            .get_u64(&header::LEASE_TIME)?
            .map(Duration::from_secs)
            .unwrap_or_default();

        {
            let now = Instant::now();
            let mut belief = self.belief();
            belief.status = if remaining.is_zero() {
                LeaseStatus::Broken
            } else {
                LeaseStatus::Breaking
            };
            belief.breaks_at = Some(now + remaining);
        }

        tracing::info!(
            target: TRACING_TARGET_LEASE,
            resource = %self.resource,
            remaining_secs = remaining.as_secs(),
            "Lease break started"
        );

        Ok(remaining)
    }

    /// Changes the id of the active lease to `proposed_lease_id`.
    ///
    /// # Errors
    ///
    /// As for [`renew`](Self::renew).
    pub async fn change(
        &self,
        proposed_lease_id: Uuid,
        condition: Option<&AccessCondition>,
    ) -> Result<LeaseId> {
        let condition = self.require_lease(LeaseAction::Change, condition)?;
        let proposed = LeaseId::from(proposed_lease_id);
        let value = header_value(&header::PROPOSED_LEASE_ID, &proposed)?;
        let request = self
            .lease_request(LeaseAction::Change, &condition)?
            .with_header(header::PROPOSED_LEASE_ID, value);

        let response = match self.dispatch(LeaseAction::Change, request).await {
            Ok(response) => response,
            Err(err) => {
                self.record_loss(&err, condition.lease_id(), LeaseStatus::Expired);
                return Err(err);
            }
        };

        let lease_id = response
            .header(header::LEASE_ID)
            .map(LeaseId::from)
            .unwrap_or_else(|| proposed.clone());

        {
            let mut belief = self.belief();
            belief.lease_id = Some(lease_id.clone());
            belief.proposed_lease_id = Some(proposed);
            if belief.status != LeaseStatus::Breaking {
                belief.status = LeaseStatus::Leased;
            }
        }

        tracing::info!(
            target: TRACING_TARGET_LEASE,
            resource = %self.resource,
            lease_id = %lease_id,
            "Lease id changed"
        );

        Ok(lease_id)
    }

    fn belief(&self) -> MutexGuard<'_, LeaseBelief> {
        self.belief.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate_break_period(&self, period: u32) -> Result<()> {
        if period > MAX_BREAK_PERIOD_SECS {
            return Err(Error::invalid_argument().with_message(format!(
                "break period must be between 0 and {MAX_BREAK_PERIOD_SECS} seconds, got {period}"
            )));
        }

        let remaining = self.belief().remaining(Instant::now());
        if let Some(remaining) = remaining
            && Duration::from_secs(u64::from(period)) > remaining
        {
            return Err(Error::invalid_argument().with_message(format!(
                "break period of {period} seconds exceeds the {:.0} seconds left on the lease",
                remaining.as_secs_f64().ceil()
            )));
        }

        Ok(())
    }

    /// Resolves the lease id for renew, release and change.
    ///
    /// An id named by the caller wins over the held one.
    fn require_lease(
        &self,
        action: LeaseAction,
        condition: Option<&AccessCondition>,
    ) -> Result<AccessCondition> {
        let explicit = condition.and_then(AccessCondition::lease_id).is_some();
        let held = if explicit { None } else { self.lease_id() };

        let merged = AccessCondition::merge(condition, held.as_ref())?;
        if merged.lease_id().is_none() {
            return Err(Error::precondition_not_set()
                .with_message(format!("{action} requires a lease id condition")));
        }

        Ok(merged)
    }

    fn lease_request(
        &self,
        action: LeaseAction,
        condition: &AccessCondition,
    ) -> Result<ResourceRequest> {
        let request = self
            .kind
            .lease_query()
            .into_iter()
            .fold(ResourceRequest::put(self.resource.clone()), |request, (name, value)| {
                request.with_query(name, value)
            });

        Ok(request
            .with_header(header::LEASE_ACTION, action.header_value())
            .with_headers(condition.to_headers()?))
    }

    async fn dispatch(
        &self,
        action: LeaseAction,
        request: ResourceRequest,
    ) -> Result<ResourceResponse> {
        tracing::debug!(
            target: TRACING_TARGET_LEASE,
            resource = %self.resource,
            action = %action,
            "Dispatching lease operation"
        );

        let response = self.transport.send(request).await?;
        if response.is_success() {
            return Ok(response);
        }

        let error = classify_response(Some(action), response);
        tracing::warn!(
            target: TRACING_TARGET_LEASE,
            resource = %self.resource,
            action = %action,
            kind = %error.kind(),
            status = ?error.status,
            code = ?error.code(),
            "Lease operation rejected"
        );

        Err(error)
    }

    /// Records that the server no longer honors the lease `lease_id`.
    ///
    /// A lease this coordinator broke keeps its `Breaking` or `Broken`
    /// status unless the loss means the lease is gone entirely.
    fn record_loss(&self, error: &Error, lease_id: Option<&LeaseId>, status: LeaseStatus) {
        if error.kind() != ErrorKind::LeaseLost {
            return;
        }

        let mut belief = self.belief();
        if !belief.holds(lease_id) {
            return;
        }

        let broken = matches!(
            belief.status_at(Instant::now()),
            LeaseStatus::Breaking | LeaseStatus::Broken
        );
        if status == LeaseStatus::Unleased {
            *belief = LeaseBelief::default();
        } else if !broken {
            belief.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use nimbus_core::Method;
    use nimbus_test::MockStorageService;

    use super::*;
    use crate::send_conditional;

    fn setup() -> (MockStorageService, Url) {
        let service = MockStorageService::new();
        let blob = service.create_blob("leases", "blob.txt", "hello");
        (service, blob)
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_then_release_once() {
        let durations = [
            LeaseDuration::Fixed(15),
            LeaseDuration::Fixed(30),
            LeaseDuration::Fixed(60),
            LeaseDuration::Infinite,
        ];

        for duration in durations {
            let (service, blob) = setup();
            let coordinator = LeaseCoordinator::blob(service.transport(), blob);

            let lease_id = coordinator.acquire(duration, None, None).await.unwrap();
            assert_eq!(coordinator.state().status, LeaseStatus::Leased);
            assert_eq!(coordinator.state().duration, Some(duration));

            let condition = AccessCondition::lease(lease_id.clone());
            coordinator.release(Some(&condition)).await.unwrap();
            assert_eq!(coordinator.state().status, LeaseStatus::Unleased);

            let err = coordinator.release(Some(&condition)).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::LeaseLost);
            assert_eq!(err.status, Some(409));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_returns_proposed_id() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob.clone());
        let proposed = Uuid::new_v4();

        let lease_id = coordinator
            .acquire(LeaseDuration::Fixed(60), Some(proposed), None)
            .await
            .unwrap();
        assert_eq!(lease_id, LeaseId::from(proposed));
        assert_eq!(service.lease_id(&blob).as_deref(), Some(lease_id.as_str()));

        // acquiring again with the active id is accepted
        let again = coordinator
            .acquire(LeaseDuration::Fixed(60), Some(proposed), None)
            .await
            .unwrap();
        assert_eq!(again, lease_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_conflict_restores_state() {
        let (service, blob) = setup();
        let owner = LeaseCoordinator::blob(service.transport(), blob.clone());
        let rival = LeaseCoordinator::blob(service.transport(), blob);

        owner
            .acquire(LeaseDuration::Infinite, None, None)
            .await
            .unwrap();

        let err = rival
            .acquire(LeaseDuration::Fixed(15), Some(Uuid::new_v4()), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeaseAlreadyPresent);
        assert_eq!(err.code(), Some("LeaseAlreadyPresent"));
        assert_eq!(rival.state().status, LeaseStatus::Unleased);
        assert!(rival.lease_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_rejects_invalid_input_before_sending() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob);
        let before = service.request_count();

        let err = coordinator
            .acquire(LeaseDuration::Fixed(10), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let condition = AccessCondition::lease("someone-else");
        let err = coordinator
            .acquire(LeaseDuration::Fixed(15), None, Some(&condition))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_eq!(service.request_count(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_requires_matching_id() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob);

        let lease_id = coordinator
            .acquire(LeaseDuration::Fixed(30), None, None)
            .await
            .unwrap();

        coordinator
            .renew(Some(&AccessCondition::lease(lease_id.clone())))
            .await
            .unwrap();
        coordinator.renew(None).await.unwrap();

        let other = AccessCondition::lease(Uuid::new_v4());
        let err = coordinator.renew(Some(&other)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeaseIdMismatch);
        assert_eq!(coordinator.state().status, LeaseStatus::Leased);
        assert_eq!(coordinator.lease_id(), Some(lease_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_without_lease_id_is_refused_locally() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob);
        let before = service.request_count();

        let err = coordinator.release(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionNotSet);

        let err = coordinator
            .release(Some(&AccessCondition::if_match("\"0x1\"")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionNotSet);

        assert_eq!(service.request_count(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_immediately_allows_new_acquire() {
        let (service, blob) = setup();
        let owner = LeaseCoordinator::blob(service.transport(), blob.clone());
        let next = LeaseCoordinator::blob(service.transport(), blob);

        owner
            .acquire(LeaseDuration::Fixed(60), None, None)
            .await
            .unwrap();

        let remaining = owner.break_lease(Some(0), None).await.unwrap();
        assert_eq!(remaining, Duration::ZERO);
        assert_eq!(owner.state().status, LeaseStatus::Broken);

        let proposed = Uuid::new_v4();
        let lease_id = next
            .acquire(LeaseDuration::Fixed(15), Some(proposed), None)
            .await
            .unwrap();
        assert_eq!(lease_id, LeaseId::from(proposed));

        // the lease now held by `next` is a different one
        let err = owner.renew(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeaseIdMismatch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_after_break_reports_lease_lost() {
        let (service, blob) = setup();
        let owner = LeaseCoordinator::blob(service.transport(), blob);

        owner
            .acquire(LeaseDuration::Fixed(60), None, None)
            .await
            .unwrap();
        owner.break_lease(Some(0), None).await.unwrap();

        let err = owner.renew(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeaseLost);
        assert_eq!(err.code(), Some("LeaseIsBrokenAndCannotBeRenewed"));
        assert_eq!(owner.state().status, LeaseStatus::Broken);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_while_breaking_keeps_break_status() {
        let (service, blob) = setup();
        let owner = LeaseCoordinator::blob(service.transport(), blob);

        owner
            .acquire(LeaseDuration::Fixed(60), None, None)
            .await
            .unwrap();
        let remaining = owner.break_lease(Some(10), None).await.unwrap();

        let err = owner.renew(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeaseLost);
        assert_eq!(owner.state().status, LeaseStatus::Breaking);

        tokio::time::advance(remaining).await;
        assert_eq!(owner.state().status, LeaseStatus::Broken);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_with_grace_period() {
        let (service, blob) = setup();
        let owner = LeaseCoordinator::blob(service.transport(), blob.clone());
        let next = LeaseCoordinator::blob(service.transport(), blob);

        owner
            .acquire(LeaseDuration::Fixed(60), None, None)
            .await
            .unwrap();

        let remaining = owner.break_lease(Some(10), None).await.unwrap();
        assert_eq!(remaining, Duration::from_secs(10));
        assert_eq!(owner.state().status, LeaseStatus::Breaking);

        let err = next
            .acquire(LeaseDuration::Fixed(15), Some(Uuid::new_v4()), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeaseAlreadyPresent);

        tokio::time::advance(remaining).await;
        assert_eq!(owner.state().status, LeaseStatus::Broken);

        next.acquire(LeaseDuration::Fixed(15), Some(Uuid::new_v4()), None)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_period_validation() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob);

        let err = coordinator.break_lease(Some(61), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        coordinator
            .acquire(LeaseDuration::Fixed(20), None, None)
            .await
            .unwrap();
        let before = service.request_count();

        let err = coordinator.break_lease(Some(30), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(service.request_count(), before);
        assert_eq!(coordinator.state().status, LeaseStatus::Leased);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_period_is_bounded_by_remaining_time() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob);

        coordinator
            .acquire(LeaseDuration::Fixed(30), None, None)
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        let before = service.request_count();

        let err = coordinator.break_lease(Some(25), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(service.request_count(), before);

        let remaining = coordinator.break_lease(Some(10), None).await.unwrap();
        assert_eq!(remaining, Duration::from_secs(10));
        assert_eq!(coordinator.state().status, LeaseStatus::Breaking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_unleased_resource_reports_lease_lost() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob);

        let err = coordinator.break_lease(Some(0), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeaseLost);
        assert_eq!(coordinator.state().status, LeaseStatus::Unleased);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_lease_id() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob.clone());

        let original = coordinator
            .acquire(LeaseDuration::Fixed(30), None, None)
            .await
            .unwrap();

        let proposed = Uuid::new_v4();
        let changed = coordinator.change(proposed, None).await.unwrap();
        assert_eq!(changed, LeaseId::from(proposed));
        assert_eq!(coordinator.lease_id(), Some(changed.clone()));
        assert_eq!(service.lease_id(&blob).as_deref(), Some(changed.as_str()));

        let err = coordinator
            .renew(Some(&AccessCondition::lease(original)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeaseIdMismatch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_after_release_reports_lease_lost() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob);

        let lease_id = coordinator
            .acquire(LeaseDuration::Fixed(30), None, None)
            .await
            .unwrap();
        let condition = AccessCondition::lease(lease_id);
        coordinator.release(Some(&condition)).await.unwrap();

        let err = coordinator
            .change(Uuid::new_v4(), Some(&condition))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeaseLost);
        assert_eq!(err.status, Some(409));
        assert_eq!(coordinator.state().status, LeaseStatus::Unleased);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_grants_exactly_one() {
        let (service, blob) = setup();
        let first = LeaseCoordinator::blob(service.transport(), blob.clone());
        let second = LeaseCoordinator::blob(service.transport(), blob.clone());

        let (a, b) = tokio::join!(
            first.acquire(LeaseDuration::Fixed(30), Some(Uuid::new_v4()), None),
            second.acquire(LeaseDuration::Fixed(30), Some(Uuid::new_v4()), None),
        );

        let (winner, loser) = match (a, b) {
            (Ok(id), Err(err)) => ((id, &first), (err, &second)),
            (Err(err), Ok(id)) => ((id, &second), (err, &first)),
            other => panic!("expected exactly one lease, got {other:?}"),
        };
        assert_eq!(loser.0.kind(), ErrorKind::LeaseAlreadyPresent);
        assert_eq!(loser.1.state().status, LeaseStatus::Unleased);
        assert_eq!(winner.1.state().status, LeaseStatus::Leased);
        assert_eq!(service.lease_id(&blob).as_deref(), Some(winner.0.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_inferred_from_elapsed_time() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob);

        coordinator
            .acquire(LeaseDuration::Fixed(15), None, None)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(coordinator.state().status, LeaseStatus::Expired);

        // nobody took the lease in the meantime, so it can be renewed
        coordinator.renew(None).await.unwrap();
        assert_eq!(coordinator.state().status, LeaseStatus::Leased);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_lease_after_expiry_and_reacquire() {
        let (service, blob) = setup();
        let owner = LeaseCoordinator::blob(service.transport(), blob.clone());
        let rival = LeaseCoordinator::blob(service.transport(), blob);

        owner
            .acquire(LeaseDuration::Fixed(15), None, None)
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        rival
            .acquire(LeaseDuration::Fixed(15), None, None)
            .await
            .unwrap();

        let err = owner.renew(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LeaseIdMismatch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_lease_addresses_container() {
        let service = MockStorageService::new();
        let container = service.create_container("shared");
        let coordinator = LeaseCoordinator::container(service.transport(), container.clone());

        let lease_id = coordinator
            .acquire(LeaseDuration::Infinite, None, None)
            .await
            .unwrap();
        assert_eq!(service.lease_id(&container).as_deref(), Some(lease_id.as_str()));

        let request = service.requests().pop().unwrap();
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.query_value("restype"), Some("container"));
        assert_eq!(request.query_value("comp"), Some("lease"));
        assert_eq!(request.headers[header::LEASE_ACTION], "acquire");
        assert_eq!(request.headers[header::LEASE_DURATION], "-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_to_leased_blob_need_the_lease() {
        let (service, blob) = setup();
        let coordinator = LeaseCoordinator::blob(service.transport(), blob.clone());
        coordinator
            .acquire(LeaseDuration::Fixed(60), None, None)
            .await
            .unwrap();

        let transport = service.transport();
        let upload = || ResourceRequest::put(blob.clone()).with_body("updated");

        let err = send_conditional(&transport, upload(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionNotSet);
        assert_eq!(err.status, Some(412));

        let condition = coordinator.lease_condition().unwrap();
        let response = send_conditional(&transport, upload(), Some(&condition))
            .await
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(service.blob_data(&blob).as_deref(), Some(&b"updated"[..]));
    }
}
