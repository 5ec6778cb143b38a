//! Server-side lease state machine.

use std::time::Duration;

use nimbus_core::headers::error_code as code;
use tokio::time::Instant;

/// A request the lease state machine refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rejection {
    pub status: u16,
    pub code: &'static str,
    pub message: &'static str,
}

impl Rejection {
    pub const fn new(status: u16, code: &'static str, message: &'static str) -> Self {
        Self {
            status,
            code,
            message,
        }
    }
}

const NOT_PRESENT: Rejection = Rejection::new(
    409,
    code::LEASE_NOT_PRESENT_WITH_LEASE_OPERATION,
    "There is currently no lease on the resource.",
);

const MISMATCH: Rejection = Rejection::new(
    409,
    code::LEASE_ID_MISMATCH_WITH_LEASE_OPERATION,
    "The lease ID specified did not match the lease ID for the resource.",
);

/// Phase of a lease as of a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Available,
    Leased,
    Expired,
    Breaking,
    Broken,
}

#[derive(Debug, Clone)]
struct Held {
    id: String,
    /// `None` for an infinite lease.
    length: Option<Duration>,
    expires_at: Option<Instant>,
    breaks_at: Option<Instant>,
}

/// Lease slot of a single container or blob.
#[derive(Debug, Clone, Default)]
pub(crate) struct LeaseSlot {
    held: Option<Held>,
}

impl LeaseSlot {
    pub fn phase(&self, now: Instant) -> Phase {
        let Some(held) = &self.held else {
            return Phase::Available;
        };

        match (held.breaks_at, held.expires_at) {
            (Some(at), _) if now >= at => Phase::Broken,
            (Some(_), _) => Phase::Breaking,
            (None, Some(at)) if now >= at => Phase::Expired,
            (None, _) => Phase::Leased,
        }
    }

    /// The id of a lease that currently restricts writes.
    pub fn active_id(&self, now: Instant) -> Option<&str> {
        match self.phase(now) {
            Phase::Leased | Phase::Breaking => self.held.as_ref().map(|h| h.id.as_str()),
            _ => None,
        }
    }

    fn matches(&self, lease_id: &str) -> bool {
        self.held.as_ref().is_some_and(|h| h.id == lease_id)
    }

    pub fn acquire(
        &mut self,
        now: Instant,
        length: Option<Duration>,
        proposed: Option<String>,
    ) -> Result<(u16, String), Rejection> {
        match self.phase(now) {
            Phase::Breaking => {
                return Err(Rejection::new(
                    409,
                    code::LEASE_IS_BREAKING_AND_CANNOT_BE_ACQUIRED,
                    "There is already a breaking lease on the resource.",
                ));
            }
            Phase::Leased => {
                return match proposed {
                    Some(id) if self.matches(&id) => {
                        self.grant(now, id.clone(), length);
                        Ok((200, id))
                    }
                    _ => Err(Rejection::new(
                        409,
                        code::LEASE_ALREADY_PRESENT,
                        "There is already a lease present.",
                    )),
                };
            }
            Phase::Available | Phase::Expired | Phase::Broken => {}
        }

        let id = proposed.unwrap_or_else(|| uuid::Uuid::new_v4().hyphenated().to_string());
        self.grant(now, id.clone(), length);
        Ok((201, id))
    }

    pub fn renew(&mut self, now: Instant, lease_id: &str) -> Result<String, Rejection> {
        let phase = self.phase(now);
        if phase == Phase::Available {
            return Err(NOT_PRESENT);
        }
        if !self.matches(lease_id) {
            return Err(MISMATCH);
        }

        match phase {
            Phase::Breaking | Phase::Broken => Err(Rejection::new(
                409,
                code::LEASE_IS_BROKEN_AND_CANNOT_BE_RENEWED,
                "The lease ID matched, but the lease has been broken explicitly.",
            )),
            _ => {
                let length = self.held.as_ref().and_then(|h| h.length);
                self.grant(now, lease_id.to_owned(), length);
                Ok(lease_id.to_owned())
            }
        }
    }

    pub fn release(&mut self, now: Instant, lease_id: &str) -> Result<(), Rejection> {
        if self.phase(now) == Phase::Available {
            return Err(NOT_PRESENT);
        }
        if !self.matches(lease_id) {
            return Err(MISMATCH);
        }

        self.held = None;
        Ok(())
    }

    /// Starts or shortens a break and returns the seconds until it completes.
    pub fn break_lease(&mut self, now: Instant, period: Option<u64>) -> Result<u64, Rejection> {
        let phase = self.phase(now);
        let Some(held) = self.held.as_mut() else {
            return Err(NOT_PRESENT);
        };

        let remaining = match phase {
            Phase::Available => return Err(NOT_PRESENT),
            Phase::Expired | Phase::Broken => 0,
            Phase::Leased | Phase::Breaking => {
                let left = held
                    .breaks_at
                    .or(held.expires_at)
                    .map(|at| ceil_secs(at.saturating_duration_since(now)));
                match (period, left) {
                    (Some(period), Some(left)) => period.min(left),
                    (Some(period), None) => period,
                    (None, Some(left)) => left,
                    (None, None) => 0,
                }
            }
        };

        held.breaks_at = Some(now + Duration::from_secs(remaining));
        Ok(remaining)
    }

    pub fn change(
        &mut self,
        now: Instant,
        lease_id: &str,
        proposed: String,
    ) -> Result<String, Rejection> {
        let phase = self.phase(now);
        if matches!(phase, Phase::Available | Phase::Expired | Phase::Broken) {
            return Err(NOT_PRESENT);
        }
        if !self.matches(lease_id) && !self.matches(&proposed) {
            return Err(MISMATCH);
        }
        if phase == Phase::Breaking {
            return Err(Rejection::new(
                409,
                code::LEASE_IS_BREAKING_AND_CANNOT_BE_CHANGED,
                "The lease ID matched, but the lease is currently in breaking state.",
            ));
        }

        if let Some(held) = self.held.as_mut() {
            held.id = proposed.clone();
        }
        Ok(proposed)
    }

    fn grant(&mut self, now: Instant, id: String, length: Option<Duration>) {
        self.held = Some(Held {
            id,
            length,
            expires_at: length.map(|length| now + length),
            breaks_at: None,
        });
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs + 1 } else { secs }
}
