//! Distributed pessimistic locking through server-enforced leases.
//!
//! A [`LeaseCoordinator`] is bound to one container or blob and drives the
//! lease verbs of the service (`acquire`, `renew`, `release`, `break`,
//! `change`). It keeps a belief about the lease ([`LeaseState`]) that is
//! only as fresh as the last response it saw. Two coordinators racing on the
//! same resource are arbitrated by the server alone.
//!
//! [`LeaseState`]: nimbus_core::lease::LeaseState

mod coordinator;

pub use coordinator::LeaseCoordinator;
