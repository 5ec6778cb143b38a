//! Server-side copies and completion polling.
//!
//! [`CopyMonitor`] issues a single copy request and then polls the
//! destination's attributes until the copy reaches a terminal status, the
//! caller's budget runs out, or the caller cancels.

mod config;
mod fetcher;
mod monitor;

pub use config::CopyMonitorConfig;
pub use fetcher::HeadAttributeFetcher;
pub use monitor::CopyMonitor;
