//! Outcome of a peer liveness probe.

use std::fmt;

/// Exactly one of these is produced per probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckResult {
    /// The TCP connection reached the ready state.
    Success,
    /// The connection attempt failed; carries the transport's reason.
    Failure(String),
    /// Neither outcome occurred within the probe bound.
    Timeout,
}

impl HealthCheckResult {
    pub fn is_success(&self) -> bool {
        matches!(self, HealthCheckResult::Success)
    }
}

impl fmt::Display for HealthCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthCheckResult::Success => f.write_str("success"),
            HealthCheckResult::Failure(reason) => write!(f, "failure: {reason}"),
            HealthCheckResult::Timeout => f.write_str("timeout"),
        }
    }
}
