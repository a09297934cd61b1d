//! TCP liveness probe against the peer's command listener.
//!
//! A probe opens a TCP connection to the peer and closes it again without
//! sending anything; the listener treats an empty connection as a liveness
//! check.  The probe resolves to exactly one [`HealthCheckResult`]: whichever
//! of "connected", "failed" or "timed out" happens first.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use periswitch_core::{HealthCheckResult, PeerHost};
use tokio::net::TcpStream;
use tracing::debug;

use crate::application::handoff::PeerProbe;

/// Default upper bound on a probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TcpHealthChecker {
    timeout: Duration,
}

impl Default for TcpHealthChecker {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl TcpHealthChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Probes `peer` once.
    pub async fn check(&self, peer: &PeerHost) -> HealthCheckResult {
        let endpoint = peer.endpoint();
        let result = race_probe(TcpStream::connect(endpoint.as_str()), self.timeout).await;
        debug!(%endpoint, %result, "health check");
        result
    }
}

#[async_trait]
impl PeerProbe for TcpHealthChecker {
    async fn probe(&self, peer: &PeerHost) -> HealthCheckResult {
        self.check(peer).await
    }
}

/// Races a connection attempt against `timeout`.  The connection, if any, is
/// dropped straight away.
async fn race_probe<F, T>(connect: F, timeout: Duration) -> HealthCheckResult
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(_connection)) => HealthCheckResult::Success,
        Ok(Err(e)) => HealthCheckResult::Failure(e.to_string()),
        Err(_elapsed) => HealthCheckResult::Timeout,
    }
}
