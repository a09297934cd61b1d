//! Batch release / acquire of the registered peripherals, and the convergence
//! poll that confirms a release actually took effect.
//!
//! Releasing is asynchronous at the radio level: the adapter accepts the
//! request and the devices drop off a little later.  Before the other host is
//! told to connect, [`release_all_and_confirm`] waits until the registry no
//! longer reads `AllConnected`.
//!
//! # Poll timing
//!
//! ```text
//! t=0        initial_delay      +interval    +interval   ...   (attempts)
//! release ─────────┤──────────────┤check 1─────┤check 2 ... ─► false
//! ```
//!
//! With the defaults (500 ms delay, 500 ms interval, 5 attempts) the poll
//! returns `true` at 1.0 s, 1.5 s, ... or `false` at 3.0 s.

use std::future::Future;
use std::time::Duration;

use periswitch_core::Peripheral;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::peripheral_registry::{PeripheralRegistry, RegistryError};

/// Bounds for the post-release convergence poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePolicy {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            interval: Duration::from_millis(500),
            attempts: 5,
        }
    }
}

impl ConvergencePolicy {
    /// Longest time [`wait_for_release`] can take.
    pub fn budget(&self) -> Duration {
        self.initial_delay + self.interval * self.attempts
    }
}

/// A peripheral that could not be released or acquired, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralFailure {
    pub peripheral: Peripheral,
    pub error: RegistryError,
}

/// Per-peripheral results of a batch operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<Peripheral>,
    pub failed: Vec<PeripheralFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Comma-separated names of the failed peripherals.
    pub fn failed_names(&self) -> String {
        self.failed
            .iter()
            .map(|f| f.peripheral.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Polls `check` until it returns `true` or the policy's attempts run out.
///
/// Sleeps `initial_delay` first, then `interval` before every check.
pub async fn wait_for_release<F, Fut>(policy: ConvergencePolicy, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::sleep(policy.initial_delay).await;
    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.interval).await;
        if check().await {
            debug!(attempt, "release converged");
            return true;
        }
        debug!(attempt, "peripherals still connected");
    }
    false
}

/// Unregisters every registered peripheral.  Failures are collected, not
/// short-circuited.
pub async fn release_all(registry: &Mutex<PeripheralRegistry>) -> BatchReport {
    let registry = registry.lock().await;
    let mut report = BatchReport::default();

    for peripheral in registry.peripherals().to_vec() {
        match registry.unregister(&peripheral).await {
            Ok(()) => report.succeeded.push(peripheral),
            Err(error) => {
                warn!(id = %peripheral.id, %error, "release failed");
                report.failed.push(PeripheralFailure { peripheral, error });
            }
        }
    }
    report
}

/// Connects every registered peripheral.  Failures are collected, not
/// short-circuited.
pub async fn acquire_all(registry: &Mutex<PeripheralRegistry>) -> BatchReport {
    let mut registry = registry.lock().await;
    let mut report = BatchReport::default();

    for peripheral in registry.peripherals().to_vec() {
        match registry.connect(&peripheral).await {
            Ok(()) => report.succeeded.push(peripheral),
            Err(error) => {
                warn!(id = %peripheral.id, %error, "acquire failed");
                report.failed.push(PeripheralFailure { peripheral, error });
            }
        }
    }
    info!(
        connected = report.succeeded.len(),
        total = report.total(),
        "acquire finished"
    );
    report
}

/// Releases everything, then waits for the registry to stop reading
/// `AllConnected`.
///
/// Returns the batch report and whether the release converged in time.  The
/// registry lock is not held across the poll sleeps.
pub async fn release_all_and_confirm(
    registry: &Mutex<PeripheralRegistry>,
    policy: ConvergencePolicy,
) -> (BatchReport, bool) {
    let report = release_all(registry).await;
    let converged = wait_for_release(policy, move || async move {
        registry.lock().await.compute_status().is_released()
    })
    .await;

    if converged {
        info!(released = report.succeeded.len(), "release confirmed");
    } else {
        warn!(budget = ?policy.budget(), "peripherals still connected after release");
    }
    (report, converged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::adapter_queue::AdapterQueue;
    use crate::application::peripheral_registry::FORGET_REJECTED;
    use crate::infrastructure::adapter::{SimulatedAdapter, SimulatedDevice};
    use crate::infrastructure::storage::store::{JsonStore, MemoryKeyValueStore};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn registry_with(adapter: Arc<SimulatedAdapter>, ids: &[&str]) -> Mutex<PeripheralRegistry> {
        let store: Arc<JsonStore<Vec<Peripheral>>> = Arc::new(JsonStore::new(
            Arc::new(MemoryKeyValueStore::new()),
            "peripherals",
        ));
        let mut registry = PeripheralRegistry::load(AdapterQueue::spawn(adapter).unwrap(), store);
        registry.replace_all(ids.iter().map(|id| Peripheral::new(*id, *id)).collect());
        Mutex::new(registry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_true_on_first_successful_check() {
        // Arrange
        let start = Instant::now();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        // Act: succeeds on the third check.
        let converged = wait_for_release(ConvergencePolicy::default(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3
        })
        .await;

        // Assert
        assert!(converged);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gives_up_after_budget() {
        let start = Instant::now();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let converged = wait_for_release(ConvergencePolicy::default(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        })
        .await;

        assert!(!converged);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[test]
    fn test_default_budget_is_three_seconds() {
        assert_eq!(ConvergencePolicy::default().budget(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_release_all_collects_failures() {
        // Arrange: one device vanished from the adapter.
        let adapter = SimulatedAdapter::new();
        adapter.insert(SimulatedDevice::new("kb", "kb").connected(true));
        let registry = registry_with(Arc::new(adapter), &["kb", "gone"]);

        // Act
        let report = release_all(&registry).await;

        // Assert
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed_names(), "gone");
        assert_eq!(
            report.failed[0].error,
            RegistryError::DeviceNotFound("gone".to_string())
        );
    }

    #[tokio::test]
    async fn test_rejected_forget_does_not_stop_release_batch() {
        // Arrange: the first device refuses to be forgotten.
        let adapter = Arc::new(SimulatedAdapter::new());
        adapter.insert(SimulatedDevice::new("kb", "kb").connected(true));
        adapter.insert(SimulatedDevice::new("mouse", "mouse").connected(true));
        adapter.reject_forget("kb");
        let registry = registry_with(adapter.clone(), &["kb", "mouse"]);

        // Act
        let report = release_all(&registry).await;

        // Assert
        assert_eq!(report.failed_names(), "kb");
        assert_eq!(
            report.failed[0].error,
            RegistryError::DisconnectFailed(FORGET_REJECTED)
        );
        assert_eq!(report.succeeded, vec![Peripheral::new("mouse", "mouse")]);
        assert!(adapter.is_device_connected("kb"));
        assert!(!adapter.is_device_connected("mouse"));
    }

    #[tokio::test]
    async fn test_acquire_all_continues_after_failure() {
        let adapter = SimulatedAdapter::new();
        adapter.insert(SimulatedDevice::new("kb", "kb"));
        adapter.insert(SimulatedDevice::new("mouse", "mouse"));
        adapter.fail_pairing("kb", 3);
        let registry = registry_with(Arc::new(adapter), &["kb", "mouse"]);

        let report = acquire_all(&registry).await;

        assert_eq!(report.succeeded, vec![Peripheral::new("mouse", "mouse")]);
        assert_eq!(report.failed[0].error, RegistryError::PairingFailed(3));
        assert!(!report.all_succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_and_confirm_waits_for_lagging_adapter() {
        // Arrange: devices take a while to actually drop.
        let adapter = SimulatedAdapter::new();
        adapter.insert(SimulatedDevice::new("kb", "kb").connected(true));
        adapter.set_release_lag(2);
        let adapter = Arc::new(adapter);
        let registry = registry_with(adapter.clone(), &["kb"]);

        // Act
        let (report, converged) =
            release_all_and_confirm(&registry, ConvergencePolicy::default()).await;

        // Assert
        assert!(report.all_succeeded());
        assert!(converged);
        assert!(!adapter.is_device_connected("kb"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_and_confirm_reports_stuck_devices() {
        let adapter = SimulatedAdapter::new();
        adapter.insert(SimulatedDevice::new("kb", "kb").connected(true));
        adapter.set_release_lag(u32::MAX);
        let registry = registry_with(Arc::new(adapter), &["kb"]);

        let (_, converged) = release_all_and_confirm(&registry, ConvergencePolicy::default()).await;

        assert!(!converged);
    }
}
