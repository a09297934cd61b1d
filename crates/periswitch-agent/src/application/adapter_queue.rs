//! Bluetooth adapter capability and the serial queue its mutating calls run on.
//!
//! Adapter operations are blocking driver calls (pairing alone can take
//! seconds).  They must never run on a Tokio worker, and no two of them may run
//! at the same time for one registry.  [`AdapterQueue`] owns a dedicated OS
//! thread that executes submitted jobs one after another; async callers await a
//! `oneshot` reply.
//!
//! Read-only queries (`power_state`, `resolve`, `is_connected`) are cheap and
//! go straight to the adapter through [`AdapterQueue::adapter`].

use std::sync::{mpsc, Arc};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Status code returned by the adapter driver for a failed operation.
pub type AdapterCode = i32;

/// RSSI reading the adapter reports when it has no measurement.
///
/// This is a sentinel, not a signal strength: a device reporting it is treated
/// as out of range, whereas any other value (however weak) is a valid reading.
pub const RSSI_UNAVAILABLE: i32 = 127;

/// Adapter radio power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

/// A device the adapter knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Hardware address.
    pub address: String,
    /// Name reported by the device, if any.
    pub name: Option<String>,
}

/// Narrow capability over the OS Bluetooth adapter.
///
/// The production implementation wraps the platform driver; tests and the
/// headless binary use `infrastructure::adapter::SimulatedAdapter`.
pub trait AdapterController: Send + Sync {
    fn power_state(&self) -> PowerState;
    /// Looks up a device by hardware address.
    fn resolve(&self, address: &str) -> Option<DeviceHandle>;
    /// Every device paired with this host.
    fn paired_devices(&self) -> Vec<DeviceHandle>;
    fn is_connected(&self, device: &DeviceHandle) -> bool;
    /// Signal strength, or [`RSSI_UNAVAILABLE`].
    fn rssi(&self, device: &DeviceHandle) -> i32;
    fn pair(&self, device: &DeviceHandle) -> Result<(), AdapterCode>;
    fn open_connection(&self, device: &DeviceHandle) -> Result<(), AdapterCode>;
    fn close_connection(&self, device: &DeviceHandle) -> Result<(), AdapterCode>;
    /// Drops the device's session binding so the OS will not reconnect it.
    fn forget(&self, device: &DeviceHandle) -> bool;
}

/// The adapter worker thread has stopped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("adapter queue is no longer running")]
pub struct QueueClosed;

type Job = Box<dyn FnOnce(&dyn AdapterController) + Send>;

/// Handle to the dedicated adapter thread.  Cheap to clone.
#[derive(Clone)]
pub struct AdapterQueue {
    jobs: mpsc::Sender<Job>,
    adapter: Arc<dyn AdapterController>,
}

impl AdapterQueue {
    /// Spawns the worker thread.  It exits once every handle has been dropped.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(adapter: Arc<dyn AdapterController>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = Arc::clone(&adapter);

        std::thread::Builder::new()
            .name("periswitch-adapter".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job(worker.as_ref());
                }
                debug!("adapter queue stopped");
            })?;

        Ok(Self { jobs: tx, adapter })
    }

    /// Direct access for read-only queries.
    pub fn adapter(&self) -> &dyn AdapterController {
        self.adapter.as_ref()
    }

    /// Runs `job` on the adapter thread after every previously submitted job.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the worker has stopped (or the job panicked).
    pub async fn run<R, F>(&self, job: F) -> Result<R, QueueClosed>
    where
        F: FnOnce(&dyn AdapterController) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let boxed: Job = Box::new(move |adapter: &dyn AdapterController| {
            let _ = reply_tx.send(job(adapter));
        });
        self.jobs.send(boxed).map_err(|_| QueueClosed)?;
        reply_rx.await.map_err(|_| QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapter::SimulatedAdapter;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_run_returns_job_result() {
        let queue = AdapterQueue::spawn(Arc::new(SimulatedAdapter::new())).unwrap();

        let state = queue.run(|adapter| adapter.power_state()).await;

        assert_eq!(state, Ok(PowerState::On));
    }

    #[tokio::test]
    async fn test_jobs_execute_in_submission_order() {
        // Arrange
        let queue = AdapterQueue::spawn(Arc::new(SimulatedAdapter::new())).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Act: submit from separate tasks; the queue must still run them one by one.
        let mut handles = Vec::new();
        for i in 0..8 {
            let order = Arc::clone(&order);
            let q = queue.clone();
            handles.push(tokio::spawn(async move {
                q.run(move |_| {
                    std::thread::sleep(std::time::Duration::from_millis(2));
                    order.lock().unwrap().push(i);
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        // Assert
        assert_eq!(*order.lock().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_worker_runs_off_the_caller_thread() {
        let queue = AdapterQueue::spawn(Arc::new(SimulatedAdapter::new())).unwrap();
        let caller = std::thread::current().id();

        let worker = queue.run(|_| std::thread::current().id()).await.unwrap();

        assert_ne!(worker, caller);
    }
}
