//! CommandHandler: executes commands received from the peer and builds the
//! reply frame.
//!
//! The listener owns the socket; this module only maps a decoded [`Frame`] to
//! the [`Frame`] that goes back.  Replies are always `OP_SUCCESS`,
//! `OP_FAILED` or (for `SYNC_PERIPHERALS`) `PERIPHERAL_DATA`.

use std::sync::Arc;

use periswitch_core::{Command, Frame};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::notify::Notifier;
use super::ownership::{acquire_all, release_all_and_confirm, ConvergencePolicy};
use super::peripheral_registry::PeripheralRegistry;

pub struct CommandHandler {
    peripherals: Arc<Mutex<PeripheralRegistry>>,
    notifier: Arc<dyn Notifier>,
    policy: ConvergencePolicy,
}

impl CommandHandler {
    pub fn new(peripherals: Arc<Mutex<PeripheralRegistry>>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            peripherals,
            notifier,
            policy: ConvergencePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ConvergencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Executes `frame` and returns the reply.
    pub async fn handle(&self, frame: Frame) -> Frame {
        debug!(command = %frame.command, "inbound command");
        match frame.command {
            Command::HealthCheck => ok(),
            Command::UnregisterAll => self.release_for_peer().await,
            Command::ConnectAll => self.acquire_for_peer().await,
            Command::Notification => self.show_notification(&frame),
            Command::SyncPeripherals => self.export_peripherals().await,
            Command::PeripheralData => self.import_peripherals(&frame).await,
            Command::OpSuccess | Command::OpFailed => {
                warn!(command = %frame.command, "reply token received as a request");
                failed()
            }
        }
    }

    /// `OP_SUCCESS` only once the release is confirmed, so the requester never
    /// connects while this host still holds a peripheral.
    async fn release_for_peer(&self) -> Frame {
        let (report, converged) = release_all_and_confirm(&self.peripherals, self.policy).await;
        if converged {
            info!(released = report.succeeded.len(), "released peripherals for peer");
            ok()
        } else {
            warn!(failed = %report.failed_names(), "could not release peripherals for peer");
            failed()
        }
    }

    async fn acquire_for_peer(&self) -> Frame {
        let report = acquire_all(&self.peripherals).await;
        if report.all_succeeded() {
            ok()
        } else {
            warn!(failed = %report.failed_names(), "some peripherals did not connect");
            failed()
        }
    }

    fn show_notification(&self, frame: &Frame) -> Frame {
        match frame.notification_payload() {
            Ok(payload) => {
                self.notifier.show(&payload.title, &payload.body);
                ok()
            }
            Err(e) => {
                warn!(error = %e, "malformed notification");
                failed()
            }
        }
    }

    async fn export_peripherals(&self) -> Frame {
        let registry = self.peripherals.lock().await;
        match Frame::peripheral_data(registry.peripherals()) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "could not encode peripheral list");
                failed()
            }
        }
    }

    async fn import_peripherals(&self, frame: &Frame) -> Frame {
        match frame.peripherals() {
            Ok(list) => {
                self.peripherals.lock().await.replace_all(list);
                ok()
            }
            Err(e) => {
                warn!(error = %e, "malformed peripheral list");
                failed()
            }
        }
    }
}

fn ok() -> Frame {
    Frame::bare(Command::OpSuccess)
}

fn failed() -> Frame {
    Frame::bare(Command::OpFailed)
}
