//! Notification backend for the headless agent.
//!
//! Desktop notification centres are an external collaborator; the headless
//! binary surfaces notices through the log instead.

use tracing::info;

use crate::application::notify::Notifier;

/// Writes every notice as an `info!` line under the `notification` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, title: &str, body: &str) {
        info!(target: "notification", %title, %body, "notice");
    }
}
