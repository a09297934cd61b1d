//! User-facing notifications.
//!
//! Every handoff attempt ends in exactly one notice.  The wording lives here
//! so the coordinator, the command handler and the tests agree on it.

/// Shows a short message to the user.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn show(&self, title: &str, body: &str);
}

/// A title / body pair ready for a [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn deliver(&self, notifier: &dyn Notifier) {
        notifier.show(&self.title, &self.body);
    }
}

pub const TITLE_ERROR: &str = "Error";
pub const TITLE_WARNING: &str = "Warning";
pub const TITLE_DONE: &str = "Handoff Complete";

pub const MSG_NO_PEER: &str = "No devices connected. Please connect a device first.";
pub const MSG_NO_RESPONSE: &str = "No response from device. Please check if the app is running.";
pub const MSG_DISCONNECT_FAILED: &str = "Failed to disconnect devices";
pub const MSG_PEER_CONNECT_FAILED: &str = "Connection process failed on target device";
pub const MSG_PEER_RELEASE_FAILED: &str = "Failed to request device disconnection from peer";
pub const MSG_PARTIAL_STATE: &str = "Some devices are connected while others are disconnected. \
     Please ensure all devices are in the same state.";
pub const MSG_POWERED_OFF: &str = "Bluetooth is turned off. Turn it on and try again.";
