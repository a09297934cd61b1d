//! The other host in the pairwise handoff relationship.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A host found through discovery or registered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerHost {
    /// Stable identifier; the advertised service instance name.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Numeric host address the command listener is reachable on.
    pub address: String,
    /// TCP port of the peer's command listener.
    pub port: u16,
    /// Seconds since the Unix epoch of the last resolve or update.
    pub last_updated: u64,
    /// `false` once the peer's advertisement has been withdrawn.
    pub active: bool,
}

impl PeerHost {
    /// Creates an active peer stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            port,
            last_updated: unix_now_secs(),
            active: true,
        }
    }

    /// Refreshes the network location and liveness from a newer sighting of
    /// the same peer, keeping `id` and `name`.
    pub fn update_from(&mut self, newer: &PeerHost) {
        self.address = newer.address.clone();
        self.port = newer.port;
        self.active = newer.active;
        self.last_updated = unix_now_secs();
    }

    /// `address:port`, bracketing IPv6 literals.
    pub fn endpoint(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

/// Returns the current time as whole seconds since the Unix epoch.
pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_peer_is_active() {
        let peer = PeerHost::new("desk", "desk", "192.168.1.20", 50123);
        assert!(peer.active);
        assert!(peer.last_updated > 0);
    }

    #[test]
    fn test_update_from_keeps_identity() {
        // Arrange
        let mut peer = PeerHost::new("desk", "Desk Mac", "192.168.1.20", 50123);
        peer.active = false;
        let newer = PeerHost::new("desk", "other label", "192.168.1.77", 40001);

        // Act
        peer.update_from(&newer);

        // Assert
        assert_eq!(peer.name, "Desk Mac");
        assert_eq!(peer.address, "192.168.1.77");
        assert_eq!(peer.port, 40001);
        assert!(peer.active);
    }

    #[test]
    fn test_endpoint_brackets_ipv6() {
        let v4 = PeerHost::new("a", "a", "10.0.0.2", 9000);
        let v6 = PeerHost::new("b", "b", "fe80::1", 9000);
        assert_eq!(v4.endpoint(), "10.0.0.2:9000");
        assert_eq!(v6.endpoint(), "[fe80::1]:9000");
    }
}
