//! mDNS-based peer discovery.
//!
//! Each agent advertises its command listener under the service type
//! `_blueswitch._tcp.local.` and browses the same type.  The instance name is
//! the host's display name; it doubles as the peer id.
//!
//! # Event flow
//!
//! ```text
//! mdns-sd daemon ── ServiceEvent ──► pump task ── PeerEvent ──► mpsc ──► PeerRegistry
//!   ServiceResolved(info)              Resolved(PeerHost)
//!   ServiceRemoved(_, fullname)        Withdrawn { name }
//! ```
//!
//! The host's own advertisement shows up in its own browse results and is
//! dropped by the pump.

use local_ip_address::local_ip;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use periswitch_core::PeerHost;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::application::peer_registry::PeerEvent;

pub const SERVICE_TYPE: &str = "_blueswitch._tcp.local.";

/// Error type for discovery service operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The mDNS daemon rejected a request.
    #[error("mDNS error: {0}")]
    Mdns(String),

    /// No local address could be found to advertise.
    #[error("could not determine local IP address: {0}")]
    LocalIp(String),
}

/// Advertising and browsing for peers.
pub trait ServiceDiscovery: Send {
    /// The instance name this host advertises.
    fn instance_name(&self) -> &str;

    /// Publishes this host's command listener on `port`, replacing any earlier
    /// advertisement.
    fn advertise(&mut self, port: u16) -> Result<(), DiscoveryError>;

    /// Starts browsing; peer changes arrive on the returned channel.
    fn browse(&self) -> Result<mpsc::Receiver<PeerEvent>, DiscoveryError>;
}

pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
    service_type: String,
    instance: String,
    registered: Option<String>,
}

impl MdnsDiscovery {
    /// Starts the mDNS daemon.  `host_name` empty means the system host name.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Mdns`] if the daemon cannot start.
    pub fn new(service_type: &str, host_name: &str) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
        Ok(Self {
            daemon,
            service_type: service_type.to_string(),
            instance: resolve_instance_name(host_name),
            registered: None,
        })
    }
}

impl ServiceDiscovery for MdnsDiscovery {
    fn instance_name(&self) -> &str {
        &self.instance
    }

    fn advertise(&mut self, port: u16) -> Result<(), DiscoveryError> {
        if let Some(fullname) = self.registered.take() {
            debug!(%fullname, "replacing previous advertisement");
            if let Err(e) = self.daemon.unregister(&fullname) {
                warn!(%fullname, error = %e, "failed to unregister previous advertisement");
            }
        }

        let ip = local_ip().map_err(|e| DiscoveryError::LocalIp(e.to_string()))?;
        let host = format!("{}.local.", self.instance);
        let properties = [("version", env!("CARGO_PKG_VERSION")), ("id", self.instance.as_str())];

        let info = ServiceInfo::new(
            &self.service_type,
            &self.instance,
            &host,
            ip,
            port,
            &properties[..],
        )
        .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
        let fullname = info.get_fullname().to_string();

        self.daemon
            .register(info)
            .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
        info!(instance = %self.instance, %ip, port, "advertising command listener");
        self.registered = Some(fullname);
        Ok(())
    }

    fn browse(&self) -> Result<mpsc::Receiver<PeerEvent>, DiscoveryError> {
        let receiver = self
            .daemon
            .browse(&self.service_type)
            .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
        let own = self.instance.clone();
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            while let Ok(event) = receiver.recv_async().await {
                let Some(peer_event) = translate_event(event, &own) else {
                    continue;
                };
                debug!(event = ?peer_event, "discovery event");
                if tx.send(peer_event).await.is_err() {
                    break;
                }
            }
            debug!("discovery pump stopped");
        });
        Ok(rx)
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        if let Some(fullname) = &self.registered {
            info!(%fullname, "withdrawing advertisement");
            if let Err(e) = self.daemon.unregister(fullname) {
                error!(error = %e, "failed to unregister service");
            }
        }
    }
}

/// Configured name, else the system host name, with dots replaced so the
/// name survives as a single DNS label.
pub fn resolve_instance_name(configured: &str) -> String {
    let raw = if configured.trim().is_empty() {
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|e| {
                warn!(error = %e, "could not read system host name");
                "periswitch".to_string()
            })
    } else {
        configured.trim().to_string()
    };
    let label = raw.trim_end_matches(".local").replace('.', "-");
    if label.is_empty() {
        "periswitch".to_string()
    } else {
        label
    }
}

/// Maps a daemon event to a peer event.  Events about this host's own
/// advertisement, resolutions without an address and daemon housekeeping
/// events yield `None`.
fn translate_event(event: ServiceEvent, own: &str) -> Option<PeerEvent> {
    match event {
        ServiceEvent::ServiceResolved(info) => translate_resolved(
            own,
            info.get_property_val_str("id"),
            info.get_hostname(),
            info.get_addresses().iter().map(|ip| ip.to_string()),
            info.get_port(),
        ),
        ServiceEvent::ServiceRemoved(_ty, fullname) => translate_removed(own, &fullname),
        _ => None,
    }
}

/// The `id` TXT property names the peer; without it the host label does.
fn translate_resolved<I>(
    own: &str,
    id_property: Option<&str>,
    hostname: &str,
    addresses: I,
    port: u16,
) -> Option<PeerEvent>
where
    I: IntoIterator<Item = String>,
{
    let address = pick_address(addresses)?;
    let id = id_property
        .map(str::to_string)
        .unwrap_or_else(|| instance_from_host(hostname));
    if id == own {
        return None;
    }
    Some(PeerEvent::Resolved(PeerHost::new(&id, &id, address, port)))
}

fn translate_removed(own: &str, fullname: &str) -> Option<PeerEvent> {
    let name = instance_from_fullname(fullname);
    (name != own).then_some(PeerEvent::Withdrawn { name })
}

/// First label of `instance._blueswitch._tcp.local.`.
fn instance_from_fullname(fullname: &str) -> String {
    fullname.split('.').next().unwrap_or_default().to_string()
}

/// `desk.local.` → `desk`.
fn instance_from_host(host: &str) -> String {
    host.split('.').next().unwrap_or_default().to_string()
}

/// Prefers an IPv4 address; falls back to the first candidate.
fn pick_address<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let all: Vec<String> = candidates.into_iter().collect();
    all.iter()
        .find(|a| a.parse::<std::net::Ipv4Addr>().is_ok())
        .or_else(|| all.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_from_fullname_takes_first_label() {
        assert_eq!(instance_from_fullname("desk._blueswitch._tcp.local."), "desk");
    }

    #[test]
    fn test_instance_from_host_strips_domain() {
        assert_eq!(instance_from_host("laptop.local."), "laptop");
    }

    #[test]
    fn test_configured_name_is_sanitised() {
        assert_eq!(resolve_instance_name("studio.mac.local"), "studio-mac");
        assert_eq!(resolve_instance_name("  desk "), "desk");
    }

    #[test]
    fn test_empty_name_falls_back_to_system_host_name() {
        assert!(!resolve_instance_name("").is_empty());
    }

    #[test]
    fn test_pick_address_prefers_ipv4() {
        let picked = pick_address(vec!["fe80::1".to_string(), "192.168.1.20".to_string()]);
        assert_eq!(picked.as_deref(), Some("192.168.1.20"));
    }

    #[test]
    fn test_pick_address_falls_back_to_ipv6() {
        let picked = pick_address(vec!["fe80::1".to_string()]);
        assert_eq!(picked.as_deref(), Some("fe80::1"));
    }

    #[test]
    fn test_pick_address_empty() {
        assert_eq!(pick_address(Vec::<String>::new()), None);
    }

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_resolved_uses_id_property() {
        // Act
        let event = translate_resolved(
            "desk",
            Some("laptop"),
            "laptop-2.local.",
            addrs(&["fe80::1", "192.168.1.20"]),
            5050,
        );

        // Assert
        let Some(PeerEvent::Resolved(peer)) = event else {
            panic!("expected a resolved peer, got {event:?}");
        };
        assert_eq!(peer.id, "laptop");
        assert_eq!(peer.name, "laptop");
        assert_eq!(peer.address, "192.168.1.20");
        assert_eq!(peer.port, 5050);
    }

    #[test]
    fn test_resolved_without_id_property_uses_host_label() {
        let event = translate_resolved("desk", None, "laptop.local.", addrs(&["10.0.0.7"]), 5050);

        let Some(PeerEvent::Resolved(peer)) = event else {
            panic!("expected a resolved peer, got {event:?}");
        };
        assert_eq!(peer.id, "laptop");
    }

    #[test]
    fn test_own_advertisement_is_dropped() {
        assert_eq!(
            translate_resolved("desk", Some("desk"), "desk.local.", addrs(&["10.0.0.2"]), 5050),
            None
        );
        assert_eq!(
            translate_resolved("desk", None, "desk.local.", addrs(&["10.0.0.2"]), 5050),
            None
        );
        assert_eq!(translate_removed("desk", "desk._blueswitch._tcp.local."), None);
    }

    #[test]
    fn test_resolved_without_address_is_dropped() {
        assert_eq!(
            translate_resolved("desk", Some("laptop"), "laptop.local.", Vec::new(), 5050),
            None
        );
    }

    #[test]
    fn test_removed_peer_is_withdrawn() {
        let event = translate_event(
            ServiceEvent::ServiceRemoved(
                SERVICE_TYPE.to_string(),
                "laptop._blueswitch._tcp.local.".to_string(),
            ),
            "desk",
        );

        assert_eq!(
            event,
            Some(PeerEvent::Withdrawn {
                name: "laptop".to_string()
            })
        );
    }

    #[test]
    fn test_housekeeping_events_are_skipped() {
        let event = translate_event(ServiceEvent::SearchStarted(SERVICE_TYPE.to_string()), "desk");
        assert_eq!(event, None);
    }
}
