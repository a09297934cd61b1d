//! PeerRegistry: discovered hosts and the one registered handoff peer.
//!
//! Discovery feeds [`PeerEvent`]s in through [`PeerRegistry::apply`]; the user
//! picks one discovered host with [`PeerRegistry::register`].  Only one peer can
//! be registered at a time (the relationship is pairwise), and the choice is
//! persisted under the `"peer_hosts"` key.
//!
//! # Lifecycle
//!
//! ```text
//! Resolved ──► discovered (active) ──register──► registered (persisted)
//!                    │                                  │
//!                Withdrawn                          Withdrawn
//!                    ▼                                  ▼
//!             discovered (inactive)            registered (inactive)
//! ```
//!
//! A withdrawn peer is marked inactive rather than dropped, so a registered
//! peer survives a brief mDNS outage.

use std::sync::Arc;

use periswitch_core::PeerHost;
use tracing::{debug, error, info, warn};

use super::persistence::Store;

/// A change observed by peer discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A host advertisement was resolved to an address and port.
    Resolved(PeerHost),
    /// The advertisement with this instance name went away.
    Withdrawn { name: String },
}

/// In-memory view of discovered hosts plus the registered peer.
pub struct PeerRegistry {
    own_name: String,
    discovered: Vec<PeerHost>,
    registered: Option<PeerHost>,
    store: Arc<dyn Store<Vec<PeerHost>>>,
}

impl PeerRegistry {
    /// Restores the registered peer from `store`.
    ///
    /// `own_name` is this host's advertised instance name; events about it are
    /// ignored.
    pub fn load(own_name: impl Into<String>, store: Arc<dyn Store<Vec<PeerHost>>>) -> Self {
        let registered = match store.load() {
            Ok(Some(list)) => list.into_iter().next(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "could not restore registered peer");
                None
            }
        };
        if let Some(peer) = &registered {
            debug!(peer = %peer.name, "registered peer restored");
        }

        Self {
            own_name: own_name.into(),
            discovered: Vec::new(),
            registered,
            store,
        }
    }

    pub fn own_name(&self) -> &str {
        &self.own_name
    }

    pub fn registered(&self) -> Option<&PeerHost> {
        self.registered.as_ref()
    }

    /// Every discovered host, active or not.
    pub fn discovered(&self) -> &[PeerHost] {
        &self.discovered
    }

    /// Discovered active hosts that are neither this host nor the registered
    /// peer.
    pub fn available(&self) -> Vec<PeerHost> {
        let registered_id = self.registered.as_ref().map(|p| p.id.as_str());
        self.discovered
            .iter()
            .filter(|p| p.active && Some(p.id.as_str()) != registered_id)
            .cloned()
            .collect()
    }

    /// Folds one discovery event into the registry.  Applying the same event
    /// twice leaves the registry as applying it once.
    pub fn apply(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Resolved(peer) => {
                if peer.name == self.own_name || peer.id == self.own_name {
                    return;
                }
                match self.discovered.iter_mut().find(|p| p.id == peer.id) {
                    Some(existing) => existing.update_from(&peer),
                    None => {
                        debug!(peer = %peer.name, endpoint = %peer.endpoint(), "peer discovered");
                        self.discovered.push(peer.clone());
                    }
                }
                let moved = match self.registered.as_mut() {
                    Some(reg) if reg.id == peer.id => {
                        let moved = reg.address != peer.address || reg.port != peer.port;
                        reg.update_from(&peer);
                        moved
                    }
                    _ => false,
                };
                if moved {
                    info!(peer = %peer.name, endpoint = %peer.endpoint(), "registered peer moved");
                    self.persist();
                }
            }
            PeerEvent::Withdrawn { name } => {
                for peer in self.discovered.iter_mut().filter(|p| p.name == name) {
                    peer.active = false;
                }
                if let Some(reg) = self.registered.as_mut().filter(|p| p.name == name) {
                    debug!(peer = %reg.name, "registered peer went away");
                    reg.active = false;
                }
            }
        }
    }

    /// Makes `peer` the handoff peer, replacing any previous choice.
    pub fn register(&mut self, peer: PeerHost) {
        info!(peer = %peer.name, endpoint = %peer.endpoint(), "peer registered");
        self.registered = Some(peer);
        self.persist();
    }

    /// Forgets the registered peer.  Returns `false` if none was registered.
    pub fn unregister(&mut self) -> bool {
        let had = self.registered.take().is_some();
        if had {
            info!("registered peer cleared");
            self.persist();
        }
        had
    }

    /// Looks up a discovered host by id.
    pub fn find(&self, id: &str) -> Option<&PeerHost> {
        self.discovered.iter().find(|p| p.id == id)
    }

    fn persist(&self) {
        let list: Vec<PeerHost> = self.registered.iter().cloned().collect();
        if let Err(e) = self.store.save(&list) {
            error!(error = %e, "failed to persist registered peer");
        }
    }
}
