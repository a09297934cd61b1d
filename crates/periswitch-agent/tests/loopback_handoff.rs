//! End-to-end tests: two agents talking over loopback TCP.
//!
//! Each agent is a full `AppState` (registries, coordinator, command handler)
//! with its own simulated adapter and a real `CommandListener` on an
//! ephemeral port.  The agents are registered as each other's peer directly,
//! standing in for mDNS discovery.
//!
//! ```text
//! laptop ── HEALTH probe ─────────► desk
//! laptop ── CONNECT_ALL / UNREGISTER_ALL ──► desk CommandHandler
//! ```

use std::sync::{Arc, Mutex as StdMutex};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_test::assert_ok;

use periswitch_agent::application::notify::{Notifier, TITLE_DONE};
use periswitch_agent::infrastructure::adapter::{SimulatedAdapter, SimulatedDevice};
use periswitch_agent::infrastructure::network::listener::CommandListener;
use periswitch_agent::infrastructure::storage::config::AppConfig;
use periswitch_agent::infrastructure::storage::store::MemoryKeyValueStore;
use periswitch_agent::infrastructure::ui_bridge::{self, AppState};
use periswitch_core::{ConnectionStatus, PeerHost, Peripheral};

const KEYBOARD: &str = "aa-bb-cc-00-00-01";
const MOUSE: &str = "aa-bb-cc-00-00-02";

#[derive(Default)]
struct RecordingNotifier {
    shown: StdMutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, title: &str, body: &str) {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}

struct Agent {
    name: &'static str,
    state: Arc<AppState>,
    adapter: Arc<SimulatedAdapter>,
    notifier: Arc<RecordingNotifier>,
    port: u16,
    _shutdown: watch::Sender<bool>,
}

impl Agent {
    async fn status(&self) -> ConnectionStatus {
        self.state.peripherals.lock().await.compute_status()
    }

    async fn register_peer(&self, other: &Agent) {
        self.state.peers.lock().await.register(PeerHost::new(
            other.name,
            other.name,
            "127.0.0.1",
            other.port,
        ));
    }
}

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.handoff.initial_delay_ms = 20;
    config.handoff.poll_interval_ms = 20;
    config.network.health_check_timeout_ms = 1000;
    config.network.command_timeout_ms = 2000;
    config
}

/// An agent that knows Keyboard and Mouse; `holding` says whether it is
/// currently connected to them.  `registered` controls whether they are in
/// its peripheral registry.
async fn agent(name: &'static str, holding: bool, registered: bool) -> Agent {
    let adapter = Arc::new(SimulatedAdapter::new());
    adapter.insert(SimulatedDevice::new(KEYBOARD, "Keyboard").connected(holding));
    adapter.insert(SimulatedDevice::new(MOUSE, "Mouse").connected(holding));
    let notifier = Arc::new(RecordingNotifier::default());

    let state = assert_ok!(AppState::assemble(
        fast_config(),
        name,
        adapter.clone(),
        Arc::new(MemoryKeyValueStore::new()),
        notifier.clone(),
    ));
    if registered {
        let mut registry = state.peripherals.lock().await;
        assert_ok!(registry.add(Peripheral::new(KEYBOARD, "Keyboard")));
        assert_ok!(registry.add(Peripheral::new(MOUSE, "Mouse")));
    }

    let listener = assert_ok!(CommandListener::bind("127.0.0.1", 0, state.handler.clone()).await);
    let port = listener.local_port();
    let (shutdown, rx) = watch::channel(false);
    listener.spawn(rx);

    Agent {
        name,
        state,
        adapter,
        notifier,
        port,
        _shutdown: shutdown,
    }
}

async fn paired_agents() -> (Agent, Agent) {
    let laptop = agent("laptop", true, true).await;
    let desk = agent("desk", false, true).await;
    laptop.register_peer(&desk).await;
    desk.register_peer(&laptop).await;
    (laptop, desk)
}

#[tokio::test]
async fn test_source_hands_peripherals_to_peer() {
    // Arrange
    let (laptop, desk) = paired_agents().await;

    // Act
    let result = ui_bridge::trigger_handoff(laptop.state.clone()).await;

    // Assert
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data.unwrap().title, TITLE_DONE);
    assert_eq!(laptop.status().await, ConnectionStatus::AllDisconnected);
    assert_eq!(desk.status().await, ConnectionStatus::AllConnected);
    assert!(desk.adapter.is_device_connected(KEYBOARD));
    assert!(desk.adapter.is_device_connected(MOUSE));
}

#[tokio::test]
async fn test_destination_pulls_peripherals_back() {
    // Arrange: laptop hands over first, then asks for them back.
    let (laptop, desk) = paired_agents().await;
    assert!(ui_bridge::trigger_handoff(laptop.state.clone()).await.success);

    // Act
    let result = ui_bridge::trigger_handoff(laptop.state.clone()).await;

    // Assert
    assert!(result.success, "{:?}", result.error);
    assert_eq!(laptop.status().await, ConnectionStatus::AllConnected);
    assert_eq!(desk.status().await, ConnectionStatus::AllDisconnected);
    assert!(!desk.adapter.is_device_connected(KEYBOARD));
}

#[tokio::test]
async fn test_either_side_can_trigger() {
    let (laptop, desk) = paired_agents().await;

    assert!(ui_bridge::trigger_handoff(laptop.state.clone()).await.success);
    assert!(ui_bridge::trigger_handoff(desk.state.clone()).await.success);

    assert_eq!(laptop.status().await, ConnectionStatus::AllConnected);
    assert_eq!(desk.status().await, ConnectionStatus::AllDisconnected);
}

#[tokio::test]
async fn test_unreachable_peer_leaves_both_sides_untouched() {
    // Arrange: register a peer whose port has nothing listening.
    let laptop = agent("laptop", true, true).await;
    let closed = assert_ok!(TcpListener::bind("127.0.0.1:0").await);
    let port = assert_ok!(closed.local_addr()).port();
    drop(closed);
    laptop
        .state
        .peers
        .lock()
        .await
        .register(PeerHost::new("desk", "desk", "127.0.0.1", port));

    // Act
    let result = ui_bridge::trigger_handoff(laptop.state.clone()).await;

    // Assert
    assert!(!result.success);
    assert!(laptop.adapter.calls().is_empty());
    assert_eq!(laptop.status().await, ConnectionStatus::AllConnected);
    assert_eq!(laptop.notifier.shown().len(), 1);
}

#[tokio::test]
async fn test_notification_reaches_peer() {
    let (laptop, desk) = paired_agents().await;

    let result =
        ui_bridge::notify_peer(laptop.state.clone(), "Hello".into(), "from laptop".into()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        desk.notifier.shown(),
        vec![("Hello".to_string(), "from laptop".to_string())]
    );
}

#[tokio::test]
async fn test_push_then_pull_peripheral_list() {
    // Arrange: desk starts with an empty registry.
    let laptop = agent("laptop", true, true).await;
    let desk = agent("desk", false, false).await;
    laptop.register_peer(&desk).await;
    desk.register_peer(&laptop).await;

    // Act
    let pushed = ui_bridge::push_peripherals_to_peer(laptop.state.clone()).await;

    // Assert
    assert_eq!(pushed.data, Some(2));
    let ids: Vec<String> = desk
        .state
        .peripherals
        .lock()
        .await
        .peripherals()
        .iter()
        .map(|p| p.id.clone())
        .collect();
    assert_eq!(ids, vec![KEYBOARD.to_string(), MOUSE.to_string()]);

    // Act: laptop forgets its list and pulls it back from desk.
    assert!(ui_bridge::remove_peripheral(laptop.state.clone(), KEYBOARD.into()).await.success);
    let pulled = ui_bridge::pull_peripherals_from_peer(laptop.state.clone()).await;

    // Assert
    assert_eq!(pulled.data, Some(2));
    assert!(laptop.state.peripherals.lock().await.contains(KEYBOARD));
}
