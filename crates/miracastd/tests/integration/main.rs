//! Network-manager integration harness.
//!
//! Tests drive a real `NetworkManager` task over one end of a Unix datagram
//! socket pair; the other end plays wpa_supplicant, recording every request
//! and answering `OK`. Timer scenarios run on tokio's paused clock, so the
//! five-second timeouts elapse instantly.
//!
//! Each test gets its own manager; no external processes or privileges are
//! required.

mod connection;
mod discovery;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixDatagram;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use miracast_core::config::MiracastConfig;
use miracast_core::peer::{DeviceState, NetworkDevice};
use miracastd::firmware::NoFirmware;
use miracastd::manager::{Delegate, Event, ManagerHandle, NetworkManager};

// ── Harness ───────────────────────────────────────────────────────────────────

pub const SINK_ADDR: &str = "4e:74:03:70:e2:c1";

pub const DEVICE_FOUND_EVENT: &str = "<3>P2P-DEVICE-FOUND 4e:74:03:70:e2:c1 \
    p2p_dev_addr=4e:74:03:70:e2:c1 pri_dev_type=8-0050F204-2 name='Aquaris M10' \
    config_methods=0x188 dev_capab=0x5 group_capab=0x0 wfd_dev_info=0x00111c440032 new=1";

pub const DEVICE_LOST_EVENT: &str = "<3>P2P-DEVICE-LOST p2p_dev_addr=4e:74:03:70:e2:c1";

/// Delegate notifications, flattened for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateEvent {
    Found { address: String, name: String },
    Lost { address: String },
    StateChanged { address: String, state: DeviceState },
}

struct ChannelDelegate(UnboundedSender<DelegateEvent>);

impl Delegate for ChannelDelegate {
    fn on_device_found(&mut self, device: &NetworkDevice) {
        let _ = self.0.send(DelegateEvent::Found {
            address: device.address.to_string(),
            name: device.name.clone(),
        });
    }

    fn on_device_lost(&mut self, device: &NetworkDevice) {
        let _ = self.0.send(DelegateEvent::Lost { address: device.address.to_string() });
    }

    fn on_device_state_changed(&mut self, device: &NetworkDevice) {
        let _ = self.0.send(DelegateEvent::StateChanged {
            address: device.address.to_string(),
            state: device.state,
        });
    }
}

/// The far end of the control socket: records requests, replies `OK`, and
/// lets tests inject events.
pub struct FakeSupplicant {
    socket: Arc<UnixDatagram>,
    requests: UnboundedReceiver<String>,
    _reply_task: JoinHandle<()>,
}

impl FakeSupplicant {
    fn spawn(socket: UnixDatagram) -> FakeSupplicant {
        let socket = Arc::new(socket);
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let reply_task = tokio::spawn({
            let socket = socket.clone();
            async move {
                let mut buf = vec![0u8; 1024];
                loop {
                    let Ok(len) = socket.recv(&mut buf).await else { return };
                    let raw = String::from_utf8_lossy(&buf[..len]).to_string();
                    let _ = socket.send(b"OK").await;
                    if requests_tx.send(raw).is_err() {
                        return;
                    }
                }
            }
        });
        FakeSupplicant { socket, requests: requests_rx, _reply_task: reply_task }
    }

    pub async fn send_event(&self, line: &str) {
        self.socket.send(line.as_bytes()).await.expect("event delivery failed");
    }

    /// Wait for the next request starting with `prefix`, skipping others.
    pub async fn expect_request(&mut self, prefix: &str) -> String {
        loop {
            let request = timeout(Duration::from_secs(30), self.requests.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for request {prefix:?}"))
                .expect("request channel closed");
            if request.starts_with(prefix) {
                return request;
            }
        }
    }
}

pub struct TestBed {
    pub handle: ManagerHandle,
    pub events: UnboundedSender<Event>,
    pub supplicant: FakeSupplicant,
    delegate: UnboundedReceiver<DelegateEvent>,
}

impl TestBed {
    pub async fn start() -> TestBed {
        let mut config = MiracastConfig::default();
        config.network.interface = "p2p-test0".to_string();
        config.network.device_name = "test-source".to_string();
        // Points nowhere so background respawn attempts fail fast.
        config.supplicant.binary_path = "/nonexistent/wpa_supplicant".into();

        let (delegate_tx, delegate_rx) = mpsc::unbounded_channel();
        let (mut manager, handle) = NetworkManager::new(
            &config,
            Box::new(ChannelDelegate(delegate_tx)),
            Box::new(NoFirmware),
        );
        let events = manager.event_sender();

        let (ours, theirs) = UnixDatagram::pair().expect("socket pair");
        // Ensure the reactor has registered the freshly created socket's
        // writable readiness before session bring-up sends its first request.
        ours.writable().await.expect("socket pair is writable");
        manager.adopt_session(ours);
        tokio::spawn(manager.run());

        TestBed {
            handle,
            events,
            supplicant: FakeSupplicant::spawn(theirs),
            delegate: delegate_rx,
        }
    }

    pub async fn expect_delegate(&mut self) -> DelegateEvent {
        timeout(Duration::from_secs(30), self.delegate.recv())
            .await
            .expect("timed out waiting for delegate notification")
            .expect("delegate channel closed")
    }

    pub fn no_pending_delegate(&mut self) -> bool {
        matches!(self.delegate.try_recv(), Err(mpsc::error::TryRecvError::Empty))
    }

    /// Feed the canonical discovery event and consume the `Found` callback.
    pub async fn discover_sink(&mut self) {
        self.supplicant.send_event(DEVICE_FOUND_EVENT).await;
        assert_eq!(
            self.expect_delegate().await,
            DelegateEvent::Found { address: SINK_ADDR.to_string(), name: "Aquaris M10".to_string() }
        );
    }

    /// Discover, connect, and consume everything up to the written
    /// `P2P_CONNECT` request.
    pub async fn connect_sink(&mut self) {
        self.discover_sink().await;
        self.handle.connect(SINK_ADDR).await.expect("connect should be accepted");
        assert_eq!(
            self.expect_delegate().await,
            DelegateEvent::StateChanged {
                address: SINK_ADDR.to_string(),
                state: DeviceState::Association,
            }
        );
        let request = self.supplicant.expect_request("P2P_CONNECT").await;
        assert_eq!(request, format!("P2P_CONNECT {SINK_ADDR} pbc"));
    }

    pub async fn expect_state(&mut self, state: DeviceState) {
        assert_eq!(
            self.expect_delegate().await,
            DelegateEvent::StateChanged { address: SINK_ADDR.to_string(), state }
        );
    }

    pub fn assign_address(&self, address: Ipv4Addr) {
        self.events
            .send(Event::AddressAssigned(address))
            .expect("manager is gone");
    }

    /// Wait until the manager has drained everything fed so far. Events and
    /// commands travel on different channels, so tests that assert on a
    /// snapshot after an un-acknowledged event need this fence: it bounces a
    /// throwaway peer through the table and waits for both callbacks.
    pub async fn barrier(&mut self) {
        const BARRIER_ADDR: &str = "02:00:00:00:00:01";
        self.supplicant
            .send_event(&format!(
                "<3>P2P-DEVICE-FOUND {BARRIER_ADDR} p2p_dev_addr={BARRIER_ADDR} name='fence' config_methods=0x0"
            ))
            .await;
        assert_eq!(
            self.expect_delegate().await,
            DelegateEvent::Found { address: BARRIER_ADDR.to_string(), name: "fence".to_string() }
        );
        self.supplicant
            .send_event(&format!("<3>P2P-DEVICE-LOST p2p_dev_addr={BARRIER_ADDR}"))
            .await;
        assert_eq!(
            self.expect_delegate().await,
            DelegateEvent::Lost { address: BARRIER_ADDR.to_string() }
        );
    }
}

// ── Session bring-up ──────────────────────────────────────────────────────────

/// Attaching to the supplicant subscribes to events, switches on Wi-Fi
/// Display support, and publishes the WFD sub-element, in that order.
#[tokio::test(start_paused = true)]
async fn session_bringup_publishes_wfd_support() {
    let mut bed = TestBed::start().await;

    assert_eq!(bed.supplicant.expect_request("ATTACH").await, "ATTACH");
    assert_eq!(bed.supplicant.expect_request("SET").await, "SET wifi_display 1");
    assert_eq!(
        bed.supplicant.expect_request("WFD_SUBELEM_SET").await,
        "WFD_SUBELEM_SET 0 000600101C440032"
    );
}

/// Scan requests pass the discovery window through verbatim.
#[tokio::test(start_paused = true)]
async fn scan_writes_p2p_find() {
    let mut bed = TestBed::start().await;

    bed.handle.scan(30).await.unwrap();
    assert_eq!(bed.supplicant.expect_request("P2P_FIND").await, "P2P_FIND 30");
}
