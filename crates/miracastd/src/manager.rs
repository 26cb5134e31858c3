//! Wi-Fi Direct coordinator.
//!
//! The manager owns the peer table, the current-peer state machine, the
//! command queue, the supplicant supervisor, and the DHCP pair. It runs as a
//! single task: commands from upper layers, supplicant traffic, timer
//! expiries, and child-exit notifications all arrive on its event loop, so
//! no state needs locking. Collaborators hold only an event-channel sender;
//! once the loop is gone their notifications are dropped on the floor.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::anyhow;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use miracast_core::config::MiracastConfig;
use miracast_core::message::Message;
use miracast_core::peer::{DeviceState, MacAddress, NetworkDevice};

use crate::dhcp::{DhcpClient, DhcpServer};
use crate::firmware::FirmwareLoader;
use crate::queue::{CommandQueue, Incoming, ReplyHandler};
use crate::supervisor::{Supervisor, CONNECT_RETRY_DELAY, RESPAWN_DELAY};
use crate::transport::ControlSocket;

/// How long a group client waits for its DHCP lease before the group is
/// declared failed.
const DHCP_ACQUISITION_TIMEOUT: Duration = Duration::from_millis(5000);

/// How long a failed peer stays in `failure` before dropping back to `idle`.
const PEER_FAILURE_COOLDOWN: Duration = Duration::from_millis(5000);

/// WFD sub-element advertised after every supplicant connect: a source
/// device offering RTSP on port 7236.
const WFD_SUB_ELEMENT: &str = "000600101C440032";

const P2P_DEVICE_FOUND: &str = "P2P-DEVICE-FOUND";
const P2P_DEVICE_LOST: &str = "P2P-DEVICE-LOST";
const P2P_GROUP_STARTED: &str = "P2P-GROUP-STARTED";
const P2P_GROUP_REMOVED: &str = "P2P-GROUP-REMOVED";

/// Everything the coordinator reacts to. Collaborators (transport reader,
/// timers, the child watch, DHCP polling, the firmware loader) deliver
/// these through the manager's unbounded event channel.
#[derive(Debug)]
pub enum Event {
    /// A parsed message from the control socket: a reply or an event.
    Supplicant(Message),
    /// The supplicant child exited with the given code.
    SupplicantExited(i32),
    /// The control socket hung up.
    TransportDown,
    /// Time to (re)try connecting to the supplicant's control socket.
    ConnectAttempt,
    /// Time to respawn the supplicant after an involuntary death.
    Respawn,
    /// The group client never received a lease.
    DhcpAcquisitionTimeout,
    /// A failed peer may drop back to idle.
    PeerFailureCooldown,
    /// The DHCP client observed a lease on the group interface.
    AddressAssigned(Ipv4Addr),
    FirmwareLoaded,
    FirmwareUnloaded,
}

/// Operations exposed to upper layers, sent through [`ManagerHandle`].
pub enum Command {
    Scan { seconds: u32 },
    Connect { address: String, reply: oneshot::Sender<Result<(), ConnectError>> },
    DisconnectAll,
    Devices { reply: oneshot::Sender<Vec<NetworkDevice>> },
    LocalAddress { reply: oneshot::Sender<Option<Ipv4Addr>> },
    Running { reply: oneshot::Sender<bool> },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("device {0} is not in the peer table")]
    UnknownDevice(String),
    #[error("a connection attempt is already in progress")]
    Busy,
    #[error("the network manager is not available")]
    Unavailable,
}

/// Consumers of peer lifecycle notifications. Callbacks run synchronously on
/// the manager's event loop; a notified peer reference is only valid for the
/// duration of the call.
pub trait Delegate: Send {
    fn on_device_found(&mut self, device: &NetworkDevice);
    fn on_device_lost(&mut self, device: &NetworkDevice);
    fn on_device_state_changed(&mut self, device: &NetworkDevice);
}

/// Cloneable front door to the manager task.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<Command>,
}

impl ManagerHandle {
    /// Begin discovery for the given number of seconds.
    pub async fn scan(&self, seconds: u32) -> anyhow::Result<()> {
        self.send(Command::Scan { seconds }).await
    }

    /// Initiate push-button pairing with a discovered peer. Returns once the
    /// request is accepted; progress arrives through the delegate.
    pub async fn connect(&self, address: &str) -> Result<(), ConnectError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect { address: address.to_string(), reply: tx })
            .await
            .map_err(|_| ConnectError::Unavailable)?;
        rx.await.map_err(|_| ConnectError::Unavailable)?
    }

    /// Tear down any active P2P group.
    pub async fn disconnect_all(&self) -> anyhow::Result<()> {
        self.send(Command::DisconnectAll).await
    }

    /// Snapshot of the peer table.
    pub async fn devices(&self) -> anyhow::Result<Vec<NetworkDevice>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Devices { reply: tx }).await?;
        rx.await.map_err(|_| anyhow!("network manager is gone"))
    }

    /// Our address on the active group, if any.
    pub async fn local_address(&self) -> anyhow::Result<Option<Ipv4Addr>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::LocalAddress { reply: tx }).await?;
        rx.await.map_err(|_| anyhow!("network manager is gone"))
    }

    /// Whether a supplicant process is currently alive.
    pub async fn running(&self) -> anyhow::Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Running { reply: tx }).await?;
        rx.await.map_err(|_| anyhow!("network manager is gone"))
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("network manager is gone"))
    }
}

pub struct NetworkManager {
    interface: String,
    delegate: Box<dyn Delegate>,
    firmware: Box<dyn FirmwareLoader>,
    supervisor: Supervisor,
    dhcp_client: DhcpClient,
    dhcp_server: DhcpServer,
    queue: CommandQueue,
    link: Option<ControlSocket>,

    peers: HashMap<MacAddress, NetworkDevice>,
    /// Address of the one peer allowed out of `idle`. Always present in
    /// `peers` while set.
    current_peer: Option<MacAddress>,
    /// Meaningful only while `current_peer` is set: true when the local node
    /// won the Group Owner role.
    group_owner: bool,

    events_tx: UnboundedSender<Event>,
    events_rx: UnboundedReceiver<Event>,
    commands_rx: mpsc::Receiver<Command>,

    connect_timer: Option<JoinHandle<()>>,
    respawn_timer: Option<JoinHandle<()>>,
    dhcp_timeout: Option<JoinHandle<()>>,
    failure_cooldown: Option<JoinHandle<()>>,
}

impl NetworkManager {
    pub fn new(
        config: &MiracastConfig,
        delegate: Box<dyn Delegate>,
        firmware: Box<dyn FirmwareLoader>,
    ) -> (NetworkManager, ManagerHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(16);

        let manager = NetworkManager {
            interface: config.network.interface.clone(),
            delegate,
            firmware,
            supervisor: Supervisor::new(config),
            dhcp_client: DhcpClient::new(&config.network.interface),
            dhcp_server: DhcpServer::new(&config.network.interface),
            queue: CommandQueue::new(),
            link: None,
            peers: HashMap::new(),
            current_peer: None,
            group_owner: false,
            events_tx,
            events_rx,
            commands_rx,
            connect_timer: None,
            respawn_timer: None,
            dhcp_timeout: None,
            failure_cooldown: None,
        };
        let handle = ManagerHandle { commands: commands_tx };
        (manager, handle)
    }

    /// Sender collaborators use to reach the event loop.
    pub fn event_sender(&self) -> UnboundedSender<Event> {
        self.events_tx.clone()
    }

    /// Bring the radio up: start the supplicant directly, or ask the
    /// firmware loader first when a handover is required.
    pub fn setup(&mut self) {
        if !self.firmware.is_needed() {
            self.start_supplicant();
        } else if !self.firmware.try_load(&self.events_tx) {
            tracing::warn!("firmware load could not be requested");
        }
    }

    /// Drive the event loop until shutdown. Supplicant traffic and timer
    /// expiries take precedence over commands, so upper layers always
    /// observe a state that reflects everything that already arrived.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                command = self.commands_rx.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }
        self.teardown();
    }

    // ── Public state queries ──────────────────────────────────────────────────

    pub fn devices(&self) -> Vec<NetworkDevice> {
        self.peers.values().cloned().collect()
    }

    pub fn local_address(&self) -> Option<Ipv4Addr> {
        if self.group_owner {
            self.dhcp_server.local_address()
        } else {
            self.dhcp_client.local_address()
        }
    }

    pub fn running(&self) -> bool {
        self.supervisor.running()
    }

    // ── Event and command dispatch ────────────────────────────────────────────

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Supplicant(message) => match self.queue.handle_incoming(message) {
                Incoming::Unsolicited(unsolicited) => self.dispatch_supplicant_event(unsolicited).await,
                Incoming::Handled { next } => {
                    if let Some(raw) = next {
                        self.write_raw(&raw);
                    }
                }
                Incoming::Stray(message) => {
                    tracing::warn!(raw = message.as_raw(), "reply with no request in flight")
                }
            },
            Event::SupplicantExited(status) => {
                tracing::warn!(status, "wpa_supplicant exited");
                self.supervisor.mark_exited();
                if status != 0 {
                    self.handle_supplicant_failure();
                }
            }
            Event::TransportDown => {
                tracing::warn!("lost connection to wpa_supplicant");
                self.handle_supplicant_failure();
            }
            Event::ConnectAttempt => self.try_connect_supplicant(),
            Event::Respawn => self.handle_respawn(),
            Event::DhcpAcquisitionTimeout => self.on_dhcp_timeout(),
            Event::PeerFailureCooldown => self.on_failure_cooldown(),
            Event::AddressAssigned(address) => self.on_address_assigned(address),
            Event::FirmwareLoaded => {
                tracing::info!("firmware loaded");
                self.start_supplicant();
            }
            Event::FirmwareUnloaded => {
                // Other system components own the handover; request a
                // reload and wait for the loaded signal.
                tracing::warn!("firmware unloaded, stopping supplicant");
                self.disconnect_supplicant();
                self.supervisor.stop();
                self.firmware.try_load(&self.events_tx);
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Scan { seconds } => self.scan(seconds),
            Command::Connect { address, reply } => {
                let _ = reply.send(self.connect(&address));
            }
            Command::DisconnectAll => self.disconnect_all(),
            Command::Devices { reply } => {
                let _ = reply.send(self.devices());
            }
            Command::LocalAddress { reply } => {
                let _ = reply.send(self.local_address());
            }
            Command::Running { reply } => {
                let _ = reply.send(self.running());
            }
            // Handled by the run loop before we get here.
            Command::Shutdown => {}
        }
    }

    async fn dispatch_supplicant_event(&mut self, event: Message) {
        match event.name() {
            P2P_DEVICE_FOUND => self.on_device_found(&event),
            P2P_DEVICE_LOST => self.on_device_lost(&event),
            P2P_GROUP_STARTED => self.on_group_started(&event).await,
            P2P_GROUP_REMOVED => self.on_group_removed(&event),
            _ => tracing::debug!(raw = event.as_raw(), "unhandled supplicant event"),
        }
    }

    // ── Operations ────────────────────────────────────────────────────────────

    fn scan(&mut self, seconds: u32) {
        self.request(
            Message::request("P2P_FIND").arg_uint(u64::from(seconds)),
            Box::new(|_| {}),
        );
    }

    fn connect(&mut self, address: &str) -> Result<(), ConnectError> {
        let address = MacAddress::parse(address)
            .map_err(|_| ConnectError::UnknownDevice(address.to_string()))?;
        if !self.peers.contains_key(&address) {
            return Err(ConnectError::UnknownDevice(address.to_string()));
        }
        if self.current_peer.is_some() {
            return Err(ConnectError::Busy);
        }

        self.current_peer = Some(address.clone());
        self.set_current_state(DeviceState::Association);
        self.notify_current_state();

        let request = Message::request("P2P_CONNECT").arg(address.as_str()).arg("pbc");
        self.request(
            request,
            Box::new(move |reply| {
                if reply.is_fail() {
                    tracing::warn!(address = %address, "P2P_CONNECT rejected by wpa_supplicant");
                }
            }),
        );
        Ok(())
    }

    fn disconnect_all(&mut self) {
        let interface = self.interface.clone();
        let request = Message::request("P2P_GROUP_REMOVE").arg(&interface);
        self.request(
            request,
            Box::new(move |reply| {
                if reply.is_fail() {
                    tracing::warn!(interface = %interface, "failed to remove P2P group");
                }
            }),
        );
    }

    /// Publish WFD sub-elements, one request per element.
    fn set_wfd_sub_elements(&mut self, elements: &[&str]) {
        for (index, element) in elements.iter().enumerate() {
            let request = Message::request("WFD_SUBELEM_SET")
                .arg_uint(index as u64)
                .arg(element);
            self.request(request, Box::new(|_| {}));
        }
    }

    // ── Supplicant events ─────────────────────────────────────────────────────

    fn on_device_found(&mut self, event: &Message) {
        let reader = event.reader();
        let (address, name) = match (reader.named("p2p_dev_addr"), reader.named("name")) {
            (Ok(address), Ok(name)) => (address, name.to_string()),
            _ => {
                tracing::warn!(raw = event.as_raw(), "malformed P2P-DEVICE-FOUND event");
                return;
            }
        };
        let address = match MacAddress::parse(address) {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!(error = %e, raw = event.as_raw(), "discarding discovery event");
                return;
            }
        };
        let config_methods = reader.named_hex("config_methods").unwrap_or(0) as u16;
        let wfd_dev_info = reader.named_bytes("wfd_dev_info").unwrap_or_default();

        if let Some(peer) = self.peers.get_mut(&address) {
            peer.name = name;
            peer.config_methods = config_methods;
            peer.wfd_dev_info = wfd_dev_info;
            tracing::debug!(address = %address, "updated known peer");
            return;
        }

        tracing::info!(address = %address, name = %name, config_methods, "peer discovered");
        let mut device = NetworkDevice::new(address.clone(), name);
        device.config_methods = config_methods;
        device.wfd_dev_info = wfd_dev_info;
        self.peers.insert(address.clone(), device);
        self.delegate.on_device_found(&self.peers[&address]);
    }

    fn on_device_lost(&mut self, event: &Message) {
        let address = match event.reader().named("p2p_dev_addr").map(MacAddress::parse) {
            Ok(Ok(address)) => address,
            _ => {
                tracing::warn!(raw = event.as_raw(), "malformed P2P-DEVICE-LOST event");
                return;
            }
        };

        if self.current_peer.as_ref() == Some(&address) {
            // The active peer leaves through P2P-GROUP-REMOVED; keep the
            // table entry until then.
            tracing::debug!(address = %address, "ignoring lost event for the current peer");
            return;
        }

        let Some(peer) = self.peers.remove(&address) else {
            return;
        };
        tracing::info!(address = %address, "peer lost");
        self.delegate.on_device_lost(&peer);
    }

    async fn on_group_started(&mut self, event: &Message) {
        // P2P-GROUP-STARTED p2p0 GO ssid="DIRECT-hB" freq=2412
        // passphrase="HtP0qYon" go_dev_addr=4e:74:03:64:95:a7
        if self.current_peer.is_none() {
            tracing::debug!(raw = event.as_raw(), "group started without a pending connect");
            return;
        }

        let mut reader = event.reader();
        let role = match reader.skip().and_then(|r| r.next_str()) {
            Ok(role) => role.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, raw = event.as_raw(), "malformed P2P-GROUP-STARTED event");
                return;
            }
        };

        self.set_current_state(DeviceState::Configuration);
        self.notify_current_state();

        if role == "GO" {
            // We run the group's access point, so the remote side is the
            // client and there is nothing left to wait for.
            self.group_owner = true;
            self.set_current_state(DeviceState::Connected);
            self.dhcp_server.start().await;
            self.notify_current_state();
        } else {
            // Any other role token means we joined as a client and still owe
            // ourselves an address before reporting connected.
            self.group_owner = false;
            self.dhcp_client.start(self.events_tx.clone());
            self.arm_dhcp_timeout();
        }
    }

    fn on_group_removed(&mut self, event: &Message) {
        // P2P-GROUP-REMOVED p2p0 GO reason=FORMATION_FAILED
        if self.current_peer.is_none() {
            tracing::debug!(raw = event.as_raw(), "group removed without a current peer");
            return;
        }

        let reason = event.reader().named("reason").unwrap_or("").to_string();
        let state = state_for_removal_reason(&reason);
        tracing::info!(reason = %reason, state = %state, "P2P group removed");

        self.set_current_state(state);
        self.notify_current_state();
        self.current_peer = None;
        self.cancel_dhcp_timeout();
        self.dhcp_client.stop();
        self.dhcp_server.stop();
        self.group_owner = false;
    }

    // ── DHCP callbacks ────────────────────────────────────────────────────────

    fn on_address_assigned(&mut self, address: Ipv4Addr) {
        if self.current_peer.is_none() {
            return;
        }
        tracing::info!(address = %address, "lease acquired on group interface");
        self.dhcp_client.note_address(address);
        self.cancel_dhcp_timeout();
        self.set_current_state(DeviceState::Connected);
        self.notify_current_state();
    }

    fn on_dhcp_timeout(&mut self) {
        if self.current_peer.is_none() {
            return;
        }
        tracing::warn!(timeout = ?DHCP_ACQUISITION_TIMEOUT, "no dhcp lease, giving up on the group");
        self.set_current_state(DeviceState::Failure);
        self.notify_current_state();
        self.dhcp_client.stop();
        self.dhcp_server.stop();
        self.group_owner = false;
        self.arm_failure_cooldown();
    }

    fn on_failure_cooldown(&mut self) {
        let Some(address) = self.current_peer.take() else {
            return;
        };
        if let Some(peer) = self.peers.get_mut(&address) {
            peer.state = DeviceState::Idle;
        }
        if let Some(peer) = self.peers.get(&address) {
            self.delegate.on_device_state_changed(peer);
        }
    }

    // ── Supplicant lifecycle ──────────────────────────────────────────────────

    fn start_supplicant(&mut self) -> bool {
        match self.supervisor.start(&self.events_tx) {
            Ok(()) => {
                self.arm_connect_timer();
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to start wpa_supplicant");
                false
            }
        }
    }

    fn try_connect_supplicant(&mut self) {
        match ControlSocket::connect(self.supervisor.ctrl_dir(), &self.interface, self.events_tx.clone()) {
            Ok(link) => {
                self.link = Some(link);
                self.finish_session_bringup();
            }
            Err(e) => {
                tracing::debug!(error = %e, "control socket not ready, retrying");
                self.arm_connect_timer();
            }
        }
    }

    /// Subscribe to events, switch on Wi-Fi Display support, and publish our
    /// sub-elements. A successful connect refills the respawn budget.
    fn finish_session_bringup(&mut self) {
        self.request(
            Message::request("ATTACH"),
            Box::new(|reply| {
                if reply.is_fail() {
                    tracing::warn!("failed to subscribe to wpa_supplicant events");
                }
            }),
        );
        self.request(
            Message::request("SET").arg("wifi_display").arg_int(1),
            Box::new(|_| {}),
        );
        self.set_wfd_sub_elements(&[WFD_SUB_ELEMENT]);
        self.supervisor.rearm_respawn();
    }

    /// Attach an already-connected control socket and run session bring-up.
    /// Production goes through the path-based connect loop; tests hand in
    /// one end of a socket pair.
    pub fn adopt_session(&mut self, socket: tokio::net::UnixDatagram) {
        self.link = Some(ControlSocket::attach(socket, self.events_tx.clone(), None));
        self.finish_session_bringup();
    }

    fn disconnect_supplicant(&mut self) {
        self.cancel_connect_timer();
        self.queue.clear();
        // Dropping the link aborts the reader and unlinks our bind path.
        self.link = None;
    }

    fn handle_supplicant_failure(&mut self) {
        if self.supervisor.consume_respawn() {
            self.arm_respawn_timer();
        } else {
            tracing::error!("respawn budget exhausted, wpa_supplicant will not be restarted");
        }
        self.disconnect_supplicant();
        self.supervisor.stop();
        self.reset();
    }

    fn handle_respawn(&mut self) {
        if self.start_supplicant() {
            return;
        }
        // The start itself failed; burn another attempt if we may.
        if self.supervisor.consume_respawn() {
            self.arm_respawn_timer();
        } else {
            tracing::error!("respawn budget exhausted, wpa_supplicant will not be restarted");
        }
    }

    /// Drop every peer and all session state. Safe to call repeatedly.
    pub fn reset(&mut self) {
        if let Some(address) = self.current_peer.take() {
            if let Some(peer) = self.peers.get_mut(&address) {
                peer.state = DeviceState::Disconnected;
            }
            if let Some(peer) = self.peers.get(&address) {
                self.delegate.on_device_state_changed(peer);
            }
            self.cancel_dhcp_timeout();
            self.cancel_failure_cooldown();
            self.dhcp_client.stop();
            self.dhcp_server.stop();
        }

        for peer in self.peers.values() {
            self.delegate.on_device_lost(peer);
        }
        self.peers.clear();
        self.group_owner = false;
    }

    fn teardown(&mut self) {
        self.reset();
        self.disconnect_supplicant();
        self.supervisor.stop();
        self.cancel_respawn_timer();
        self.cancel_dhcp_timeout();
        self.cancel_failure_cooldown();
    }

    // ── Request plumbing ──────────────────────────────────────────────────────

    fn request(&mut self, message: Message, handler: ReplyHandler) {
        if let Some(raw) = self.queue.enqueue(message, handler) {
            self.write_raw(&raw);
        }
    }

    fn write_raw(&mut self, raw: &str) {
        match &self.link {
            Some(link) => {
                if let Err(e) = link.send(raw) {
                    tracing::warn!(error = %e, "failed to send request to wpa_supplicant");
                }
            }
            None => tracing::warn!(raw, "dropping request, control socket not connected"),
        }
    }

    // ── Current-peer helpers ──────────────────────────────────────────────────

    fn set_current_state(&mut self, state: DeviceState) {
        if let Some(address) = &self.current_peer {
            if let Some(peer) = self.peers.get_mut(address) {
                peer.state = state;
            }
        }
    }

    fn notify_current_state(&mut self) {
        if let Some(address) = &self.current_peer {
            if let Some(peer) = self.peers.get(address) {
                self.delegate.on_device_state_changed(peer);
            }
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────────

    fn arm_connect_timer(&mut self) {
        self.cancel_connect_timer();
        self.connect_timer = Some(schedule(&self.events_tx, CONNECT_RETRY_DELAY, Event::ConnectAttempt));
    }

    fn cancel_connect_timer(&mut self) {
        if let Some(timer) = self.connect_timer.take() {
            timer.abort();
        }
    }

    fn arm_respawn_timer(&mut self) {
        self.cancel_respawn_timer();
        self.respawn_timer = Some(schedule(&self.events_tx, RESPAWN_DELAY, Event::Respawn));
    }

    fn cancel_respawn_timer(&mut self) {
        if let Some(timer) = self.respawn_timer.take() {
            timer.abort();
        }
    }

    fn arm_dhcp_timeout(&mut self) {
        self.cancel_dhcp_timeout();
        self.dhcp_timeout = Some(schedule(
            &self.events_tx,
            DHCP_ACQUISITION_TIMEOUT,
            Event::DhcpAcquisitionTimeout,
        ));
    }

    fn cancel_dhcp_timeout(&mut self) {
        if let Some(timer) = self.dhcp_timeout.take() {
            timer.abort();
        }
    }

    fn arm_failure_cooldown(&mut self) {
        self.cancel_failure_cooldown();
        self.failure_cooldown = Some(schedule(
            &self.events_tx,
            PEER_FAILURE_COOLDOWN,
            Event::PeerFailureCooldown,
        ));
    }

    fn cancel_failure_cooldown(&mut self) {
        if let Some(timer) = self.failure_cooldown.take() {
            timer.abort();
        }
    }
}

/// Single-shot timer that reports back through the event channel. If the
/// loop is gone by the time it fires, the send fails and the event is
/// dropped, which is exactly the contract for a non-owning callback.
fn schedule(events: &UnboundedSender<Event>, delay: Duration, event: Event) -> JoinHandle<()> {
    let events = events.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = events.send(event);
    })
}

fn state_for_removal_reason(reason: &str) -> DeviceState {
    match reason {
        "FORMATION_FAILED" | "PSK_FAILURE" | "FREQ_CONFLICT" => DeviceState::Failure,
        _ => DeviceState::Disconnected,
    }
}
