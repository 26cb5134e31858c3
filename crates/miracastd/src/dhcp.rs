//! DHCP pair for the P2P group interface.
//!
//! Exactly one side runs while a group is up: the server when the local node
//! is Group Owner, the client otherwise. Both wrap the busybox DHCP tools as
//! supervised children and manage the interface address through `ip`, the
//! same way the supervisor wraps wpa_supplicant.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::manager::Event;

/// Address the Group Owner assigns itself on the group interface.
pub const GROUP_OWNER_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 7, 1);
const GROUP_PREFIX_LEN: u8 = 24;
const LEASE_RANGE_START: Ipv4Addr = Ipv4Addr::new(192, 168, 7, 50);
const LEASE_RANGE_END: Ipv4Addr = Ipv4Addr::new(192, 168, 7, 150);

const ADDRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Acquires a lease on the group interface when we join as a client.
///
/// The lease itself is negotiated by udhcpc; a poll task watches the
/// interface and reports the assigned address to the coordinator as
/// [`Event::AddressAssigned`]. The coordinator's acquisition timeout bounds
/// the wait.
pub struct DhcpClient {
    interface: String,
    child: Option<Child>,
    poll: Option<JoinHandle<()>>,
    address: Option<Ipv4Addr>,
    running: bool,
}

impl DhcpClient {
    pub fn new(interface: &str) -> DhcpClient {
        DhcpClient {
            interface: interface.to_string(),
            child: None,
            poll: None,
            address: None,
            running: false,
        }
    }

    pub fn start(&mut self, events: UnboundedSender<Event>) {
        if self.running {
            return;
        }
        self.running = true;

        let spawned = Command::new("udhcpc")
            .args(["-i", &self.interface, "-f", "-q"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(child) => {
                self.child = Some(child);
                let interface = self.interface.clone();
                self.poll = Some(tokio::spawn(async move {
                    loop {
                        tokio::time::sleep(ADDRESS_POLL_INTERVAL).await;
                        if let Some(address) = query_interface_address(&interface).await {
                            let _ = events.send(Event::AddressAssigned(address));
                            return;
                        }
                    }
                }));
            }
            Err(e) => {
                tracing::warn!(interface = %self.interface, error = %e, "failed to spawn udhcpc")
            }
        }
    }

    /// Record the address once the coordinator accepts it.
    pub fn note_address(&mut self, address: Ipv4Addr) {
        self.address = Some(address);
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
        self.child = None;
        self.address = None;
        flush_interface(&self.interface);
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn local_address(&self) -> Option<Ipv4Addr> {
        self.address
    }
}

/// Serves leases in the fixed group subnet while we are Group Owner.
pub struct DhcpServer {
    interface: String,
    conf_path: PathBuf,
    child: Option<Child>,
    running: bool,
}

impl DhcpServer {
    pub fn new(interface: &str) -> DhcpServer {
        DhcpServer {
            conf_path: PathBuf::from(format!("/tmp/udhcpd-{interface}.conf")),
            interface: interface.to_string(),
            child: None,
            running: false,
        }
    }

    pub async fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;

        // The owner address must be on the interface before leases go out.
        let assigned = Command::new("ip")
            .args([
                "addr",
                "replace",
                &format!("{GROUP_OWNER_ADDRESS}/{GROUP_PREFIX_LEN}"),
                "dev",
                &self.interface,
            ])
            .output()
            .await;
        match assigned {
            Ok(output) if output.status.success() => {}
            Ok(output) => tracing::warn!(
                interface = %self.interface,
                status = ?output.status,
                "failed to assign group owner address"
            ),
            Err(e) => tracing::warn!(interface = %self.interface, error = %e, "failed to run ip"),
        }

        if let Err(e) = self.write_config() {
            tracing::warn!(path = %self.conf_path.display(), error = %e, "failed to write udhcpd configuration");
            return;
        }

        let spawned = Command::new("udhcpd")
            .arg("-f")
            .arg(&self.conf_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(child) => self.child = Some(child),
            Err(e) => {
                tracing::warn!(interface = %self.interface, error = %e, "failed to spawn udhcpd")
            }
        }
    }

    fn write_config(&self) -> std::io::Result<()> {
        let config = format!(
            "start {LEASE_RANGE_START}\n\
             end {LEASE_RANGE_END}\n\
             interface {}\n\
             max_leases 16\n\
             lease_file /tmp/udhcpd-{}.leases\n\
             option subnet 255.255.255.0\n\
             option router {GROUP_OWNER_ADDRESS}\n",
            self.interface, self.interface
        );
        std::fs::write(&self.conf_path, config)
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.child = None;
        flush_interface(&self.interface);
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn local_address(&self) -> Option<Ipv4Addr> {
        self.running.then_some(GROUP_OWNER_ADDRESS)
    }
}

/// First IPv4 address currently configured on the interface.
async fn query_interface_address(interface: &str) -> Option<Ipv4Addr> {
    let output = Command::new("ip")
        .args(["-4", "-o", "addr", "show", "dev", interface])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_inet_address(&String::from_utf8_lossy(&output.stdout))
}

/// Pull the address out of `ip -4 -o addr show` output, e.g.
/// `3: p2p0    inet 192.168.49.3/24 brd 192.168.49.255 scope global p2p0`.
fn parse_inet_address(text: &str) -> Option<Ipv4Addr> {
    let mut fields = text.split_whitespace();
    while let Some(field) = fields.next() {
        if field == "inet" {
            return fields.next()?.split('/').next()?.parse().ok();
        }
    }
    None
}

/// Best-effort removal of any addresses we configured or leased.
fn flush_interface(interface: &str) {
    let interface = interface.to_string();
    tokio::spawn(async move {
        let _ = Command::new("ip")
            .args(["addr", "flush", "dev", &interface])
            .output()
            .await;
    });
}
