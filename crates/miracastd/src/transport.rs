//! Control-socket transport to wpa_supplicant.
//!
//! The supplicant listens on a Unix datagram socket at
//! `<ctrl_dir>/<interface>`. We bind our own caller-unique path under /tmp,
//! connect, and read datagrams on a background task that feeds parsed
//! messages into the coordinator's event channel. One datagram carries one
//! message; a short send is a write failure.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UnixDatagram;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use miracast_core::message::Message;

use crate::manager::Event;

const READ_BUFFER_SIZE: usize = 1024;

pub struct ControlSocket {
    socket: Arc<UnixDatagram>,
    reader: JoinHandle<()>,
    local_path: Option<PathBuf>,
}

impl ControlSocket {
    /// Bind `/tmp/<interface>-<pid>` (dropping any stale file first) and
    /// connect to the supplicant's socket under its control directory.
    pub fn connect(
        ctrl_dir: &Path,
        interface: &str,
        events: UnboundedSender<Event>,
    ) -> Result<ControlSocket> {
        let remote = ctrl_dir.join(interface);
        let local = PathBuf::from(format!("/tmp/{}-{}", interface, std::process::id()));

        match std::fs::remove_file(&local) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %local.display(), error = %e, "failed to remove stale bind path"),
        }

        let socket = UnixDatagram::bind(&local)
            .with_context(|| format!("failed to bind control socket at {}", local.display()))?;
        socket
            .connect(&remote)
            .with_context(|| format!("failed to connect to supplicant at {}", remote.display()))?;

        tracing::info!(path = %remote.display(), "connected to wpa_supplicant control socket");
        Ok(Self::attach(socket, events, Some(local)))
    }

    /// Wrap an already-connected socket. Tests hand in one end of a
    /// `UnixDatagram::pair`; the path-based [`ControlSocket::connect`] is the
    /// production entry point.
    pub fn attach(
        socket: UnixDatagram,
        events: UnboundedSender<Event>,
        local_path: Option<PathBuf>,
    ) -> ControlSocket {
        let socket = Arc::new(socket);
        let reader = tokio::spawn(read_loop(socket.clone(), events));
        ControlSocket { socket, reader, local_path }
    }

    /// Send one request as one datagram.
    pub fn send(&self, raw: &str) -> io::Result<()> {
        let sent = self.socket.try_send(raw.as_bytes())?;
        if sent != raw.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "short control-socket write"));
        }
        Ok(())
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(path) = &self.local_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Drain datagrams until the socket hangs up. Parse failures and transient
/// read errors are logged and tolerated; a connection-level error reports
/// `Event::TransportDown` and ends the task, leaving recovery to process
/// supervision.
async fn read_loop(socket: Arc<UnixDatagram>, events: UnboundedSender<Event>) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match socket.recv(&mut buf).await {
            Ok(len) => {
                let text = String::from_utf8_lossy(&buf[..len]);
                match Message::parse(&text) {
                    Ok(message) => {
                        if events.send(Event::Supplicant(message)).is_err() {
                            // Coordinator is gone; nothing left to deliver to.
                            return;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, raw = %text, "discarding malformed supplicant message"),
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionRefused
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::NotConnected
                        | io::ErrorKind::BrokenPipe
                ) =>
            {
                tracing::warn!(error = %e, "control socket hangup");
                let _ = events.send(Event::TransportDown);
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "control socket read failed");
            }
        }
    }
}
