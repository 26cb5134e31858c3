//! wpa_supplicant process supervision.
//!
//! The supervisor owns everything about the child process: the generated
//! configuration file, the control directory, the argument vector, the exit
//! watch, and the respawn budget. Scheduling (the 500 ms connect retry and
//! the 2 s respawn delay) is driven by the coordinator's event loop; the
//! delays live here next to the budget they belong to.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::sync::{mpsc::UnboundedSender, oneshot};

use miracast_core::config::MiracastConfig;

use crate::manager::Event;

/// Involuntary deaths and failed respawns each consume one unit; the budget
/// refills only after a successful control-socket connect.
const RESPAWN_LIMIT: u32 = 10;

/// Delay between an involuntary death and the next start attempt.
pub const RESPAWN_DELAY: Duration = Duration::from_millis(2000);

/// Interval between control-socket connect attempts after a spawn.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct Supervisor {
    interface: String,
    device_name: String,
    binary_path: PathBuf,
    conf_path: PathBuf,
    ctrl_dir: PathBuf,
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
    respawn_budget: u32,
}

impl Supervisor {
    pub fn new(config: &MiracastConfig) -> Supervisor {
        let interface = config.network.interface.clone();
        Supervisor {
            conf_path: PathBuf::from(format!("/tmp/supplicant-{interface}.conf")),
            ctrl_dir: PathBuf::from(format!("/var/run/{interface}_supplicant")),
            interface,
            device_name: config.network.device_name.clone(),
            binary_path: config.supplicant.binary_path.clone(),
            pid: None,
            kill: None,
            respawn_budget: RESPAWN_LIMIT,
        }
    }

    /// Directory the supplicant creates its per-interface socket in.
    pub fn ctrl_dir(&self) -> &Path {
        &self.ctrl_dir
    }

    pub fn running(&self) -> bool {
        self.pid.is_some()
    }

    /// Rewrite the supplicant configuration. Push-button pairing is the only
    /// supported WPS method.
    fn write_config(&self) -> Result<()> {
        let config = format!(
            "# GENERATED - DO NOT EDIT!\n\
             config_methods=pbc\n\
             ap_scan=1\n\
             device_name={}",
            self.device_name
        );
        std::fs::write(&self.conf_path, config)
            .with_context(|| format!("failed to write {}", self.conf_path.display()))
    }

    /// Drop any left-over control directory so the supplicant can set up a
    /// fresh socket. Failure is logged and does not abort the start.
    fn clean_ctrl_dir(&self) {
        match std::fs::remove_dir_all(&self.ctrl_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.ctrl_dir.display(),
                error = %e,
                "failed to remove supplicant control directory, this will cause problems"
            ),
        }
    }

    /// Spawn wpa_supplicant and watch it. A non-zero exit reaches the
    /// coordinator as [`Event::SupplicantExited`].
    pub fn start(&mut self, events: &UnboundedSender<Event>) -> Result<()> {
        self.write_config()?;
        self.clean_ctrl_dir();

        let mut command = Command::new(&self.binary_path);
        command
            .arg("-Dnl80211")
            .arg(format!("-i{}", self.interface))
            .arg(format!("-C{}", self.ctrl_dir.display()))
            .arg("-ddd")
            .arg("-t")
            .arg("-K")
            .arg(format!("-c{}", self.conf_path.display()))
            .arg("-W")
            .kill_on_drop(true);

        if std::env::var_os("MIRACAST_SUPPLICANT_DEBUG").is_none() {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        // The child must not outlive the daemon.
        unsafe {
            command.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.binary_path.display()))?;
        self.pid = child.id();

        let (kill_tx, kill_rx) = oneshot::channel();
        self.kill = Some(kill_tx);

        let events = events.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let code = status.map(|s| s.code().unwrap_or(-1)).unwrap_or(-1);
                    let _ = events.send(Event::SupplicantExited(code));
                }
                _ = kill_rx => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        });

        tracing::info!(pid = ?self.pid, interface = %self.interface, "wpa_supplicant started");
        Ok(())
    }

    /// Stop watching and kill the child if it is still alive.
    pub fn stop(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        self.pid = None;
    }

    /// Forget the pid after the exit watch fired.
    pub fn mark_exited(&mut self) {
        self.pid = None;
        self.kill = None;
    }

    /// Take one respawn attempt from the budget. Returns false once the
    /// budget is exhausted, after which the supplicant stays down until the
    /// manager is re-initialized externally.
    pub fn consume_respawn(&mut self) -> bool {
        if self.respawn_budget == 0 {
            return false;
        }
        self.respawn_budget -= 1;
        true
    }

    /// Refill the budget after a successful control-socket connect.
    pub fn rearm_respawn(&mut self) {
        self.respawn_budget = RESPAWN_LIMIT;
    }

    pub fn respawn_budget(&self) -> u32 {
        self.respawn_budget
    }
}
