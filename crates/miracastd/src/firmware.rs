//! Firmware-loader seam.
//!
//! On some platforms the P2P interface only exists after a firmware handover
//! performed by an external loader. The coordinator consumes two signals
//! from it, [`Event::FirmwareLoaded`] and [`Event::FirmwareUnloaded`], and
//! otherwise treats loading as opaque.

use tokio::sync::mpsc::UnboundedSender;

use crate::manager::Event;

pub trait FirmwareLoader: Send {
    /// Whether the interface needs a firmware handover before the
    /// supplicant can start.
    fn is_needed(&self) -> bool;

    /// Kick off loading. Completion arrives as [`Event::FirmwareLoaded`].
    /// Returns false when the request could not even be issued.
    fn try_load(&self, events: &UnboundedSender<Event>) -> bool;
}

/// Platforms whose P2P interface is available from boot.
pub struct NoFirmware;

impl FirmwareLoader for NoFirmware {
    fn is_needed(&self) -> bool {
        false
    }

    fn try_load(&self, events: &UnboundedSender<Event>) -> bool {
        events.send(Event::FirmwareLoaded).is_ok()
    }
}
