//! Discovered remote endpoints and their connection lifecycle.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid hardware address {0:?}")]
    Invalid(String),
}

/// Hardware address of a peer, canonicalized to lower-case colon-separated
/// form. The canonical form is the identity key for the peer table, so
/// discoveries that differ only in case collapse onto one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress(String);

impl MacAddress {
    pub fn parse(input: &str) -> Result<MacAddress, AddressError> {
        let normalized = input.trim().to_ascii_lowercase();
        let mut octets = 0;
        for octet in normalized.split(':') {
            if octet.len() != 2 || !octet.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(AddressError::Invalid(input.to_string()));
            }
            octets += 1;
        }
        if octets != 6 {
            return Err(AddressError::Invalid(input.to_string()));
        }
        Ok(MacAddress(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection state of a peer. At most one peer leaves `Idle` at a time;
/// that peer is the coordinator's current peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Idle,
    Association,
    Configuration,
    Connected,
    Failure,
    Disconnected,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Idle => "idle",
            DeviceState::Association => "association",
            DeviceState::Configuration => "configuration",
            DeviceState::Connected => "connected",
            DeviceState::Failure => "failure",
            DeviceState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// A remote Miracast-capable device seen in P2P discovery.
#[derive(Debug, Clone)]
pub struct NetworkDevice {
    pub address: MacAddress,
    pub name: String,
    /// WPS config methods bitmask as advertised (`config_methods=0x188`).
    pub config_methods: u16,
    /// Raw WFD sub-element bytes from `wfd_dev_info`.
    pub wfd_dev_info: Vec<u8>,
    pub state: DeviceState,
}

impl NetworkDevice {
    pub fn new(address: MacAddress, name: impl Into<String>) -> NetworkDevice {
        NetworkDevice {
            address,
            name: name.into(),
            config_methods: 0,
            wfd_dev_info: Vec::new(),
            state: DeviceState::Idle,
        }
    }
}
