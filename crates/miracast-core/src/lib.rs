//! miracast-core — shared types and the wpa_supplicant message codec.
//! The daemon crate depends on this one.

pub mod config;
pub mod message;
pub mod peer;

pub use message::{Message, MessageKind};
pub use peer::{DeviceState, MacAddress, NetworkDevice};
