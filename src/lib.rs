//! # neewer_ble_bridge
//!
//! An async Rust bridge that drives Neewer RGB light panels over Bluetooth LE
//! from plain UDP datagrams.
//!
//! A caller sends a 3-byte `r, g, b` datagram. The bridge converts the color
//! to the light's hue/saturation/value representation, packs it into the
//! 8-byte "set HSI color" frame and writes it to characteristic handle 14 over
//! a single persistent BLE connection.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use neewer_ble_bridge::{BtleplugTransport, CommandBridge, ConnectionManager, DeviceConnection};
//!
//! async fn run() -> Result<(), neewer_ble_bridge::Error> {
//!     let device = DeviceConnection::new("D1:28:C0:6B:32:34".parse()?, 0);
//!     let manager = Arc::new(ConnectionManager::new(BtleplugTransport::default(), device));
//!     manager.connect().await?;
//!     CommandBridge::new(manager).serve_forever("0.0.0.0", 1664).await
//! }
//! ```
//!
//! ## Wire Format
//!
//! ```text
//! 78 86 04 <hue low> <hue high> <saturation> <value> <checksum>
//! ```
//!
//! See [`ProtocolFrame`] for details. Use [`encode`] to build one.
//!
//! ## Feature Flags
//!
//! - `ble-btleplug`: BLE backend built on btleplug ([`BtleplugTransport`])
//! - `cli`: the `neewer-bridge` binary

mod bridge;
mod config;
mod connection;
mod errors;
mod frame;
mod history;
mod notification;
pub mod runtime;
pub mod transport;
mod types;

// Re-export public API
pub use bridge::{CommandBridge, DEFAULT_LISTEN_ADDRESS, DEFAULT_LISTEN_PORT};
pub use config::{BridgeConfig, DeviceConfig, ListenConfig, Mode};
pub use connection::{
    ConnectionDiagnostics, ConnectionManager, ConnectionState, DEFAULT_HANDLE, DeviceConnection,
};
pub use errors::Error;
pub use frame::{ProtocolFrame, encode};
pub use history::{HistoryEntry, HistorySummary, MessageHistory, MessageType};
pub use notification::{NotificationRecord, NotificationSink};
#[cfg(feature = "ble-btleplug")]
pub use transport::BtleplugTransport;
pub use transport::{
    AddressType, BleLink, BleTransport, CharacteristicInfo, CharacteristicProperties,
    DeviceAddress, HandleMap,
};
pub use types::{ColorCommand, HsvValue};
