//! BLE transport abstractions.
//!
//! The connection manager never talks to a Bluetooth stack directly. It goes
//! through the [`BleTransport`] and [`BleLink`] traits, which cover exactly
//! what the bridge needs: connecting with a given address type, writing to a
//! characteristic handle, listing the GATT table, disconnecting and having
//! notifications pushed into a [`NotificationSink`].
//!
//! # Feature Flags
//!
//! - `ble-btleplug` - Provides [`BtleplugTransport`], backed by the `btleplug` crate

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Error;
use crate::notification::NotificationSink;

#[cfg(feature = "ble-btleplug")]
mod btleplug_impl;

#[cfg(test)]
pub(crate) mod mock;

#[cfg(feature = "ble-btleplug")]
pub use btleplug_impl::{BtleplugLink, BtleplugTransport};

type Result<T> = std::result::Result<T, Error>;

/// Trait for opening BLE connections.
///
/// Implementations must register `sink` so that every notification the
/// device pushes afterwards overwrites it, for as long as the link lives.
pub trait BleTransport: Send + Sync {
    /// An open connection to a single device.
    type Link: BleLink;

    /// Connect to the device at `address` through adapter number `adapter`.
    fn connect(
        &self,
        address: &DeviceAddress,
        address_type: AddressType,
        adapter: usize,
        sink: NotificationSink,
    ) -> impl Future<Output = Result<Self::Link>> + Send;
}

/// Trait for an open BLE connection.
///
/// Characteristic writes are not safe to issue concurrently; callers must
/// serialize them.
pub trait BleLink: Send + Sync {
    /// Write raw bytes to the characteristic with the given handle.
    fn write_characteristic(
        &self,
        handle: u16,
        bytes: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;

    /// List every characteristic of every service on the device.
    fn services(&self) -> impl Future<Output = Result<Vec<CharacteristicInfo>>> + Send;

    /// Close the link.
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;
}

/// BLE address type. Neewer lights advertise with a random address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressType {
    Public,
    Random,
}

/// A Bluetooth hardware address such as `D1:28:C0:6B:32:34`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceAddress {
    type Err = Error;

    /// Parse six colon-separated hex octets. The stored form is uppercase.
    fn from_str(s: &str) -> Result<Self> {
        let octets: Vec<&str> = s.split(':').collect();
        let valid = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        if valid {
            Ok(DeviceAddress(s.to_uppercase()))
        } else {
            Err(Error::InvalidAddress(s.to_string()))
        }
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DeviceAddress> for String {
    fn from(address: DeviceAddress) -> Self {
        address.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// GATT characteristic property flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicProperties {
    pub broadcast: bool,
    pub read: bool,
    pub write_without_response: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
    pub authenticated_signed_writes: bool,
    pub extended_properties: bool,
}

impl CharacteristicProperties {
    pub fn supports_read(&self) -> bool {
        self.read
    }

    /// Whether the device can push data on this characteristic.
    pub fn can_push(&self) -> bool {
        self.notify || self.indicate
    }
}

impl fmt::Display for CharacteristicProperties {
    /// Space-separated names of the set flags, e.g. `READ WRITE NOTIFY`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.broadcast, "BROADCAST"),
            (self.read, "READ"),
            (self.write_without_response, "WRITE NO RESPONSE"),
            (self.write, "WRITE"),
            (self.notify, "NOTIFY"),
            (self.indicate, "INDICATE"),
            (self.authenticated_signed_writes, "SIGNED WRITE"),
            (self.extended_properties, "EXTENDED PROPERTIES"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&set.join(" "))
    }
}

/// One characteristic as reported by [`BleLink::services`].
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicInfo {
    pub service_uuid: Uuid,
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    /// Handle the characteristic is addressed by, when one is known
    pub handle: Option<u16>,
}

/// Handle to characteristic UUID table.
///
/// Not every BLE stack exposes raw ATT handles, so the bridge keeps its own
/// table. The default maps handle 14 to the Neewer control characteristic
/// and handle 16 to the notify characteristic that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleMap(BTreeMap<u16, Uuid>);

impl Default for HandleMap {
    fn default() -> Self {
        Self(BTreeMap::from([
            (crate::connection::DEFAULT_HANDLE, Self::NEEWER_CONTROL_UUID),
            (Self::NEEWER_NOTIFY_HANDLE, Self::NEEWER_NOTIFY_UUID),
        ]))
    }
}

impl HandleMap {
    /// Write characteristic of Neewer RGB lights.
    pub const NEEWER_CONTROL_UUID: Uuid = Uuid::from_u128(0x69400002_b5a3_f393_e0a9_e50e24dcca9e);
    /// Notify characteristic of Neewer RGB lights.
    pub const NEEWER_NOTIFY_UUID: Uuid = Uuid::from_u128(0x69400003_b5a3_f393_e0a9_e50e24dcca9e);
    /// Value handle of the notify characteristic.
    pub const NEEWER_NOTIFY_HANDLE: u16 = 16;

    /// An empty table.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Map `handle` to `uuid`, replacing any previous entry for the handle.
    pub fn insert(&mut self, handle: u16, uuid: Uuid) {
        self.0.insert(handle, uuid);
    }

    pub fn uuid_for(&self, handle: u16) -> Option<Uuid> {
        self.0.get(&handle).copied()
    }

    pub fn handle_for(&self, uuid: &Uuid) -> Option<u16> {
        self.0
            .iter()
            .find(|(_, u)| *u == uuid)
            .map(|(handle, _)| *handle)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
