//! Bridge configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::bridge::{DEFAULT_LISTEN_ADDRESS, DEFAULT_LISTEN_PORT};
use crate::connection::{DEFAULT_HANDLE, DeviceConnection};
use crate::errors::Error;
use crate::transport::{DeviceAddress, HandleMap};

type Result<T> = std::result::Result<T, Error>;

/// What the process does once connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forward UDP datagrams to the light
    #[default]
    Serve,
    /// Log the light's services and characteristics
    Scan,
}

impl Mode {
    /// Every mode name, for `--list-commands`.
    pub fn names() -> Vec<String> {
        Mode::iter().map(|m| m.to_string()).collect()
    }
}

/// Which light to drive and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub address: DeviceAddress,
    #[serde(default)]
    pub adapter: usize,
    /// Handle color frames are written to
    #[serde(default = "default_handle")]
    pub handle: u16,
    #[serde(default)]
    pub handles: HandleMap,
}

impl DeviceConfig {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            address,
            adapter: 0,
            handle: DEFAULT_HANDLE,
            handles: HandleMap::default(),
        }
    }

    pub fn connection(&self) -> DeviceConnection {
        DeviceConnection::new(self.address.clone(), self.adapter)
    }
}

/// Where the UDP listener binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen_address")]
    pub address: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            port: default_listen_port(),
        }
    }
}

/// Complete process configuration.
///
/// # Example
///
/// ```
/// use neewer_ble_bridge::{BridgeConfig, Mode};
///
/// let config = BridgeConfig::from_json(r#"{"device": {"address": "D1:28:C0:6B:32:34"}}"#).unwrap();
/// assert_eq!(config.listen.port, 1664);
/// assert_eq!(config.device.handle, 14);
/// assert_eq!(config.mode, Mode::Serve);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub mode: Mode,
}

impl BridgeConfig {
    pub fn new(address: DeviceAddress) -> Self {
        Self {
            device: DeviceConfig::new(address),
            listen: ListenConfig::default(),
            mode: Mode::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Error::JsonLoad)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| Error::Config {
            path: path.display().to_string(),
            err,
        })?;
        Self::from_json(&json)
    }
}

fn default_handle() -> u16 {
    DEFAULT_HANDLE
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}
