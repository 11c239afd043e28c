/// All error types that can occur while bridging commands to a Neewer light.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The UDP listener could not be bound. This is the only fatal error.
    #[error("failed to bind listener on {addr}: {err:?}")]
    Bind { addr: String, err: std::io::Error },

    /// A network socket operation failed.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// Establishing the BLE connection failed.
    #[error("failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// Writing a frame to a characteristic failed.
    #[error("failed to write characteristic {handle}: {reason}")]
    Write { handle: u16, reason: String },

    /// A datagram too short to hold an RGB triple.
    #[error("malformed command; expected at least 3 bytes, got {len}")]
    MalformedCommand { len: usize },

    /// Tearing down the BLE link failed. Only ever logged.
    #[error("disconnect error: {0}")]
    Disconnect(String),

    /// An operation that needs a live link was called while disconnected.
    #[error("device is not connected")]
    NotConnected,

    /// The BLE stack reported an error.
    #[error("ble transport error: {0}")]
    Transport(String),

    /// No Bluetooth adapter at the requested index.
    #[error("bluetooth adapter {0} not found")]
    AdapterNotFound(usize),

    /// The device did not show up while scanning.
    #[error("device {0} not found")]
    DeviceNotFound(String),

    /// The device does not expose the characteristic a handle maps to.
    #[error("characteristic {0} not found on device")]
    CharacteristicNotFound(uuid::Uuid),

    /// No characteristic UUID is known for this handle.
    #[error("no characteristic known for handle {0}")]
    UnknownHandle(u16),

    /// Failed to parse a hardware address.
    #[error("invalid hardware address: {0}")]
    InvalidAddress(String),

    /// Failed to parse a [`crate::ColorCommand`] from a string.
    #[error("invalid color string: {0}")]
    InvalidColorString(String),

    /// Failed to read a configuration file.
    #[error("failed to read config {path}: {err:?}")]
    Config { path: String, err: std::io::Error },

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new bind error
    pub fn bind(addr: &str, err: std::io::Error) -> Self {
        Error::Bind {
            addr: addr.to_string(),
            err,
        }
    }

    /// Create a new connect error from the underlying cause
    pub fn connect(address: &str, cause: &Error) -> Self {
        Error::Connect {
            address: address.to_string(),
            reason: cause.to_string(),
        }
    }

    /// Create a new write error from the underlying cause
    pub fn write(handle: u16, cause: &Error) -> Self {
        Error::Write {
            handle,
            reason: cause.to_string(),
        }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
