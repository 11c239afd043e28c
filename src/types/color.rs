//! RGB color commands as received from the network.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::Error;

/// An RGB color command with red, green, and blue components (0-255 each).
///
/// One is built per inbound datagram and handed to [`crate::encode`].
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ColorCommand {
    pub(crate) red: u8,
    pub(crate) green: u8,
    pub(crate) blue: u8,
}

impl ColorCommand {
    /// Number of payload bytes a command is read from.
    pub const LEN: usize = 3;

    /// Create a command with the given RGB values.
    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Read a command from the first three bytes of a raw payload.
    ///
    /// Anything after the third byte is ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use neewer_ble_bridge::ColorCommand;
    ///
    /// let cmd = ColorCommand::from_payload(b"\xff\x00\x00").unwrap();
    /// assert_eq!(cmd, ColorCommand::rgb(255, 0, 0));
    /// assert!(ColorCommand::from_payload(b"\xff\x00").is_err());
    /// ```
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        match payload {
            [red, green, blue, ..] => Ok(Self::rgb(*red, *green, *blue)),
            _ => Err(Error::MalformedCommand { len: payload.len() }),
        }
    }

    pub fn red(&self) -> u8 {
        self.red
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    /// The raw 3-byte datagram for this command.
    pub fn to_payload(&self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }
}

impl FromStr for ColorCommand {
    type Err = Error;

    /// Parse from comma-separated string (e.g., "255,128,0").
    fn from_str(s: &str) -> Result<Self, Error> {
        let parts = s
            .split(',')
            .map(|c| c.trim().parse::<u8>())
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| Error::InvalidColorString(s.to_string()))?;
        match parts[..] {
            [red, green, blue] => Ok(Self::rgb(red, green, blue)),
            _ => Err(Error::InvalidColorString(s.to_string())),
        }
    }
}
