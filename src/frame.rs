//! Binary control frames for Neewer lights.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ColorCommand, HsvValue};

/// A "set HSI color" frame ready to be written to the light.
///
/// The layout is fixed at eight bytes:
///
/// ```text
/// 78 86 04 <hue low> <hue high> <saturation> <value> <checksum>
/// ```
///
/// `78 86 04` is the header of a color command with a 4-byte payload. The hue
/// spans 0-359 and is split into a low byte and a carry byte that is `1` for
/// hues of 256 and above. The checksum is the sum of the seven preceding
/// bytes modulo 256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolFrame([u8; FRAME_LEN]);

const FRAME_LEN: usize = 8;

impl ProtocolFrame {
    /// Total frame length.
    pub const LEN: usize = FRAME_LEN;
    /// Header of the "set HSI color" command.
    pub const HEADER: [u8; 3] = [0x78, 0x86, 0x04];

    /// Assemble a frame from HSV components, appending the checksum.
    pub fn from_hsv(hsv: &HsvValue) -> Self {
        let hue = hsv.hue();
        let (hue_low, hue_high) = if hue < 256 {
            (hue as u8, 0)
        } else {
            ((hue % 256) as u8, 1)
        };

        let mut bytes = [0u8; Self::LEN];
        bytes[..3].copy_from_slice(&Self::HEADER);
        bytes[3] = hue_low;
        bytes[4] = hue_high;
        bytes[5] = hsv.saturation();
        bytes[6] = hsv.value();
        bytes[7] = checksum(&bytes[..Self::LEN - 1]);
        ProtocolFrame(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The hue in degrees, recombined from the low and carry bytes.
    pub fn hue(&self) -> u16 {
        self.0[3] as u16 + self.0[4] as u16 * 256
    }

    pub fn saturation(&self) -> u8 {
        self.0[5]
    }

    pub fn value(&self) -> u8 {
        self.0[6]
    }

    pub fn checksum(&self) -> u8 {
        self.0[7]
    }

    /// Whether the trailing byte matches the sum of the others.
    pub fn is_checksum_valid(&self) -> bool {
        checksum(&self.0[..Self::LEN - 1]) == self.checksum()
    }
}

impl AsRef<[u8]> for ProtocolFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ProtocolFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<&ColorCommand> for ProtocolFrame {
    fn from(command: &ColorCommand) -> Self {
        encode(command)
    }
}

/// Encode an RGB command into the light's binary frame.
///
/// Encoding is total: every RGB triple produces a frame. The conversion is
/// lossy, so there is no decoder.
///
/// # Examples
///
/// ```
/// use neewer_ble_bridge::{ColorCommand, encode};
///
/// let frame = encode(&ColorCommand::rgb(255, 0, 0));
/// assert_eq!(
///     frame.as_bytes(),
///     &[0x78, 0x86, 0x04, 0x00, 0x00, 0x64, 0x64, 0xca]
/// );
/// ```
pub fn encode(command: &ColorCommand) -> ProtocolFrame {
    ProtocolFrame::from_hsv(&HsvValue::from(command))
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}
