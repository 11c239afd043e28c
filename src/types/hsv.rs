//! Hue, Saturation and Value representation used by the light's protocol.

use serde::{Deserialize, Serialize};

use super::ColorCommand;

/// Hue, Saturation and Value as the light understands them.
///
/// - Hue: The color angle on the color wheel (0-359 degrees)
/// - Saturation: The intensity of the color (0-100 percent)
/// - Value: The brightness of the color (0-100 percent)
///
/// Every component is truncated, never rounded, so a hue that computes to
/// 44.94 degrees becomes 44.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvValue {
    hue: u16,
    saturation: u8,
    value: u8,
}

impl HsvValue {
    /// Get the hue value.
    pub fn hue(&self) -> u16 {
        self.hue
    }

    /// Get the saturation value.
    pub fn saturation(&self) -> u8 {
        self.saturation
    }

    /// Get the brightness value.
    pub fn value(&self) -> u8 {
        self.value
    }
}

impl From<&ColorCommand> for HsvValue {
    /// Convert from RGB.
    ///
    /// The channels are used as-is (0-255) rather than normalized to 0-1, so
    /// the raw value component lands in 0-255 and is scaled to a percentage
    /// through `value / 255 * 100`. Saturation is already a ratio and is
    /// scaled with `* 100` directly.
    ///
    /// # Examples
    ///
    /// ```
    /// use neewer_ble_bridge::{ColorCommand, HsvValue};
    ///
    /// let hsv = HsvValue::from(&ColorCommand::rgb(0, 0, 255));
    /// assert_eq!(hsv.hue(), 240);
    /// assert_eq!(hsv.saturation(), 100);
    /// assert_eq!(hsv.value(), 100);
    /// ```
    fn from(color: &ColorCommand) -> Self {
        let r = color.red as f64;
        let g = color.green as f64;
        let b = color.blue as f64;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let value = max;

        let (h, s) = if max == min {
            (0.0, 0.0)
        } else {
            let range = max - min;
            let s = range / max;
            let rc = (max - r) / range;
            let gc = (max - g) / range;
            let bc = (max - b) / range;

            let h = if r == max {
                bc - gc
            } else if g == max {
                2.0 + rc - bc
            } else {
                4.0 + gc - rc
            };
            ((h / 6.0).rem_euclid(1.0), s)
        };

        HsvValue {
            hue: ((h * 360.0) as u16).min(359),
            saturation: (s * 100.0) as u8,
            value: ((value / 255.0) * 100.0) as u8,
        }
    }
}
