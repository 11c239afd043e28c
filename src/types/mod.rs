//! Value types for color commands.

mod color;
mod hsv;

pub use color::ColorCommand;
pub use hsv::HsvValue;
