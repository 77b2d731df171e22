#![no_std]

#[macro_use]
mod fmt;

/// Driver for the BMP280 barometric pressure and temperature sensor.
///
/// Refer to [this datasheet](https://www.bosch-sensortec.com/media/boschsensortec/downloads/datasheets/bst-bmp280-ds001.pdf)
/// for more information about the device and its compensation formulas.
pub mod bmp280;
/// Linear per-channel corrections applied to every physical reading.
pub mod calibration;
/// Driver for the DHT22 (AM2302) humidity and temperature sensor.
pub mod dht22;
pub mod error;
/// Pin abstractions for bidirectional single-wire lines.
pub mod io;

pub use calibration::CalibrationParams;
pub use error::{Error, FailureKind, HandshakePhase, INVALID_READING};
