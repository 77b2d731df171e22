//! Failures shared by both sensor drivers.
//!
//! Every failure is terminal for the acquisition that produced it; nothing in this crate retries.

use core::fmt;

/// The value legacy publishers report on both channels of a failed acquisition.
///
/// The drivers never produce it themselves. Use [`invalid_pair`] at the edge of a system that
/// still expects sentinels.
pub const INVALID_READING: f32 = -999.0;

/// Which step of the single-wire handshake the sensor failed to answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakePhase {
    /// The sensor never pulled the line low after the host released it.
    AckLow,
    /// The sensor never released the line after its low acknowledgement.
    AckHigh,
    /// The sensor never pulled the line low to start the data stream.
    DataStart,
}

#[derive(Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<TIoError> {
    /// Wrapped error from the HAL.
    Wrapped(TIoError),
    /// The device did not become ready on the bus within the polling bound.
    BusTimeout,
    /// The single-wire sensor did not answer the host's start signal.
    HandshakeTimeout(HandshakePhase),
    /// The given bit (0-39) of the single-wire stream never started.
    BitTimeout(u8),
    /// The received checksum byte does not match the sum of the data bytes.
    ChecksumMismatch { expected: u8, received: u8 },
    /// The decoded value lies outside the sensor's physical range.
    RangeViolation,
    /// The device could not be identified. Holds the ID that was read, if any.
    DeviceNotFound(Option<u8>),
}

impl<TIoError> From<TIoError> for Error<TIoError> {
    fn from(error: TIoError) -> Error<TIoError> {
        Error::Wrapped(error)
    }
}

impl<TIoError> Error<TIoError> {
    /// Flattens this error into its category.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Wrapped(_) => FailureKind::BusError,
            Error::BusTimeout => FailureKind::BusTimeout,
            Error::HandshakeTimeout(_) => FailureKind::HandshakeTimeout,
            Error::BitTimeout(_) => FailureKind::BitTimeout,
            Error::ChecksumMismatch { .. } => FailureKind::ChecksumMismatch,
            Error::RangeViolation => FailureKind::RangeViolation,
            Error::DeviceNotFound(_) => FailureKind::DeviceNotFound,
        }
    }
}

/// The category of a failed acquisition, without any HAL-specific payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailureKind {
    BusTimeout,
    HandshakeTimeout,
    BitTimeout,
    ChecksumMismatch,
    RangeViolation,
    DeviceNotFound,
    BusError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::BusTimeout => "bus timeout",
            FailureKind::HandshakeTimeout => "handshake timeout",
            FailureKind::BitTimeout => "bit timeout",
            FailureKind::ChecksumMismatch => "checksum mismatch",
            FailureKind::RangeViolation => "range violation",
            FailureKind::DeviceNotFound => "device not found",
            FailureKind::BusError => "bus error",
        };
        f.write_str(name)
    }
}

/// Converts a reading result into the `(a, b)` pair a sentinel-based publisher expects.
///
/// Failures become [`INVALID_READING`] on both channels.
pub fn invalid_pair<TReading, TIoError>(result: Result<TReading, Error<TIoError>>) -> (f32, f32)
where
    TReading: Into<(f32, f32)>,
{
    match result {
        Ok(reading) => reading.into(),
        Err(_) => (INVALID_READING, INVALID_READING),
    }
}
