use crate::calibration::CalibrationParams;
use crate::error::{Error, HandshakePhase};
use crate::io::IoPin;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::PinState;

/// The minimum interval the DHT22 needs between two reads.
///
/// The driver does not enforce this. Reading more often tends to return stale data or fail the
/// handshake.
pub const MIN_READ_INTERVAL: Duration = Duration::from_millis(2000);

// The host start signal must hold the line low for at least 1ms.
const START_LOW_US: u32 = 1_200;
const START_RELEASE_US: u32 = 30;
const INPUT_SETTLE_US: u32 = 10;
// Each of the three response edges must arrive within this window.
const RESPONSE_TIMEOUT_US: u32 = 100;
// Every bit starts with a ~50us low pulse.
const BIT_START_TIMEOUT_US: u32 = 70;
const BIT_HIGH_TIMEOUT_US: u32 = 90;
// A 0 is sent as a 26-28us high pulse, a 1 as a ~70us high pulse. Compared against the measured
// width, which misses the first high sample, so a pulse must last 42us to read as 1.
const BIT_THRESHOLD_US: u32 = 40;

const NUM_BITS: u8 = 40;

const MIN_TEMPERATURE_X10: i16 = -400;
const MAX_TEMPERATURE_X10: i16 = 800;
const MAX_HUMIDITY_X10: u16 = 1000;

/// Per-channel corrections applied to a successful read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    pub temperature: CalibrationParams,
    pub humidity: CalibrationParams,
}

/// A validated reading.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Percent relative humidity.
    pub humidity: f32,
}

impl Reading {
    pub fn calibrated(&self, calibration: &Calibration) -> Reading {
        Reading {
            temperature: calibration.temperature.apply(self.temperature),
            humidity: calibration.humidity.apply(self.humidity),
        }
    }
}

impl From<Reading> for (f32, f32) {
    fn from(reading: Reading) -> (f32, f32) {
        (reading.temperature, reading.humidity)
    }
}

/// The five bytes sent by the sensor: humidity (2), temperature (2) and checksum (1), each
/// most-significant byte first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawFrame([u8; 5]);

impl RawFrame {
    pub const fn new(bytes: [u8; 5]) -> RawFrame {
        RawFrame(bytes)
    }

    pub fn bytes(&self) -> &[u8; 5] {
        &self.0
    }

    /// The checksum the sensor should have sent: the low byte of the sum of the data bytes.
    pub fn checksum(&self) -> u8 {
        self.0[..4].iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
    }

    pub fn received_checksum(&self) -> u8 {
        self.0[4]
    }

    /// Relative humidity in tenths of a percent.
    pub fn humidity_x10(&self) -> u16 {
        u16::from_be_bytes([self.0[0], self.0[1]])
    }

    /// Temperature in tenths of a degree Celsius.
    ///
    /// The sensor sends sign and magnitude, not two's complement: bit 15 is the sign.
    pub fn temperature_x10(&self) -> i16 {
        let raw = u16::from_be_bytes([self.0[2], self.0[3]]);
        let magnitude = (raw & 0x7FFF) as i16;
        if raw & 0x8000 != 0 {
            return -magnitude;
        }
        magnitude
    }

    pub fn verify<TIoError>(&self) -> Result<(), Error<TIoError>> {
        let expected = self.checksum();
        let received = self.received_checksum();
        if expected != received {
            return Err(Error::ChecksumMismatch { expected, received });
        }
        Ok(())
    }

    /// Verifies the checksum and the physical range, then converts to physical units.
    ///
    /// The range check catches misdecoded pulse timings that happen to pass the checksum.
    pub fn decode<TIoError>(&self) -> Result<Reading, Error<TIoError>> {
        self.verify()?;

        let humidity_x10 = self.humidity_x10();
        let temperature_x10 = self.temperature_x10();
        if humidity_x10 > MAX_HUMIDITY_X10
            || !(MIN_TEMPERATURE_X10..=MAX_TEMPERATURE_X10).contains(&temperature_x10)
        {
            return Err(Error::RangeViolation);
        }

        Ok(Reading {
            temperature: f32::from(temperature_x10) / 10.0,
            humidity: f32::from(humidity_x10) / 10.0,
        })
    }
}

/// A DHT22 on a single bidirectional line.
///
/// The `delay` is both the source of the handshake delays and the clock for pulse measurement:
/// the line is sampled once per microsecond of delay, and the number of samples is taken as the
/// pulse width.
#[derive(Debug)]
pub struct Dht22<TPin, TDelay> {
    pin: TPin,
    delay: TDelay,
}

impl<TPin, TDelay, TError> Dht22<TPin, TDelay>
where
    TPin: IoPin<Error = TError>,
    TDelay: DelayNs,
{
    /// Takes ownership of the line and drives it high, which is the idle state the sensor
    /// expects between reads.
    ///
    /// The sensor needs about a second after power-up before it answers the first read.
    pub fn init(mut pin: TPin, delay: TDelay) -> Result<Dht22<TPin, TDelay>, Error<TError>> {
        pin.set_as_output(PinState::High)?;
        debug!("DHT22 initialized");
        Ok(Dht22 { pin, delay })
    }

    /// Performs one read and applies `calibration` to the result.
    ///
    /// The handshake and the 40-bit stream are timed by busy-waiting inside a critical section,
    /// which blocks for roughly 5ms. Nothing is retried: a failed read should be repeated by the
    /// caller no sooner than [`MIN_READ_INTERVAL`] later.
    pub fn read(&mut self, calibration: &Calibration) -> Result<Reading, Error<TError>> {
        let received = critical_section::with(|_| self.receive_frame());
        let result = received.and_then(|(frame, timed_out)| {
            if timed_out > 0 {
                warn!("DHT22 {} of {} bit pulses timed out, read as 0", timed_out, NUM_BITS);
            }
            trace!(
                "DHT22 raw humidity={} temperature={} checksum={}",
                frame.humidity_x10(),
                frame.temperature_x10(),
                frame.received_checksum()
            );
            frame.decode()
        });
        match result {
            Ok(reading) => Ok(reading.calibrated(calibration)),
            Err(err) => {
                warn!("DHT22 read failed: {}", err.kind());
                Err(err)
            }
        }
    }

    /// Gives back the line and the delay.
    pub fn release(self) -> (TPin, TDelay) {
        (self.pin, self.delay)
    }

    /// Runs the handshake and reads the frame, leaving the line driven high whatever happens.
    ///
    /// Also returns how many high pulses outlasted the measurement window.
    fn receive_frame(&mut self) -> Result<(RawFrame, u8), Error<TError>> {
        let received = self.request_data();
        let idle = self.pin.set_as_output(PinState::High);
        let frame = received?;
        idle?;
        Ok(frame)
    }

    fn request_data(&mut self) -> Result<(RawFrame, u8), Error<TError>> {
        self.pin.set_as_output(PinState::Low)?;
        self.delay.delay_us(START_LOW_US);
        self.pin.set_high()?;
        self.delay.delay_us(START_RELEASE_US);
        self.pin.set_as_input()?;
        self.delay.delay_us(INPUT_SETTLE_US);

        self.await_response(false, HandshakePhase::AckLow)?;
        self.await_response(true, HandshakePhase::AckHigh)?;
        self.await_response(false, HandshakePhase::DataStart)?;

        let mut bytes = [0u8; 5];
        let mut timed_out = 0u8;
        for bit in 0..NUM_BITS {
            if self.wait_for_level(true, BIT_START_TIMEOUT_US)?.is_none() {
                return Err(Error::BitTimeout(bit));
            }
            let high_us = self.wait_for_level(false, BIT_HIGH_TIMEOUT_US)?;
            if high_us.is_none() {
                timed_out += 1;
            }

            let byte = &mut bytes[usize::from(bit / 8)];
            *byte <<= 1;
            if is_one(high_us) {
                *byte |= 1;
            }
        }
        Ok((RawFrame(bytes), timed_out))
    }

    fn await_response(&mut self, high: bool, phase: HandshakePhase) -> Result<(), Error<TError>> {
        match self.wait_for_level(high, RESPONSE_TIMEOUT_US)? {
            Some(_) => Ok(()),
            None => Err(Error::HandshakeTimeout(phase)),
        }
    }

    /// Polls the line every microsecond until it reaches the requested level.
    ///
    /// Returns the number of microseconds waited, or `None` if `timeout_us` passed first.
    #[inline]
    fn wait_for_level(&mut self, high: bool, timeout_us: u32) -> Result<Option<u32>, TError> {
        let mut elapsed_us = 0u32;
        while self.pin.is_high()? != high {
            if elapsed_us >= timeout_us {
                return Ok(None);
            }
            elapsed_us += 1;
            self.delay.delay_us(1);
        }
        Ok(Some(elapsed_us))
    }
}

/// Decides a bit from the width of its high pulse.
///
/// A pulse that outlasted the measurement window is read as 0 rather than failing the whole
/// read. A single stuck pulse usually breaks the checksum, but a line stuck high after the data
/// start yields an all-zero frame, whose checksum is also 0, and decodes as 0 °C and 0 %RH. The
/// caller only learns of that through the warning `Dht22::read` logs.
fn is_one(high_us: Option<u32>) -> bool {
    matches!(high_us, Some(width) if width > BIT_THRESHOLD_US)
}
