use crate::calibration::CalibrationParams;
use crate::error::Error;
use core::future::Future;
use core::time::Duration;
use embedded_hal::i2c::I2c;

/// The bus address when SDO is tied to ground.
pub const DEFAULT_ADDRESS: u8 = 0x76;
/// The bus address when SDO is tied to V<sub>DDIO</sub>.
pub const SECONDARY_ADDRESS: u8 = 0x77;
/// The bus clock the I2C peripheral should be configured with.
pub const BUS_FREQUENCY_HZ: u32 = 100_000;
/// How long a single bus transfer may take before the HAL should give up on it.
pub const BUS_TIMEOUT: Duration = Duration::from_millis(1000);
/// The value of the ID register on a genuine BMP280.
pub const CHIP_ID: u8 = 0x58;

const REG_CALIBRATION: u8 = 0x88;
const REG_ID: u8 = 0xD0;
const REG_RESET: u8 = 0xE0;
const REG_STATUS: u8 = 0xF3;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
// Pressure then temperature, 3 bytes each.
const REG_PRESS_MSB: u8 = 0xF7;

const SOFT_RESET: u8 = 0xB6;
const STATUS_MEASURING: u8 = 0b1000;
const STATUS_IM_UPDATE: u8 = 0b0001;
const MODE_MASK: u8 = 0b11;
// Standby time is unused in forced mode, filter off, 3-wire SPI off.
const CONFIG_FILTER_OFF: u8 = 0x00;

const CALIBRATION_LEN: usize = 24;
const STARTUP_TIME: Duration = Duration::from_millis(2);
const POLL_INTERVAL: Duration = Duration::from_millis(1);
const POLL_ATTEMPTS: u8 = 10;

const MIN_CENTI_CELSIUS: i32 = -4000;
const MAX_CENTI_CELSIUS: i32 = 8500;
const MIN_PRESSURE_PA: u32 = 30_000;
const MAX_PRESSURE_PA: u32 = 110_000;

/// Oversampling settings and the matching conversion time for forced-mode measurements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Profile {
    /// Ultra low power: temperature x1, pressure x1.
    WeatherMonitoring,
    /// Temperature x2, pressure x16.
    #[default]
    HighResolution,
}

impl Profile {
    /// The `ctrl_meas` value that starts a forced conversion with this profile.
    ///
    /// Layout: `osrs_t[7:5] osrs_p[4:2] mode[1:0]`, with mode `01` (forced).
    pub fn ctrl_meas(self) -> u8 {
        match self {
            // osrs_t 001, osrs_p 001
            Profile::WeatherMonitoring => 0x25,
            // osrs_t 010, osrs_p 101
            Profile::HighResolution => 0x55,
        }
    }

    /// The `ctrl_meas` value that keeps this profile's oversampling but puts the device to sleep.
    pub fn sleep_ctrl_meas(self) -> u8 {
        self.ctrl_meas() & !MODE_MASK
    }

    /// How long to wait after triggering a conversion before polling for completion.
    pub fn conversion_time(self) -> Duration {
        match self {
            Profile::WeatherMonitoring => Duration::from_millis(10),
            Profile::HighResolution => Duration::from_millis(50),
        }
    }
}

/// Factory trimming constants, read once from the device's non-volatile memory.
///
/// Built by [`CalibrationCoefficients::from_bytes`] or from explicit values. There is no
/// all-zero default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationCoefficients {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
}

/// Output of the temperature compensation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Temperature {
    /// The "fine temperature", an intermediate value required by the pressure compensation.
    pub fine: i32,
    /// Hundredths of a degree Celsius.
    pub centi_celsius: i32,
}

impl CalibrationCoefficients {
    /// Decodes the 24-byte block starting at register `0x88`. All words are little-endian.
    pub fn from_bytes(bytes: &[u8; CALIBRATION_LEN]) -> CalibrationCoefficients {
        let unsigned = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let signed = |i: usize| i16::from_le_bytes([bytes[i], bytes[i + 1]]);
        CalibrationCoefficients {
            t1: unsigned(0),
            t2: signed(2),
            t3: signed(4),
            p1: unsigned(6),
            p2: signed(8),
            p3: signed(10),
            p4: signed(12),
            p5: signed(14),
            p6: signed(16),
            p7: signed(18),
            p8: signed(20),
            p9: signed(22),
        }
    }

    /// Compensates a raw 20-bit temperature using the datasheet's 32-bit integer formula.
    ///
    /// Arithmetic wraps like the reference C implementation, so garbage input yields a garbage
    /// value instead of a panic; the range check on the final reading rejects it.
    pub fn compensate_temperature(&self, adc_t: i32) -> Temperature {
        let t1 = i32::from(self.t1);
        let var1 = ((adc_t >> 3) - (t1 << 1)).wrapping_mul(i32::from(self.t2)) >> 11;
        let delta = (adc_t >> 4) - t1;
        let var2 = (delta.wrapping_mul(delta) >> 12).wrapping_mul(i32::from(self.t3)) >> 14;
        let fine = var1.wrapping_add(var2);
        Temperature {
            fine,
            centi_celsius: fine.wrapping_mul(5).wrapping_add(128) >> 8,
        }
    }

    /// Compensates a raw 20-bit pressure using the datasheet's 64-bit integer formula.
    ///
    /// Returns pressure in Pa as unsigned Q24.8, i.e. in units of 1/256 Pa. Returns 0 when the
    /// coefficients make the divisor zero.
    pub fn compensate_pressure(&self, adc_p: i32, fine: i32) -> u32 {
        let mut var1 = i64::from(fine) - 128_000;
        let mut var2 = var1.wrapping_mul(var1).wrapping_mul(i64::from(self.p6));
        var2 = var2.wrapping_add(var1.wrapping_mul(i64::from(self.p5)) << 17);
        var2 = var2.wrapping_add(i64::from(self.p4) << 35);
        var1 = (var1.wrapping_mul(var1).wrapping_mul(i64::from(self.p3)) >> 8)
            .wrapping_add(var1.wrapping_mul(i64::from(self.p2)) << 12);
        var1 = ((1i64 << 47).wrapping_add(var1)).wrapping_mul(i64::from(self.p1)) >> 33;
        if var1 == 0 {
            return 0;
        }

        let mut p = 1_048_576 - i64::from(adc_p);
        p = ((p << 31).wrapping_sub(var2))
            .wrapping_mul(3125)
            .wrapping_div(var1);
        var1 = i64::from(self.p9).wrapping_mul(p >> 13).wrapping_mul(p >> 13) >> 25;
        var2 = i64::from(self.p8).wrapping_mul(p) >> 19;
        p = (p.wrapping_add(var1).wrapping_add(var2) >> 8) + (i64::from(self.p7) << 4);
        p as u32
    }
}

/// Per-channel corrections applied to a successful read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    pub temperature: CalibrationParams,
    pub pressure: CalibrationParams,
}

/// A validated reading.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Pascal.
    pub pressure: f32,
}

impl Reading {
    /// Range-checks compensated values and converts them to physical units.
    pub fn from_compensated<TIoError>(
        centi_celsius: i32,
        pressure_q24_8: u32,
    ) -> Result<Reading, Error<TIoError>> {
        let pressure_in_range =
            (MIN_PRESSURE_PA << 8..=MAX_PRESSURE_PA << 8).contains(&pressure_q24_8);
        let temperature_in_range =
            (MIN_CENTI_CELSIUS..=MAX_CENTI_CELSIUS).contains(&centi_celsius);
        if !pressure_in_range || !temperature_in_range {
            return Err(Error::RangeViolation);
        }
        Ok(Reading {
            temperature: centi_celsius as f32 / 100.0,
            pressure: pressure_q24_8 as f32 / 256.0,
        })
    }

    pub fn calibrated(&self, calibration: &Calibration) -> Reading {
        Reading {
            temperature: calibration.temperature.apply(self.temperature),
            pressure: calibration.pressure.apply(self.pressure),
        }
    }
}

impl From<Reading> for (f32, f32) {
    fn from(reading: Reading) -> (f32, f32) {
        (reading.temperature, reading.pressure)
    }
}

/// A BMP280 on an I2C bus, used in forced mode.
///
/// Between reads the device sleeps. Each [`Bmp280::read`] triggers exactly one conversion.
#[derive(Debug)]
pub struct Bmp280<TI2c> {
    i2c: TI2c,
    address: u8,
    profile: Profile,
    coefficients: CalibrationCoefficients,
}

impl<TI2c, TIoError> Bmp280<TI2c>
where
    TI2c: I2c<Error = TIoError>,
{
    /// Identifies and resets the device, reads its calibration and puts it to sleep.
    ///
    /// The bus must already be configured; see [`BUS_FREQUENCY_HZ`] and [`BUS_TIMEOUT`]. This
    /// asynchronously sleeps using the provided `delay_fn`, which needs millisecond precision.
    ///
    /// Returns [`Error::DeviceNotFound`] if nothing answers at `address` or the ID register does
    /// not hold [`CHIP_ID`], and [`Error::BusTimeout`] if the device never finishes loading its
    /// calibration after the reset.
    pub async fn init<DelayFn, EmptyFuture>(
        mut i2c: TI2c,
        address: u8,
        profile: Profile,
        delay_fn: DelayFn,
    ) -> Result<Bmp280<TI2c>, Error<TIoError>>
    where
        DelayFn: Fn(Duration) -> EmptyFuture,
        EmptyFuture: Future<Output = ()>,
    {
        let id = match read_register(&mut i2c, address, REG_ID) {
            Ok(id) => id,
            Err(_) => {
                warn!("BMP280 not responding at {}", address);
                return Err(Error::DeviceNotFound(None));
            }
        };
        if id != CHIP_ID {
            warn!("BMP280 not found, ID register holds {}", id);
            return Err(Error::DeviceNotFound(Some(id)));
        }

        write_register(&mut i2c, address, REG_RESET, SOFT_RESET)?;
        delay_fn(STARTUP_TIME).await;
        if !poll_status(&mut i2c, address, STATUS_IM_UPDATE, &delay_fn).await? {
            warn!("BMP280 calibration copy did not finish");
            return Err(Error::BusTimeout);
        }

        let mut calibration = [0u8; CALIBRATION_LEN];
        i2c.write_read(address, &[REG_CALIBRATION], &mut calibration)?;
        let coefficients = CalibrationCoefficients::from_bytes(&calibration);

        write_register(&mut i2c, address, REG_CTRL_MEAS, profile.sleep_ctrl_meas())?;
        write_register(&mut i2c, address, REG_CONFIG, CONFIG_FILTER_OFF)?;

        debug!("BMP280 initialized at {}", address);
        Ok(Bmp280::with_coefficients(i2c, address, profile, coefficients))
    }

    /// Wraps a device that was already initialized, using known coefficients.
    pub fn with_coefficients(
        i2c: TI2c,
        address: u8,
        profile: Profile,
        coefficients: CalibrationCoefficients,
    ) -> Bmp280<TI2c> {
        Bmp280 {
            i2c,
            address,
            profile,
            coefficients,
        }
    }

    /// Triggers a conversion, waits for it and returns the compensated, calibrated reading.
    ///
    /// This asynchronously sleeps for the profile's conversion time using the provided
    /// `delay_fn`, then polls the status register for up to ten more milliseconds. If the
    /// conversion still looks unfinished the result registers are read anyway.
    ///
    /// Any bus error while triggering or reading fails the whole read; no temperature-only
    /// result is returned.
    pub async fn read<DelayFn, EmptyFuture>(
        &mut self,
        calibration: &Calibration,
        delay_fn: DelayFn,
    ) -> Result<Reading, Error<TIoError>>
    where
        DelayFn: Fn(Duration) -> EmptyFuture,
        EmptyFuture: Future<Output = ()>,
    {
        match self.measure(delay_fn).await {
            Ok(reading) => Ok(reading.calibrated(calibration)),
            Err(err) => {
                warn!("BMP280 read failed: {}", err.kind());
                Err(err)
            }
        }
    }

    pub fn coefficients(&self) -> &CalibrationCoefficients {
        &self.coefficients
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Gives back the bus.
    pub fn release(self) -> TI2c {
        self.i2c
    }

    async fn measure<DelayFn, EmptyFuture>(
        &mut self,
        delay_fn: DelayFn,
    ) -> Result<Reading, Error<TIoError>>
    where
        DelayFn: Fn(Duration) -> EmptyFuture,
        EmptyFuture: Future<Output = ()>,
    {
        write_register(
            &mut self.i2c,
            self.address,
            REG_CTRL_MEAS,
            self.profile.ctrl_meas(),
        )?;
        delay_fn(self.profile.conversion_time()).await;
        if !matches!(
            poll_status(&mut self.i2c, self.address, STATUS_MEASURING, &delay_fn).await,
            Ok(true)
        ) {
            debug!("BMP280 conversion not confirmed, reading anyway");
        }

        let mut data = [0u8; 6];
        self.i2c
            .write_read(self.address, &[REG_PRESS_MSB], &mut data)?;
        let adc_p = unpack_20_bits(data[0], data[1], data[2]);
        let adc_t = unpack_20_bits(data[3], data[4], data[5]);
        trace!("BMP280 raw pressure={} temperature={}", adc_p, adc_t);

        let temperature = self.coefficients.compensate_temperature(adc_t);
        let pressure = self
            .coefficients
            .compensate_pressure(adc_p, temperature.fine);
        Reading::from_compensated(temperature.centi_celsius, pressure)
    }
}

/// Reconstructs a 20-bit conversion result stored as `msb[19:12] lsb[11:4] xlsb[3:0]`.
fn unpack_20_bits(msb: u8, lsb: u8, xlsb: u8) -> i32 {
    (i32::from(msb) << 12) | (i32::from(lsb) << 4) | (i32::from(xlsb) >> 4)
}

fn read_register<TI2c: I2c>(
    i2c: &mut TI2c,
    address: u8,
    register: u8,
) -> Result<u8, TI2c::Error> {
    let mut value = [0u8; 1];
    i2c.write_read(address, &[register], &mut value)?;
    Ok(value[0])
}

fn write_register<TI2c: I2c>(
    i2c: &mut TI2c,
    address: u8,
    register: u8,
    value: u8,
) -> Result<(), TI2c::Error> {
    i2c.write(address, &[register, value])
}

/// Checks whether all bits in `mask` have cleared in the status register.
fn status_cleared<TI2c: I2c>(
    i2c: &mut TI2c,
    address: u8,
    mask: u8,
) -> nb::Result<(), TI2c::Error> {
    let status = read_register(i2c, address, REG_STATUS).map_err(nb::Error::Other)?;
    if status & mask != 0 {
        return Err(nb::Error::WouldBlock);
    }
    Ok(())
}

/// Polls the status register until the bits in `mask` clear.
///
/// Returns `false` if they were still set after `POLL_ATTEMPTS` polls.
async fn poll_status<TI2c, DelayFn, EmptyFuture>(
    i2c: &mut TI2c,
    address: u8,
    mask: u8,
    delay_fn: &DelayFn,
) -> Result<bool, TI2c::Error>
where
    TI2c: I2c,
    DelayFn: Fn(Duration) -> EmptyFuture,
    EmptyFuture: Future<Output = ()>,
{
    for _ in 0..POLL_ATTEMPTS {
        match status_cleared(i2c, address, mask) {
            Ok(()) => return Ok(true),
            Err(nb::Error::WouldBlock) => delay_fn(POLL_INTERVAL).await,
            Err(nb::Error::Other(err)) => return Err(err),
        }
    }
    Ok(false)
}
