//! Bosch BMP280/BME280 driver over `embedded-hal` I2C.
//!
//! Each read triggers one forced-mode conversion at the requested
//! oversampling, waits for the chip to finish, and applies the datasheet's
//! floating-point compensation to the raw ADC values.
//!
//! On Linux, [`open_linux`] binds a driver to `/dev/i2c-<bus>`.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use tracing::{debug, trace};

use envsense_types::{Accuracy, ChipModel, SensorId, altitude_from_pressure};

use crate::error::{BusError, Error, Result};
use crate::traits::DeviceDriver;

/// Default address when SDO is tied to ground.
pub const ADDRESS_PRIMARY: u8 = 0x76;
/// Address when SDO is tied to VDDIO (most breakout boards).
pub const ADDRESS_SECONDARY: u8 = 0x77;

mod reg {
    pub const CALIB_TP: u8 = 0x88;
    pub const CALIB_H1: u8 = 0xA1;
    pub const CHIP_ID: u8 = 0xD0;
    pub const RESET: u8 = 0xE0;
    pub const CALIB_H2: u8 = 0xE1;
    pub const CTRL_HUM: u8 = 0xF2;
    pub const STATUS: u8 = 0xF3;
    pub const CTRL_MEAS: u8 = 0xF4;
    pub const DATA: u8 = 0xF7;
}

const SOFT_RESET: u8 = 0xB6;
const FORCED_MODE: u8 = 0b01;
const STATUS_MEASURING: u8 = 0b1000;
const STATUS_IM_UPDATE: u8 = 0b0001;
/// ADC output when a conversion was skipped.
const ADC_SKIPPED: i32 = 0x80000;
const MAX_STATUS_POLLS: u32 = 10;
const STATUS_POLL_INTERVAL_US: u32 = 1_000;

/// Factory calibration constants read from the chip's NVM.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Calibration {
    t1: u16,
    t2: i16,
    t3: i16,
    p1: u16,
    p2: i16,
    p3: i16,
    p4: i16,
    p5: i16,
    p6: i16,
    p7: i16,
    p8: i16,
    p9: i16,
    h1: u8,
    h2: i16,
    h3: u8,
    h4: i16,
    h5: i16,
    h6: i8,
}

impl Calibration {
    /// Parse the temperature/pressure block (0x88..0x9F) and, for the
    /// BME280, the humidity bytes (0xA1 and 0xE1..0xE7).
    pub fn parse(
        tp: &[u8; 24],
        humidity: Option<(u8, [u8; 7])>,
    ) -> std::result::Result<Self, BusError> {
        let u16_at = |i: usize| u16::from_le_bytes([tp[i], tp[i + 1]]);
        let i16_at = |i: usize| i16::from_le_bytes([tp[i], tp[i + 1]]);

        let mut cal = Calibration {
            t1: u16_at(0),
            t2: i16_at(2),
            t3: i16_at(4),
            p1: u16_at(6),
            p2: i16_at(8),
            p3: i16_at(10),
            p4: i16_at(12),
            p5: i16_at(14),
            p6: i16_at(16),
            p7: i16_at(18),
            p8: i16_at(20),
            p9: i16_at(22),
            ..Default::default()
        };

        if cal.t1 == 0 || cal.p1 == 0 {
            return Err(BusError::InvalidData(
                "calibration data is blank".to_string(),
            ));
        }

        if let Some((h1, e)) = humidity {
            cal.h1 = h1;
            cal.h2 = i16::from_le_bytes([e[0], e[1]]);
            cal.h3 = e[2];
            // H4 and H5 are 12-bit signed values sharing the nibbles of 0xE5.
            cal.h4 = (i16::from(e[3] as i8) << 4) | i16::from(e[4] & 0x0F);
            cal.h5 = (i16::from(e[5] as i8) << 4) | i16::from(e[4] >> 4);
            cal.h6 = e[6] as i8;
        }

        Ok(cal)
    }

    /// Fine temperature used by pressure and humidity compensation.
    fn t_fine(&self, adc_t: i32) -> f64 {
        let adc_t = f64::from(adc_t);
        let t1 = f64::from(self.t1);
        let var1 = (adc_t / 16_384.0 - t1 / 1_024.0) * f64::from(self.t2);
        let d = adc_t / 131_072.0 - t1 / 8_192.0;
        let var2 = d * d * f64::from(self.t3);
        var1 + var2
    }

    fn temperature(t_fine: f64) -> f64 {
        t_fine / 5_120.0
    }

    fn pressure(&self, adc_p: i32, t_fine: f64) -> Option<f64> {
        let mut var1 = t_fine / 2.0 - 64_000.0;
        let mut var2 = var1 * var1 * f64::from(self.p6) / 32_768.0;
        var2 += var1 * f64::from(self.p5) * 2.0;
        var2 = var2 / 4.0 + f64::from(self.p4) * 65_536.0;
        var1 = (f64::from(self.p3) * var1 * var1 / 524_288.0 + f64::from(self.p2) * var1)
            / 524_288.0;
        var1 = (1.0 + var1 / 32_768.0) * f64::from(self.p1);
        if var1 == 0.0 {
            return None;
        }
        let mut p = 1_048_576.0 - f64::from(adc_p);
        p = (p - var2 / 4_096.0) * 6_250.0 / var1;
        let var1 = f64::from(self.p9) * p * p / 2_147_483_648.0;
        let var2 = p * f64::from(self.p8) / 32_768.0;
        Some(p + (var1 + var2 + f64::from(self.p7)) / 16.0)
    }

    fn humidity(&self, adc_h: i32, t_fine: f64) -> f64 {
        let mut h = t_fine - 76_800.0;
        h = (f64::from(adc_h) - (f64::from(self.h4) * 64.0 + f64::from(self.h5) / 16_384.0 * h))
            * (f64::from(self.h2) / 65_536.0
                * (1.0
                    + f64::from(self.h6) / 67_108_864.0
                        * h
                        * (1.0 + f64::from(self.h3) / 67_108_864.0 * h)));
        h *= 1.0 - f64::from(self.h1) * h / 524_288.0;
        h.clamp(0.0, 100.0)
    }
}

/// Raw ADC output of one forced conversion.
#[derive(Debug, Clone, Copy)]
struct RawSample {
    adc_p: i32,
    adc_t: i32,
    adc_h: Option<i32>,
}

impl RawSample {
    fn parse(data: &[u8]) -> Self {
        let adc20 =
            |b: &[u8]| (i32::from(b[0]) << 12) | (i32::from(b[1]) << 4) | (i32::from(b[2]) >> 4);
        Self {
            adc_p: adc20(&data[0..3]),
            adc_t: adc20(&data[3..6]),
            adc_h: (data.len() >= 8).then(|| (i32::from(data[6]) << 8) | i32::from(data[7])),
        }
    }
}

/// Worst-case conversion time in microseconds (datasheet section 9.1).
fn max_measurement_time_us(accuracy: Accuracy, humidity: bool) -> u32 {
    let n = accuracy.samples();
    let mut us = 1_250 + 2_300 * n + (2_300 * n + 575);
    if humidity {
        us += 2_300 * n + 575;
    }
    us
}

fn bus_error<E: embedded_hal::i2c::Error>(err: E) -> BusError {
    BusError::Transaction(format!("{:?}", err.kind()))
}

/// A BMP280 or BME280 bound to one I2C address.
pub struct Bme280<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    model: ChipModel,
    calibration: Calibration,
}

impl<I2C, D> std::fmt::Debug for Bme280<I2C, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bme280")
            .field("address", &format_args!("0x{:02X}", self.address))
            .field("model", &self.model)
            .finish()
    }
}

impl<I2C: I2c, D: DelayNs> Bme280<I2C, D> {
    /// Probe the chip, reset it and load its calibration.
    ///
    /// Fails with [`Error::UnsupportedChip`] if the chip id register does not
    /// match `model`.
    pub fn new(i2c: I2C, delay: D, address: u8, model: ChipModel) -> Result<Self> {
        let mut dev = Self {
            i2c,
            delay,
            address,
            model,
            calibration: Calibration::default(),
        };

        let init = |source: BusError| Error::Init { address, source };

        let found = dev.read_register(reg::CHIP_ID).map_err(init)?;
        if found != model.chip_id() {
            return Err(Error::UnsupportedChip {
                expected: model,
                found,
            });
        }

        dev.write_register(reg::RESET, SOFT_RESET).map_err(init)?;
        dev.delay.delay_ms(2);
        dev.wait_status_clear(STATUS_IM_UPDATE, "nvm copy").map_err(init)?;

        dev.calibration = dev.read_calibration().map_err(init)?;
        debug!(
            "Initialized {} at address 0x{:02X}",
            dev.model, dev.address
        );
        Ok(dev)
    }

    /// The chip model this driver was bound with.
    pub fn model(&self) -> ChipModel {
        self.model
    }

    /// The I2C address of the chip.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Release the bus and delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn read_register(&mut self, register: u8) -> std::result::Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(bus_error)?;
        Ok(buf[0])
    }

    fn read_block(&mut self, register: u8, buf: &mut [u8]) -> std::result::Result<(), BusError> {
        self.i2c
            .write_read(self.address, &[register], buf)
            .map_err(bus_error)
    }

    fn write_register(&mut self, register: u8, value: u8) -> std::result::Result<(), BusError> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(bus_error)
    }

    fn wait_status_clear(
        &mut self,
        mask: u8,
        operation: &str,
    ) -> std::result::Result<(), BusError> {
        for _ in 0..MAX_STATUS_POLLS {
            if self.read_register(reg::STATUS)? & mask == 0 {
                return Ok(());
            }
            self.delay.delay_us(STATUS_POLL_INTERVAL_US);
        }
        Err(BusError::timeout(
            operation,
            Duration::from_micros(u64::from(MAX_STATUS_POLLS * STATUS_POLL_INTERVAL_US)),
        ))
    }

    fn read_calibration(&mut self) -> std::result::Result<Calibration, BusError> {
        let mut tp = [0u8; 24];
        self.read_block(reg::CALIB_TP, &mut tp)?;

        let humidity = if self.model.supports_humidity() {
            let h1 = self.read_register(reg::CALIB_H1)?;
            let mut e = [0u8; 7];
            self.read_block(reg::CALIB_H2, &mut e)?;
            Some((h1, e))
        } else {
            None
        };

        Calibration::parse(&tp, humidity)
    }

    /// Run one forced conversion and read back the raw ADC values.
    fn measure(&mut self, accuracy: Accuracy) -> std::result::Result<RawSample, BusError> {
        let osrs = accuracy.oversampling_code();
        let humidity = self.model.supports_humidity();

        if humidity {
            // ctrl_hum only takes effect after the next ctrl_meas write.
            self.write_register(reg::CTRL_HUM, osrs)?;
        }
        self.write_register(reg::CTRL_MEAS, (osrs << 5) | (osrs << 2) | FORCED_MODE)?;

        self.delay
            .delay_us(max_measurement_time_us(accuracy, humidity));
        self.wait_status_clear(STATUS_MEASURING, "forced measurement")?;

        let mut data = [0u8; 8];
        let len = if humidity { 8 } else { 6 };
        self.read_block(reg::DATA, &mut data[..len])?;
        let sample = RawSample::parse(&data[..len]);
        trace!(?sample, "raw sample");

        if sample.adc_t == ADC_SKIPPED {
            return Err(BusError::InvalidData(
                "temperature conversion was skipped".to_string(),
            ));
        }
        Ok(sample)
    }

    fn compensated_pressure(&mut self, accuracy: Accuracy) -> std::result::Result<f32, BusError> {
        let sample = self.measure(accuracy)?;
        if sample.adc_p == ADC_SKIPPED {
            return Err(BusError::InvalidData(
                "pressure conversion was skipped".to_string(),
            ));
        }
        let t_fine = self.calibration.t_fine(sample.adc_t);
        self.calibration
            .pressure(sample.adc_p, t_fine)
            .map(|p| p as f32)
            .ok_or_else(|| {
                BusError::InvalidData("pressure compensation divided by zero".to_string())
            })
    }
}

impl<I2C, D> DeviceDriver for Bme280<I2C, D>
where
    I2C: I2c + Send,
    D: DelayNs + Send,
{
    fn read_id(&mut self) -> std::result::Result<SensorId, BusError> {
        self.read_register(reg::CHIP_ID).map(SensorId)
    }

    fn read_temperature(&mut self, accuracy: Accuracy) -> std::result::Result<f32, BusError> {
        let sample = self.measure(accuracy)?;
        let t_fine = self.calibration.t_fine(sample.adc_t);
        Ok(Calibration::temperature(t_fine) as f32)
    }

    fn read_pressure(&mut self, accuracy: Accuracy) -> std::result::Result<f32, BusError> {
        self.compensated_pressure(accuracy)
    }

    fn read_humidity(&mut self, accuracy: Accuracy) -> std::result::Result<Option<f32>, BusError> {
        if !self.model.supports_humidity() {
            return Ok(None);
        }
        let sample = self.measure(accuracy)?;
        let adc_h = match sample.adc_h {
            Some(h) if h != 0x8000 => h,
            _ => {
                return Err(BusError::InvalidData(
                    "humidity conversion was skipped".to_string(),
                ));
            }
        };
        let t_fine = self.calibration.t_fine(sample.adc_t);
        Ok(Some(self.calibration.humidity(adc_h, t_fine) as f32))
    }

    fn read_altitude(&mut self, accuracy: Accuracy) -> std::result::Result<f32, BusError> {
        self.compensated_pressure(accuracy)
            .map(altitude_from_pressure)
    }
}

/// Driver bound to a Linux I2C character device.
#[cfg(target_os = "linux")]
pub type LinuxBme280 = Bme280<linux_embedded_hal::I2cdev, linux_embedded_hal::Delay>;

/// Open `/dev/i2c-<bus>` and bind a driver to the chip at `address`.
#[cfg(target_os = "linux")]
pub fn open_linux(bus: u8, address: u8, model: ChipModel) -> Result<LinuxBme280> {
    let path = std::path::PathBuf::from(format!("/dev/i2c-{bus}"));
    let i2c = linux_embedded_hal::I2cdev::new(&path).map_err(|e| Error::Open {
        path: path.clone(),
        source: BusError::Io(std::io::Error::other(e.to_string())),
    })?;
    Bme280::new(i2c, linux_embedded_hal::Delay, address, model)
}
