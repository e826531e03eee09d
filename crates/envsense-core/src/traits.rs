//! Trait abstractions for sensor device drivers.
//!
//! This module provides the [`DeviceDriver`] trait that abstracts over the
//! real BMP280/BME280 driver and mock drivers for testing.

use envsense_types::{Accuracy, SensorId};

use crate::error::BusError;

/// Blocking reads against one physical sensor device.
///
/// Every call returns the instantaneous value from the hardware and issues its
/// own bus traffic. Implementations are not expected to tolerate overlapping
/// calls, which is why every read takes `&mut self`; sharing a driver across
/// threads goes through [`crate::SensorStore`].
///
/// # Example
///
/// ```ignore
/// use envsense_core::{DeviceDriver, Accuracy};
///
/// fn print_temperature<D: DeviceDriver>(device: &mut D) -> Result<(), BusError> {
///     let t = device.read_temperature(Accuracy::High)?;
///     println!("{t:.2} °C");
///     Ok(())
/// }
/// ```
pub trait DeviceDriver: Send {
    /// Read the device identifier.
    fn read_id(&mut self) -> Result<SensorId, BusError>;

    /// Read the temperature in degrees Celsius.
    fn read_temperature(&mut self, accuracy: Accuracy) -> Result<f32, BusError>;

    /// Read the pressure in pascals.
    fn read_pressure(&mut self, accuracy: Accuracy) -> Result<f32, BusError>;

    /// Read the relative humidity in percent.
    ///
    /// Returns `Ok(None)` when the device has no humidity sensor.
    fn read_humidity(&mut self, accuracy: Accuracy) -> Result<Option<f32>, BusError>;

    /// Read the altitude in meters, assuming standard sea-level pressure.
    fn read_altitude(&mut self, accuracy: Accuracy) -> Result<f32, BusError>;
}

impl<D: DeviceDriver + ?Sized> DeviceDriver for Box<D> {
    fn read_id(&mut self) -> Result<SensorId, BusError> {
        (**self).read_id()
    }

    fn read_temperature(&mut self, accuracy: Accuracy) -> Result<f32, BusError> {
        (**self).read_temperature(accuracy)
    }

    fn read_pressure(&mut self, accuracy: Accuracy) -> Result<f32, BusError> {
        (**self).read_pressure(accuracy)
    }

    fn read_humidity(&mut self, accuracy: Accuracy) -> Result<Option<f32>, BusError> {
        (**self).read_humidity(accuracy)
    }

    fn read_altitude(&mut self, accuracy: Accuracy) -> Result<f32, BusError> {
        (**self).read_altitude(accuracy)
    }
}

/// A type-erased driver, as bound at bootstrap.
pub type BoxedDriver = Box<dyn DeviceDriver>;
