//! Cached readings for one sensor and the refresh cycle that updates them.

use time::OffsetDateTime;
use tracing::debug;

use envsense_types::{Accuracy, Measurement, Quantity, SensorId, SensorSnapshot};

use crate::error::{BusError, Error, Result};
use crate::traits::DeviceDriver;

/// The most recently refreshed readings of one sensor, plus the driver they
/// were read from.
///
/// The record exclusively owns its driver; all bus traffic for the device
/// goes through [`SensorRecord::refresh`].
#[derive(Debug)]
pub struct SensorRecord<D> {
    id: Option<SensorId>,
    temperature: Measurement,
    pressure: Measurement,
    humidity: Measurement,
    altitude: Measurement,
    refreshed_at: Option<OffsetDateTime>,
    accuracy: Accuracy,
    device: D,
}

impl<D: DeviceDriver> SensorRecord<D> {
    /// Bind a record to `device`. Nothing is read until the first refresh.
    pub fn new(device: D, accuracy: Accuracy) -> Self {
        Self {
            id: None,
            temperature: Measurement::Pending,
            pressure: Measurement::Pending,
            humidity: Measurement::Pending,
            altitude: Measurement::Pending,
            refreshed_at: None,
            accuracy,
            device,
        }
    }

    /// Run one full read cycle and replace the cached values.
    ///
    /// Reads id, temperature, pressure, humidity and altitude in that order.
    /// The first failing read aborts the cycle and the cached values are left
    /// exactly as they were. A device reporting humidity as unsupported is a
    /// successful read and clears any previous humidity value.
    ///
    /// Once an id is assigned it cannot change: a device answering with a
    /// different id fails the refresh.
    pub fn refresh(&mut self) -> Result<SensorSnapshot> {
        let accuracy = self.accuracy;

        let id = self
            .device
            .read_id()
            .map_err(|e| Error::refresh(Quantity::Id, e))?;
        if let Some(current) = self.id
            && current != id
        {
            return Err(Error::refresh(
                Quantity::Id,
                BusError::InvalidData(format!("device reported id {id}, expected {current}")),
            ));
        }
        debug!("sensor id={}", id);

        let temperature = self
            .device
            .read_temperature(accuracy)
            .map_err(|e| Error::refresh(Quantity::Temperature, e))?;
        debug!("sensor {} temperature={:.2}", id, temperature);

        let pressure = self
            .device
            .read_pressure(accuracy)
            .map_err(|e| Error::refresh(Quantity::Pressure, e))?;
        debug!("sensor {} pressure={:.2}", id, pressure);

        let humidity = self
            .device
            .read_humidity(accuracy)
            .map_err(|e| Error::refresh(Quantity::Humidity, e))?;
        match humidity {
            Some(h) => debug!("sensor {} humidity={:.2}", id, h),
            None => debug!("sensor {} humidity unsupported", id),
        }

        let altitude = self
            .device
            .read_altitude(accuracy)
            .map_err(|e| Error::refresh(Quantity::Altitude, e))?;
        debug!("sensor {} altitude={:.2}", id, altitude);

        self.id = Some(id);
        self.temperature = Measurement::Value(temperature);
        self.pressure = Measurement::Value(pressure);
        self.humidity = Measurement::from(humidity);
        self.altitude = Measurement::Value(altitude);
        self.refreshed_at = Some(OffsetDateTime::now_utc());

        Ok(self.snapshot_unchecked(id))
    }

    /// Copy of the cached values, or `None` before the first successful refresh.
    pub fn snapshot(&self) -> Option<SensorSnapshot> {
        self.id.map(|id| self.snapshot_unchecked(id))
    }

    fn snapshot_unchecked(&self, id: SensorId) -> SensorSnapshot {
        SensorSnapshot {
            id,
            temperature: self.temperature,
            pressure: self.pressure,
            humidity: self.humidity,
            altitude: self.altitude,
            refreshed_at: self.refreshed_at,
        }
    }

    pub fn id(&self) -> Option<SensorId> {
        self.id
    }

    pub fn temperature(&self) -> Measurement {
        self.temperature
    }

    pub fn pressure(&self) -> Measurement {
        self.pressure
    }

    pub fn humidity(&self) -> Measurement {
        self.humidity
    }

    pub fn altitude(&self) -> Measurement {
        self.altitude
    }

    pub fn refreshed_at(&self) -> Option<OffsetDateTime> {
        self.refreshed_at
    }

    pub fn accuracy(&self) -> Accuracy {
        self.accuracy
    }

    /// Release the driver.
    pub fn into_device(self) -> D {
        self.device
    }
}
