//! Mock driver implementation for testing.
//!
//! This module provides a mock device that can be used for unit testing
//! without requiring actual I2C hardware.
//!
//! The [`MockDriver`] implements the [`DeviceDriver`] trait, so it can be
//! bound into a [`crate::SensorStore`] like a real chip. Because the store
//! takes ownership of the driver, tests control it through a [`MockHandle`].
//!
//! # Features
//!
//! - **Failure injection**: fail reads of a given quantity a number of times
//! - **Latency simulation**: block each read to widen race windows
//! - **Call log**: the order in which quantities were read
//! - **Bus monitoring**: detect overlapping reads across mocks on one bus

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use envsense_types::{Accuracy, Quantity, SensorId, altitude_from_pressure};

use crate::error::BusError;
use crate::traits::DeviceDriver;
use crate::util::lock_unpoisoned;

/// Records overlapping reads across every driver that shares it.
///
/// Share one monitor between several mocks to model devices on the same bus.
#[derive(Debug, Default)]
pub struct BusMonitor {
    in_flight: AtomicUsize,
    max_concurrent: AtomicUsize,
    overlaps: AtomicUsize,
    transactions: AtomicUsize,
}

impl BusMonitor {
    /// Create a monitor ready to be shared.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) -> BusTransaction<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        if now > 1 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        self.transactions.fetch_add(1, Ordering::SeqCst);
        BusTransaction(self)
    }

    /// Number of reads that started while another was in flight.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous reads observed.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// Total reads observed.
    pub fn transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }
}

struct BusTransaction<'a>(&'a BusMonitor);

impl Drop for BusTransaction<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
struct MockValues {
    id: SensorId,
    temperature: f32,
    pressure: f32,
    humidity: Option<f32>,
    altitude: Option<f32>,
}

#[derive(Debug)]
struct MockState {
    values: Mutex<MockValues>,
    /// Remaining injected failures per quantity.
    failures: Mutex<HashMap<Quantity, u32>>,
    latency: Mutex<Duration>,
    read_count: AtomicU32,
    call_log: Mutex<Vec<Quantity>>,
    monitor: Mutex<Option<Arc<BusMonitor>>>,
}

/// A mock sensor device for testing.
///
/// Defaults to a BME280-like device at 22.5 °C, 101325 Pa and 45 %RH.
///
/// # Example
///
/// ```
/// use envsense_core::{DeviceDriver, MockDriver};
/// use envsense_types::{Accuracy, Quantity, SensorId};
///
/// let mut device = MockDriver::new(SensorId(119)).with_humidity(None);
/// let handle = device.handle();
///
/// assert_eq!(device.read_humidity(Accuracy::High).unwrap(), None);
///
/// handle.fail_times(Quantity::Temperature, 1);
/// assert!(device.read_temperature(Accuracy::High).is_err());
/// assert!(device.read_temperature(Accuracy::High).is_ok());
/// ```
#[derive(Debug)]
pub struct MockDriver {
    state: Arc<MockState>,
}

/// Controls a [`MockDriver`] after it has been moved into a store.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<MockState>,
}

impl MockDriver {
    /// Create a new mock device with default values.
    pub fn new(id: SensorId) -> Self {
        Self {
            state: Arc::new(MockState {
                values: Mutex::new(MockValues {
                    id,
                    temperature: 22.5,
                    pressure: 101_325.0,
                    humidity: Some(45.0),
                    altitude: None,
                }),
                failures: Mutex::new(HashMap::new()),
                latency: Mutex::new(Duration::ZERO),
                read_count: AtomicU32::new(0),
                call_log: Mutex::new(Vec::new()),
                monitor: Mutex::new(None),
            }),
        }
    }

    /// Set the temperature in °C.
    #[must_use]
    pub fn with_temperature(self, value: f32) -> Self {
        self.handle().set_temperature(value);
        self
    }

    /// Set the pressure in Pa.
    #[must_use]
    pub fn with_pressure(self, value: f32) -> Self {
        self.handle().set_pressure(value);
        self
    }

    /// Set the humidity in %RH, or `None` for a device without one.
    #[must_use]
    pub fn with_humidity(self, value: Option<f32>) -> Self {
        self.handle().set_humidity(value);
        self
    }

    /// Report a fixed altitude instead of deriving it from the pressure.
    #[must_use]
    pub fn with_altitude(self, value: f32) -> Self {
        self.handle().set_altitude(value);
        self
    }

    /// Block every read for `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.handle().set_latency(latency);
        self
    }

    /// Report every read to a shared bus monitor.
    #[must_use]
    pub fn on_bus(self, monitor: Arc<BusMonitor>) -> Self {
        *lock_unpoisoned(&self.state.monitor) = Some(monitor);
        self
    }

    /// Get a handle for controlling this mock later.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Common path for every read: bus accounting, latency, failure injection.
    fn read<T>(
        &mut self,
        quantity: Quantity,
        value: impl FnOnce(&MockValues) -> T,
    ) -> Result<T, BusError> {
        let monitor = lock_unpoisoned(&self.state.monitor).clone();
        let _transaction = monitor.as_deref().map(BusMonitor::enter);

        self.state.read_count.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.state.call_log).push(quantity);

        let latency = *lock_unpoisoned(&self.state.latency);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        {
            let mut failures = lock_unpoisoned(&self.state.failures);
            if let Some(remaining) = failures.get_mut(&quantity)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(BusError::Transaction(format!(
                    "mock failure reading {}",
                    quantity
                )));
            }
        }

        Ok(value(&lock_unpoisoned(&self.state.values)))
    }
}

impl DeviceDriver for MockDriver {
    fn read_id(&mut self) -> Result<SensorId, BusError> {
        self.read(Quantity::Id, |v| v.id)
    }

    fn read_temperature(&mut self, _accuracy: Accuracy) -> Result<f32, BusError> {
        self.read(Quantity::Temperature, |v| v.temperature)
    }

    fn read_pressure(&mut self, _accuracy: Accuracy) -> Result<f32, BusError> {
        self.read(Quantity::Pressure, |v| v.pressure)
    }

    fn read_humidity(&mut self, _accuracy: Accuracy) -> Result<Option<f32>, BusError> {
        self.read(Quantity::Humidity, |v| v.humidity)
    }

    fn read_altitude(&mut self, _accuracy: Accuracy) -> Result<f32, BusError> {
        self.read(Quantity::Altitude, |v| {
            v.altitude
                .unwrap_or_else(|| altitude_from_pressure(v.pressure))
        })
    }
}

impl MockHandle {
    /// Change the id the device reports.
    pub fn set_id(&self, id: SensorId) {
        lock_unpoisoned(&self.state.values).id = id;
    }

    /// Set the temperature in °C.
    pub fn set_temperature(&self, value: f32) {
        lock_unpoisoned(&self.state.values).temperature = value;
    }

    /// Set the pressure in Pa.
    pub fn set_pressure(&self, value: f32) {
        lock_unpoisoned(&self.state.values).pressure = value;
    }

    /// Set the humidity in %RH, or `None` for unsupported.
    pub fn set_humidity(&self, value: Option<f32>) {
        lock_unpoisoned(&self.state.values).humidity = value;
    }

    /// Set a fixed altitude in meters.
    pub fn set_altitude(&self, value: f32) {
        lock_unpoisoned(&self.state.values).altitude = Some(value);
    }

    /// Set the simulated latency of each read.
    pub fn set_latency(&self, latency: Duration) {
        *lock_unpoisoned(&self.state.latency) = latency;
    }

    /// Fail the next `count` reads of `quantity`.
    pub fn fail_times(&self, quantity: Quantity, count: u32) {
        lock_unpoisoned(&self.state.failures).insert(quantity, count);
    }

    /// Fail the next read of `quantity`.
    pub fn fail_next(&self, quantity: Quantity) {
        self.fail_times(quantity, 1);
    }

    /// Clear all injected failures.
    pub fn clear_failures(&self) {
        lock_unpoisoned(&self.state.failures).clear();
    }

    /// Number of reads issued so far, including failed ones.
    pub fn read_count(&self) -> u32 {
        self.state.read_count.load(Ordering::SeqCst)
    }

    /// The quantities read so far, in order.
    pub fn call_log(&self) -> Vec<Quantity> {
        lock_unpoisoned(&self.state.call_log).clone()
    }

    /// Forget the recorded calls.
    pub fn clear_log(&self) {
        lock_unpoisoned(&self.state.call_log).clear();
    }
}
