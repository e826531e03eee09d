//! Driver contract, BME280 driver and concurrent sensor store for I2C
//! environmental sensors.
//!
//! This crate owns everything between the HTTP layer and the bus: the
//! [`DeviceDriver`] trait, a BMP280/BME280 implementation of it, and the
//! [`SensorStore`] that serializes every bus access behind one lock and hands
//! out consistent snapshots.
//!
//! # Features
//!
//! - **Refresh-on-read**: every `get` re-reads the device; there is no polling
//! - **All-or-nothing refresh**: a failed read never leaves half-updated values
//! - **Serialized bus access**: no two refreshes overlap, even across devices
//! - **Retries**: optional per-read backoff beneath the store
//! - **Mock driver**: hardware-free testing with failure injection
//!
//! # Supported Devices
//!
//! | Chip | Chip id | Quantities |
//! |------|---------|------------|
//! | BMP280 | 0x58 | Temperature, Pressure, Altitude |
//! | BME280 | 0x60 | Temperature, Pressure, Humidity, Altitude |
//!
//! # Quick Start
//!
//! ```no_run
//! use envsense_core::{SensorConfig, SensorStore};
//!
//! let store = SensorStore::bootstrap(&[SensorConfig::default()]);
//! for snapshot in store.get_all()? {
//!     println!("{snapshot}");
//! }
//! # Ok::<(), envsense_core::Error>(())
//! ```

pub mod bme280;
pub mod bootstrap;
pub mod error;
pub mod mock;
pub mod record;
pub mod retry;
pub mod store;
pub mod traits;
pub mod util;

pub use bme280::{Bme280, Calibration};
#[cfg(target_os = "linux")]
pub use bme280::{LinuxBme280, open_linux};
pub use bootstrap::{SensorConfig, open_device};
pub use error::{BusError, Error, Result};
pub use mock::{BusMonitor, MockDriver, MockHandle};
pub use record::SensorRecord;
pub use retry::{RetryConfig, Retrying, with_retry};
pub use store::SensorStore;
pub use traits::{BoxedDriver, DeviceDriver};

pub use envsense_types::{
    Accuracy, ChipModel, Measurement, Quantity, SensorId, SensorSnapshot, altitude_from_pressure,
};
