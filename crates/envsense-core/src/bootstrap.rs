//! Binding configured I2C devices into a [`SensorStore`] at startup.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use envsense_types::{Accuracy, ChipModel};

use crate::error::Result;
use crate::store::SensorStore;
use crate::traits::BoxedDriver;

/// Where to find one sensor and how to read it.
///
/// Defaults match a BME280 breakout on a Raspberry Pi: bus 1, address 0x77.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// I2C bus number, as in `/dev/i2c-<bus>`.
    pub bus: u8,
    /// 7-bit I2C address.
    pub address: u8,
    /// Expected chip model.
    pub chip: ChipModel,
    /// Oversampling used for every read.
    pub accuracy: Accuracy,
    /// Retries per single read on transient bus errors (0 disables).
    pub retries: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            bus: 1,
            address: crate::bme280::ADDRESS_SECONDARY,
            chip: ChipModel::default(),
            accuracy: Accuracy::default(),
            retries: 2,
        }
    }
}

/// Open the device described by `config`.
#[cfg(target_os = "linux")]
pub fn open_device(config: &SensorConfig) -> Result<BoxedDriver> {
    use crate::retry::{RetryConfig, Retrying};

    let device = crate::bme280::open_linux(config.bus, config.address, config.chip)?;
    if config.retries == 0 {
        Ok(Box::new(device))
    } else {
        Ok(Box::new(Retrying::new(
            device,
            RetryConfig::for_bus(config.retries),
        )))
    }
}

/// Open the device described by `config`.
///
/// I2C buses are only reachable on Linux; elsewhere this always fails.
#[cfg(not(target_os = "linux"))]
pub fn open_device(config: &SensorConfig) -> Result<BoxedDriver> {
    Err(crate::error::Error::invalid_config(format!(
        "cannot open I2C bus {}: only supported on Linux",
        config.bus
    )))
}

impl SensorStore<BoxedDriver> {
    /// Open every configured device and bind those that answer.
    ///
    /// A device that cannot be opened is logged and skipped, so missing
    /// hardware yields a store with fewer (possibly zero) sensors rather than
    /// an error.
    pub fn bootstrap(configs: &[SensorConfig]) -> Self {
        let mut devices = Vec::with_capacity(configs.len());
        for config in configs {
            match open_device(config) {
                Ok(device) => {
                    info!(
                        "Opened {} on bus {} at 0x{:02X}",
                        config.chip, config.bus, config.address
                    );
                    devices.push((device, config.accuracy));
                }
                Err(e) => warn!(
                    "Skipping {} on bus {} at 0x{:02X}: {}",
                    config.chip, config.bus, config.address, e
                ),
            }
        }

        let store = Self::bind(devices);
        info!("Sensor store ready with {} sensor(s)", store.len());
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A bus number no test machine has.
    fn missing_bus() -> SensorConfig {
        SensorConfig {
            bus: 250,
            ..Default::default()
        }
    }

    #[test]
    fn test_sensor_config_defaults() {
        let config = SensorConfig::default();
        assert_eq!(config.bus, 1);
        assert_eq!(config.address, 0x77);
        assert_eq!(config.chip, ChipModel::Bme280);
        assert_eq!(config.accuracy, Accuracy::High);
        assert_eq!(config.retries, 2);
    }

    #[test]
    fn test_sensor_config_partial_deserialize() {
        let config: SensorConfig =
            serde_json::from_str(r#"{"address": 118, "chip": "bmp280"}"#).unwrap();
        assert_eq!(config.bus, 1);
        assert_eq!(config.address, 0x76);
        assert_eq!(config.chip, ChipModel::Bmp280);
        assert_eq!(config.accuracy, Accuracy::High);
    }

    #[test]
    fn test_open_missing_bus_fails() {
        assert!(open_device(&missing_bus()).is_err());
    }

    #[test]
    fn test_bootstrap_without_hardware_is_empty() {
        let store = SensorStore::bootstrap(&[missing_bus()]);
        assert!(store.is_empty());
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_bootstrap_no_config() {
        assert!(SensorStore::bootstrap(&[]).is_empty());
    }
}
