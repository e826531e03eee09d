//! Server configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use envsense_core::SensorConfig;

/// Lowest non-reserved 7-bit I2C address.
pub const MIN_I2C_ADDRESS: u8 = 0x03;
/// Highest non-reserved 7-bit I2C address.
pub const MAX_I2C_ADDRESS: u8 = 0x77;
/// Upper bound on per-read retries; more only stalls the store lock.
pub const MAX_RETRIES: u32 = 10;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Sensors to bind at startup. Defaults to one BME280 at bus 1, 0x77.
    pub sensors: Vec<SensorConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            sensors: vec![SensorConfig::default()],
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Request timeout is not zero
    /// - Storage path is not empty
    /// - Sensor addresses are valid 7-bit I2C addresses
    /// - No two sensors share a bus and address
    /// - No two sensors use the same chip model, since a device reports its
    ///   chip id as its sensor id
    ///
    /// # Example
    ///
    /// ```
    /// use envsense_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());

        let mut locations = HashSet::new();
        let mut chips = HashSet::new();
        for (i, sensor) in self.sensors.iter().enumerate() {
            let prefix = format!("sensors[{}]", i);
            errors.extend(validate_sensor(sensor, &prefix));

            if !locations.insert((sensor.bus, sensor.address)) {
                errors.push(ValidationError {
                    field: format!("{}.address", prefix),
                    message: format!(
                        "duplicate sensor at bus {} address 0x{:02X}",
                        sensor.bus, sensor.address
                    ),
                });
            }
            if !chips.insert(sensor.chip) {
                errors.push(ValidationError {
                    field: format!("{}.chip", prefix),
                    message: format!(
                        "another {} is configured; both would report the same sensor id",
                        sensor.chip
                    ),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
    /// Deadline for a single sensor request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    /// The sensor request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                }),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError {
                        field: "server.bind".to_string(),
                        message: "port cannot be 0".to_string(),
                    }),
                    Err(_) => errors.push(ValidationError {
                        field: "server.bind".to_string(),
                        message: format!("invalid port '{}': must be a number 1-65535", port),
                    }),
                    Ok(_) => {}
                },
            }
        }

        if self.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "server.request_timeout_secs".to_string(),
                message: "request timeout must be at least 1 second".to_string(),
            });
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Task database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: envsense_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Validate one sensor entry.
pub fn validate_sensor(sensor: &SensorConfig, prefix: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !(MIN_I2C_ADDRESS..=MAX_I2C_ADDRESS).contains(&sensor.address) {
        errors.push(ValidationError {
            field: format!("{}.address", prefix),
            message: format!(
                "address 0x{:02X} is outside the 7-bit range 0x{:02X}-0x{:02X}",
                sensor.address, MIN_I2C_ADDRESS, MAX_I2C_ADDRESS
            ),
        });
    }

    if sensor.retries > MAX_RETRIES {
        errors.push(ValidationError {
            field: format!("{}.retries", prefix),
            message: format!(
                "{} retries is too many (maximum {})",
                sensor.retries, MAX_RETRIES
            ),
        });
    }

    errors
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `sensors[0].address`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("envsense")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use envsense_core::{Accuracy, ChipModel};

    fn validation_fields(config: &Config) -> Vec<String> {
        match config.validate() {
            Ok(()) => Vec::new(),
            Err(ConfigError::Validation(errors)) => errors.into_iter().map(|e| e.field).collect(),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.server.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.sensors, vec![SensorConfig::default()]);
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.path, envsense_store::default_db_path());
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:9090"
            request_timeout_secs = 5

            [storage]
            path = "/data/tasks.db"

            [[sensors]]
            bus = 1
            address = 0x77
            chip = "bme280"
            accuracy = "ultra_high"
            retries = 0

            [[sensors]]
            address = 0x76
            chip = "bmp280"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9090");
        assert_eq!(config.server.request_timeout_secs, 5);
        assert_eq!(config.storage.path, PathBuf::from("/data/tasks.db"));
        assert_eq!(config.sensors.len(), 2);
        assert_eq!(config.sensors[0].accuracy, Accuracy::UltraHigh);
        assert_eq!(config.sensors[0].retries, 0);
        assert_eq!(config.sensors[1].bus, 1);
        assert_eq!(config.sensors[1].address, 0x76);
        assert_eq!(config.sensors[1].chip, ChipModel::Bmp280);
        assert_eq!(config.sensors[1].retries, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_without_sensors_section_uses_default_sensor() {
        let config: Config = toml::from_str("[server]\nbind = \"127.0.0.1:1\"").unwrap();
        assert_eq!(config.sensors, vec![SensorConfig::default()]);
    }

    #[test]
    fn test_config_explicitly_no_sensors() {
        let config: Config = toml::from_str("sensors = []").unwrap();
        assert!(config.sensors.is_empty());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("server.toml");

        let config = Config {
            server: ServerConfig {
                bind: "0.0.0.0:9090".to_string(),
                request_timeout_secs: 10,
            },
            storage: StorageConfig {
                path: PathBuf::from("/tmp/test.db"),
            },
            sensors: vec![SensorConfig {
                bus: 3,
                address: 0x76,
                chip: ChipModel::Bmp280,
                accuracy: Accuracy::Low,
                retries: 1,
            }],
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.server.request_timeout_secs, 10);
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/test.db"));
        assert_eq!(loaded.sensors, config.sensors);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_config_load_unknown_chip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("chip.toml");
        std::fs::write(&config_path, "[[sensors]]\nchip = \"dht22\"\n").unwrap();

        assert!(matches!(
            Config::load(&config_path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_validated_rejects_invalid() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        std::fs::write(&config_path, "[server]\nrequest_timeout_secs = 0\n").unwrap();

        assert!(matches!(
            Config::load_validated(&config_path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("envsense/server.toml"));
    }

    // ==========================================================================
    // Validation tests
    // ==========================================================================

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_server_bind_validation() {
        let server = |bind: &str| ServerConfig {
            bind: bind.to_string(),
            ..Default::default()
        };

        assert!(server("127.0.0.1:8080").validate().is_empty());
        assert!(server("[::1]:8080").validate().is_empty());
        assert!(server("localhost:8080").validate().is_empty());

        assert_eq!(server("").validate().len(), 1);
        assert_eq!(server("127.0.0.1").validate().len(), 1);
        assert_eq!(server("127.0.0.1:0").validate().len(), 1);
        assert_eq!(server("127.0.0.1:http").validate().len(), 1);
        assert_eq!(server("127.0.0.1:70000").validate().len(), 1);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.server.request_timeout_secs = 0;
        assert_eq!(
            validation_fields(&config),
            vec!["server.request_timeout_secs"]
        );
    }

    #[test]
    fn test_empty_storage_path_rejected() {
        let mut config = Config::default();
        config.storage.path = PathBuf::new();
        assert_eq!(validation_fields(&config), vec!["storage.path"]);
    }

    #[test]
    fn test_sensor_address_range() {
        let sensor = |address: u8| SensorConfig {
            address,
            ..Default::default()
        };

        assert!(validate_sensor(&sensor(0x03), "s").is_empty());
        assert!(validate_sensor(&sensor(0x77), "s").is_empty());
        assert_eq!(validate_sensor(&sensor(0x02), "s").len(), 1);
        assert_eq!(validate_sensor(&sensor(0x78), "s").len(), 1);
        assert_eq!(validate_sensor(&sensor(0xFF), "s")[0].field, "s.address");
    }

    #[test]
    fn test_sensor_retries_bound() {
        let sensor = SensorConfig {
            retries: MAX_RETRIES + 1,
            ..Default::default()
        };
        assert_eq!(validate_sensor(&sensor, "s")[0].field, "s.retries");
    }

    #[test]
    fn test_duplicate_sensor_rejected() {
        let mut config = Config::default();
        config.sensors.push(SensorConfig {
            chip: ChipModel::Bmp280,
            ..Default::default()
        });

        assert_eq!(validation_fields(&config), vec!["sensors[1].address"]);

        // Same address on another bus is fine.
        config.sensors[1].bus = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_documented_sample_config() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:8080"
            request_timeout_secs = 60

            [storage]
            path = "/var/lib/envsense/tasks.db"

            [[sensors]]
            bus = 1
            address = 0x77
            chip = "bme280"
            accuracy = "standard"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.storage.path.is_absolute());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_same_chip_model_twice_rejected() {
        // Both addresses are valid for a BME280, but both report chip id 0x60.
        let mut config = Config::default();
        config.sensors = vec![
            SensorConfig {
                address: 0x76,
                ..Default::default()
            },
            SensorConfig {
                address: 0x77,
                ..Default::default()
            },
        ];

        assert_eq!(validation_fields(&config), vec!["sensors[1].chip"]);
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("same sensor id"));
    }

    #[test]
    fn test_validation_error_display() {
        let mut config = Config::default();
        config.server.bind = String::new();
        config.sensors[0].address = 0x80;

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("server.bind: bind address cannot be empty"));
        assert!(message.contains("sensors[0].address"));
    }
}
