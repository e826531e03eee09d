//! Error types for envsense-core.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`BusError::Io`] | Retry | The adapter may be momentarily busy |
//! | [`BusError::Transaction`] | Retry | NACKs and arbitration loss are transient |
//! | [`BusError::Timeout`] | Retry | A conversion can overrun under load |
//! | [`BusError::InvalidData`] | Do not retry | The chip answered with nonsense |
//! | [`Error::NotFound`] | Do not retry | The id was never registered |
//! | [`Error::UnsupportedChip`] | Do not retry | Wrong device at that address |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//!
//! The store never retries on its own. Retries live beneath it, in
//! [`crate::Retrying`], so a refresh stays all-or-nothing either way.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use envsense_types::{ChipModel, Quantity, SensorId};

/// A single bus transaction against a device failed.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BusError {
    /// I/O error from the operating system's bus device.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The transaction was rejected on the bus (NACK, arbitration loss, ...).
    #[error("Bus transaction failed: {0}")]
    Transaction(String),

    /// The device answered with data that cannot be right.
    #[error("Invalid data from device: {0}")]
    InvalidData(String),

    /// The device did not finish in time.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// How long we waited.
        duration: Duration,
    },
}

impl BusError {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether retrying the same read may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BusError::InvalidData(_))
    }
}

/// Errors returned by the driver, record and store layers.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested sensor is not registered in the store.
    #[error("sensor with id={0} not found")]
    NotFound(SensorId),

    /// A refresh aborted because one of its reads failed.
    #[error("read {quantity} error: {source}")]
    Refresh {
        /// The quantity whose read failed.
        quantity: Quantity,
        /// The underlying bus failure.
        #[source]
        source: BusError,
    },

    /// The chip at the configured address is not the configured model.
    #[error("unsupported chip: expected {expected}, found chip id 0x{found:02X}")]
    UnsupportedChip {
        /// The configured model.
        expected: ChipModel,
        /// What the chip id register held.
        found: u8,
    },

    /// The device answered at its address but could not be initialized.
    #[error("Failed to initialize device at address 0x{address:02X}: {source}")]
    Init {
        /// The I2C address of the device.
        address: u8,
        /// The underlying bus failure.
        #[source]
        source: BusError,
    },

    /// The bus device could not be opened.
    #[error("Failed to open bus {path}: {source}")]
    Open {
        /// Path of the bus device node.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: BusError,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Wrap a bus failure on the given quantity.
    pub fn refresh(quantity: Quantity, source: BusError) -> Self {
        Self::Refresh { quantity, source }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this is a lookup miss rather than a device failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type for envsense-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound(SensorId(7));
        assert_eq!(err.to_string(), "sensor with id=7 not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_refresh_display_names_quantity() {
        let err = Error::refresh(
            Quantity::Pressure,
            BusError::Transaction("NACK".to_string()),
        );
        let msg = err.to_string();
        assert!(msg.contains("read pressure error"));
        assert!(msg.contains("NACK"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_refresh_exposes_source() {
        use std::error::Error as _;
        let err = Error::refresh(Quantity::Id, BusError::InvalidData("bad".into()));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_unsupported_chip_display() {
        let err = Error::UnsupportedChip {
            expected: ChipModel::Bme280,
            found: 0x58,
        };
        assert_eq!(
            err.to_string(),
            "unsupported chip: expected BME280, found chip id 0x58"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BusError::Transaction("x".into()).is_retryable());
        assert!(BusError::timeout("measure", Duration::from_millis(50)).is_retryable());
        assert!(
            BusError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).is_retryable()
        );
        assert!(!BusError::InvalidData("x".into()).is_retryable());
    }
}
