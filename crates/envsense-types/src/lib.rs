//! Platform-agnostic types for I2C environmental sensors.
//!
//! This crate provides the value types shared by the driver and store
//! (envsense-core) and the HTTP service (envsense-service).
//!
//! # Features
//!
//! - Sensor identifiers and quantities
//! - Chip model and accuracy selection
//! - Tagged per-field measurements that tell "unsupported" apart from "not yet read"
//! - JSON-ready sensor snapshots
//!
//! # Example
//!
//! ```
//! use envsense_types::{Measurement, SensorId, SensorSnapshot};
//!
//! let snapshot = SensorSnapshot {
//!     id: SensorId(119),
//!     temperature: Measurement::Value(21.5),
//!     pressure: Measurement::Value(101_300.0),
//!     humidity: Measurement::Unsupported,
//!     altitude: Measurement::Value(12.3),
//!     refreshed_at: None,
//! };
//! assert_eq!(snapshot.humidity.value(), None);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    Accuracy, ChipModel, Measurement, Quantity, SEA_LEVEL_PRESSURE_PA, SensorId, SensorSnapshot,
    altitude_from_pressure,
};
