//! Error types for value parsing in envsense-types.

use thiserror::Error;

/// Errors that can occur when parsing sensor identifiers and settings.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The sensor identifier is not a decimal number in `0..=255`.
    #[error("Invalid sensor id '{0}': expected a number between 0 and 255")]
    InvalidSensorId(String),

    /// The chip id register held a value that matches no supported model.
    #[error("Unknown chip id: 0x{0:02X}")]
    UnknownChipId(u8),

    /// The chip model name is not recognised.
    #[error("Unknown chip model '{0}': expected 'bmp280' or 'bme280'")]
    UnknownChipModel(String),
}

/// Result type alias using envsense-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
