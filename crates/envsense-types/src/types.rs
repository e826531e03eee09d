//! Core types for environmental sensor data.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Standard atmospheric pressure at sea level, in pascals.
pub const SEA_LEVEL_PRESSURE_PA: f32 = 101_325.0;

/// Altitude in meters above sea level for a pressure in pascals.
///
/// Uses the international barometric formula against [`SEA_LEVEL_PRESSURE_PA`].
///
/// ```
/// use envsense_types::altitude_from_pressure;
///
/// assert!(altitude_from_pressure(101_325.0).abs() < 0.01);
/// assert!(altitude_from_pressure(90_000.0) > 900.0);
/// ```
#[must_use]
pub fn altitude_from_pressure(pressure_pa: f32) -> f32 {
    44_330.0 * (1.0 - (pressure_pa / SEA_LEVEL_PRESSURE_PA).powf(1.0 / 5.255))
}

/// Identifier of one physical sensor bound into a store.
///
/// Assigned from the device itself at bootstrap and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SensorId(pub u8);

impl SensorId {
    /// The raw identifier value.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl From<u8> for SensorId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SensorId {
    type Err = ParseError;

    /// Parse a decimal sensor identifier.
    ///
    /// ```
    /// use envsense_types::SensorId;
    ///
    /// assert_eq!("119".parse::<SensorId>(), Ok(SensorId(119)));
    /// assert!("-1".parse::<SensorId>().is_err());
    /// assert!("256".parse::<SensorId>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidSensorId(s.to_string()));
        }
        trimmed
            .parse::<u8>()
            .map(SensorId)
            .map_err(|_| ParseError::InvalidSensorId(s.to_string()))
    }
}

/// A quantity read from a device during a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Quantity {
    /// The sensor identifier.
    Id,
    /// Temperature in degrees Celsius.
    Temperature,
    /// Pressure in pascals.
    Pressure,
    /// Relative humidity in percent.
    Humidity,
    /// Altitude in meters.
    Altitude,
}

impl Quantity {
    /// The order in which a refresh reads its quantities.
    pub const REFRESH_ORDER: [Quantity; 5] = [
        Quantity::Id,
        Quantity::Temperature,
        Quantity::Pressure,
        Quantity::Humidity,
        Quantity::Altitude,
    ];
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quantity::Id => "sensor id",
            Quantity::Temperature => "temperature",
            Quantity::Pressure => "pressure",
            Quantity::Humidity => "humidity",
            Quantity::Altitude => "altitude",
        };
        f.write_str(name)
    }
}

/// Measurement accuracy, selected once per device and reused for every read.
///
/// Higher accuracy oversamples more and takes longer per conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Accuracy {
    /// 1x oversampling.
    UltraLow,
    /// 2x oversampling.
    Low,
    /// 4x oversampling.
    Standard,
    /// 8x oversampling.
    #[default]
    High,
    /// 16x oversampling.
    UltraHigh,
}

impl Accuracy {
    /// Oversampling register code (`osrs_*` field) for this accuracy.
    #[must_use]
    pub fn oversampling_code(self) -> u8 {
        match self {
            Accuracy::UltraLow => 0b001,
            Accuracy::Low => 0b010,
            Accuracy::Standard => 0b011,
            Accuracy::High => 0b100,
            Accuracy::UltraHigh => 0b101,
        }
    }

    /// Number of samples averaged per conversion.
    #[must_use]
    pub fn samples(self) -> u32 {
        match self {
            Accuracy::UltraLow => 1,
            Accuracy::Low => 2,
            Accuracy::Standard => 4,
            Accuracy::High => 8,
            Accuracy::UltraHigh => 16,
        }
    }
}

/// Supported Bosch chip variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChipModel {
    /// BMP280: temperature and pressure.
    Bmp280,
    /// BME280: temperature, pressure and humidity.
    #[default]
    Bme280,
}

impl ChipModel {
    /// Value of the chip id register for this model.
    #[must_use]
    pub fn chip_id(self) -> u8 {
        match self {
            ChipModel::Bmp280 => 0x58,
            ChipModel::Bme280 => 0x60,
        }
    }

    /// Look up the model from a chip id register value.
    ///
    /// ```
    /// use envsense_types::ChipModel;
    ///
    /// assert_eq!(ChipModel::from_chip_id(0x60), Ok(ChipModel::Bme280));
    /// assert!(ChipModel::from_chip_id(0x55).is_err());
    /// ```
    pub fn from_chip_id(id: u8) -> Result<Self, ParseError> {
        match id {
            0x58 => Ok(ChipModel::Bmp280),
            0x60 => Ok(ChipModel::Bme280),
            other => Err(ParseError::UnknownChipId(other)),
        }
    }

    /// Whether the chip has a humidity sensor.
    #[must_use]
    pub fn supports_humidity(self) -> bool {
        matches!(self, ChipModel::Bme280)
    }
}

impl fmt::Display for ChipModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipModel::Bmp280 => write!(f, "BMP280"),
            ChipModel::Bme280 => write!(f, "BME280"),
        }
    }
}

impl FromStr for ChipModel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bmp280" => Ok(ChipModel::Bmp280),
            "bme280" => Ok(ChipModel::Bme280),
            _ => Err(ParseError::UnknownChipModel(s.to_string())),
        }
    }
}

/// One cached quantity of a sensor.
///
/// Distinguishes a quantity that has never been read from one the device
/// reported as unavailable. Only [`Measurement::Value`] is serialized; the
/// other two cases are omitted from JSON.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Measurement {
    /// Not read yet.
    #[default]
    Pending,
    /// The device does not support this quantity.
    Unsupported,
    /// A value from the most recent refresh.
    Value(f32),
}

impl Measurement {
    /// The measured value, if present and finite.
    ///
    /// A non-finite value (for example a compensation that overflowed) is
    /// treated as no value at all.
    #[must_use]
    pub fn value(&self) -> Option<f32> {
        match self {
            Measurement::Value(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    /// Whether the device reported this quantity as unsupported.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Measurement::Unsupported)
    }

    /// Whether there is no value to report.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.value().is_none()
    }
}

impl From<Option<f32>> for Measurement {
    /// `None` maps to [`Measurement::Unsupported`]: drivers return `None`
    /// only for quantities the chip lacks.
    fn from(value: Option<f32>) -> Self {
        match value {
            Some(v) => Measurement::Value(v),
            None => Measurement::Unsupported,
        }
    }
}

#[cfg(feature = "serde")]
impl Serialize for Measurement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value() {
            Some(v) => serializer.serialize_some(&v),
            None => serializer.serialize_none(),
        }
    }
}

/// An explicit `null` reads back as [`Measurement::Unsupported`]; a missing
/// field falls back to [`Measurement::Pending`] through `#[serde(default)]`.
#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Measurement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<f32>::deserialize(deserializer)?.into())
    }
}

/// Immutable copy of a sensor's cached readings.
///
/// Returned by the store after a successful refresh; later refreshes never
/// change a snapshot that has already been handed out.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorSnapshot {
    /// Sensor identifier.
    pub id: SensorId,
    /// Temperature in degrees Celsius.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Measurement::is_absent")
    )]
    pub temperature: Measurement,
    /// Pressure in pascals.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Measurement::is_absent")
    )]
    pub pressure: Measurement,
    /// Relative humidity in percent.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Measurement::is_absent")
    )]
    pub humidity: Measurement,
    /// Altitude in meters, assuming standard sea-level pressure.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Measurement::is_absent")
    )]
    pub altitude: Measurement,
    /// When the refresh that produced this snapshot completed.
    #[cfg_attr(
        feature = "serde",
        serde(
            default,
            with = "time::serde::rfc3339::option",
            skip_serializing_if = "Option::is_none"
        )
    )]
    pub refreshed_at: Option<OffsetDateTime>,
}

impl fmt::Display for SensorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor {}", self.id)?;
        if let Some(t) = self.temperature.value() {
            write!(f, " {:.2}°C", t)?;
        }
        if let Some(p) = self.pressure.value() {
            write!(f, " {:.0}Pa", p)?;
        }
        if let Some(h) = self.humidity.value() {
            write!(f, " {:.1}%RH", h)?;
        }
        if let Some(a) = self.altitude.value() {
            write!(f, " {:.1}m", a)?;
        }
        Ok(())
    }
}
