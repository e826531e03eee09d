//! Retry logic for bus reads.
//!
//! This module provides configurable retry functionality for handling
//! transient bus failures. Retries happen per read, beneath the record's
//! refresh, so a refresh still either commits all of its values or none.
//!
//! # Example
//!
//! ```
//! use envsense_core::{BusError, RetryConfig, with_retry};
//!
//! let config = RetryConfig::new(3);
//!
//! let value = with_retry(&config, "read_temperature", || {
//!     // Your bus operation here
//!     Ok::<_, BusError>(21.5)
//! })?;
//! # Ok::<(), BusError>(())
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use envsense_types::{Accuracy, SensorId};

use crate::error::BusError;
use crate::traits::DeviceDriver;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries).
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries (for exponential backoff).
    pub max_delay: Duration,
    /// Backoff multiplier (1.0 = constant delay, 2.0 = double each time).
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retry configuration for single register reads on a local bus.
    ///
    /// A conversion takes tens of milliseconds at most, so waiting seconds
    /// between attempts only stalls the callers queued on the store lock.
    pub fn for_bus(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Set maximum number of retries.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Calculate delay for a given attempt number.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter {
            // Up to 25% jitter
            let jitter_factor = 1.0 + (rand::rng().random::<f64>() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Run a blocking bus operation with retry logic.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once all retries are spent.
pub fn with_retry<F, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, BusError>
where
    F: FnMut() -> Result<T, BusError>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} retries", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if !e.is_retryable() || attempt >= config.max_retries => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    operation_name,
                    attempt + 1,
                    config.max_retries + 1,
                    e,
                    delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// A driver that retries each read on transient bus errors.
#[derive(Debug)]
pub struct Retrying<D> {
    inner: D,
    config: RetryConfig,
}

impl<D: DeviceDriver> Retrying<D> {
    /// Wrap `inner` with the given retry policy.
    pub fn new(inner: D, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Unwrap the inner driver.
    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: DeviceDriver> DeviceDriver for Retrying<D> {
    fn read_id(&mut self) -> Result<SensorId, BusError> {
        let inner = &mut self.inner;
        with_retry(&self.config, "read_id", || inner.read_id())
    }

    fn read_temperature(&mut self, accuracy: Accuracy) -> Result<f32, BusError> {
        let inner = &mut self.inner;
        with_retry(&self.config, "read_temperature", || {
            inner.read_temperature(accuracy)
        })
    }

    fn read_pressure(&mut self, accuracy: Accuracy) -> Result<f32, BusError> {
        let inner = &mut self.inner;
        with_retry(&self.config, "read_pressure", || inner.read_pressure(accuracy))
    }

    fn read_humidity(&mut self, accuracy: Accuracy) -> Result<Option<f32>, BusError> {
        let inner = &mut self.inner;
        with_retry(&self.config, "read_humidity", || inner.read_humidity(accuracy))
    }

    fn read_altitude(&mut self, accuracy: Accuracy) -> Result<f32, BusError> {
        let inner = &mut self.inner;
        with_retry(&self.config, "read_altitude", || inner.read_altitude(accuracy))
    }
}
