//! Application state shared across handlers.
//!
//! The sensor store is blocking and guarded by its own lock, so handlers reach
//! it through [`AppState::with_sensors`], which moves the call onto the
//! blocking pool and applies the configured request deadline. Callers queue
//! on an async gate before anything is spawned, so at most one sensor job
//! exists at a time, including one whose caller already timed out. The task
//! store holds a single SQLite connection behind an async mutex.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use envsense_core::{SensorId, SensorStore};
use envsense_store::Store;

use crate::api::AppError;
use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// Sensors bound at startup.
    pub sensors: Arc<SensorStore>,
    /// The task database (wrapped in Mutex for thread-safe access).
    pub tasks: Mutex<Store>,
    /// Configuration the service was started with.
    pub config: Config,
    /// Registered sensor ids, captured once since the set never changes.
    sensor_ids: Vec<SensorId>,
    /// Held by the running sensor job until its blocking call returns.
    sensor_gate: Arc<Mutex<()>>,
}

impl AppState {
    /// Create new application state.
    pub fn new(sensors: SensorStore, tasks: Store, config: Config) -> Arc<Self> {
        let sensor_ids = sensors.ids();
        Arc::new(Self {
            sensors: Arc::new(sensors),
            tasks: Mutex::new(tasks),
            config,
            sensor_ids,
            sensor_gate: Arc::new(Mutex::new(())),
        })
    }

    /// Ids of all registered sensors, without waiting on the sensor lock.
    pub fn sensor_ids(&self) -> &[SensorId] {
        &self.sensor_ids
    }

    /// The deadline applied to each sensor request.
    pub fn request_timeout(&self) -> Duration {
        self.config.server.request_timeout()
    }

    /// Run a blocking sensor store operation under the request deadline.
    ///
    /// The deadline covers both waiting for the gate and the call itself. On
    /// timeout the caller gets [`AppError::Timeout`] straight away. A call
    /// that already started keeps running on the blocking pool until the
    /// device answers and then releases the gate; callers still waiting for
    /// the gate when their deadline passes never spawn anything.
    pub async fn with_sensors<T, F>(&self, operation: &'static str, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&SensorStore) -> envsense_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sensors = Arc::clone(&self.sensors);
        let gate = Arc::clone(&self.sensor_gate);
        let deadline = self.request_timeout();
        let job = async move {
            let permit = gate.lock_owned().await;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                f(&sensors)
            })
            .await
        };

        match tokio::time::timeout(deadline, job).await {
            Ok(Ok(result)) => result.map_err(AppError::from),
            Ok(Err(e)) => Err(AppError::Internal(format!("{} failed: {}", operation, e))),
            Err(_) => {
                warn!("{} timed out after {:?}", operation, deadline);
                Err(AppError::Timeout(format!(
                    "{} timed out after {}s",
                    operation,
                    deadline.as_secs()
                )))
            }
        }
    }
}
