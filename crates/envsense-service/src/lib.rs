//! HTTP REST API for I2C environmental sensors, plus a small task list.
//!
//! Sensors are bound once at startup from the configuration. Every sensor
//! request refreshes the device before answering, so responses always carry
//! fresh readings.
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/v1/sensor` - Refresh and list all sensors
//! - `GET /api/v1/sensor/{id}` - Refresh and return one sensor
//! - `GET /api/v1/task` - List tasks
//! - `POST /api/v1/task` - Create a task, returns `{"id": n}`
//! - `DELETE /api/v1/task` - Delete every task
//! - `GET /api/v1/task/{id}` - Get a task
//! - `PUT /api/v1/task/{id}` - Replace a task
//! - `DELETE /api/v1/task/{id}` - Delete a task
//!
//! A trailing slash on any path is ignored.
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/envsense/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//! request_timeout_secs = 60
//!
//! [storage]
//! path = "/var/lib/envsense/tasks.db"
//!
//! [[sensors]]
//! bus = 1
//! address = 0x77
//! chip = "bme280"
//! accuracy = "standard"
//! ```
//!
//! A sensor's id is its chip id register, so each chip model may appear at
//! most once in `[[sensors]]`; validation rejects a second BME280 or BMP280.

pub mod api;
pub mod config;
pub mod middleware;
pub mod state;

use std::sync::Arc;

use axum::Router;
use tower::Layer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};

pub use config::{Config, ConfigError, ServerConfig, StorageConfig, ValidationError};
pub use state::AppState;

/// Build the complete service: routes, middleware and state.
///
/// Path normalization has to run before routing, so it wraps the router
/// rather than being added as a route layer.
pub fn app(state: Arc<AppState>) -> NormalizePath<Router> {
    let router = middleware::apply(api::router()).with_state(state);
    NormalizePathLayer::trim_trailing_slash().layer(router)
}
