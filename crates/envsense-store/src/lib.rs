//! SQLite persistence for the envsense task list.
//!
//! Tasks are short notes with optional tags and an optional due date. The
//! store is synchronous and owns a single connection; share it behind a lock.
//!
//! # Example
//!
//! ```
//! use envsense_store::{NewTask, Store};
//!
//! let mut store = Store::open_in_memory()?;
//! let task = store.create_task(&NewTask::new("calibrate sensor").tag("lab"))?;
//!
//! assert_eq!(store.list_tasks()?, vec![task]);
//! # Ok::<(), envsense_store::Error>(())
//! ```

mod error;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{NewTask, Task};
pub use schema::SCHEMA_VERSION;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/envsense/tasks.db`
/// - macOS: `~/Library/Application Support/envsense/tasks.db`
/// - Windows: `C:\Users\<user>\AppData\Local\envsense\tasks.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("envsense")
        .join("tasks.db")
}
