//! Database schema and migrations.
//!
//! The schema version lives in SQLite's `user_version` header field. Each
//! entry in [`MIGRATIONS`] moves the database up by one version and is applied
//! in its own transaction together with the version bump.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Migration `i` upgrades a database from version `i` to `i + 1`.
const MIGRATIONS: &[&str] = &[
    // 1: tasks and their tags
    r#"
    CREATE TABLE tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        due INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    -- Tags keep insertion order through their rowid
    CREATE TABLE tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        text TEXT NOT NULL
    );
    CREATE INDEX idx_tags_task ON tags(task_id);
    "#,
];

/// Bring the database up to [`SCHEMA_VERSION`].
pub fn initialize(conn: &Connection) -> Result<()> {
    let current = user_version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(Error::UnsupportedSchema {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    for (from, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let to = from as i32 + 1;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", to)?;
        tx.commit()?;
        info!("Migrated task database to schema version {}", to);
    }

    Ok(())
}

fn user_version(conn: &Connection) -> Result<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_fresh_database_gets_every_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(user_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();

        let tables = table_names(&conn);
        assert!(tables.iter().any(|t| t == "tasks"));
        assert!(tables.iter().any(|t| t == "tags"));
        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO tasks (text, created_at, updated_at) VALUES ('keep', 0, 0)",
            [],
        )
        .unwrap();

        initialize(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();

        assert!(matches!(
            initialize(&conn),
            Err(Error::UnsupportedSchema { found, supported })
                if found == SCHEMA_VERSION + 1 && supported == SCHEMA_VERSION
        ));
    }

    #[test]
    fn test_tags_cascade_with_foreign_keys() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        initialize(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO tasks (id, text, created_at, updated_at) VALUES (1, 'a', 0, 0);
             INSERT INTO tags (task_id, text) VALUES (1, 'x'), (1, 'y');
             DELETE FROM tasks WHERE id = 1;",
        )
        .unwrap();

        let tags: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tags, 0);
    }
}
