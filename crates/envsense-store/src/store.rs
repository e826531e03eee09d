//! Main store implementation.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{NewTask, Task};
use crate::schema;

/// SQLite-based store for tasks.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Insert a task and return it as stored.
    pub fn create_task(&mut self, task: &NewTask) -> Result<Task> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO tasks (text, due, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![task.text, task.due.map(|d| d.unix_timestamp()), now],
        )?;
        let id = tx.last_insert_rowid();
        insert_tags(&tx, id, &task.tags)?;
        tx.commit()?;

        debug!("Created task {}", id);
        self.get_task(id)?.ok_or(Error::TaskNotFound(id))
    }

    /// Get a task by ID.
    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                "SELECT id, text, due, created_at, updated_at FROM tasks WHERE id = ?",
                [id],
                task_from_row,
            )
            .optional()?;

        let Some(mut task) = task else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT text FROM tags WHERE task_id = ? ORDER BY id")?;
        task.tags = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(Some(task))
    }

    /// List all tasks, ordered by ID.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT task_id, text FROM tags ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get(1)?)))?;
        for row in rows {
            let (task_id, text) = row?;
            tags.entry(task_id).or_default().push(text);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id, text, due, created_at, updated_at FROM tasks ORDER BY id")?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .map(|task| {
                task.map(|mut task| {
                    task.tags = tags.remove(&task.id).unwrap_or_default();
                    task
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    /// Replace the text, tags and due date of an existing task.
    ///
    /// Returns `None` if no task has this ID.
    pub fn update_task(&mut self, id: i64, task: &NewTask) -> Result<Option<Task>> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE tasks SET text = ?2, due = ?3, updated_at = ?4 WHERE id = ?1",
            rusqlite::params![id, task.text, task.due.map(|d| d.unix_timestamp()), now],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        tx.execute("DELETE FROM tags WHERE task_id = ?", [id])?;
        insert_tags(&tx, id, &task.tags)?;
        tx.commit()?;

        debug!("Updated task {}", id);
        self.get_task(id)
    }

    /// Delete a task and its tags. Returns whether it existed.
    pub fn delete_task(&mut self, id: i64) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM tasks WHERE id = ?", [id])?;
        debug!("Deleted task {}: {}", id, deleted > 0);
        Ok(deleted > 0)
    }

    /// Delete every task. Returns how many were removed.
    pub fn delete_all_tasks(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM tags", [])?;
        let deleted = tx.execute("DELETE FROM tasks", [])?;
        tx.commit()?;

        info!("Deleted {} tasks", deleted);
        Ok(deleted)
    }
}

fn insert_tags(tx: &Transaction<'_>, task_id: i64, tags: &[String]) -> Result<()> {
    let mut stmt = tx.prepare("INSERT INTO tags (task_id, text) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute(rusqlite::params![task_id, tag])?;
    }
    Ok(())
}

/// Map a `tasks` row; tags are filled in by the caller.
fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let due = row
        .get::<_, Option<i64>>(2)?
        .map(|secs| timestamp(2, secs))
        .transpose()?;

    Ok(Task {
        id: row.get(0)?,
        text: row.get(1)?,
        tags: Vec::new(),
        due,
        created_at: timestamp(3, row.get(3)?)?,
        updated_at: timestamp(4, row.get(4)?)?,
    })
}

fn timestamp(column: usize, secs: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Integer, Box::new(e)))
}
