//! Data models for stored tasks.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A task stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Database row ID.
    pub id: i64,
    /// Free-form description.
    pub text: String,
    /// Tags, in the order they were given.
    pub tags: Vec<String>,
    /// Due date, stored with second precision in UTC.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due: Option<OffsetDateTime>,
    /// When the task was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the task was last replaced.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The client-supplied part of a task, used for create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTask {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due: Option<OffsetDateTime>,
}

impl NewTask {
    /// Create a task description with no tags and no due date.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the due date.
    #[must_use]
    pub fn due(mut self, due: OffsetDateTime) -> Self {
        self.due = Some(due);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_from_json() {
        let task: NewTask = serde_json::from_str(
            r#"{"text": "water plants", "tags": ["home"], "due": "2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(task.text, "water plants");
        assert_eq!(task.tags, vec!["home"]);
        assert_eq!(task.due.unwrap().unix_timestamp(), 1_714_564_800);
    }

    #[test]
    fn test_new_task_optional_fields() {
        let task: NewTask = serde_json::from_str(r#"{"text": "x"}"#).unwrap();
        assert!(task.tags.is_empty());
        assert!(task.due.is_none());
    }

    #[test]
    fn test_new_task_rejects_unknown_fields() {
        assert!(serde_json::from_str::<NewTask>(r#"{"text": "x", "priority": 1}"#).is_err());
    }

    #[test]
    fn test_builder() {
        let task = NewTask::new("a").tag("b").tag("c");
        assert_eq!(task.tags, vec!["b", "c"]);
    }
}
