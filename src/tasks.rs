//! Task store collaborator.
//! The orchestrator only consumes the success flag and the human-readable
//! message; persistence belongs to the host application.

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::TaskStoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "high" | "urgent" => Some(Priority::High),
            "medium" | "normal" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStoreResult {
    pub success: bool,
    pub message: String,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn complete_all(
        &self,
        user_id: &str,
        priority: Option<Priority>,
    ) -> Result<TaskStoreResult, TaskStoreError>;

    async fn delete_all(
        &self,
        user_id: &str,
        priority: Option<Priority>,
    ) -> Result<TaskStoreResult, TaskStoreError>;

    async fn create_task(
        &self,
        user_id: &str,
        title: &str,
        priority: Priority,
    ) -> Result<TaskStoreResult, TaskStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub user_id: String,
    pub title: String,
    pub priority: Priority,
    pub completed: bool,
}

/// In-process store for the console binary and tests.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<Vec<TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self, user_id: &str) -> Vec<TaskRecord> {
        self.tasks
            .lock()
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }
}

fn scope(priority: Option<Priority>) -> String {
    match priority {
        Some(p) => format!("{p} priority "),
        None => String::new(),
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn complete_all(
        &self,
        user_id: &str,
        priority: Option<Priority>,
    ) -> Result<TaskStoreResult, TaskStoreError> {
        let mut tasks = self.tasks.lock();
        let mut count = 0;
        for task in tasks.iter_mut().filter(|t| {
            t.user_id == user_id && !t.completed && priority.map_or(true, |p| t.priority == p)
        }) {
            task.completed = true;
            count += 1;
        }
        info!(user_id, count, "tasks_completed");
        let message = if count == 0 {
            format!("You have no pending {}tasks to complete.", scope(priority))
        } else {
            format!("Marked {count} {}task{} as complete.", scope(priority), plural(count))
        };
        Ok(TaskStoreResult {
            success: true,
            message,
        })
    }

    async fn delete_all(
        &self,
        user_id: &str,
        priority: Option<Priority>,
    ) -> Result<TaskStoreResult, TaskStoreError> {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|t| !(t.user_id == user_id && priority.map_or(true, |p| t.priority == p)));
        let count = before - tasks.len();
        info!(user_id, count, "tasks_deleted");
        let message = if count == 0 {
            format!("There are no {}tasks to delete.", scope(priority))
        } else {
            format!("Deleted {count} {}task{}.", scope(priority), plural(count))
        };
        Ok(TaskStoreResult {
            success: true,
            message,
        })
    }

    async fn create_task(
        &self,
        user_id: &str,
        title: &str,
        priority: Priority,
    ) -> Result<TaskStoreResult, TaskStoreError> {
        if title.trim().is_empty() {
            return Err(TaskStoreError::Rejected("task title is empty".into()));
        }
        self.tasks.lock().push(TaskRecord {
            user_id: user_id.to_string(),
            title: title.to_string(),
            priority,
            completed: false,
        });
        info!(user_id, title, %priority, "task_created");
        Ok(TaskStoreResult {
            success: true,
            message: format!("Added \"{title}\" to your tasks with {priority} priority."),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_complete_by_priority() {
        let store = InMemoryTaskStore::new();
        store.create_task("u", "buy milk", Priority::High).await.unwrap();
        store.create_task("u", "walk dog", Priority::Low).await.unwrap();
        store.create_task("other", "x", Priority::High).await.unwrap();

        let res = store.complete_all("u", Some(Priority::High)).await.unwrap();
        assert!(res.success);
        assert_eq!(res.message, "Marked 1 high priority task as complete.");

        let tasks = store.tasks("u");
        assert!(tasks.iter().any(|t| t.title == "buy milk" && t.completed));
        assert!(tasks.iter().any(|t| t.title == "walk dog" && !t.completed));
        assert!(!store.tasks("other")[0].completed);
    }

    #[tokio::test]
    async fn delete_all_scoped_to_user() {
        let store = InMemoryTaskStore::new();
        store.create_task("u", "a", Priority::Medium).await.unwrap();
        store.create_task("u", "b", Priority::Medium).await.unwrap();
        store.create_task("other", "c", Priority::Medium).await.unwrap();

        let res = store.delete_all("u", None).await.unwrap();
        assert_eq!(res.message, "Deleted 2 tasks.");
        assert!(store.tasks("u").is_empty());
        assert_eq!(store.tasks("other").len(), 1);
    }

    #[tokio::test]
    async fn empty_title_rejected() {
        let store = InMemoryTaskStore::new();
        assert!(store.create_task("u", "  ", Priority::Low).await.is_err());
    }

    #[test]
    fn priority_parse() {
        assert_eq!(Priority::parse("HIGH"), Some(Priority::High));
        assert_eq!(Priority::parse("urgent"), Some(Priority::High));
        assert_eq!(Priority::parse("whenever"), None);
    }
}
