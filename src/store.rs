//! Consumed persistence interface.
//!
//! The replicated store lives with the manager; the scheduler core only
//! reads the task inventory and writes back placement results and the
//! framework id. `memory::MemStore` backs tests and embedded setups.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from store operations. Read-side failures are tolerated by the
/// core (skip-and-log); write failures surface to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// A persisted application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A persisted task. The core mutates `agent_id`, `ip` and `port` when a
/// launch places the task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub app_id: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub port: Option<u64>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub state: String,
}

/// Store surface consumed by the scheduler core.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persisted framework id with its write time in epoch milliseconds.
    async fn get_framework_id(&self) -> Result<Option<(String, i64)>, StoreError>;

    async fn update_framework_id(&self, id: &str) -> Result<(), StoreError>;

    async fn list_apps(&self) -> Result<Vec<AppRecord>, StoreError>;

    async fn list_tasks(&self, app_id: &str) -> Result<Vec<TaskRecord>, StoreError>;

    async fn get_task(&self, app_id: &str, task_id: &str) -> Result<TaskRecord, StoreError>;

    async fn update_task(&self, app_id: &str, task: TaskRecord) -> Result<(), StoreError>;
}

pub mod memory {
    use std::sync::RwLock;

    use super::*;

    /// In-memory store for tests and embedded single-node setups.
    #[derive(Default)]
    pub struct MemStore {
        framework_id: RwLock<Option<(String, i64)>>,
        apps: RwLock<HashMap<String, AppRecord>>,
        tasks: RwLock<HashMap<String, HashMap<String, TaskRecord>>>,
    }

    impl MemStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_app(&self, app: AppRecord) {
            self.apps.write().unwrap().insert(app.id.clone(), app);
        }

        pub fn put_task(&self, task: TaskRecord) {
            self.tasks
                .write()
                .unwrap()
                .entry(task.app_id.clone())
                .or_default()
                .insert(task.id.clone(), task);
        }

        /// Backdate the framework-id write time (failover-staleness tests).
        pub fn set_framework_id_at(&self, id: &str, mtime_ms: i64) {
            *self.framework_id.write().unwrap() = Some((id.to_string(), mtime_ms));
        }
    }

    #[async_trait]
    impl Store for MemStore {
        async fn get_framework_id(&self) -> Result<Option<(String, i64)>, StoreError> {
            Ok(self.framework_id.read().unwrap().clone())
        }

        async fn update_framework_id(&self, id: &str) -> Result<(), StoreError> {
            *self.framework_id.write().unwrap() =
                Some((id.to_string(), Utc::now().timestamp_millis()));
            Ok(())
        }

        async fn list_apps(&self) -> Result<Vec<AppRecord>, StoreError> {
            let mut apps: Vec<_> = self.apps.read().unwrap().values().cloned().collect();
            apps.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(apps)
        }

        async fn list_tasks(&self, app_id: &str) -> Result<Vec<TaskRecord>, StoreError> {
            let tasks = self.tasks.read().unwrap();
            let mut list: Vec<_> = tasks
                .get(app_id)
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default();
            list.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(list)
        }

        async fn get_task(&self, app_id: &str, task_id: &str) -> Result<TaskRecord, StoreError> {
            self.tasks
                .read()
                .unwrap()
                .get(app_id)
                .and_then(|m| m.get(task_id))
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("{app_id}/{task_id}")))
        }

        async fn update_task(&self, app_id: &str, task: TaskRecord) -> Result<(), StoreError> {
            let mut tasks = self.tasks.write().unwrap();
            let app_tasks = tasks
                .get_mut(app_id)
                .ok_or_else(|| StoreError::NotFound(app_id.to_string()))?;
            app_tasks.insert(task.id.clone(), task);
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_framework_id_roundtrip() {
            let store = MemStore::new();
            assert!(store.get_framework_id().await.unwrap().is_none());

            store.update_framework_id("fw-1").await.unwrap();
            let (id, mtime) = store.get_framework_id().await.unwrap().unwrap();
            assert_eq!(id, "fw-1");
            assert!(mtime > 0);
        }

        #[tokio::test]
        async fn test_task_inventory() {
            let store = MemStore::new();
            store.put_app(AppRecord {
                id: "web".to_string(),
                name: "web".to_string(),
            });
            store.put_task(TaskRecord {
                id: "t1".to_string(),
                app_id: "web".to_string(),
                ..TaskRecord::default()
            });

            assert_eq!(store.list_apps().await.unwrap().len(), 1);
            assert_eq!(store.list_tasks("web").await.unwrap().len(), 1);
            assert!(store.list_tasks("missing").await.unwrap().is_empty());

            let mut task = store.get_task("web", "t1").await.unwrap();
            task.agent_id = "a1".to_string();
            task.port = Some(31000);
            store.update_task("web", task).await.unwrap();

            let updated = store.get_task("web", "t1").await.unwrap();
            assert_eq!(updated.agent_id, "a1");
            assert_eq!(updated.port, Some(31000));
        }

        #[tokio::test]
        async fn test_get_missing_task_is_not_found() {
            let store = MemStore::new();
            let err = store.get_task("web", "nope").await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
        }
    }
}
