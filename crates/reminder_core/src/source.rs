use crate::error::AppError;
use crate::model::Task;
use crate::storage::{DocumentStore, TASKS_FIELD};
use async_trait::async_trait;
use serde_json::Value;

/// Where a loaded task is stored, and so where its updates are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOrigin {
    /// An entry of the user document's `tasks` array.
    UserDocument,
    /// Its own task document, by document id.
    TaskDocument(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourcedTask {
    pub origin: TaskOrigin,
    pub task: Task,
}

/// One place a user's tasks may live.
#[async_trait]
pub trait TaskSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Missing documents yield an empty list; unreadable or malformed ones are errors.
    async fn load(
        &self,
        store: &dyn DocumentStore,
        user: &str,
    ) -> Result<Vec<SourcedTask>, AppError>;
}

/// The `tasks` array of the user document.
pub struct AggregateDocumentSource;

#[async_trait]
impl TaskSource for AggregateDocumentSource {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    async fn load(
        &self,
        store: &dyn DocumentStore,
        user: &str,
    ) -> Result<Vec<SourcedTask>, AppError> {
        let Some(mut document) = store.read_user_document(user).await? else {
            return Ok(Vec::new());
        };

        let entries = match document.remove(TASKS_FIELD) {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(AppError::invalid_data(format!(
                    "{TASKS_FIELD} of user {user} must be an array"
                )));
            }
        };

        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| -> Result<SourcedTask, AppError> {
                let task = serde_json::from_value(entry).map_err(|err| {
                    AppError::invalid_data(format!("task {index} of user {user}: {err}"))
                })?;
                Ok(SourcedTask {
                    origin: TaskOrigin::UserDocument,
                    task,
                })
            })
            .collect()
    }
}

/// One document per task under the user, keyed by task id.
pub struct TaskCollectionSource;

#[async_trait]
impl TaskSource for TaskCollectionSource {
    fn name(&self) -> &'static str {
        "collection"
    }

    async fn load(
        &self,
        store: &dyn DocumentStore,
        user: &str,
    ) -> Result<Vec<SourcedTask>, AppError> {
        let documents = store.read_task_documents(user).await?;
        let mut tasks = Vec::with_capacity(documents.len());

        for (document_id, body) in documents {
            let mut task: Task = serde_json::from_value(Value::Object(body)).map_err(|err| {
                AppError::invalid_data(format!("task {document_id} of user {user}: {err}"))
            })?;
            if task.id.trim().is_empty() {
                task.id = document_id.clone();
            }
            tasks.push(SourcedTask {
                origin: TaskOrigin::TaskDocument(document_id),
                task,
            });
        }

        Ok(tasks)
    }
}

/// Tries each source in order and returns the first non-empty task list.
pub struct LayeredTaskSource {
    sources: Vec<Box<dyn TaskSource>>,
}

impl Default for LayeredTaskSource {
    fn default() -> Self {
        Self::new(vec![
            Box::new(AggregateDocumentSource),
            Box::new(TaskCollectionSource),
        ])
    }
}

impl LayeredTaskSource {
    pub fn new(sources: Vec<Box<dyn TaskSource>>) -> Self {
        Self { sources }
    }

    pub async fn load_tasks(
        &self,
        store: &dyn DocumentStore,
        user: &str,
    ) -> Result<Vec<SourcedTask>, AppError> {
        for source in &self.sources {
            let tasks = source.load(store, user).await?;
            if !tasks.is_empty() {
                tracing::debug!(user, source = source.name(), count = tasks.len(), "loaded tasks");
                return Ok(tasks);
            }
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::{LayeredTaskSource, TaskOrigin};
    use crate::storage::JsonDocumentStore;
    use serde_json::{Value, json};
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("todo-reminder-{nanos}-{name}"))
    }

    fn write_json(path: &Path, value: Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn prefers_aggregate_document() {
        let root = temp_root("source-aggregate");
        write_json(
            &root.join("users/alice.json"),
            json!({ "tasks": [{ "id": "agg-1", "text": "from aggregate" }] }),
        );
        write_json(
            &root.join("users/alice/tasks/doc-1.json"),
            json!({ "text": "from collection" }),
        );

        let store = JsonDocumentStore::new(&root);
        let tasks = LayeredTaskSource::default()
            .load_tasks(&store, "alice")
            .await
            .unwrap();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task.id, "agg-1");
        assert_eq!(tasks[0].origin, TaskOrigin::UserDocument);
    }

    #[tokio::test]
    async fn falls_back_to_task_documents_and_keeps_ids() {
        let root = temp_root("source-collection");
        write_json(
            &root.join("users/alice.json"),
            json!({ "tasks": [], "deviceTokens": ["tok"] }),
        );
        write_json(
            &root.join("users/alice/tasks/doc-2.json"),
            json!({ "text": "second", "dueDate": "2025-12-21T09:00:00Z" }),
        );
        write_json(
            &root.join("users/alice/tasks/doc-1.json"),
            json!({ "id": "", "text": "first" }),
        );

        let store = JsonDocumentStore::new(&root);
        let tasks = LayeredTaskSource::default()
            .load_tasks(&store, "alice")
            .await
            .unwrap();
        std::fs::remove_dir_all(&root).ok();

        let ids: Vec<&str> = tasks.iter().map(|loaded| loaded.task.id.as_str()).collect();
        assert_eq!(ids, vec!["doc-1", "doc-2"]);
        assert_eq!(tasks[1].task.text, "second");
        assert!(tasks[1].task.due_date.is_some());
        assert_eq!(tasks[1].origin, TaskOrigin::TaskDocument("doc-2".to_string()));
    }

    #[tokio::test]
    async fn empty_when_nothing_is_stored() {
        let root = temp_root("source-empty");
        let store = JsonDocumentStore::new(&root);

        let tasks = LayeredTaskSource::default()
            .load_tasks(&store, "nobody")
            .await
            .unwrap();

        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn malformed_task_is_an_error() {
        let root = temp_root("source-malformed");
        write_json(
            &root.join("users/alice.json"),
            json!({ "tasks": [{ "id": "t1", "dueDate": "tomorrow-ish" }] }),
        );

        let store = JsonDocumentStore::new(&root);
        let err = LayeredTaskSource::default()
            .load_tasks(&store, "alice")
            .await
            .unwrap_err();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[tokio::test]
    async fn non_array_tasks_field_is_an_error() {
        let root = temp_root("source-not-array");
        write_json(&root.join("users/alice.json"), json!({ "tasks": "nope" }));

        let store = JsonDocumentStore::new(&root);
        let err = LayeredTaskSource::default()
            .load_tasks(&store, "alice")
            .await
            .unwrap_err();
        std::fs::remove_dir_all(&root).ok();

        assert_eq!(err.code(), "invalid_data");
    }
}
