use crate::error::AppError;
use crate::storage::DocumentStore;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const STORE_DIR_NAME: &str = "store";
const USERS_DIR_NAME: &str = "users";
const TASKS_DIR_NAME: &str = "tasks";
const DOCUMENT_EXTENSION: &str = "json";

pub fn store_root() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var("REMINDER_STORE_PATH")
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata)
            .join("todo_reminder")
            .join(STORE_DIR_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("todo_reminder")
            .join(STORE_DIR_NAME))
    }
}

/// Document store kept as JSON files:
///
/// ```text
/// <root>/users/<user>.json                user document
/// <root>/users/<user>/tasks/<task>.json   one document per task
/// ```
#[derive(Debug, Clone)]
pub struct JsonDocumentStore {
    root: PathBuf,
}

impl JsonDocumentStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn users_dir(&self) -> PathBuf {
        self.root.join(USERS_DIR_NAME)
    }

    fn user_document_path(&self, user: &str) -> Result<PathBuf, AppError> {
        let user = checked_segment(user)?;
        Ok(self
            .users_dir()
            .join(format!("{user}.{DOCUMENT_EXTENSION}")))
    }

    fn task_documents_dir(&self, user: &str) -> Result<PathBuf, AppError> {
        let user = checked_segment(user)?;
        Ok(self.users_dir().join(user).join(TASKS_DIR_NAME))
    }

    fn task_document_path(&self, user: &str, document: &str) -> Result<PathBuf, AppError> {
        let document = checked_segment(document)?;
        Ok(self
            .task_documents_dir(user)?
            .join(format!("{document}.{DOCUMENT_EXTENSION}")))
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn list_users(&self) -> Result<Vec<String>, AppError> {
        let dir = self.users_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&dir, err)),
        };

        let mut users = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_error(&dir, err))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| io_error(&path, err))?;

            if file_type.is_dir() {
                if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                    users.insert(name.to_string());
                }
            } else if let Some(stem) = document_stem(&path) {
                users.insert(stem);
            }
        }

        Ok(users.into_iter().collect())
    }

    async fn read_user_document(&self, user: &str) -> Result<Option<Map<String, Value>>, AppError> {
        let path = self.user_document_path(user)?;
        read_document(&path).await
    }

    async fn read_task_documents(
        &self,
        user: &str,
    ) -> Result<Vec<(String, Map<String, Value>)>, AppError> {
        let dir = self.task_documents_dir(user)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&dir, err)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_error(&dir, err))?
        {
            let path = entry.path();
            if let Some(stem) = document_stem(&path) {
                paths.push((stem, path));
            }
        }
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for (id, path) in paths {
            if let Some(document) = read_document(&path).await? {
                documents.push((id, document));
            }
        }

        Ok(documents)
    }

    async fn merge_user_document(
        &self,
        user: &str,
        fields: Map<String, Value>,
    ) -> Result<(), AppError> {
        let path = self.user_document_path(user)?;
        let mut document = read_document(&path).await?.unwrap_or_default();
        document.extend(fields);
        write_document(&path, &document).await
    }

    async fn merge_task_document(
        &self,
        user: &str,
        document: &str,
        fields: Map<String, Value>,
    ) -> Result<(), AppError> {
        let path = self.task_document_path(user, document)?;
        let Some(mut stored) = read_document(&path).await? else {
            tracing::debug!(user, document, "task document removed before write-back");
            return Ok(());
        };
        stored.extend(fields);
        write_document(&path, &stored).await
    }
}

fn checked_segment(segment: &str) -> Result<&str, AppError> {
    let trimmed = segment.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
    {
        return Err(AppError::invalid_input(format!(
            "invalid document id: {segment:?}"
        )));
    }
    Ok(trimmed)
}

fn document_stem(path: &Path) -> Option<String> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXTENSION) {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

async fn read_document(path: &Path) -> Result<Option<Map<String, Value>>, AppError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(path, err)),
    };

    let value: Value = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;

    match value {
        Value::Object(document) => Ok(Some(document)),
        _ => Err(AppError::invalid_data(format!(
            "{} is not a JSON object",
            path.display()
        ))),
    }
}

async fn write_document(path: &Path, document: &Map<String, Value>) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| io_error(parent, err))?;
    }

    let content = serde_json::to_string_pretty(document)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|err| io_error(path, err))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, permissions)
            .await
            .map_err(|err| io_error(path, err))?;
    }

    Ok(())
}

fn io_error(path: &Path, err: std::io::Error) -> AppError {
    AppError::io(format!("{}: {}", path.display(), err))
}
