pub mod json_store;

use crate::error::AppError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub use json_store::JsonDocumentStore;

pub const TASKS_FIELD: &str = "tasks";
const DEVICE_TOKENS_FIELD: &str = "deviceTokens";
const LEGACY_DEVICE_TOKEN_FIELD: &str = "deviceToken";

/// Per-user document storage. Documents are JSON objects.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<String>, AppError>;

    async fn read_user_document(&self, user: &str) -> Result<Option<Map<String, Value>>, AppError>;

    /// One `(document id, body)` pair per task document, ordered by id.
    async fn read_task_documents(
        &self,
        user: &str,
    ) -> Result<Vec<(String, Map<String, Value>)>, AppError>;

    /// Overwrites only the given top-level fields; every other field of the
    /// stored document is kept.
    async fn merge_user_document(
        &self,
        user: &str,
        fields: Map<String, Value>,
    ) -> Result<(), AppError>;

    /// Same as [`DocumentStore::merge_user_document`] for one task document.
    /// A task document that no longer exists stays absent.
    async fn merge_task_document(
        &self,
        user: &str,
        document: &str,
        fields: Map<String, Value>,
    ) -> Result<(), AppError>;
}

pub async fn load_device_tokens(
    store: &dyn DocumentStore,
    user: &str,
) -> Result<BTreeSet<String>, AppError> {
    let document = store.read_user_document(user).await?;
    Ok(document.as_ref().map(device_tokens).unwrap_or_default())
}

pub fn device_tokens(document: &Map<String, Value>) -> BTreeSet<String> {
    let listed = document
        .get(DEVICE_TOKENS_FIELD)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    let legacy = document
        .get(LEGACY_DEVICE_TOKEN_FIELD)
        .and_then(Value::as_str);

    listed
        .chain(legacy)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::device_tokens;
    use serde_json::{Value, json};

    fn object(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn tokens_are_deduplicated_and_trimmed() {
        let document = object(json!({
            "deviceTokens": ["tok-a", " tok-b ", "tok-a", "", 7],
            "deviceToken": "tok-b"
        }));

        let tokens: Vec<String> = device_tokens(&document).into_iter().collect();
        assert_eq!(tokens, vec!["tok-a".to_string(), "tok-b".to_string()]);
    }

    #[test]
    fn no_token_fields_means_no_tokens() {
        let document = object(json!({ "tasks": [] }));
        assert!(device_tokens(&document).is_empty());
    }
}
