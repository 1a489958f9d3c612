use crate::config::Config;
use crate::credentials::credentials_from_env;
use crate::error::AppError;
use crate::model::NotificationIntent;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

mod http;
pub use http::HttpPushGateway;

const LINK_PREFIX: &str = "/tasks/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn for_intent(intent: &NotificationIntent, token: &str) -> Self {
        let data = BTreeMap::from([
            ("taskId".to_string(), intent.task_id.clone()),
            ("window".to_string(), intent.window.clone()),
            ("kind".to_string(), intent.kind.as_str().to_string()),
            ("link".to_string(), task_link(&intent.task_id)),
        ]);

        Self {
            token: token.to_string(),
            title: intent.title.clone(),
            body: intent.body.clone(),
            data,
        }
    }
}

pub fn task_link(task_id: &str) -> String {
    format!("{LINK_PREFIX}{task_id}")
}

/// A token-based push delivery service. One call is one delivery attempt.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<(), AppError>;
}

pub struct NoopGateway;

#[async_trait]
impl PushGateway for NoopGateway {
    async fn send(&self, _message: &PushMessage) -> Result<(), AppError> {
        Ok(())
    }
}

pub fn gateway_from_env(config: &Config) -> Result<Arc<dyn PushGateway>, AppError> {
    if config.push_disabled {
        return Ok(Arc::new(NoopGateway));
    }

    let credentials = credentials_from_env()?;
    tracing::debug!(project = %credentials.project_id, "push gateway configured");
    Ok(Arc::new(HttpPushGateway::new(
        &credentials,
        config.push_timeout_ms,
    )?))
}

#[derive(Debug)]
pub struct DeliveryReport {
    pub token: String,
    pub outcome: Result<(), AppError>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Fans one intent out to every device token of a user.
#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<dyn PushGateway>,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn PushGateway>) -> Self {
        Self { gateway }
    }

    /// Sends once to each distinct token, concurrently. Never fails: each
    /// token's result is in its report.
    pub async fn dispatch(
        &self,
        intent: &NotificationIntent,
        tokens: &[String],
    ) -> Vec<DeliveryReport> {
        let unique: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();

        let sends = unique.into_iter().map(|token| async move {
            let message = PushMessage::for_intent(intent, token);
            let outcome = self.gateway.send(&message).await;
            if let Err(err) = &outcome {
                tracing::warn!(
                    task = %intent.task_id,
                    kind = intent.kind.as_str(),
                    token = %redact_token(token),
                    error = %err,
                    "push delivery failed"
                );
            }
            DeliveryReport {
                token: token.to_string(),
                outcome,
            }
        });

        futures::future::join_all(sends).await
    }
}

fn redact_token(token: &str) -> String {
    let visible: String = token.chars().take(6).collect();
    format!("{visible}…")
}

#[cfg(test)]
mod tests {
    use super::{Dispatcher, PushGateway, PushMessage, task_link};
    use crate::error::AppError;
    use crate::model::{IntentKind, NotificationIntent};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<PushMessage>>,
    }

    #[async_trait]
    impl PushGateway for RecordingGateway {
        async fn send(&self, message: &PushMessage) -> Result<(), AppError> {
            self.sent.lock().unwrap().push(message.clone());
            if message.token.starts_with("bad") {
                Err(AppError::gateway("token expired"))
            } else {
                Ok(())
            }
        }
    }

    fn intent() -> NotificationIntent {
        NotificationIntent {
            task_id: "task-1".to_string(),
            window: "15min".to_string(),
            kind: IntentKind::DueSoon,
            title: "Task due soon".to_string(),
            body: "Pay rent".to_string(),
        }
    }

    #[test]
    fn message_carries_task_metadata() {
        let message = PushMessage::for_intent(&intent(), "tok-1");

        assert_eq!(message.token, "tok-1");
        assert_eq!(message.title, "Task due soon");
        assert_eq!(message.body, "Pay rent");
        assert_eq!(message.data["taskId"], "task-1");
        assert_eq!(message.data["kind"], "due-soon");
        assert_eq!(message.data["window"], "15min");
        assert_eq!(message.data["link"], task_link("task-1"));
        assert_eq!(task_link("task-1"), "/tasks/task-1");
    }

    #[tokio::test]
    async fn sends_once_per_distinct_token() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = Dispatcher::new(gateway.clone());
        let tokens = vec![
            "tok-a".to_string(),
            "tok-b".to_string(),
            "tok-a".to_string(),
        ];

        let reports = dispatcher.dispatch(&intent(), &tokens).await;

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|report| report.delivered()));
        let mut sent: Vec<String> = gateway
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|message| message.token.clone())
            .collect();
        sent.sort();
        assert_eq!(sent, vec!["tok-a".to_string(), "tok-b".to_string()]);
    }

    #[tokio::test]
    async fn one_failing_token_does_not_stop_the_others() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = Dispatcher::new(gateway.clone());
        let tokens = vec!["bad-token".to_string(), "tok-ok".to_string()];

        let reports = dispatcher.dispatch(&intent(), &tokens).await;

        assert_eq!(gateway.sent.lock().unwrap().len(), 2);
        let failed: Vec<&str> = reports
            .iter()
            .filter(|report| !report.delivered())
            .map(|report| report.token.as_str())
            .collect();
        assert_eq!(failed, vec!["bad-token"]);
    }

    #[tokio::test]
    async fn no_tokens_means_no_sends() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = Dispatcher::new(gateway.clone());

        let reports = dispatcher.dispatch(&intent(), &[]).await;

        assert!(reports.is_empty());
        assert!(gateway.sent.lock().unwrap().is_empty());
    }
}
