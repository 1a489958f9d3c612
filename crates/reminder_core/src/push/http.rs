use crate::credentials::Credentials;
use crate::error::AppError;
use crate::push::{PushGateway, PushMessage};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

const BODY_PREVIEW_LIMIT: usize = 256;

#[derive(Serialize)]
struct SendRequest<'a> {
    message: WireMessage<'a>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    token: &'a str,
    notification: WireNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct WireNotification<'a> {
    title: &'a str,
    body: &'a str,
}

/// Posts each message as JSON to the gateway endpoint named in the credentials.
#[derive(Clone)]
pub struct HttpPushGateway {
    http: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl HttpPushGateway {
    pub fn new(credentials: &Credentials, timeout_ms: u64) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| AppError::gateway(err.to_string()))?;

        Ok(Self {
            http,
            endpoint: credentials.push_endpoint.trim().to_string(),
            access_token: credentials.access_token.clone(),
        })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(&self, message: &PushMessage) -> Result<(), AppError> {
        let request = SendRequest {
            message: WireMessage {
                token: &message.token,
                notification: WireNotification {
                    title: &message.title,
                    body: &message.body,
                },
                data: &message.data,
            },
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(describe_request_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AppError::gateway(format!(
            "status={} body={}",
            status.as_u16(),
            preview_body(&body)
        )))
    }
}

fn describe_request_error(err: reqwest::Error) -> AppError {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else {
        "request"
    };
    AppError::gateway(format!("{kind}: {err}"))
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut preview: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        preview.push_str("...");
    }
    preview
}
