use crate::error::AppError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::fmt;

const CREDENTIALS_ENV_VAR: &str = "REMINDER_CREDENTIALS";

/// Service-account blob used to reach the push gateway.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub project_id: String,
    pub push_endpoint: String,
    pub access_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("project_id", &self.project_id)
            .field("push_endpoint", &self.push_endpoint)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

pub fn credentials_from_env() -> Result<Credentials, AppError> {
    let blob = std::env::var(CREDENTIALS_ENV_VAR)
        .map_err(|_| AppError::credentials(format!("{CREDENTIALS_ENV_VAR} is not set")))?;
    parse_credentials(&blob)
}

/// Accepts the JSON blob as-is or base64-encoded.
pub fn parse_credentials(blob: &str) -> Result<Credentials, AppError> {
    let trimmed = blob.trim();
    if trimmed.is_empty() {
        return Err(AppError::credentials("credentials are empty"));
    }

    let json = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        let bytes = STANDARD
            .decode(trimmed)
            .map_err(|err| AppError::credentials(format!("invalid base64: {err}")))?;
        String::from_utf8(bytes)
            .map_err(|_| AppError::credentials("decoded credentials are not UTF-8"))?
    };

    let credentials: Credentials = serde_json::from_str(&json)
        .map_err(|err| AppError::credentials(format!("invalid credentials JSON: {err}")))?;

    if credentials.project_id.trim().is_empty() {
        return Err(AppError::credentials("project_id is required"));
    }
    if credentials.access_token.trim().is_empty() {
        return Err(AppError::credentials("access_token is required"));
    }
    let endpoint = credentials.push_endpoint.trim();
    if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
        return Err(AppError::credentials("push_endpoint must be an http(s) URL"));
    }

    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::parse_credentials;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    const BLOB: &str = r#"{
        "project_id": "reminders-prod",
        "push_endpoint": "https://push.example.com/v1/send",
        "access_token": "secret-token"
    }"#;

    #[test]
    fn parses_plain_json() {
        let credentials = parse_credentials(BLOB).unwrap();
        assert_eq!(credentials.project_id, "reminders-prod");
        assert_eq!(credentials.push_endpoint, "https://push.example.com/v1/send");
    }

    #[test]
    fn parses_base64_json() {
        let encoded = STANDARD.encode(BLOB);
        let credentials = parse_credentials(&encoded).unwrap();
        assert_eq!(credentials.access_token, "secret-token");
    }

    #[test]
    fn debug_output_hides_token() {
        let credentials = parse_credentials(BLOB).unwrap();
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("reminders-prod"));
    }

    #[test]
    fn rejects_bad_blobs() {
        for blob in [
            "",
            "%%%not base64%%%",
            "{ broken json",
            r#"{"project_id":"p","push_endpoint":"ftp://x","access_token":"t"}"#,
            r#"{"project_id":"p","push_endpoint":"https://x","access_token":" "}"#,
        ] {
            let err = parse_credentials(blob).unwrap_err();
            assert_eq!(err.code(), "credentials_error", "blob: {blob}");
        }
    }
}
